use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The organisation's local zone, used for "today" and date truncation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Default for LocalZone {
    fn default() -> Self {
        LocalZone::Named(chrono_tz::UTC)
    }
}

fn parse_fixed_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (sign, rest) = match trimmed.chars().next()? {
        '+' => (1, &trimmed[1..]),
        '-' => (-1, &trimmed[1..]),
        _ => return None,
    };

    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if rest.len() > 2 {
        let (h, m) = rest.split_at(rest.len() - 2);
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else {
        (rest.parse::<i32>().ok()?, 0)
    };

    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Accepts IANA names (`Europe/London`), `UTC`/`GMT`, and `UTC+02:00` style offsets.
pub fn parse_zone(raw: &str) -> Option<LocalZone> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_uppercase();
    if upper == "UTC" || upper == "GMT" {
        return Some(LocalZone::default());
    }

    if upper.starts_with("UTC") || upper.starts_with("GMT") {
        return parse_fixed_offset(&trimmed[3..]).map(LocalZone::Fixed);
    }

    trimmed.parse::<Tz>().ok().map(LocalZone::Named)
}

impl LocalZone {
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            LocalZone::Named(tz) => instant.with_timezone(tz).date_naive(),
            LocalZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// The UTC instant at which `date` begins locally.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        let local = match self {
            LocalZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            LocalZone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        };
        local.unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zone_variants() {
        assert_eq!(parse_zone("utc"), Some(LocalZone::default()));
        assert_eq!(
            parse_zone("UTC+02:00"),
            FixedOffset::east_opt(7200).map(LocalZone::Fixed)
        );
        assert_eq!(
            parse_zone("GMT-0530"),
            FixedOffset::west_opt(5 * 3600 + 30 * 60).map(LocalZone::Fixed)
        );
        assert!(matches!(parse_zone("Europe/London"), Some(LocalZone::Named(_))));
        assert_eq!(parse_zone("Mars/Olympus"), None);
        assert_eq!(parse_zone(""), None);
    }

    #[test]
    fn test_start_of_day_in_fixed_offset() {
        let zone = parse_zone("UTC+02:00").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let start = zone.start_of_day(date);
        assert_eq!(start.to_rfc3339(), "2024-04-30T22:00:00+00:00");
        assert_eq!(zone.local_date(start), date);
    }
}
