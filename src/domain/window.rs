use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Named date buckets shared by the table list and submission results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateWindow {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "30d")]
    Last30Days,
}

impl DateWindow {
    /// Unknown or missing tokens mean no filtering.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("today") => DateWindow::Today,
            Some("week") | Some("7d") => DateWindow::Week,
            Some("month") => DateWindow::Month,
            Some("30d") => DateWindow::Last30Days,
            _ => DateWindow::All,
        }
    }

    /// First local date included in the window (inclusive).
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateWindow::All => None,
            DateWindow::Today => Some(today),
            DateWindow::Week => Some(today - Duration::days(7)),
            DateWindow::Month => today.with_day(1),
            DateWindow::Last30Days => Some(today - Duration::days(30)),
        }
    }
}
