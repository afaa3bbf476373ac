//! Chart projections over visible health checks.

use crate::domain::records::HealthCheck;
use crate::time_utils::LocalZone;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NUMERIC_FIELDS: &[(&str, &str)] = &[
    ("systolic", "Systolic"),
    ("diastolic", "Diastolic"),
    ("pulse", "Pulse"),
    ("bmi", "BMI"),
    ("age", "Age"),
    ("risk", "Risk"),
];

const PERSON_SEPARATOR: &str = "|||";
const MIN_CHECKS_FOR_IMPROVEMENT: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("Invalid x/y")]
    InvalidAxes,
    #[error("Invalid metric")]
    InvalidMetric,
    #[error("Invalid person")]
    InvalidPerson,
    #[error("Unknown mode")]
    UnknownMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartRequest {
    pub mode: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub metric: Option<String>,
    pub person: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmiDelta {
    pub person: String,
    pub delta: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Series {
    Scatter { label: String, points: Vec<Point> },
    Line { label: String, data: Vec<f64> },
    Deltas { label: String, points: Vec<BmiDelta> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub ok: bool,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonChoice {
    pub key: String,
    pub label: String,
}

type PersonKey = (String, String, String);

fn person_of(check: &HealthCheck) -> PersonKey {
    (
        check.forename.clone(),
        check.surname.clone(),
        check.postcode.clone(),
    )
}

fn person_label((forename, surname, postcode): &PersonKey) -> String {
    format!("{forename} {surname} ({postcode})").trim().to_string()
}

pub fn person_key((forename, surname, postcode): &PersonKey) -> String {
    [forename.as_str(), surname.as_str(), postcode.as_str()].join(PERSON_SEPARATOR)
}

pub fn parse_person_key(raw: &str) -> Option<PersonKey> {
    let parts: Vec<&str> = raw.split(PERSON_SEPARATOR).collect();
    match parts.as_slice() {
        [forename, surname, postcode] => Some((
            forename.to_string(),
            surname.to_string(),
            postcode.to_string(),
        )),
        _ => None,
    }
}

fn allowed_field(name: Option<&str>) -> Option<&'static str> {
    let name = name?;
    NUMERIC_FIELDS
        .iter()
        .map(|(key, _)| *key)
        .find(|key| *key == name)
}

/// Distinct people in the visible checks, sorted by name then postcode.
pub fn people(checks: &[HealthCheck]) -> Vec<PersonChoice> {
    let mut unique: Vec<PersonKey> = checks.iter().map(person_of).collect();
    unique.sort();
    unique.dedup();
    unique
        .iter()
        .map(|p| PersonChoice {
            key: person_key(p),
            label: person_label(p),
        })
        .collect()
}

fn chronological(checks: &[&HealthCheck]) -> Vec<HealthCheck> {
    let mut sorted: Vec<HealthCheck> = checks.iter().map(|c| (*c).clone()).collect();
    sorted.sort_by_key(|c| (c.created_at, c.id));
    sorted
}

fn correlation(checks: &[HealthCheck], x: &str, y: &str) -> ChartData {
    let points = checks
        .iter()
        .filter_map(|c| Some(Point {
            x: c.numeric(x)?,
            y: c.numeric(y)?,
        }))
        .collect();
    ChartData {
        ok: true,
        mode: "correlation",
        labels: None,
        series: vec![Series::Scatter {
            label: format!("{y} vs {x}"),
            points,
        }],
    }
}

fn progression(
    checks: &[HealthCheck],
    zone: &LocalZone,
    metric: &str,
    person: &PersonKey,
) -> ChartData {
    let theirs: Vec<&HealthCheck> = checks.iter().filter(|c| &person_of(c) == person).collect();
    let mut labels = Vec::new();
    let mut data = Vec::new();
    for check in chronological(&theirs) {
        let Some(value) = check.numeric(metric) else {
            continue;
        };
        let label = match check.created_at {
            Some(at) => zone.local_date(at).format("%Y-%m-%d").to_string(),
            None => format!("Check {}", labels.len() + 1),
        };
        labels.push(label);
        data.push(value);
    }
    ChartData {
        ok: true,
        mode: "progression",
        labels: Some(labels),
        series: vec![Series::Line {
            label: metric.to_string(),
            data,
        }],
    }
}

/// Last BMI minus first BMI for people with at least three checks.
fn bmi_improvement(checks: &[HealthCheck]) -> ChartData {
    let mut by_person: BTreeMap<PersonKey, Vec<&HealthCheck>> = BTreeMap::new();
    for check in checks {
        by_person.entry(person_of(check)).or_default().push(check);
    }

    let points = by_person
        .iter()
        .filter(|(_, theirs)| theirs.len() >= MIN_CHECKS_FOR_IMPROVEMENT)
        .filter_map(|(person, theirs)| {
            let ordered = chronological(theirs);
            let first = ordered.first()?.numeric("bmi")?;
            let last = ordered.last()?.numeric("bmi")?;
            Some(BmiDelta {
                person: person_label(person),
                delta: last - first,
                count: ordered.len(),
            })
        })
        .collect();

    ChartData {
        ok: true,
        mode: "bmi_improvement",
        labels: None,
        series: vec![Series::Deltas {
            label: "BMI change (last - first)".to_string(),
            points,
        }],
    }
}

pub fn chart_data(
    checks: &[HealthCheck],
    zone: &LocalZone,
    request: &ChartRequest,
) -> Result<ChartData, ChartError> {
    match request.mode.as_deref().map(str::trim).unwrap_or("correlation") {
        "correlation" => {
            let x = allowed_field(request.x.as_deref()).ok_or(ChartError::InvalidAxes)?;
            let y = allowed_field(request.y.as_deref()).ok_or(ChartError::InvalidAxes)?;
            Ok(correlation(checks, x, y))
        }
        "progression" => {
            let metric =
                allowed_field(request.metric.as_deref()).ok_or(ChartError::InvalidMetric)?;
            let person = request
                .person
                .as_deref()
                .and_then(parse_person_key)
                .ok_or(ChartError::InvalidPerson)?;
            Ok(progression(checks, zone, metric, &person))
        }
        "bmi_improvement" => Ok(bmi_improvement(checks)),
        _ => Err(ChartError::UnknownMode),
    }
}
