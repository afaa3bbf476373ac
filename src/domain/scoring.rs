//! Diabetes risk scoring. Thresholds are fixed; results are persisted with
//! the assessment and never recomputed for stored records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognised {field} value: {value}")]
pub struct ScoringError {
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl FromStr for Gender {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" => Ok(Gender::Female),
            "M" => Ok(Gender::Male),
            other => Err(ScoringError {
                field: "gender",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ethnicity {
    White,
    Other,
}

impl FromStr for Ethnicity {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WHITE" => Ok(Ethnicity::White),
            "OTHER" => Ok(Ethnicity::Other),
            other => Err(ScoringError {
                field: "ethnicity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn parse(field: &'static str, s: &str) -> Result<Self, ScoringError> {
        match s {
            "YES" => Ok(YesNo::Yes),
            "NO" => Ok(YesNo::No),
            other => Err(ScoringError {
                field,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Increased,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Increased => "Increased",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn bmi(height_cm: f64, weight_kg: f64) -> f64 {
    let height_m = height_cm / 100.0;
    round1(weight_kg / (height_m * height_m))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn age_score(age: u32) -> i32 {
    match age {
        0..=49 => 0,
        50..=59 => 5,
        60..=69 => 9,
        _ => 13,
    }
}

pub fn waist_score(waist_cm: f64) -> i32 {
    if waist_cm < 90.0 {
        0
    } else if waist_cm < 99.9 {
        4
    } else if waist_cm < 109.9 {
        6
    } else {
        9
    }
}

pub fn bmi_score(bmi: f64) -> i32 {
    if bmi < 25.0 {
        0
    } else if bmi < 29.9 {
        3
    } else if bmi < 34.9 {
        5
    } else {
        8
    }
}

pub fn gender_score(gender: Gender) -> i32 {
    match gender {
        Gender::Female => 0,
        Gender::Male => 1,
    }
}

pub fn ethnicity_score(ethnicity: Ethnicity) -> i32 {
    match ethnicity {
        Ethnicity::White => 0,
        Ethnicity::Other => 6,
    }
}

pub fn yes_no_score(answer: YesNo) -> i32 {
    match answer {
        YesNo::Yes => 5,
        YesNo::No => 0,
    }
}

pub fn family_history_score(answer: YesNo) -> i32 {
    yes_no_score(answer)
}

pub fn bp_score(answer: YesNo) -> i32 {
    yes_no_score(answer)
}

pub fn risk_level(total: i32) -> RiskLevel {
    match total {
        i32::MIN..=6 => RiskLevel::Low,
        7..=15 => RiskLevel::Increased,
        16..=24 => RiskLevel::Moderate,
        _ => RiskLevel::High,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    pub age: u32,
    pub gender: Gender,
    pub ethnicity: Ethnicity,
    pub family_history: YesNo,
    pub high_bp: YesNo,
    pub waist_cm: f64,
    pub height_cm: f64,
    pub weight_kg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskBreakdown {
    pub bmi: f64,
    pub age_score: i32,
    pub gender_score: i32,
    pub ethnicity_score: i32,
    pub family_history_score: i32,
    pub waist_score: i32,
    pub bmi_score: i32,
    pub bp_score: i32,
    pub total_score: i32,
    pub risk_level: RiskLevel,
}

pub fn assess(inputs: &RiskInputs) -> RiskBreakdown {
    let bmi_value = bmi(inputs.height_cm, inputs.weight_kg);
    let age_score = age_score(inputs.age);
    let gender_score = gender_score(inputs.gender);
    let ethnicity_score = ethnicity_score(inputs.ethnicity);
    let family_history_score = family_history_score(inputs.family_history);
    let waist_score = waist_score(inputs.waist_cm);
    let bmi_score = bmi_score(bmi_value);
    let bp_score = bp_score(inputs.high_bp);

    let total_score = age_score
        + gender_score
        + ethnicity_score
        + family_history_score
        + waist_score
        + bmi_score
        + bp_score;

    RiskBreakdown {
        bmi: bmi_value,
        age_score,
        gender_score,
        ethnicity_score,
        family_history_score,
        waist_score,
        bmi_score,
        bp_score,
        total_score,
        risk_level: risk_level(total_score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_rounding() {
        assert_eq!(bmi(180.0, 81.0), 25.0);
        assert_eq!(bmi(165.0, 70.0), 25.7);
    }

    #[test]
    fn test_age_boundaries() {
        assert_eq!(age_score(49), 0);
        assert_eq!(age_score(50), 5);
        assert_eq!(age_score(59), 5);
        assert_eq!(age_score(60), 9);
        assert_eq!(age_score(69), 9);
        assert_eq!(age_score(70), 13);
    }

    #[test]
    fn test_waist_boundaries() {
        assert_eq!(waist_score(89.9), 0);
        assert_eq!(waist_score(90.0), 4);
        assert_eq!(waist_score(99.9), 6);
        assert_eq!(waist_score(109.8), 6);
        assert_eq!(waist_score(109.9), 9);
    }

    #[test]
    fn test_bmi_score_boundaries() {
        assert_eq!(bmi_score(24.9), 0);
        assert_eq!(bmi_score(25.0), 3);
        assert_eq!(bmi_score(29.9), 5);
        assert_eq!(bmi_score(34.9), 8);
    }

    #[test]
    fn test_categorical_scores() {
        assert_eq!(gender_score("F".parse().unwrap()), 0);
        assert_eq!(gender_score("M".parse().unwrap()), 1);
        assert!("X".parse::<Gender>().is_err());
        assert_eq!(ethnicity_score(Ethnicity::White), 0);
        assert_eq!(ethnicity_score("OTHER".parse().unwrap()), 6);
        assert_eq!(family_history_score(YesNo::Yes), 5);
        assert_eq!(bp_score(YesNo::No), 0);
        assert!(YesNo::parse("high_bp", "maybe").is_err());
    }

    #[test]
    fn test_risk_level_bands() {
        let levels: Vec<RiskLevel> = [6, 7, 15, 16, 24, 25].into_iter().map(risk_level).collect();
        assert_eq!(
            levels,
            vec![
                RiskLevel::Low,
                RiskLevel::Increased,
                RiskLevel::Increased,
                RiskLevel::Moderate,
                RiskLevel::Moderate,
                RiskLevel::High,
            ]
        );
    }

    #[test]
    fn test_assess_sums_components() {
        let breakdown = assess(&RiskInputs {
            age: 55,
            gender: Gender::Male,
            ethnicity: Ethnicity::White,
            family_history: YesNo::Yes,
            high_bp: YesNo::No,
            waist_cm: 95.0,
            height_cm: 180.0,
            weight_kg: 81.0,
        });
        assert_eq!(breakdown.bmi, 25.0);
        // 5 + 1 + 0 + 5 + 4 + 3 + 0
        assert_eq!(breakdown.total_score, 18);
        assert_eq!(breakdown.risk_level, RiskLevel::Moderate);
    }
}
