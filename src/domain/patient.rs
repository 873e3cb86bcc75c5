//! Patient biometric input for metabolic risk assessment.
//!
//! Units follow the clinical convention used at intake: kilograms, metres,
//! mg/dL for the blood panel and percent for HbA1c.

use serde::{Deserialize, Serialize};

/// Errors raised when biometric input cannot be used for computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidInputError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{}", join_problems(.0))]
    Multiple(Vec<InvalidInputError>),
}

fn join_problems(problems: &[InvalidInputError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl InvalidInputError {
    /// Collapse a list of problems into a single error (or none).
    pub(crate) fn from_problems(mut problems: Vec<InvalidInputError>) -> Result<(), Self> {
        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            _ => Err(Self::Multiple(problems)),
        }
    }

    /// Flattened list of the individual problems.
    #[must_use]
    pub fn problems(&self) -> Vec<&InvalidInputError> {
        match self {
            Self::Multiple(all) => all.iter().collect(),
            other => vec![other],
        }
    }
}

/// Require a finite, strictly positive value.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<f64, InvalidInputError> {
    if !value.is_finite() {
        return Err(InvalidInputError::NonFinite { field, value });
    }
    if value <= 0.0 {
        return Err(InvalidInputError::NotPositive { field, value });
    }
    Ok(value)
}

/// Raw patient entry as captured at intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub full_name: String,

    /// Age in whole years
    pub age: u32,

    /// Free-form gender as entered
    pub gender: String,

    /// Body weight in kg
    pub weight: f64,

    /// Height in metres
    pub height: f64,

    /// Fasting glucose in mg/dL
    pub glucose: f64,

    /// Triglycerides in mg/dL
    pub triglycerides: f64,

    /// HDL cholesterol in mg/dL
    pub hdl: f64,

    /// Glycated haemoglobin in percent
    pub hba1c: f64,

    /// Diabetes status as entered (e.g. "No", "Prediabetes", "Type 2")
    #[serde(rename = "diabetes", alias = "diabetesStatus")]
    pub diabetes_status: String,
}

impl PatientInput {
    /// Check every field, collecting all problems rather than stopping at the first.
    ///
    /// # Errors
    /// Returns `InvalidInputError` (possibly `Multiple`) describing each bad field.
    pub fn validate(&self) -> Result<(), InvalidInputError> {
        let mut problems = Vec::new();

        for (field, value) in [
            ("fullName", &self.full_name),
            ("gender", &self.gender),
            ("diabetesStatus", &self.diabetes_status),
        ] {
            if value.trim().is_empty() {
                problems.push(InvalidInputError::Missing { field });
            }
        }

        if self.age == 0 {
            problems.push(InvalidInputError::NotPositive {
                field: "age",
                value: 0.0,
            });
        }

        for (field, value) in [
            ("weight", self.weight),
            ("height", self.height),
            ("glucose", self.glucose),
            ("triglycerides", self.triglycerides),
            ("hdl", self.hdl),
        ] {
            if let Err(e) = require_positive(field, value) {
                problems.push(e);
            }
        }

        if !self.hba1c.is_finite() {
            problems.push(InvalidInputError::NonFinite {
                field: "hba1c",
                value: self.hba1c,
            });
        } else if self.hba1c < 0.0 {
            problems.push(InvalidInputError::Negative {
                field: "hba1c",
                value: self.hba1c,
            });
        }

        InvalidInputError::from_problems(problems)
    }
}

#[cfg(test)]
pub(crate) fn sample_input() -> PatientInput {
    PatientInput {
        full_name: "Jane Doe".to_string(),
        age: 52,
        gender: "Female".to_string(),
        weight: 80.0,
        height: 1.8,
        glucose: 100.0,
        triglycerides: 180.0,
        hdl: 40.0,
        hba1c: 6.8,
        diabetes_status: "Prediabetes".to_string(),
    }
}
