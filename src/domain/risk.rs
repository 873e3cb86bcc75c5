//! Metabolic risk categories derived from the TyG Index.

use serde::{Deserialize, Serialize};

use super::patient::InvalidInputError;

/// Upper bound (exclusive) of the low-risk band.
pub const LOW_RISK_CEILING: f64 = 8.0;

/// Upper bound (inclusive) of the moderate-risk band.
pub const MODERATE_RISK_CEILING: f64 = 8.5;

/// Risk classification for metabolic disorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    /// TyG below 8.0
    Low,
    /// TyG in [8.0, 8.5]
    Moderate,
    /// TyG above 8.5
    High,
}

/// Classify a TyG Index value.
///
/// # Errors
/// Returns `InvalidInputError::NonFinite` for NaN or infinite values.
pub fn classify(tyg_index: f64) -> Result<RiskCategory, InvalidInputError> {
    if !tyg_index.is_finite() {
        return Err(InvalidInputError::NonFinite {
            field: "tygIndex",
            value: tyg_index,
        });
    }

    Ok(if tyg_index < LOW_RISK_CEILING {
        RiskCategory::Low
    } else if tyg_index <= MODERATE_RISK_CEILING {
        RiskCategory::Moderate
    } else {
        RiskCategory::High
    })
}

impl RiskCategory {
    /// Label as stored in the "Risk Level" column.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Moderate => "Moderate Risk",
            Self::High => "High Risk",
        }
    }

    /// Fixed human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low metabolic disorder risk",
            Self::Moderate => "Moderate metabolic disorder risk - monitoring recommended",
            Self::High => "High metabolic disorder risk - immediate attention required",
        }
    }

    /// Presentation tag for front ends.
    #[must_use]
    pub fn color_tag(&self) -> &'static str {
        match self {
            Self::Low => "success",
            Self::Moderate => "warning",
            Self::High => "danger",
        }
    }

    /// Parse a stored label. Accepts "High Risk", "high", "HighRisk", "HIGH".
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.trim_end_matches("risk") {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
