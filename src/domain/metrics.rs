//! Metabolic indices derived from biometric input.
//!
//! - BMI = weight / height², 1 decimal
//! - TyG Index = ln(glucose × triglycerides / 2), 2 decimals
//! - TG/HDL ratio = triglycerides / hdl, 2 decimals
//!
//! Rounding is half-away-from-zero, applied after the IEEE-754 computation.

use serde::{Deserialize, Serialize};

use super::patient::{require_positive, InvalidInputError, PatientInput};

/// Derived indices. Never mutated; recompute from input instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub bmi: f64,
    pub tyg_index: f64,
    pub tg_hdl_ratio: f64,
}

/// Round to a fixed number of decimals, half away from zero.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Compute all three indices.
///
/// # Errors
/// Returns `InvalidInputError` if any argument is non-finite, zero or negative.
pub fn compute_metrics(
    weight: f64,
    height: f64,
    glucose: f64,
    triglycerides: f64,
    hdl: f64,
) -> Result<Metrics, InvalidInputError> {
    let weight = require_positive("weight", weight)?;
    let height = require_positive("height", height)?;
    let glucose = require_positive("glucose", glucose)?;
    let triglycerides = require_positive("triglycerides", triglycerides)?;
    let hdl = require_positive("hdl", hdl)?;

    let bmi = weight / (height * height);
    let tyg_index = (glucose * triglycerides / 2.0).ln();
    let tg_hdl_ratio = triglycerides / hdl;

    Ok(Metrics {
        bmi: round_to(bmi, 1),
        tyg_index: round_to(tyg_index, 2),
        tg_hdl_ratio: round_to(tg_hdl_ratio, 2),
    })
}

impl Metrics {
    /// Compute metrics from a full patient entry.
    ///
    /// # Errors
    /// Returns `InvalidInputError` if a biometric field is unusable.
    pub fn from_input(input: &PatientInput) -> Result<Self, InvalidInputError> {
        compute_metrics(
            input.weight,
            input.height,
            input.glucose,
            input.triglycerides,
            input.hdl,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_bmi() {
        let m = compute_metrics(70.0, 1.75, 90.0, 150.0, 50.0).expect("Should compute");
        assert_close(m.bmi, 22.9);
    }

    #[test]
    fn test_tyg_index() {
        let m = compute_metrics(70.0, 1.75, 90.0, 150.0, 50.0).expect("Should compute");
        assert_close(m.tyg_index, 8.82);
    }

    #[test]
    fn test_tg_hdl_ratio() {
        let m = compute_metrics(70.0, 1.75, 90.0, 150.0, 50.0).expect("Should compute");
        assert_close(m.tg_hdl_ratio, 3.0);
    }

    #[test]
    fn test_high_risk_scenario() {
        let m = compute_metrics(80.0, 1.8, 100.0, 180.0, 40.0).expect("Should compute");
        assert_close(m.bmi, 24.7);
        assert_close(m.tyg_index, 9.10);
        assert_close(m.tg_hdl_ratio, 4.5);
    }

    #[test]
    fn test_rejects_unusable_arguments() {
        assert!(matches!(
            compute_metrics(70.0, 0.0, 90.0, 150.0, 50.0),
            Err(InvalidInputError::NotPositive { field: "height", .. })
        ));
        assert!(matches!(
            compute_metrics(70.0, 1.75, -5.0, 150.0, 50.0),
            Err(InvalidInputError::NotPositive { field: "glucose", .. })
        ));
        assert!(matches!(
            compute_metrics(f64::INFINITY, 1.75, 90.0, 150.0, 50.0),
            Err(InvalidInputError::NonFinite { field: "weight", .. })
        ));
        assert!(matches!(
            compute_metrics(70.0, 1.75, 90.0, 150.0, f64::NAN),
            Err(InvalidInputError::NonFinite { field: "hdl", .. })
        ));
    }

    #[test]
    fn test_repeated_invocations_agree() {
        let first = compute_metrics(63.2, 1.61, 97.0, 133.0, 58.0).expect("Should compute");
        for _ in 0..10 {
            let again = compute_metrics(63.2, 1.61, 97.0, 133.0, 58.0).expect("Should compute");
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_close(round_to(2.25, 1), 2.3);
        assert_close(round_to(-2.25, 1), -2.3);
        assert_close(round_to(8.824, 2), 8.82);
    }
}
