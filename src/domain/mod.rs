//! Domain layer: Core metabolic-risk types and logic.
//!
//! Everything here is pure: no I/O, no clocks beyond record timestamps, and
//! identical inputs always give identical outputs.

pub mod advice;
pub mod gauge;
mod metrics;
mod patient;
mod record;
mod risk;

pub use metrics::{compute_metrics, round_to, Metrics};
pub use patient::{InvalidInputError, PatientInput};
pub use record::{next_record_id, now_millis, sort_newest_first, CanonicalField, PatientRecord};
pub use risk::{classify, RiskCategory, LOW_RISK_CEILING, MODERATE_RISK_CEILING};

#[cfg(test)]
pub(crate) use patient::sample_input;
