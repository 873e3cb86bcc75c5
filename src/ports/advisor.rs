//! Advisor port: narrative recommendation collaborator.
//!
//! The core consumes advisors; a failure here never blocks saving a record.

use crate::domain::{Metrics, PatientInput, RiskCategory};

/// Errors from recommendation collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecommendationError {
    #[error("Advisor is not configured")]
    NotConfigured,

    #[error("Advisor unreachable: {0}")]
    Unreachable(String),

    #[error("Advisor returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Advisor response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("Advisor returned no text")]
    Empty,
}

/// Trait for generating narrative recommendations.
pub trait Advisor: Send + Sync {
    /// Short name for logs and provenance.
    fn name(&self) -> &str;

    /// Produce markdown-style advice (`**Heading**: text` paragraphs).
    ///
    /// # Errors
    /// Returns `RecommendationError` if the collaborator fails.
    fn generate(
        &self,
        input: &PatientInput,
        metrics: &Metrics,
        risk: RiskCategory,
    ) -> Result<String, RecommendationError>;
}
