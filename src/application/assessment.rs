//! Assessment service: input → metrics → risk → recommendation → record.
//!
//! Recommendation failures never block a record: the advisor's error is kept
//! on the [`Recommendation`] and the configured fallback text is used instead.

use std::sync::Arc;

use crate::config::RecommendationFallback;
use crate::adapters::RuleBasedAdvisor;
use crate::domain::advice::{format_recommendations, RECOMMENDATION_UNAVAILABLE};
use crate::domain::{classify, InvalidInputError, Metrics, PatientInput, PatientRecord, RiskCategory};
use crate::ports::Advisor;

use super::Actor;

/// Validated input with its derived metrics and risk.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub input: PatientInput,
    pub metrics: Metrics,
    pub risk: RiskCategory,
}

/// Where recommendation text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendationSource {
    /// The named advisor answered
    Advisor(String),
    RuleBased,
    Placeholder,
}

/// Recommendation text (minimal HTML) and its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub html: String,
    pub source: RecommendationSource,
    /// Advisor failure that forced the fallback, if any
    pub error: Option<String>,
}

impl Recommendation {
    fn from_markdown(text: &str, source: RecommendationSource, error: Option<String>) -> Self {
        Self {
            html: format_recommendations(text),
            source,
            error,
        }
    }
}

/// Service for assessing patient input.
pub struct AssessmentService {
    advisor: Option<Arc<dyn Advisor>>,
    rules: RuleBasedAdvisor,
    fallback: RecommendationFallback,
}

impl AssessmentService {
    /// Create a service. Without an advisor, rule-based advice is always used.
    #[must_use]
    pub fn new(advisor: Option<Arc<dyn Advisor>>, fallback: RecommendationFallback) -> Self {
        Self {
            advisor,
            rules: RuleBasedAdvisor,
            fallback,
        }
    }

    /// Name of the configured advisor, if any.
    #[must_use]
    pub fn advisor_name(&self) -> Option<&str> {
        self.advisor.as_deref().map(|a| a.name())
    }

    /// Validate the input and derive metrics and risk.
    ///
    /// # Errors
    /// Returns `InvalidInputError` listing every unusable field.
    pub fn assess(&self, input: PatientInput) -> Result<Assessment, InvalidInputError> {
        input.validate()?;
        let metrics = Metrics::from_input(&input)?;
        let risk = classify(metrics.tyg_index)?;

        tracing::debug!(
            "Assessed: bmi={}, tyg={}, tg/hdl={}, risk={}",
            metrics.bmi,
            metrics.tyg_index,
            metrics.tg_hdl_ratio,
            risk
        );
        Ok(Assessment {
            input,
            metrics,
            risk,
        })
    }

    /// Produce recommendation text. Never fails.
    #[must_use]
    pub fn recommend(&self, assessment: &Assessment) -> Recommendation {
        let rules = || self.rules.advise(&assessment.input, &assessment.metrics);

        let Some(advisor) = &self.advisor else {
            return Recommendation::from_markdown(&rules(), RecommendationSource::RuleBased, None);
        };

        match advisor.generate(&assessment.input, &assessment.metrics, assessment.risk) {
            Ok(text) => Recommendation::from_markdown(
                &text,
                RecommendationSource::Advisor(advisor.name().to_string()),
                None,
            ),
            Err(e) => {
                tracing::warn!("Advisor {} failed, using fallback: {}", advisor.name(), e);
                let error = Some(e.to_string());
                match self.fallback {
                    RecommendationFallback::RuleBased => Recommendation::from_markdown(
                        &rules(),
                        RecommendationSource::RuleBased,
                        error,
                    ),
                    RecommendationFallback::Placeholder => Recommendation::from_markdown(
                        RECOMMENDATION_UNAVAILABLE,
                        RecommendationSource::Placeholder,
                        error,
                    ),
                }
            }
        }
    }

    /// Assemble the record to persist.
    #[must_use]
    pub fn build_record(
        &self,
        assessment: &Assessment,
        recommendation: &Recommendation,
        actor: &Actor,
    ) -> PatientRecord {
        PatientRecord::new(
            &assessment.input,
            &assessment.metrics,
            assessment.risk,
            recommendation.html.clone(),
            actor.email.clone(),
        )
    }
}
