//! Rule-based advisor: deterministic advice from the metric thresholds.

use crate::domain::advice::rule_based_advice;
use crate::domain::{Metrics, PatientInput, RiskCategory};
use crate::ports::{Advisor, RecommendationError};

/// Advisor that never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAdvisor;

impl RuleBasedAdvisor {
    pub const NAME: &'static str = "rule-based";

    /// Advice text (markdown) for the given metrics.
    #[must_use]
    pub fn advise(&self, input: &PatientInput, metrics: &Metrics) -> String {
        rule_based_advice(input, metrics)
    }
}

impl Advisor for RuleBasedAdvisor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate(
        &self,
        input: &PatientInput,
        metrics: &Metrics,
        _risk: RiskCategory,
    ) -> Result<String, RecommendationError> {
        Ok(self.advise(input, metrics))
    }
}
