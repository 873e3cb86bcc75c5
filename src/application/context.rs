//! Application context: the acting user and the wired-up services.
//!
//! Everything a front end needs is reached through one [`AppContext`] built
//! from [`AppConfig`]; nothing is held in process-wide state.

use std::fmt;
use std::sync::Arc;

use crate::adapters::{LocalStore, OpenAiAdvisor, RelationalStore, RuleBasedAdvisor, SpreadsheetEndpoint};
use crate::config::AppConfig;
use crate::domain::{InvalidInputError, PatientInput, PatientRecord};
use crate::ports::{Advisor, BackendKind, PersistError, RecordStore};
use crate::MetriskError;

use super::{Assessment, AssessmentService, Recommendation, RecordService, SaveOutcome, SyncReport};

/// The user on whose behalf records are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub email: String,
}

impl Actor {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Result of one assessment, saved or not.
#[derive(Debug, Clone)]
pub struct Submission {
    pub assessment: Assessment,
    pub recommendation: Recommendation,
    pub record: PatientRecord,
    /// Present when the record was persisted
    pub saved: Option<SaveOutcome>,
}

/// Wired services for one session.
pub struct AppContext {
    actor: Actor,
    assessments: AssessmentService,
    records: RecordService,
    local: Arc<LocalStore>,
    primary: Arc<dyn RecordStore>,
    spreadsheet: Option<Arc<SpreadsheetEndpoint>>,
}

impl AppContext {
    /// Build the context from configuration.
    ///
    /// An advisor that cannot be constructed is logged and skipped; rule-based
    /// advice is used instead.
    ///
    /// # Errors
    /// Returns `MetriskError::Persist` if a configured store cannot be opened.
    pub fn build(config: AppConfig) -> crate::Result<Self> {
        let local = Arc::new(match &config.local_store_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::in_memory(),
        });

        let spreadsheet = match &config.spreadsheet {
            Some(sheet) => Some(Arc::new(SpreadsheetEndpoint::new(
                &sheet.url,
                config.http_timeout_secs,
                sheet.bulk_supported,
            )?)),
            None => None,
        };

        let primary: Arc<dyn RecordStore> = match config.backend {
            BackendKind::Local => local.clone(),
            BackendKind::Relational => Arc::new(RelationalStore::new(&config.db_path)?),
            BackendKind::Spreadsheet => match &spreadsheet {
                Some(sheet) => sheet.clone(),
                None => {
                    return Err(MetriskError::Config(crate::config::ConfigError::MissingSheetsUrl))
                }
            },
        };

        let advisor: Option<Arc<dyn Advisor>> = match &config.openai {
            Some(openai) => match OpenAiAdvisor::new(
                &openai.base_url,
                openai.api_key.clone(),
                &openai.model,
                config.http_timeout_secs,
            ) {
                Ok(advisor) => Some(Arc::new(advisor)),
                Err(e) => {
                    tracing::warn!("Remote advisor unavailable, using rule-based advice: {}", e);
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            "Context ready: backend={}, advisor={}",
            primary.kind(),
            advisor.as_ref().map_or(RuleBasedAdvisor::NAME, |a| a.name())
        );

        let assessments = AssessmentService::new(advisor, config.recommendation_fallback);
        Ok(Self::with_components(
            Actor::new(config.user),
            assessments,
            primary,
            local,
            spreadsheet,
        ))
    }

    /// Assemble a context from ready-made parts.
    #[must_use]
    pub fn with_components(
        actor: Actor,
        assessments: AssessmentService,
        primary: Arc<dyn RecordStore>,
        local: Arc<LocalStore>,
        spreadsheet: Option<Arc<SpreadsheetEndpoint>>,
    ) -> Self {
        let records = RecordService::new(primary.clone(), Some(local.clone()));
        Self {
            actor,
            assessments,
            records,
            local,
            primary,
            spreadsheet,
        }
    }

    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    #[must_use]
    pub fn assessments(&self) -> &AssessmentService {
        &self.assessments
    }

    #[must_use]
    pub fn records(&self) -> &RecordService {
        &self.records
    }

    /// The spreadsheet endpoint, when one is configured.
    #[must_use]
    pub fn spreadsheet(&self) -> Option<&SpreadsheetEndpoint> {
        self.spreadsheet.as_deref()
    }

    /// Assess and recommend without saving.
    ///
    /// # Errors
    /// Returns `InvalidInputError` if the input is unusable.
    pub fn evaluate(&self, input: PatientInput) -> Result<Submission, InvalidInputError> {
        let assessment = self.assessments.assess(input)?;
        let recommendation = self.assessments.recommend(&assessment);
        let record = self
            .assessments
            .build_record(&assessment, &recommendation, &self.actor);
        Ok(Submission {
            assessment,
            recommendation,
            record,
            saved: None,
        })
    }

    /// Assess, recommend and save.
    ///
    /// # Errors
    /// Returns `MetriskError::InvalidInput` for unusable input and
    /// `MetriskError::Persist` if the record could not be saved anywhere.
    pub fn submit(&self, input: PatientInput) -> crate::Result<Submission> {
        let mut submission = self.evaluate(input)?;
        submission.saved = Some(self.save(&submission.record)?);
        Ok(submission)
    }

    /// Save an already assembled record.
    ///
    /// # Errors
    /// See [`RecordService::save`].
    pub fn save(&self, record: &PatientRecord) -> Result<SaveOutcome, PersistError> {
        self.records.save(record)
    }

    /// Push local records to the primary backend.
    ///
    /// Returns `None` when the primary backend is the local store itself.
    ///
    /// # Errors
    /// See [`RecordService::sync_to`].
    pub fn sync(&self, sequential_fallback: bool) -> Result<Option<SyncReport>, PersistError> {
        if self.primary.kind() == BackendKind::Local {
            return Ok(None);
        }
        let source = RecordService::new(self.local.clone(), None);
        source
            .sync_to(self.primary.as_ref(), sequential_fallback)
            .map(Some)
    }

    /// Flush the local store before exit.
    ///
    /// # Errors
    /// Returns `PersistError` if the local file cannot be written.
    pub fn shutdown(&self) -> Result<(), PersistError> {
        self.local.flush()?;
        tracing::info!("Session for {} closed", self.actor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecommendationFallback, SpreadsheetConfig};
    use crate::domain::sample_input;
    use crate::test_support::{closed_url, sheet_stub};

    fn local_context() -> AppContext {
        AppContext::build(AppConfig {
            user: "nurse@clinic.org".to_string(),
            ..AppConfig::default()
        })
        .expect("Should build")
    }

    #[test]
    fn test_evaluate_does_not_save() {
        let ctx = local_context();
        let submission = ctx.evaluate(sample_input()).expect("Should evaluate");
        assert!(submission.saved.is_none());
        assert_eq!(submission.record.created_by, "nurse@clinic.org");
        assert!(ctx.records().list().expect("Should list").records.is_empty());
    }

    #[test]
    fn test_submit_saves_to_primary() {
        let ctx = local_context();
        let submission = ctx.submit(sample_input()).expect("Should submit");
        let outcome = submission.saved.expect("Should be saved");
        assert_eq!(outcome.receipt.backend, BackendKind::Local);
        assert_eq!(outcome.receipt.id, submission.record.id);

        let listing = ctx.records().list().expect("Should list");
        assert_eq!(listing.records, vec![submission.record]);
    }

    #[test]
    fn test_submit_rejects_invalid_input() {
        let ctx = local_context();
        let input = PatientInput {
            hdl: 0.0,
            ..sample_input()
        };
        let err = ctx.submit(input).expect_err("Should reject");
        assert!(matches!(err, MetriskError::InvalidInput(_)));
    }

    #[test]
    fn test_sync_is_noop_for_local_primary() {
        let ctx = local_context();
        ctx.submit(sample_input()).expect("Should submit");
        assert!(ctx.sync(false).expect("Should sync").is_none());
    }

    #[test]
    fn test_unreachable_sheet_falls_back_then_syncs() {
        let stub = sheet_stub();
        let down = Arc::new(SpreadsheetEndpoint::new(&closed_url(), 2, true).expect("Should build"));
        let local = Arc::new(LocalStore::in_memory());
        let assessments = AssessmentService::new(None, RecommendationFallback::RuleBased);

        let offline = AppContext::with_components(
            Actor::new("nurse@clinic.org"),
            assessments,
            down.clone(),
            local.clone(),
            Some(down),
        );
        let submission = offline.submit(sample_input()).expect("Should fall back");
        let outcome = submission.saved.expect("Should be saved");
        assert!(outcome.used_fallback());
        assert_eq!(local.len().expect("Should count"), 1);

        let online = AppContext::build(AppConfig {
            backend: BackendKind::Spreadsheet,
            spreadsheet: Some(SpreadsheetConfig {
                url: stub.url.clone(),
                bulk_supported: true,
            }),
            ..AppConfig::default()
        })
        .expect("Should build");
        let online = AppContext::with_components(
            online.actor().clone(),
            AssessmentService::new(None, RecommendationFallback::RuleBased),
            online.primary.clone(),
            local,
            online.spreadsheet.clone(),
        );

        let report = online.sync(false).expect("Should sync").expect("Should run");
        assert_eq!(report.source, BackendKind::Local);
        assert_eq!(report.target, BackendKind::Spreadsheet);
        assert_eq!(report.report.saved, 1);
        assert_eq!(stub.row_count(), 1);
        assert!(online.spreadsheet().is_some());
    }

    #[test]
    fn test_file_backed_session_survives_restart() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let config = AppConfig {
            local_store_path: Some(dir.path().join("records.json")),
            ..AppConfig::default()
        };

        let first = AppContext::build(config.clone()).expect("Should build");
        let submission = first.submit(sample_input()).expect("Should submit");
        first.shutdown().expect("Should flush");

        let second = AppContext::build(config).expect("Should rebuild");
        let listing = second.records().list().expect("Should list");
        assert_eq!(listing.records, vec![submission.record]);
    }

    #[test]
    fn test_relational_backend() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let ctx = AppContext::build(AppConfig {
            backend: BackendKind::Relational,
            db_path: dir.path().join("metrisk.db"),
            ..AppConfig::default()
        })
        .expect("Should build");
        ctx.submit(sample_input()).expect("Should submit");
        assert_eq!(ctx.records().primary_kind(), BackendKind::Relational);
        assert_eq!(ctx.records().list().expect("Should list").records.len(), 1);
    }
}
