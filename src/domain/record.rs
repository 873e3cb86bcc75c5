//! Canonical patient record shared by every persistence backend.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::Metrics;
use super::patient::{InvalidInputError, PatientInput};
use super::risk::{classify, RiskCategory};

/// The 19 canonical fields, in the fixed column order used by the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Id,
    FullName,
    Age,
    Gender,
    Weight,
    Height,
    Glucose,
    Triglycerides,
    Hdl,
    Hba1c,
    DiabetesStatus,
    Bmi,
    TygIndex,
    TgHdlRatio,
    RiskLevel,
    RiskDescription,
    Recommendations,
    CreatedAt,
    CreatedBy,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 19] = [
        Self::Id,
        Self::FullName,
        Self::Age,
        Self::Gender,
        Self::Weight,
        Self::Height,
        Self::Glucose,
        Self::Triglycerides,
        Self::Hdl,
        Self::Hba1c,
        Self::DiabetesStatus,
        Self::Bmi,
        Self::TygIndex,
        Self::TgHdlRatio,
        Self::RiskLevel,
        Self::RiskDescription,
        Self::Recommendations,
        Self::CreatedAt,
        Self::CreatedBy,
    ];

    /// camelCase key of the canonical form.
    #[must_use]
    pub fn camel(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FullName => "fullName",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Weight => "weight",
            Self::Height => "height",
            Self::Glucose => "glucose",
            Self::Triglycerides => "triglycerides",
            Self::Hdl => "hdl",
            Self::Hba1c => "hba1c",
            Self::DiabetesStatus => "diabetes",
            Self::Bmi => "bmi",
            Self::TygIndex => "tygIndex",
            Self::TgHdlRatio => "tgHdlRatio",
            Self::RiskLevel => "riskLevel",
            Self::RiskDescription => "riskDescription",
            Self::Recommendations => "aiRecommendations",
            Self::CreatedAt => "createdAt",
            Self::CreatedBy => "createdBy",
        }
    }

    /// snake_case column name used by the relational store.
    #[must_use]
    pub fn snake(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FullName => "full_name",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Weight => "weight",
            Self::Height => "height",
            Self::Glucose => "glucose",
            Self::Triglycerides => "triglycerides",
            Self::Hdl => "hdl",
            Self::Hba1c => "hba1c",
            Self::DiabetesStatus => "diabetes",
            Self::Bmi => "bmi",
            Self::TygIndex => "tyg_index",
            Self::TgHdlRatio => "tg_hdl_ratio",
            Self::RiskLevel => "risk_level",
            Self::RiskDescription => "risk_description",
            Self::Recommendations => "ai_recommendations",
            Self::CreatedAt => "created_at",
            Self::CreatedBy => "created_by",
        }
    }

    /// Human-readable spreadsheet header.
    #[must_use]
    pub fn header(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::FullName => "Full Name",
            Self::Age => "Age",
            Self::Gender => "Gender",
            Self::Weight => "Weight (kg)",
            Self::Height => "Height (m)",
            Self::Glucose => "Glucose (mg/dL)",
            Self::Triglycerides => "Triglycerides (mg/dL)",
            Self::Hdl => "HDL (mg/dL)",
            Self::Hba1c => "HbA1c (%)",
            Self::DiabetesStatus => "Diabetes Status",
            Self::Bmi => "BMI",
            Self::TygIndex => "TyG Index",
            Self::TgHdlRatio => "TG/HDL Ratio",
            Self::RiskLevel => "Risk Level",
            Self::RiskDescription => "Risk Description",
            Self::Recommendations => "AI Recommendations",
            Self::CreatedAt => "Created At",
            Self::CreatedBy => "Created By",
        }
    }
}

/// Last issued id (ms since epoch), for monotonic id generation.
static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Generate a time-based record id.
///
/// Ids are milliseconds since the Unix epoch, bumped forward when two records
/// are created within the same millisecond so ids stay unique per process.
#[must_use]
pub fn next_record_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_ID_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}

/// Current time truncated to millisecond precision.
///
/// Text backends keep milliseconds, so truncating here keeps `createdAt`
/// identical after a round trip.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// The persisted aggregate: input, derived metrics, risk and metadata.
///
/// Textual fields are never absent (empty string instead); numeric fields are
/// `None` when a backend row did not carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: String,
    pub full_name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub glucose: Option<f64>,
    pub triglycerides: Option<f64>,
    pub hdl: Option<f64>,
    pub hba1c: Option<f64>,
    #[serde(rename = "diabetes")]
    pub diabetes_status: String,
    pub bmi: Option<f64>,
    pub tyg_index: Option<f64>,
    pub tg_hdl_ratio: Option<f64>,
    /// Stored label ("Low Risk", ...); kept as text so foreign labels survive
    pub risk_level: String,
    pub risk_description: String,
    #[serde(rename = "aiRecommendations")]
    pub recommendation_text: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl PatientRecord {
    /// Assemble a new record with a fresh id and `createdAt = now`.
    #[must_use]
    pub fn new(
        input: &PatientInput,
        metrics: &Metrics,
        risk: RiskCategory,
        recommendation_text: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: next_record_id(),
            full_name: input.full_name.clone(),
            age: Some(input.age),
            gender: input.gender.clone(),
            weight: Some(input.weight),
            height: Some(input.height),
            glucose: Some(input.glucose),
            triglycerides: Some(input.triglycerides),
            hdl: Some(input.hdl),
            hba1c: Some(input.hba1c),
            diabetes_status: input.diabetes_status.clone(),
            bmi: Some(metrics.bmi),
            tyg_index: Some(metrics.tyg_index),
            tg_hdl_ratio: Some(metrics.tg_hdl_ratio),
            risk_level: risk.label().to_string(),
            risk_description: risk.description().to_string(),
            recommendation_text: recommendation_text.into(),
            created_at: now_millis(),
            created_by: created_by.into(),
        }
    }

    /// An empty record: blank text, absent numbers, `createdAt = now`.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            id: String::new(),
            full_name: String::new(),
            age: None,
            gender: String::new(),
            weight: None,
            height: None,
            glucose: None,
            triglycerides: None,
            hdl: None,
            hba1c: None,
            diabetes_status: String::new(),
            bmi: None,
            tyg_index: None,
            tg_hdl_ratio: None,
            risk_level: String::new(),
            risk_description: String::new(),
            recommendation_text: String::new(),
            created_at: now_millis(),
            created_by: String::new(),
        }
    }

    /// Give the record an id if it has none.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.trim().is_empty() {
            self.id = next_record_id();
        }
        &self.id
    }

    /// Metrics, if all three were computed.
    #[must_use]
    pub fn metrics(&self) -> Option<Metrics> {
        Some(Metrics {
            bmi: self.bmi?,
            tyg_index: self.tyg_index?,
            tg_hdl_ratio: self.tg_hdl_ratio?,
        })
    }

    /// Parsed risk category, if the stored label is recognised.
    #[must_use]
    pub fn risk(&self) -> Option<RiskCategory> {
        RiskCategory::from_label(&self.risk_level)
    }

    /// Rebuild the intake entry from the stored fields.
    ///
    /// # Errors
    /// Returns `InvalidInputError` listing missing or unusable fields.
    pub fn input(&self) -> Result<PatientInput, InvalidInputError> {
        fn need<T>(field: &'static str, v: Option<T>, problems: &mut Vec<InvalidInputError>) -> Option<T> {
            if v.is_none() {
                problems.push(InvalidInputError::Missing { field });
            }
            v
        }

        let mut problems = Vec::new();
        let age = need("age", self.age, &mut problems);
        let weight = need("weight", self.weight, &mut problems);
        let height = need("height", self.height, &mut problems);
        let glucose = need("glucose", self.glucose, &mut problems);
        let triglycerides = need("triglycerides", self.triglycerides, &mut problems);
        let hdl = need("hdl", self.hdl, &mut problems);
        let hba1c = need("hba1c", self.hba1c, &mut problems);
        InvalidInputError::from_problems(problems)?;

        let input = PatientInput {
            full_name: self.full_name.clone(),
            age: age.unwrap_or_default(),
            gender: self.gender.clone(),
            weight: weight.unwrap_or_default(),
            height: height.unwrap_or_default(),
            glucose: glucose.unwrap_or_default(),
            triglycerides: triglycerides.unwrap_or_default(),
            hdl: hdl.unwrap_or_default(),
            hba1c: hba1c.unwrap_or_default(),
            diabetes_status: self.diabetes_status.clone(),
        };
        input.validate()?;
        Ok(input)
    }

    /// Recompute metrics and risk wholesale from the stored inputs.
    ///
    /// # Errors
    /// Returns `InvalidInputError` if the stored inputs are incomplete.
    pub fn recompute(&self) -> Result<Self, InvalidInputError> {
        let input = self.input()?;
        let metrics = Metrics::from_input(&input)?;
        let risk = classify(metrics.tyg_index)?;
        Ok(Self {
            bmi: Some(metrics.bmi),
            tyg_index: Some(metrics.tyg_index),
            tg_hdl_ratio: Some(metrics.tg_hdl_ratio),
            risk_level: risk.label().to_string(),
            risk_description: risk.description().to_string(),
            ..self.clone()
        })
    }
}

/// Sort most recent first; ties keep their existing (insertion) order.
pub fn sort_newest_first(records: &mut [PatientRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
