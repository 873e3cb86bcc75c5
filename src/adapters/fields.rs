//! Field reconciliation between the canonical record and backend rows.
//!
//! Writing uses one naming scheme per backend. Reading accepts any of them,
//! plus a few legacy aliases, so rows written by other revisions of the
//! application (camelCase and snake_case mixed in one row, older sync
//! payloads using `name`/`tyg`/`risk`) still populate every canonical field.
//!
//! Keys are matched after normalization: lowercase, alphanumerics only. Thus
//! `fullName`, `full_name` and `Full Name` all resolve to `fullname`, and
//! `Weight (kg)` to `weightkg`.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Number, Value};

use crate::domain::{now_millis, CanonicalField, PatientRecord};

/// Naming scheme a backend uses for its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldNaming {
    /// `fullName`, `tygIndex` (local store, spreadsheet request payloads)
    Camel,
    /// `full_name`, `tyg_index` (relational columns)
    Snake,
    /// `Full Name`, `TyG Index` (spreadsheet header row)
    Header,
}

impl FieldNaming {
    /// Backend key for a canonical field.
    #[must_use]
    pub fn key(&self, field: CanonicalField) -> &'static str {
        match self {
            Self::Camel => field.camel(),
            Self::Snake => field.snake(),
            Self::Header => field.header(),
        }
    }
}

/// Legacy keys seen in rows written by older revisions.
fn legacy_aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::FullName => &["name"],
        CanonicalField::DiabetesStatus => &["diabetesStatus"],
        CanonicalField::TygIndex => &["tyg"],
        CanonicalField::TgHdlRatio => &["tghdl"],
        CanonicalField::RiskLevel => &["risk"],
        CanonicalField::Recommendations => &["recommendations", "recommendationText"],
        _ => &[],
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a backend key to its canonical field and the key's precedence.
///
/// Precedence runs camelCase (0), snake_case (1), header (2), then legacy
/// aliases (3 and up); a lower rank wins when one row carries several keys
/// for the same field.
fn resolve_key(key: &str) -> Option<(CanonicalField, usize)> {
    let wanted = normalize_key(key);
    if wanted.is_empty() {
        return None;
    }
    CanonicalField::ALL.into_iter().find_map(|field| {
        [field.camel(), field.snake(), field.header()]
            .iter()
            .chain(legacy_aliases(field))
            .position(|k| normalize_key(k) == wanted)
            .map(|rank| (field, rank))
    })
}

/// Resolve a backend key to its canonical field, whatever its naming.
#[must_use]
pub fn field_for_key(key: &str) -> Option<CanonicalField> {
    resolve_key(key).map(|(field, _)| field)
}

/// Format a timestamp the way every backend stores it.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn number(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}

/// Canonical value of one field, or `None` when the record lacks it.
#[must_use]
pub fn field_value(record: &PatientRecord, field: CanonicalField) -> Option<Value> {
    let text = |s: &str| Some(Value::String(s.to_string()));
    match field {
        CanonicalField::Id => text(&record.id),
        CanonicalField::FullName => text(&record.full_name),
        CanonicalField::Age => record.age.map(|a| Value::Number(a.into())),
        CanonicalField::Gender => text(&record.gender),
        CanonicalField::Weight => record.weight.and_then(number),
        CanonicalField::Height => record.height.and_then(number),
        CanonicalField::Glucose => record.glucose.and_then(number),
        CanonicalField::Triglycerides => record.triglycerides.and_then(number),
        CanonicalField::Hdl => record.hdl.and_then(number),
        CanonicalField::Hba1c => record.hba1c.and_then(number),
        CanonicalField::DiabetesStatus => text(&record.diabetes_status),
        CanonicalField::Bmi => record.bmi.and_then(number),
        CanonicalField::TygIndex => record.tyg_index.and_then(number),
        CanonicalField::TgHdlRatio => record.tg_hdl_ratio.and_then(number),
        CanonicalField::RiskLevel => text(&record.risk_level),
        CanonicalField::RiskDescription => text(&record.risk_description),
        CanonicalField::Recommendations => text(&record.recommendation_text),
        CanonicalField::CreatedAt => text(&format_timestamp(&record.created_at)),
        CanonicalField::CreatedBy => text(&record.created_by),
    }
}

/// Translate a record into a backend row. Absent numbers are omitted.
#[must_use]
pub fn to_backend(record: &PatientRecord, naming: FieldNaming) -> Map<String, Value> {
    CanonicalField::ALL
        .into_iter()
        .filter_map(|field| {
            field_value(record, field).map(|v| (naming.key(field).to_string(), v))
        })
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_age(value: &Value) -> Option<u32> {
    let n = as_number(value)?;
    (n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then(|| n as u32)
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Translate a backend row (any naming) into a canonical record.
///
/// Missing text becomes an empty string; missing or unparseable numbers stay
/// `None`. When several keys map to one field, a non-blank value beats a
/// blank one, and among equals the key naming with the lower rank wins
/// (camelCase, then snake_case, then header, then legacy aliases). Keys of
/// equal rank keep the first in the row's iteration order, which is
/// alphabetical for `serde_json::Map`.
#[must_use]
pub fn from_backend(row: &Map<String, Value>) -> PatientRecord {
    let mut candidates: HashMap<CanonicalField, (usize, &Value)> = HashMap::new();
    for (key, value) in row {
        let Some((field, rank)) = resolve_key(key) else {
            tracing::trace!("Ignoring unknown backend field {:?}", key);
            continue;
        };
        let replace = match candidates.get(&field) {
            None => true,
            Some((held_rank, held)) => match (is_blank(held), is_blank(value)) {
                (true, false) => true,
                (false, true) => false,
                _ => rank < *held_rank,
            },
        };
        if replace {
            candidates.insert(field, (rank, value));
        }
    }
    let found: HashMap<CanonicalField, &Value> =
        candidates.into_iter().map(|(f, (_, v))| (f, v)).collect();

    let text = |f: CanonicalField| found.get(&f).map(|v| as_text(v)).unwrap_or_default();
    let num = |f: CanonicalField| found.get(&f).and_then(|v| as_number(v));

    let created_at = match found.get(&CanonicalField::CreatedAt) {
        Some(v) => as_timestamp(v).unwrap_or_else(|| {
            tracing::warn!("Unparseable createdAt {}, defaulting to now", v);
            now_millis()
        }),
        None => now_millis(),
    };

    PatientRecord {
        id: text(CanonicalField::Id),
        full_name: text(CanonicalField::FullName),
        age: found.get(&CanonicalField::Age).and_then(|v| as_age(v)),
        gender: text(CanonicalField::Gender),
        weight: num(CanonicalField::Weight),
        height: num(CanonicalField::Height),
        glucose: num(CanonicalField::Glucose),
        triglycerides: num(CanonicalField::Triglycerides),
        hdl: num(CanonicalField::Hdl),
        hba1c: num(CanonicalField::Hba1c),
        diabetes_status: text(CanonicalField::DiabetesStatus),
        bmi: num(CanonicalField::Bmi),
        tyg_index: num(CanonicalField::TygIndex),
        tg_hdl_ratio: num(CanonicalField::TgHdlRatio),
        risk_level: text(CanonicalField::RiskLevel),
        risk_description: text(CanonicalField::RiskDescription),
        recommendation_text: text(CanonicalField::Recommendations),
        created_at,
        created_by: text(CanonicalField::CreatedBy),
    }
}
