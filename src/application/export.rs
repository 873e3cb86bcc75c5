//! CSV export of patient records.
//!
//! Columns follow the spreadsheet header row (19 columns, fixed order). Fields
//! are quoted per RFC 4180 and rows end in CRLF. Recommendations are exported
//! as plain text.

use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::adapters::fields::field_value;
use crate::domain::advice::plain_text;
use crate::domain::{CanonicalField, PatientRecord};

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn cell(record: &PatientRecord, field: CanonicalField) -> String {
    if field == CanonicalField::Recommendations {
        return plain_text(&record.recommendation_text);
    }
    match field_value(record, field) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Render records as CSV text, header row first.
#[must_use]
pub fn to_csv(records: &[PatientRecord]) -> String {
    let mut out = String::new();
    let header: Vec<String> = CanonicalField::ALL.iter().map(|f| escape(f.header())).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");

    for record in records {
        let row: Vec<String> = CanonicalField::ALL
            .iter()
            .map(|f| escape(&cell(record, *f)))
            .collect();
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// Write records as CSV to `path`.
///
/// # Errors
/// Returns `std::io::Error` if the file cannot be written.
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[PatientRecord]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path.as_ref())?;
    file.write_all(to_csv(records).as_bytes())?;
    file.flush()?;
    tracing::info!(
        "Exported {} records to {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(())
}
