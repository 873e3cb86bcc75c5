//! Spreadsheet endpoint adapter: a web app fronting a sheet, reached over HTTP.
//!
//! Wire protocol:
//! - `GET ?action=test` returns a plain-text liveness message
//! - `GET ?action=getPatients` returns `{status, data | message}`
//! - `POST {action: "savePatient", data}` returns `{status, message, rowNumber?}`
//! - `POST {action: "bulkSave", data: [..]}` returns `{status, message, count}`
//!
//! Request payloads use camelCase keys. Rows read back may carry any naming
//! (the web app derives keys from the header row), so reads go through
//! [`fields::from_backend`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{self, FieldNaming};
use crate::domain::{sort_newest_first, PatientRecord};
use crate::ports::{BackendKind, BulkFailure, BulkReport, PersistError, RecordStore, SavedReceipt};

const BACKEND: BackendKind = BackendKind::Spreadsheet;

/// Longest response excerpt quoted in error messages.
const EXCERPT_CHARS: usize = 200;

#[derive(Serialize)]
struct EndpointRequest<'a, T: Serialize> {
    action: &'a str,
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    row_number: Option<u64>,
    #[serde(default)]
    count: Option<u64>,
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// HTTP client for the spreadsheet web app.
pub struct SpreadsheetEndpoint {
    url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    bulk_supported: bool,
}

impl SpreadsheetEndpoint {
    /// Create a client for the web app at `url`.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the HTTP client cannot be built.
    pub fn new(url: &str, timeout_secs: u64, bulk_supported: bool) -> Result<Self, PersistError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PersistError::Storage {
                backend: BACKEND,
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.trim().to_string(),
            client,
            timeout_secs,
            bulk_supported,
        })
    }

    /// Web app URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport_error(&self, e: &reqwest::Error) -> PersistError {
        let message = if e.is_timeout() {
            format!("request timed out after {}s", self.timeout_secs)
        } else if e.is_connect() {
            format!("cannot connect to {}", self.url)
        } else {
            e.to_string()
        };
        PersistError::Unreachable {
            backend: BACKEND,
            message,
        }
    }

    fn get(&self, action: &str) -> Result<(reqwest::StatusCode, String), PersistError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("action", action)])
            .send()
            .map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let body = response.text().map_err(|e| self.transport_error(&e))?;
        Ok((status, body))
    }

    fn post<T: Serialize>(&self, action: &str, data: T) -> Result<EndpointReply, PersistError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EndpointRequest { action, data })
            .send()
            .map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let body = response.text().map_err(|e| self.transport_error(&e))?;
        Self::parse_reply(status, &body)
    }

    /// Interpret a JSON reply. Non-2xx and `status: "error"` are rejections.
    fn parse_reply(status: reqwest::StatusCode, body: &str) -> Result<EndpointReply, PersistError> {
        let parsed = serde_json::from_str::<EndpointReply>(body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), excerpt(body)));
            return Err(PersistError::Rejected {
                backend: BACKEND,
                message,
            });
        }

        let reply = parsed.map_err(|e| PersistError::MalformedResponse {
            backend: BACKEND,
            message: format!("{e} in {:?}", excerpt(body)),
        })?;

        match reply.status.to_ascii_lowercase().as_str() {
            "success" => Ok(reply),
            "error" => Err(PersistError::Rejected {
                backend: BACKEND,
                message: reply
                    .message
                    .unwrap_or_else(|| "unspecified error".to_string()),
            }),
            other => Err(PersistError::MalformedResponse {
                backend: BACKEND,
                message: format!("unexpected status {other:?}"),
            }),
        }
    }

    /// Liveness check: returns the web app's plain-text reply.
    ///
    /// # Errors
    /// Returns `PersistError` if the endpoint is unreachable or answers non-2xx.
    pub fn ping(&self) -> Result<String, PersistError> {
        let (status, body) = self.get("test")?;
        if !status.is_success() {
            return Err(PersistError::Rejected {
                backend: BACKEND,
                message: format!("HTTP {}: {}", status.as_u16(), excerpt(&body)),
            });
        }
        Ok(body.trim().to_string())
    }
}

impl RecordStore for SpreadsheetEndpoint {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn save(&self, record: &PatientRecord) -> Result<SavedReceipt, PersistError> {
        let mut record = record.clone();
        let id = record.ensure_id().to_string();

        let reply = self.post("savePatient", fields::to_backend(&record, FieldNaming::Camel))?;
        tracing::debug!(
            "Saved record {} to spreadsheet row {:?}",
            id,
            reply.row_number
        );

        Ok(SavedReceipt {
            row_number: reply.row_number,
            message: reply.message,
            ..SavedReceipt::new(BACKEND, id)
        })
    }

    fn list(&self) -> Result<Vec<PatientRecord>, PersistError> {
        let (status, body) = self.get("getPatients")?;
        let reply = Self::parse_reply(status, &body)?;

        let rows = match reply.data {
            Some(Value::Array(rows)) => rows,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(PersistError::MalformedResponse {
                    backend: BACKEND,
                    message: format!("expected an array of records, got {other}"),
                })
            }
        };

        let mut records = rows
            .iter()
            .map(|row| {
                row.as_object()
                    .map(fields::from_backend)
                    .ok_or_else(|| PersistError::MalformedResponse {
                        backend: BACKEND,
                        message: "record entries must be JSON objects".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        sort_newest_first(&mut records);
        tracing::debug!("Loaded {} records from spreadsheet", records.len());
        Ok(records)
    }

    fn supports_bulk(&self) -> bool {
        self.bulk_supported
    }

    fn bulk_save(&self, records: &[PatientRecord]) -> Result<BulkReport, PersistError> {
        if !self.bulk_supported {
            return Err(PersistError::Unsupported { backend: BACKEND });
        }

        let prepared: Vec<PatientRecord> = records
            .iter()
            .cloned()
            .map(|mut r| {
                r.ensure_id();
                r
            })
            .collect();
        let payload: Vec<Map<String, Value>> = prepared
            .iter()
            .map(|r| fields::to_backend(r, FieldNaming::Camel))
            .collect();

        let reply = self.post("bulkSave", payload)?;

        // The web app writes the batch in one range update, so a success reply
        // covers the first `count` records.
        let saved = reply
            .count
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(prepared.len())
            .min(prepared.len());
        let failures = prepared[saved..]
            .iter()
            .map(|r| BulkFailure {
                id: r.id.clone(),
                message: "not acknowledged by the spreadsheet endpoint".to_string(),
            })
            .collect();

        tracing::info!(
            "Bulk saved {} of {} records to spreadsheet",
            saved,
            prepared.len()
        );
        Ok(BulkReport { saved, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fields::tests::sample_record;
    use crate::test_support::{closed_url, fixed_reply_stub, sheet_stub};
    use axum::http::StatusCode;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn endpoint(url: &str) -> SpreadsheetEndpoint {
        SpreadsheetEndpoint::new(url, 5, true).expect("Should build client")
    }

    #[test]
    fn test_ping() {
        let stub = sheet_stub();
        let reply = endpoint(&stub.url).ping().expect("Should ping");
        assert_eq!(reply, "Google Apps Script is working!");
    }

    #[test]
    fn test_save_then_list_round_trips() {
        let stub = sheet_stub();
        let sheet = endpoint(&stub.url);
        let record = sample_record();

        let receipt = sheet.save(&record).expect("Should save");
        assert_eq!(receipt.id, record.id);
        assert_eq!(receipt.row_number, Some(2));
        assert_eq!(
            receipt.message.as_deref(),
            Some("Patient record saved successfully")
        );

        let listed = sheet.list().expect("Should list");
        assert_eq!(listed, vec![record]);
    }

    #[test]
    fn test_list_orders_newest_first() {
        let stub = sheet_stub();
        let sheet = endpoint(&stub.url);
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();

        for (id, minutes) in [("1", 0), ("2", 30), ("3", 15)] {
            let record = PatientRecord {
                id: id.to_string(),
                created_at: base + ChronoDuration::minutes(minutes),
                ..sample_record()
            };
            sheet.save(&record).expect("Should save");
        }

        let ids: Vec<String> = sheet
            .list()
            .expect("Should list")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_bulk_save() {
        let stub = sheet_stub();
        let sheet = endpoint(&stub.url);
        let batch = vec![
            PatientRecord {
                id: String::new(),
                ..sample_record()
            },
            sample_record(),
        ];

        let report = sheet.bulk_save(&batch).expect("Should bulk save");
        assert_eq!(report.saved, 2);
        assert!(report.is_complete());
        assert_eq!(stub.row_count(), 2);
        assert!(sheet.list().expect("Should list").iter().all(|r| !r.id.is_empty()));
    }

    #[test]
    fn test_bulk_disabled_is_discoverable() {
        let stub = sheet_stub();
        let sheet = SpreadsheetEndpoint::new(&stub.url, 5, false).expect("Should build client");
        assert!(!sheet.supports_bulk());
        assert!(matches!(
            sheet.bulk_save(&[sample_record()]),
            Err(PersistError::Unsupported { .. })
        ));
        assert_eq!(stub.row_count(), 0);
    }

    #[test]
    fn test_partial_acknowledgement_reports_failures() {
        let url = fixed_reply_stub(
            StatusCode::OK,
            r#"{"status":"success","message":"Successfully saved 1 patient records","count":1}"#,
        );
        let first = sample_record();
        let second = PatientRecord {
            id: "second".to_string(),
            ..sample_record()
        };
        let report = endpoint(&url)
            .bulk_save(&[first, second])
            .expect("Should bulk save");
        assert_eq!(report.saved, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "second");
    }

    #[test]
    fn test_error_status_is_rejection() {
        let url = fixed_reply_stub(
            StatusCode::OK,
            r#"{"status":"error","message":"Failed to save patient: sheet is locked"}"#,
        );
        let err = endpoint(&url).save(&sample_record()).expect_err("Should fail");
        match err {
            PersistError::Rejected { message, .. } => {
                assert_eq!(message, "Failed to save patient: sheet is locked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_http_failure_is_rejection() {
        let url = fixed_reply_stub(StatusCode::INTERNAL_SERVER_ERROR, "oops");
        let err = endpoint(&url).list().expect_err("Should fail");
        assert!(matches!(err, PersistError::Rejected { ref message, .. } if message.contains("500")));
    }

    #[test]
    fn test_non_json_reply_is_malformed() {
        let url = fixed_reply_stub(StatusCode::OK, "<html><body>Sign in</body></html>");
        let err = endpoint(&url).list().expect_err("Should fail");
        assert!(matches!(err, PersistError::MalformedResponse { .. }));
    }

    #[test]
    fn test_unreachable_endpoint() {
        let err = endpoint(&closed_url()).list().expect_err("Should fail");
        assert!(matches!(err, PersistError::Unreachable { .. }));
        assert!(err.backend().is_networked());
    }

    #[test]
    fn test_reads_header_named_rows() {
        let url = fixed_reply_stub(
            StatusCode::OK,
            r#"{"status":"success","data":[
                {"ID": 1700000000000, "Full Name": "Header Row", "TyG Index": 8.4,
                 "Risk Level": "Moderate Risk", "Created At": "2023-11-14T22:13:20.000Z",
                 "BMI": ""}
            ]}"#,
        );
        let records = endpoint(&url).list().expect("Should list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "1700000000000");
        assert_eq!(records[0].full_name, "Header Row");
        assert_eq!(records[0].tyg_index, Some(8.4));
        assert_eq!(records[0].bmi, None);
        assert_eq!(records[0].gender, "");
    }
}
