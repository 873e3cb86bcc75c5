//! Record service: persistence with a local safety net.
//!
//! A failed save or list on a networked primary falls back once to the local
//! store. The fallback is reported on the outcome, never silent.

use std::collections::HashSet;
use std::sync::Arc;

use crate::adapters::fields::format_timestamp;
use crate::adapters::LocalStore;
use crate::domain::PatientRecord;
use crate::ports::{BackendKind, BulkFailure, BulkReport, PersistError, RecordStore, SavedReceipt};

/// Result of a save, with any fallback warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub receipt: SavedReceipt,
    pub warnings: Vec<String>,
}

impl SaveOutcome {
    /// Whether the record ended up somewhere other than the primary backend.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Records read from a backend, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub records: Vec<PatientRecord>,
    /// Backend the records came from
    pub source: BackendKind,
    pub warnings: Vec<String>,
}

/// Result of pushing one store's records to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub source: BackendKind,
    pub target: BackendKind,
    /// Records already present in the target (matched by id)
    pub skipped: usize,
    /// Whether records were sent one at a time
    pub sequential: bool,
    pub report: BulkReport,
}

/// Whether a primary failure should be retried against the local store.
fn warrants_fallback(e: &PersistError) -> bool {
    !matches!(
        e,
        PersistError::DuplicateId { .. } | PersistError::Unsupported { .. }
    )
}

/// Case-insensitive substring match over the displayed record fields.
///
/// An empty query matches everything.
#[must_use]
pub fn matches_query(record: &PatientRecord, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    let number = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
    let haystack = [
        record.id.clone(),
        record.full_name.clone(),
        record.age.map(|a| a.to_string()).unwrap_or_default(),
        record.gender.clone(),
        record.diabetes_status.clone(),
        number(record.bmi),
        number(record.tyg_index),
        number(record.tg_hdl_ratio),
        record.risk_level.clone(),
        record.created_at.format("%Y-%m-%d").to_string(),
        format_timestamp(&record.created_at),
        record.created_by.clone(),
    ];
    haystack
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Fill in metrics and risk for rows stored without them.
///
/// Rows whose inputs are incomplete are returned unchanged.
fn complete_metrics(records: Vec<PatientRecord>) -> Vec<PatientRecord> {
    records
        .into_iter()
        .map(|record| {
            if record.metrics().is_some() && record.risk().is_some() {
                return record;
            }
            match record.recompute() {
                Ok(full) => {
                    tracing::debug!("Recomputed metrics for record {}", record.id);
                    full
                }
                Err(e) => {
                    tracing::debug!("Record {} kept without metrics: {}", record.id, e);
                    record
                }
            }
        })
        .collect()
}

/// Push `records` to `store` in bulk, or one at a time when allowed.
///
/// Returns the report and whether the sequential path was taken.
fn push_all(
    store: &dyn RecordStore,
    records: &[PatientRecord],
    sequential_fallback: bool,
) -> Result<(BulkReport, bool), PersistError> {
    if store.supports_bulk() {
        return store.bulk_save(records).map(|r| (r, false));
    }
    if !sequential_fallback {
        return Err(PersistError::Unsupported {
            backend: store.kind(),
        });
    }

    tracing::info!(
        "{} has no bulk save, sending {} records one at a time",
        store.kind(),
        records.len()
    );
    let mut report = BulkReport::default();
    for record in records {
        match store.save(record) {
            Ok(_) => report.saved += 1,
            Err(e) => report.failures.push(BulkFailure {
                id: record.id.clone(),
                message: e.to_string(),
            }),
        }
    }
    Ok((report, true))
}

/// Service for saving and retrieving records.
pub struct RecordService {
    primary: Arc<dyn RecordStore>,
    fallback: Option<Arc<LocalStore>>,
}

impl RecordService {
    /// Create a service. `fallback` is only consulted for a networked primary.
    #[must_use]
    pub fn new(primary: Arc<dyn RecordStore>, fallback: Option<Arc<LocalStore>>) -> Self {
        Self { primary, fallback }
    }

    /// Primary backend kind.
    #[must_use]
    pub fn primary_kind(&self) -> BackendKind {
        self.primary.kind()
    }

    fn local_fallback(&self) -> Option<&LocalStore> {
        if self.primary.kind().is_networked() {
            self.fallback.as_deref()
        } else {
            None
        }
    }

    /// Save one record, falling back to the local store on primary failure.
    ///
    /// # Errors
    /// Returns the primary's error when no fallback applies, or
    /// `PersistError::FallbackFailed` when the local store also fails.
    pub fn save(&self, record: &PatientRecord) -> Result<SaveOutcome, PersistError> {
        let mut record = record.clone();
        record.ensure_id();

        let primary_err = match self.primary.save(&record) {
            Ok(receipt) => {
                tracing::info!("Saved record {} to {}", receipt.id, receipt.backend);
                return Ok(SaveOutcome {
                    receipt,
                    warnings: Vec::new(),
                });
            }
            Err(e) => e,
        };

        let Some(local) = self.local_fallback().filter(|_| warrants_fallback(&primary_err)) else {
            return Err(primary_err);
        };

        tracing::warn!(
            "Save to {} failed ({}), writing record {} to local store",
            self.primary.kind(),
            primary_err,
            record.id
        );
        match local.save(&record) {
            Ok(receipt) => Ok(SaveOutcome {
                receipt,
                warnings: vec![format!(
                    "{primary_err}; record saved to {} instead",
                    BackendKind::Local
                )],
            }),
            Err(fallback_err) => Err(PersistError::FallbackFailed {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            }),
        }
    }

    /// List all records, falling back to the local store on primary failure.
    ///
    /// Rows stored without metrics are completed from their inputs.
    ///
    /// # Errors
    /// Returns the primary's error when no fallback applies, or
    /// `PersistError::FallbackFailed` when the local store also fails.
    pub fn list(&self) -> Result<Listing, PersistError> {
        let primary_err = match self.primary.list() {
            Ok(records) => {
                return Ok(Listing {
                    records: complete_metrics(records),
                    source: self.primary.kind(),
                    warnings: Vec::new(),
                })
            }
            Err(e) => e,
        };

        let Some(local) = self.local_fallback() else {
            return Err(primary_err);
        };

        tracing::warn!(
            "Listing from {} failed ({}), reading local store",
            self.primary.kind(),
            primary_err
        );
        match local.list() {
            Ok(records) => Ok(Listing {
                records: complete_metrics(records),
                source: BackendKind::Local,
                warnings: vec![format!(
                    "{primary_err}; showing records from {} instead",
                    BackendKind::Local
                )],
            }),
            Err(fallback_err) => Err(PersistError::FallbackFailed {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            }),
        }
    }

    /// Records matching `query` (see [`matches_query`]), newest first.
    ///
    /// # Errors
    /// Same as [`RecordService::list`].
    pub fn search(&self, query: &str) -> Result<Listing, PersistError> {
        let mut listing = self.list()?;
        listing.records.retain(|r| matches_query(r, query));
        Ok(listing)
    }

    /// Save many records to the primary backend.
    ///
    /// Backends without bulk support are rejected with
    /// `PersistError::Unsupported` unless `sequential_fallback` is set.
    ///
    /// # Errors
    /// Returns `PersistError` if the backend rejects the batch as a whole.
    pub fn bulk_save(
        &self,
        records: &[PatientRecord],
        sequential_fallback: bool,
    ) -> Result<BulkReport, PersistError> {
        push_all(self.primary.as_ref(), records, sequential_fallback).map(|(report, _)| report)
    }

    /// Copy this service's primary records into `target`.
    ///
    /// Records whose id already exists in the target are skipped.
    ///
    /// # Errors
    /// Returns `PersistError` if either side cannot be read or the target
    /// rejects the batch as a whole.
    pub fn sync_to(
        &self,
        target: &dyn RecordStore,
        sequential_fallback: bool,
    ) -> Result<SyncReport, PersistError> {
        let records = self.primary.list()?;
        let known: HashSet<String> = target.list()?.into_iter().map(|r| r.id).collect();

        let (pending, present): (Vec<PatientRecord>, Vec<PatientRecord>) = records
            .into_iter()
            .partition(|r| r.id.trim().is_empty() || !known.contains(&r.id));

        let (report, sequential) = if pending.is_empty() {
            (BulkReport::default(), false)
        } else {
            push_all(target, &pending, sequential_fallback)?
        };

        tracing::info!(
            "Synced {} of {} records from {} to {} ({} already present)",
            report.saved,
            pending.len(),
            self.primary.kind(),
            target.kind(),
            present.len()
        );
        Ok(SyncReport {
            source: self.primary.kind(),
            target: target.kind(),
            skipped: present.len(),
            sequential,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fields::tests::sample_record;
    use crate::adapters::{RelationalStore, SpreadsheetEndpoint};
    use crate::test_support::{closed_url, sheet_stub};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn record_at(id: &str, minutes: i64) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap() + Duration::minutes(minutes),
            ..sample_record()
        }
    }

    /// A store that is always down.
    struct DownStore;

    impl RecordStore for DownStore {
        fn kind(&self) -> BackendKind {
            BackendKind::Relational
        }

        fn save(&self, _record: &PatientRecord) -> Result<SavedReceipt, PersistError> {
            Err(PersistError::Unreachable {
                backend: BackendKind::Relational,
                message: "connection reset".to_string(),
            })
        }

        fn list(&self) -> Result<Vec<PatientRecord>, PersistError> {
            Err(PersistError::Unreachable {
                backend: BackendKind::Relational,
                message: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn test_save_to_primary() {
        let local = Arc::new(LocalStore::in_memory());
        let service = RecordService::new(
            Arc::new(RelationalStore::in_memory().expect("Should create db")),
            Some(Arc::clone(&local)),
        );

        let outcome = service.save(&record_at("", 0)).expect("Should save");
        assert_eq!(outcome.receipt.backend, BackendKind::Relational);
        assert!(!outcome.used_fallback());
        assert!(local.is_empty().expect("Should count"));
    }

    #[test]
    fn test_save_falls_back_to_local() {
        let local = Arc::new(LocalStore::in_memory());
        let service = RecordService::new(Arc::new(DownStore), Some(Arc::clone(&local)));

        let outcome = service.save(&record_at("r1", 0)).expect("Should fall back");
        assert_eq!(outcome.receipt.backend, BackendKind::Local);
        assert_eq!(outcome.receipt.id, "r1");
        assert!(outcome.used_fallback());
        assert!(outcome.warnings[0].contains("connection reset"));
        assert_eq!(local.len().expect("Should count"), 1);
    }

    #[test]
    fn test_save_without_fallback_surfaces_error() {
        let service = RecordService::new(Arc::new(DownStore), None);
        let err = service.save(&record_at("r1", 0)).expect_err("Should fail");
        assert!(matches!(err, PersistError::Unreachable { .. }));
    }

    #[test]
    fn test_duplicate_is_not_retried_locally() {
        let local = Arc::new(LocalStore::in_memory());
        let primary = Arc::new(RelationalStore::in_memory().expect("Should create db"));
        let service = RecordService::new(primary, Some(Arc::clone(&local)));

        service.save(&record_at("dup", 0)).expect("Should save");
        let err = service.save(&record_at("dup", 1)).expect_err("Should reject");
        assert!(matches!(err, PersistError::DuplicateId { .. }));
        assert!(local.is_empty().expect("Should count"));
    }

    #[test]
    fn test_both_failing_reports_both() {
        let local = Arc::new(LocalStore::in_memory());
        local.save(&record_at("taken", 0)).expect("Should save");
        let service = RecordService::new(Arc::new(DownStore), Some(Arc::clone(&local)));

        let err = service.save(&record_at("taken", 1)).expect_err("Should fail");
        match err {
            PersistError::FallbackFailed { primary, fallback } => {
                assert!(matches!(*primary, PersistError::Unreachable { .. }));
                assert!(matches!(*fallback, PersistError::DuplicateId { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_list_falls_back_to_local() {
        let local = Arc::new(LocalStore::in_memory());
        local.save(&record_at("kept", 0)).expect("Should save");
        let service = RecordService::new(Arc::new(DownStore), Some(local));

        let listing = service.list().expect("Should fall back");
        assert_eq!(listing.source, BackendKind::Local);
        assert_eq!(listing.records.len(), 1);
        assert_eq!(listing.warnings.len(), 1);
    }

    #[test]
    fn test_local_primary_never_falls_back() {
        let local = Arc::new(LocalStore::in_memory());
        let service = RecordService::new(Arc::clone(&local) as Arc<dyn RecordStore>, Some(local));
        service.save(&record_at("a", 0)).expect("Should save");
        let err = service.save(&record_at("a", 1)).expect_err("Should reject");
        assert!(matches!(err, PersistError::DuplicateId { .. }));
    }

    #[test]
    fn test_unreachable_spreadsheet_falls_back() {
        let local = Arc::new(LocalStore::in_memory());
        let sheet = SpreadsheetEndpoint::new(&closed_url(), 5, true).expect("Should build client");
        let service = RecordService::new(Arc::new(sheet), Some(Arc::clone(&local)));

        let outcome = service.save(&record_at("offline", 0)).expect("Should fall back");
        assert_eq!(outcome.receipt.backend, BackendKind::Local);
        let listing = service.list().expect("Should fall back");
        assert_eq!(listing.records[0].id, "offline");
    }

    #[test]
    fn test_list_fills_in_missing_metrics() {
        let local = Arc::new(LocalStore::in_memory());
        local
            .save(&PatientRecord {
                bmi: None,
                tyg_index: None,
                tg_hdl_ratio: None,
                risk_level: String::new(),
                risk_description: String::new(),
                ..record_at("bare", 1)
            })
            .expect("Should save");
        local
            .save(&PatientRecord {
                weight: None,
                bmi: None,
                ..record_at("partial", 0)
            })
            .expect("Should save");
        let service = RecordService::new(local as Arc<dyn RecordStore>, None);

        let listing = service.list().expect("Should list");
        let bare = &listing.records[0];
        assert_eq!(bare.id, "bare");
        assert_eq!(bare.bmi, Some(24.7));
        assert_eq!(bare.tyg_index, Some(9.1));
        assert_eq!(bare.tg_hdl_ratio, Some(4.5));
        assert_eq!(bare.risk_level, "High Risk");

        let partial = &listing.records[1];
        assert_eq!(partial.id, "partial");
        assert_eq!(partial.bmi, None);
        assert_eq!(partial.weight, None);
    }

    #[test]
    fn test_search() {
        let local = Arc::new(LocalStore::in_memory());
        let service = RecordService::new(Arc::clone(&local) as Arc<dyn RecordStore>, None);
        service
            .save(&PatientRecord {
                full_name: "Ana Lima".to_string(),
                risk_level: "Low Risk".to_string(),
                ..record_at("1", 0)
            })
            .expect("Should save");
        service
            .save(&PatientRecord {
                full_name: "Bruno Costa".to_string(),
                ..record_at("2", 1)
            })
            .expect("Should save");

        let names = |q: &str| -> Vec<String> {
            service
                .search(q)
                .expect("Should search")
                .records
                .into_iter()
                .map(|r| r.full_name)
                .collect()
        };
        assert_eq!(names("ana"), vec!["Ana Lima"]);
        assert_eq!(names("LOW RISK"), vec!["Ana Lima"]);
        assert_eq!(names("high"), vec!["Bruno Costa"]);
        assert_eq!(names("2024-05-20"), vec!["Bruno Costa", "Ana Lima"]);
        assert_eq!(names("  "), vec!["Bruno Costa", "Ana Lima"]);
        assert!(names("zzz").is_empty());
    }

    #[test]
    fn test_bulk_save_requires_opt_in_for_sequential() {
        let stub = sheet_stub();
        let sheet = SpreadsheetEndpoint::new(&stub.url, 5, false).expect("Should build client");
        let service = RecordService::new(Arc::new(sheet), None);
        let batch = [record_at("1", 0), record_at("2", 1)];

        assert!(matches!(
            service.bulk_save(&batch, false),
            Err(PersistError::Unsupported { .. })
        ));
        assert_eq!(stub.row_count(), 0);

        let report = service.bulk_save(&batch, true).expect("Should save one by one");
        assert_eq!(report.saved, 2);
        assert_eq!(stub.row_count(), 2);
    }

    #[test]
    fn test_sync_local_to_spreadsheet() {
        let stub = sheet_stub();
        let sheet = SpreadsheetEndpoint::new(&stub.url, 5, true).expect("Should build client");
        sheet.save(&record_at("1", 0)).expect("Should save");

        let local = Arc::new(LocalStore::in_memory());
        for (id, minutes) in [("1", 0), ("2", 1), ("3", 2)] {
            local.save(&record_at(id, minutes)).expect("Should save");
        }
        let service = RecordService::new(local, None);

        let sync = service.sync_to(&sheet, false).expect("Should sync");
        assert_eq!(sync.source, BackendKind::Local);
        assert_eq!(sync.target, BackendKind::Spreadsheet);
        assert_eq!(sync.skipped, 1);
        assert_eq!(sync.report.saved, 2);
        assert!(!sync.sequential);
        assert_eq!(stub.row_count(), 3);

        let again = service.sync_to(&sheet, false).expect("Should sync");
        assert_eq!(again.skipped, 3);
        assert_eq!(again.report.attempted(), 0);
    }

    proptest! {
        #[test]
        fn prop_listing_is_newest_first_for_any_insertion_order(
            order in Just((0..12i64).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let service = RecordService::new(
                Arc::new(RelationalStore::in_memory().expect("Should create db")),
                None,
            );
            for minutes in &order {
                service.save(&record_at(&format!("m{minutes}"), *minutes)).expect("Should save");
            }

            let listing = service.list().expect("Should list");
            let ids: Vec<String> = listing.records.into_iter().map(|r| r.id).collect();
            let expected: Vec<String> = (0..12i64).rev().map(|m| format!("m{m}")).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
