//! Local record store: process-local, optionally mirrored to a JSON file.
//!
//! Rows are kept in canonical camelCase form. When a file path is given the
//! full array is rewritten after every change (temp file + rename), which is
//! also how legacy exports with numeric ids or snake_case keys get read in.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::fields::{self, FieldNaming};
use crate::domain::{sort_newest_first, PatientRecord};
use crate::ports::{BackendKind, BulkFailure, BulkReport, PersistError, RecordStore, SavedReceipt};

const BACKEND: BackendKind = BackendKind::Local;

fn storage_error(message: impl std::fmt::Display) -> PersistError {
    PersistError::Storage {
        backend: BACKEND,
        message: message.to_string(),
    }
}

/// Local store adapter.
pub struct LocalStore {
    /// Records in insertion order
    records: Mutex<Vec<PatientRecord>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// A store that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Open a file-backed store. A missing file starts empty.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the file exists but cannot be read
    /// or is not a JSON array of objects.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(storage_error)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                Self::parse_rows(&content)?
            }
        } else {
            Vec::new()
        };

        tracing::info!(
            "Opened local store at {} ({} records)",
            path.display(),
            records.len()
        );
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path),
        })
    }

    fn parse_rows(content: &str) -> Result<Vec<PatientRecord>, PersistError> {
        let rows: Vec<Value> = serde_json::from_str(content).map_err(storage_error)?;
        rows.iter()
            .map(|row| {
                row.as_object()
                    .map(fields::from_backend)
                    .ok_or_else(|| storage_error("local store entries must be JSON objects"))
            })
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<PatientRecord>>, PersistError> {
        self.records
            .lock()
            .map_err(|_| storage_error("local store lock poisoned"))
    }

    /// Write the current records to the backing file, if any.
    fn persist(&self, records: &[PatientRecord]) -> Result<(), PersistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let rows: Vec<Value> = records
            .iter()
            .map(|r| Value::Object(fields::to_backend(r, FieldNaming::Camel)))
            .collect();
        let json = serde_json::to_string_pretty(&rows).map_err(storage_error)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_error)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(storage_error)?;
        std::fs::rename(&tmp, path).map_err(storage_error)?;
        Ok(())
    }

    /// Flush to disk. Called on context teardown.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the file cannot be written.
    pub fn flush(&self) -> Result<(), PersistError> {
        let records = self.lock()?;
        self.persist(&records)
    }

    /// Number of records held.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, PersistError> {
        Ok(self.lock()?.len())
    }

    /// Whether the store holds no records.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, PersistError> {
        Ok(self.len()? == 0)
    }

    fn insert(records: &mut Vec<PatientRecord>, record: &PatientRecord) -> Result<String, PersistError> {
        let mut record = record.clone();
        let id = record.ensure_id().to_string();
        if records.iter().any(|r| r.id == id) {
            return Err(PersistError::DuplicateId { backend: BACKEND, id });
        }
        records.push(record);
        Ok(id)
    }
}

impl RecordStore for LocalStore {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn save(&self, record: &PatientRecord) -> Result<SavedReceipt, PersistError> {
        let mut records = self.lock()?;
        let id = Self::insert(&mut records, record)?;
        if let Err(e) = self.persist(&records) {
            records.pop();
            return Err(e);
        }

        tracing::debug!("Saved record {} to local store", id);
        Ok(SavedReceipt::new(BACKEND, id))
    }

    fn list(&self) -> Result<Vec<PatientRecord>, PersistError> {
        let mut records = self.lock()?.clone();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn supports_bulk(&self) -> bool {
        true
    }

    fn bulk_save(&self, batch: &[PatientRecord]) -> Result<BulkReport, PersistError> {
        let mut records = self.lock()?;
        let before = records.len();
        let mut report = BulkReport::default();

        for record in batch {
            match Self::insert(&mut records, record) {
                Ok(_) => report.saved += 1,
                Err(e) => report.failures.push(BulkFailure {
                    id: record.id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if let Err(e) = self.persist(&records) {
            records.truncate(before);
            return Err(e);
        }

        tracing::info!(
            "Bulk saved {} of {} records to local store",
            report.saved,
            batch.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fields::tests::sample_record;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn record_at(id: &str, minutes: i64) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes),
            ..sample_record()
        }
    }

    #[test]
    fn test_save_and_list() {
        let store = LocalStore::in_memory();
        assert!(store.is_empty().expect("Should count"));

        store.save(&record_at("a", 0)).expect("Should save");
        store.save(&record_at("b", 5)).expect("Should save");

        let listed = store.list().expect("Should list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[1].id, "a");
    }

    #[test]
    fn test_generates_missing_id() {
        let store = LocalStore::in_memory();
        let receipt = store.save(&record_at("", 0)).expect("Should save");
        assert!(!receipt.id.is_empty());
        assert_eq!(receipt.backend, BackendKind::Local);
        assert_eq!(store.list().expect("Should list")[0].id, receipt.id);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = LocalStore::in_memory();
        store.save(&record_at("same", 0)).expect("Should save");
        let err = store.save(&record_at("same", 1)).expect_err("Should reject");
        assert!(matches!(err, PersistError::DuplicateId { .. }));
        assert_eq!(store.len().expect("Should count"), 1);
    }

    #[test]
    fn test_bulk_save_reports_failures() {
        let store = LocalStore::in_memory();
        store.save(&record_at("x", 0)).expect("Should save");

        let report = store
            .bulk_save(&[record_at("y", 1), record_at("x", 2), record_at("z", 3)])
            .expect("Should bulk save");
        assert_eq!(report.saved, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "x");
        assert_eq!(store.len().expect("Should count"), 3);
    }

    #[test]
    fn test_file_backed_round_trip() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let path = dir.path().join("nested").join("records.json");

        let original = record_at("r1", 0);
        {
            let store = LocalStore::open(&path).expect("Should open");
            store.save(&original).expect("Should save");
        }

        let reopened = LocalStore::open(&path).expect("Should reopen");
        assert_eq!(reopened.list().expect("Should list"), vec![original]);
    }

    #[test]
    fn test_reads_legacy_rows() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[{"id": 1717232400000, "fullName": "Legacy", "risk_level": "Low Risk",
                 "created_at": "2024-06-01T09:00:00.000Z", "bmi": 21.3}]"#,
        )
        .expect("Should write");

        let store = LocalStore::open(&path).expect("Should open");
        let records = store.list().expect("Should list");
        assert_eq!(records[0].id, "1717232400000");
        assert_eq!(records[0].risk_level, "Low Risk");
        assert_eq!(records[0].bmi, Some(21.3));
        assert_eq!(records[0].tyg_index, None);
    }

    #[test]
    fn test_rejects_corrupt_file() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let path = dir.path().join("records.json");
        std::fs::write(&path, "{not json").expect("Should write");
        assert!(matches!(
            LocalStore::open(&path),
            Err(PersistError::Storage { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_list_is_newest_first(offsets in proptest::collection::vec(0i64..50, 1..30)) {
            let store = LocalStore::in_memory();
            for (i, minutes) in offsets.iter().enumerate() {
                store.save(&record_at(&format!("r{i}"), *minutes)).expect("Should save");
            }

            let listed = store.list().expect("Should list");
            prop_assert_eq!(listed.len(), offsets.len());
            for pair in listed.windows(2) {
                prop_assert!(pair[0].created_at >= pair[1].created_at);
                if pair[0].created_at == pair[1].created_at {
                    let a: usize = pair[0].id[1..].parse().expect("index");
                    let b: usize = pair[1].id[1..].parse().expect("index");
                    prop_assert!(a < b);
                }
            }
        }
    }
}
