//! SQLite adapter: the relational record store.
//!
//! One table, `patient_records`, with snake_case columns. Numeric columns are
//! nullable so rows imported from other revisions keep their gaps; text
//! columns default to the empty string.
//!
//! # Ordering
//!
//! `seq` is an autoincrement surrogate recording insertion order. Listing sorts
//! by `created_at` descending and falls back to `seq` for ties.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::{Map, Number, Value};

use super::fields::{self, FieldNaming};
use crate::domain::{sort_newest_first, CanonicalField, PatientRecord};
use crate::ports::{BackendKind, BulkFailure, BulkReport, PersistError, RecordStore, SavedReceipt};

const BACKEND: BackendKind = BackendKind::Relational;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS patient_records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL DEFAULT '',
        age INTEGER,
        gender TEXT NOT NULL DEFAULT '',
        weight REAL,
        height REAL,
        glucose REAL,
        triglycerides REAL,
        hdl REAL,
        hba1c REAL,
        diabetes TEXT NOT NULL DEFAULT '',
        bmi REAL,
        tyg_index REAL,
        tg_hdl_ratio REAL,
        risk_level TEXT NOT NULL DEFAULT '',
        risk_description TEXT NOT NULL DEFAULT '',
        ai_recommendations TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX IF NOT EXISTS idx_patient_records_created
        ON patient_records(created_at DESC);
";

fn db_error(e: rusqlite::Error) -> PersistError {
    PersistError::Storage {
        backend: BACKEND,
        message: e.to_string(),
    }
}

fn column_list() -> String {
    CanonicalField::ALL
        .iter()
        .map(|f| f.snake())
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql() -> String {
    let placeholders = (1..=CanonicalField::ALL.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO patient_records ({}) VALUES ({placeholders})",
        column_list()
    )
}

/// Column values in `CanonicalField::ALL` order.
fn to_row(record: &PatientRecord) -> Vec<SqlValue> {
    let mut row = fields::to_backend(record, FieldNaming::Snake);
    CanonicalField::ALL
        .iter()
        .map(|field| match row.remove(field.snake()) {
            Some(Value::String(s)) => SqlValue::Text(s),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            },
            _ => SqlValue::Null,
        })
        .collect()
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(i) => Value::Number(i.into()),
        SqlValue::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
    }
}

fn is_duplicate(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

/// SQLite record store adapter.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let conn = Connection::open(path.as_ref()).map_err(db_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("Opened relational store at {}", path.as_ref().display());
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns `PersistError::Storage` if the database cannot be created.
    pub fn in_memory() -> Result<Self, PersistError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), PersistError> {
        self.lock()?.execute_batch(SCHEMA).map_err(db_error)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistError> {
        self.conn.lock().map_err(|_| PersistError::Storage {
            backend: BACKEND,
            message: "connection lock poisoned".to_string(),
        })
    }

    /// Insert one record, returning the id it was stored under.
    fn insert(conn: &Connection, record: &PatientRecord) -> Result<String, PersistError> {
        let mut record = record.clone();
        let id = record.ensure_id().to_string();

        conn.execute(&insert_sql(), params_from_iter(to_row(&record)))
            .map_err(|e| {
                if is_duplicate(&e) {
                    PersistError::DuplicateId {
                        backend: BACKEND,
                        id: id.clone(),
                    }
                } else {
                    db_error(e)
                }
            })?;
        Ok(id)
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// Returns `PersistError::Storage` on database failure.
    pub fn count(&self) -> Result<usize, PersistError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM patient_records", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl RecordStore for RelationalStore {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    fn save(&self, record: &PatientRecord) -> Result<SavedReceipt, PersistError> {
        let conn = self.lock()?;
        let id = Self::insert(&conn, record)?;
        tracing::debug!("Saved record {} to relational store", id);
        Ok(SavedReceipt::new(BACKEND, id))
    }

    fn list(&self) -> Result<Vec<PatientRecord>, PersistError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM patient_records ORDER BY seq",
                column_list()
            ))
            .map_err(db_error)?;

        let mut records = stmt
            .query_map([], |row| {
                let mut map = Map::new();
                for (i, field) in CanonicalField::ALL.iter().enumerate() {
                    let value: SqlValue = row.get(i)?;
                    map.insert(field.snake().to_string(), to_json(value));
                }
                Ok(fields::from_backend(&map))
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        sort_newest_first(&mut records);
        Ok(records)
    }

    fn supports_bulk(&self) -> bool {
        true
    }

    fn bulk_save(&self, records: &[PatientRecord]) -> Result<BulkReport, PersistError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_error)?;
        let mut report = BulkReport::default();

        for record in records {
            match Self::insert(&tx, record) {
                Ok(_) => report.saved += 1,
                Err(e) => report.failures.push(BulkFailure {
                    id: record.id.clone(),
                    message: e.to_string(),
                }),
            }
        }

        tx.commit().map_err(db_error)?;
        tracing::info!(
            "Bulk saved {} of {} records to relational store",
            report.saved,
            records.len()
        );
        Ok(report)
    }
}
