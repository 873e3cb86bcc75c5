//! Record store port: the persistence adapter contract.
//!
//! One capability `{save, list, bulk_save?}` implemented per backend and
//! selected by configuration at startup.

use crate::domain::PatientRecord;

/// Backend variants a record store can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Process-local store, optionally mirrored to a JSON file
    Local,
    /// SQL-backed store with snake_case columns
    Relational,
    /// Spreadsheet web app reached over HTTP
    Spreadsheet,
}

impl BackendKind {
    /// Whether calls cross a network boundary.
    #[must_use]
    pub fn is_networked(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local-store"),
            Self::Relational => write!(f, "relational-store"),
            Self::Spreadsheet => write!(f, "spreadsheet-endpoint"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "local-store" | "localstore" => Ok(Self::Local),
            "relational" | "relational-store" | "sqlite" | "sql" => Ok(Self::Relational),
            "spreadsheet" | "spreadsheet-endpoint" | "sheets" => Ok(Self::Spreadsheet),
            other => Err(format!(
                "unknown backend '{other}' (expected local, relational or spreadsheet)"
            )),
        }
    }
}

/// Errors from persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{backend} is unreachable: {message}")]
    Unreachable { backend: BackendKind, message: String },

    #[error("{backend} returned a malformed response: {message}")]
    MalformedResponse { backend: BackendKind, message: String },

    #[error("{backend} rejected the request: {message}")]
    Rejected { backend: BackendKind, message: String },

    #[error("{backend} does not support bulk save")]
    Unsupported { backend: BackendKind },

    #[error("record {id} already exists in {backend}")]
    DuplicateId { backend: BackendKind, id: String },

    #[error("{backend} storage error: {message}")]
    Storage { backend: BackendKind, message: String },

    #[error("primary backend failed ({primary}); local fallback also failed ({fallback})")]
    FallbackFailed {
        primary: Box<PersistError>,
        fallback: Box<PersistError>,
    },
}

impl PersistError {
    /// Backend that produced the error (the primary one for fallback failures).
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Unreachable { backend, .. }
            | Self::MalformedResponse { backend, .. }
            | Self::Rejected { backend, .. }
            | Self::Unsupported { backend }
            | Self::DuplicateId { backend, .. }
            | Self::Storage { backend, .. } => *backend,
            Self::FallbackFailed { primary, .. } => primary.backend(),
        }
    }
}

/// Acknowledgement of a single save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReceipt {
    /// Backend that accepted the record
    pub backend: BackendKind,
    /// Id the record was stored under
    pub id: String,
    /// Spreadsheet row, when the backend reports one
    pub row_number: Option<u64>,
    /// Backend message, if any
    pub message: Option<String>,
}

impl SavedReceipt {
    #[must_use]
    pub fn new(backend: BackendKind, id: impl Into<String>) -> Self {
        Self {
            backend,
            id: id.into(),
            row_number: None,
            message: None,
        }
    }
}

/// A record that could not be stored during a bulk save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: String,
    pub message: String,
}

/// Outcome of a best-effort bulk save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub saved: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    /// True when every record was stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of records attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.saved + self.failures.len()
    }
}

/// Trait for patient record persistence.
///
/// Implementations own the canonical-to-backend field mapping. `list` returns
/// records most recent first, ties in insertion order.
pub trait RecordStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Save one record. An empty id is replaced by a generated one.
    ///
    /// # Errors
    /// Returns `PersistError` if the backend cannot store the record.
    fn save(&self, record: &PatientRecord) -> Result<SavedReceipt, PersistError>;

    /// Load every record, newest first.
    ///
    /// # Errors
    /// Returns `PersistError` if the backend cannot be read.
    fn list(&self) -> Result<Vec<PatientRecord>, PersistError>;

    /// Whether [`RecordStore::bulk_save`] is implemented.
    fn supports_bulk(&self) -> bool {
        false
    }

    /// Save many records in one request.
    ///
    /// # Errors
    /// Returns `PersistError::Unsupported` unless the backend overrides it.
    fn bulk_save(&self, _records: &[PatientRecord]) -> Result<BulkReport, PersistError> {
        Err(PersistError::Unsupported { backend: self.kind() })
    }
}
