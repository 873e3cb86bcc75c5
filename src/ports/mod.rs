//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (record backends, text
//! generation services).

mod advisor;
mod record_store;

pub use advisor::{Advisor, RecommendationError};
pub use record_store::{
    BackendKind, BulkFailure, BulkReport, PersistError, RecordStore, SavedReceipt,
};
