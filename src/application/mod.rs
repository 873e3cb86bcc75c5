//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod assessment;
mod context;
pub mod export;
mod records;
mod worker;

pub use assessment::{Assessment, AssessmentService, Recommendation, RecommendationSource};
pub use context::{Actor, AppContext, Submission};
pub use records::{matches_query, Listing, RecordService, SaveOutcome, SyncReport};
pub use worker::{SubmissionHandle, SubmissionProgress, SubmissionWorker};
