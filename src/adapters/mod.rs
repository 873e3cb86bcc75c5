//! Adapters layer: Concrete implementations of ports.
//!
//! - `fields`: canonical record ⇄ backend row reconciliation
//! - `local`: process-local store, optionally file-backed
//! - `sqlite`: SQLite relational store
//! - `spreadsheet`: spreadsheet web app over HTTP
//! - `openai`: remote chat-completions advisor
//! - `rules`: deterministic rule-based advisor
//! - `sanitize`: PII filtering for logs

pub mod fields;
pub mod local;
pub mod openai;
pub mod rules;
pub mod sanitize;
pub mod spreadsheet;
pub mod sqlite;

pub use local::LocalStore;
pub use openai::OpenAiAdvisor;
pub use rules::RuleBasedAdvisor;
pub use spreadsheet::SpreadsheetEndpoint;
pub use sqlite::RelationalStore;
