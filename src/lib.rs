//! # Metrisk
//!
//! Metabolic risk assessment with pluggable record persistence.
//!
//! This crate provides:
//! - BMI, TyG index and TG/HDL ratio computation with risk classification
//! - Recommendation text from a remote advisor or deterministic rules
//! - Record storage in a local store, SQLite, or a spreadsheet web app,
//!   with local fallback when a networked backend is down
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (patient input, metrics, risk, records)
//! - `ports`: Trait definitions for persistence and recommendations
//! - `adapters`: Concrete implementations (local, SQLite, spreadsheet, OpenAI)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven configuration
//! - `cli`: Command line front end

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod test_support;

pub use domain::{Metrics, PatientInput, PatientRecord, RiskCategory};

/// Result type for Metrisk operations
pub type Result<T> = std::result::Result<T, MetriskError>;

/// Main error type for Metrisk
#[derive(Debug, thiserror::Error)]
pub enum MetriskError {
    #[error("Invalid patient data: {0}")]
    InvalidInput(#[from] domain::InvalidInputError),

    #[error("Persistence failed: {0}")]
    Persist(#[from] ports::PersistError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
