//! Core prerender error types (pure - no I/O variants).

use thiserror::Error;

/// Core prerender errors (pure - no I/O variants).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Logical path not found in asset manifest: {path}")]
    ManifestLookup { path: String },

    #[error("Invalid asset manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid document template: {0}")]
    Template(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
