//! Error types for compendium storage operations.
//!
//! Provides a unified error type covering database access, row conversion,
//! prefix validation, and configuration loading failures.

use thiserror::Error;

/// Errors that can occur while storing or querying compendium content.
#[derive(Debug, Error)]
pub enum CompendiumError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Record-to-row or row-to-record conversion failure.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// Error loading configuration or a stored manifest.
    #[error("loader error: {0}")]
    LoaderError(#[from] compendium_db::LoadError),

    /// Stored JSON column could not be encoded or decoded.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience alias for results with [`CompendiumError`].
pub type Result<T> = std::result::Result<T, CompendiumError>;
