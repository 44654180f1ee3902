//! Error types for export loading and configuration.
//!
//! Missing or malformed export files are not errors: the loader absorbs
//! them and reports zero entries. These variants cover the remaining
//! failure modes, such as reading configuration or manifests.

use thiserror::Error;

/// Errors that can occur while loading configuration or manifests.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration value out of range or malformed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
