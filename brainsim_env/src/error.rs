//! Error types for the brainsim environment layer.

use thiserror::Error;

/// Errors raised while loading, reading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The persisted document exists but is not a valid JSON object
    #[error("Malformed configuration in {source_name}: {reason}")]
    Malformed {
        source_name: String,
        reason: String,
    },

    /// Reading or writing the backing document failed
    #[error("I/O error on {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    /// The mapping could not be serialized for persistence
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A parameter exists but holds an unusable value
    #[error("Invalid value for parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
}

impl ConfigError {
    /// Creates a malformed-document error.
    pub fn malformed(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an I/O error tagged with the source it came from.
    pub fn io(source_name: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            source_name: source_name.into(),
            error,
        }
    }

    /// Creates an invalid-parameter error.
    pub fn invalid(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}
