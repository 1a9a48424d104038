//! Error types for sprintgym-core.

use thiserror::Error;

/// Result type alias using sprintgym-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during episode orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// An unknown episode type, phase name, or runtime type was requested.
    /// The message enumerates the valid options.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An LLM runtime backend failed at the transport level.
    #[error("Runtime error: {runtime_type} - {message}")]
    Runtime {
        runtime_type: String,
        message: String,
    },

    /// Checkpoint file could not be read or written.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error for an unknown option, listing valid ones.
    pub fn unknown_option(kind: &str, requested: &str, available: &[&str]) -> Self {
        Self::Validation(format!(
            "Unknown {kind}: {requested:?}. Available: {}",
            available.join(", ")
        ))
    }

    /// Create a runtime transport error.
    pub fn runtime(runtime_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            runtime_type: runtime_type.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_lists_available() {
        let err = Error::unknown_option("phase", "compile", &["planning", "development"]);
        let msg = err.to_string();
        assert!(msg.contains("compile"));
        assert!(msg.contains("planning, development"));
    }
}
