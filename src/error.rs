/// Error types for reflect
///
/// This module defines all possible errors that can occur in the pipeline.
/// Uses thiserror for ergonomic error handling.
///
/// Nothing here is fatal to the whole run: every variant is scoped to one
/// record, one queue append, or one document.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for reflect operations
#[derive(Error, Debug)]
pub enum ReflectError {
    /// I/O errors (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A built-in pattern failed to compile
    #[error("Pattern detection error: {0}")]
    Pattern(#[from] regex::Error),

    /// A transcript line or queue entry that could not be decoded
    #[error("Malformed record in {source_name}: {reason}")]
    MalformedRecord { source_name: String, reason: String },

    /// The atomic queue swap kept losing the race
    #[error("Queue write conflict: gave up after {attempts} attempts")]
    WriteConflict { attempts: u32 },

    /// A target document could not be parsed or written
    #[error("Could not update {}: {reason}", path.display())]
    DocumentWriteFailure { path: PathBuf, reason: String },

    /// The review workflow was asked to do something its current state forbids
    #[error("Invalid review transition from {state} on {event}")]
    InvalidTransition { state: String, event: String },

    /// Project root detection failed
    #[error("Could not detect project root for path: {0}")]
    ProjectRootNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid turn format or content
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    /// Turn contains sensitive data
    #[error("Turn contains sensitive data and was not captured")]
    SensitiveData,

    /// Turn exceeds maximum length
    #[error("Turn exceeds maximum allowed length of {0} characters")]
    TurnTooLong(usize),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Result type alias for reflect operations
pub type Result<T> = std::result::Result<T, ReflectError>;

impl ReflectError {
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ReflectError::MalformedRecord {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn document(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReflectError::DocumentWriteFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convert to a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ReflectError::Io(e) => {
                format!("File system error. Check permissions. Details: {}", e)
            }
            ReflectError::Git(e) => {
                format!("Git operation failed. Details: {}", e)
            }
            ReflectError::Serialization(e) => {
                format!("Data format error: {}", e)
            }
            ReflectError::Pattern(e) => {
                format!("Pattern detection failed: {}", e)
            }
            ReflectError::MalformedRecord { source_name, reason } => {
                format!("Skipped an unreadable record in {}: {}", source_name, reason)
            }
            ReflectError::WriteConflict { attempts } => {
                format!(
                    "The learnings queue is busy (tried {} times). The correction was not queued.",
                    attempts
                )
            }
            ReflectError::DocumentWriteFailure { path, reason } => {
                format!("Could not update {}: {}", path.display(), reason)
            }
            ReflectError::InvalidTransition { state, event } => {
                format!("Cannot {} while the review is {}", event, state)
            }
            ReflectError::ProjectRootNotFound(path) => {
                format!("Could not find project root for: {}", path)
            }
            ReflectError::Config(msg) => {
                format!("Configuration issue: {}", msg)
            }
            ReflectError::InvalidTurn(reason) => {
                format!("Invalid turn: {}", reason)
            }
            ReflectError::SensitiveData => {
                "Turn contains sensitive data and was not captured".to_string()
            }
            ReflectError::TurnTooLong(max) => {
                format!("Turn exceeds maximum length of {} characters", max)
            }
            ReflectError::Generic(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_messages() {
        let err = ReflectError::WriteConflict { attempts: 50 };
        assert!(err.user_message().contains("50"));

        let err = ReflectError::SensitiveData;
        assert!(err.user_message().contains("sensitive"));
    }

    #[test]
    fn test_error_display() {
        let err = ReflectError::document("/tmp/CLAUDE.md", "unbalanced markers");
        let display = format!("{}", err);
        assert!(display.contains("/tmp/CLAUDE.md"));
        assert!(display.contains("unbalanced markers"));

        let err = ReflectError::malformed("queue", "expected object");
        assert!(format!("{}", err).contains("Malformed record"));
    }
}
