//! Error types for the claw-suppress crate.

use thiserror::Error;

/// Errors that can occur in the suppression engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuppressError {
    /// Silence with the given ID was not found.
    #[error("silence not found: {id}")]
    SilenceNotFound {
        /// The silence ID that was not found.
        id: String,
    },

    /// Caller-supplied input violated a constraint.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// The constraint that was violated.
        reason: String,
    },

    /// A label matcher could not be constructed.
    #[error("invalid matcher '{matcher}': {reason}")]
    InvalidMatcher {
        /// The matcher as written by the caller.
        matcher: String,
        /// Why the matcher was rejected.
        reason: String,
    },

    /// The backing state store failed.
    #[error("state store error: {reason}")]
    StateStore {
        /// Description of the storage failure.
        reason: String,
    },

    /// The caller's deadline elapsed before the operation completed.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exhausted, in milliseconds.
        after_ms: u64,
    },

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// Engine configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error while reading or writing state.
    #[error("io error: {0}")]
    Io(String),
}

impl SuppressError {
    /// Creates a [`SuppressError::Validation`] for `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`SuppressError::StateStore`].
    pub fn state_store(reason: impl Into<String>) -> Self {
        Self::StateStore {
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by caller misuse.
    ///
    /// These are always surfaced verbatim and never folded into a verdict.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::InvalidMatcher { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Returns true for infrastructure faults that a suppression query
    /// recovers from by reporting "not suppressed".
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::StateStore { .. }
                | Self::Timeout { .. }
                | Self::Cancelled { .. }
                | Self::Serialization(_)
                | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for SuppressError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SuppressError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for suppression operations.
pub type Result<T> = std::result::Result<T, SuppressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_silence_not_found() {
        let err = SuppressError::SilenceNotFound {
            id: "silence-123".to_string(),
        };
        assert_eq!(err.to_string(), "silence not found: silence-123");
    }

    #[test]
    fn error_display_validation_names_field() {
        let err = SuppressError::validation("comment", "must be at least 3 characters");
        assert_eq!(
            err.to_string(),
            "invalid comment: must be at least 3 characters"
        );
    }

    #[test]
    fn error_display_timeout() {
        let err = SuppressError::Timeout {
            operation: "is_alert_silenced".to_string(),
            after_ms: 250,
        };
        assert_eq!(err.to_string(), "is_alert_silenced timed out after 250ms");
    }

    #[test]
    fn error_display_invalid_matcher() {
        let err = SuppressError::InvalidMatcher {
            matcher: "job=~\"(\"".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert!(err.to_string().starts_with("invalid matcher"));
    }

    #[test]
    fn classification() {
        assert!(SuppressError::validation("x", "y").is_validation());
        assert!(!SuppressError::validation("x", "y").is_degraded());
        assert!(SuppressError::state_store("down").is_degraded());
        assert!(
            SuppressError::Cancelled {
                operation: "q".to_string()
            }
            .is_degraded()
        );
        assert!(
            !SuppressError::SilenceNotFound {
                id: "a".to_string()
            }
            .is_degraded()
        );
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let err: SuppressError = json_err.unwrap_err().into();
        assert!(matches!(err, SuppressError::Serialization(_)));
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SuppressError = io.into();
        assert!(matches!(err, SuppressError::Io(_)));
    }
}
