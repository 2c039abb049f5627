//! Error types for the sweep persistence subsystem.

use thiserror::Error;

/// The shared error type for the persistence subsystem.
///
/// Explicit, user-initiated operations propagate these to the caller.
/// Implicit lifecycle paths (pause, resume, background save, recovery)
/// catch them, log, and fall back to a safe state instead.
#[derive(Error, Debug, Clone)]
pub enum SweepError {
    /// The durable medium is missing or cannot be opened.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {format} - {message}")]
    SerializationFailed {
        format: String, // "JSON", "TOML", ...
        message: String,
    },

    /// The medium refused the write for lack of space.
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// The medium refused the operation for lack of permission.
    #[error("Storage permission denied")]
    PermissionDenied,

    /// A loaded record failed validation.
    #[error("Session validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// A tracked change exhausted its persist attempts and was dropped.
    #[error("Retry attempts exhausted for change '{key}'")]
    RetryExhausted { key: String },

    /// An operation requiring a live session ran before `initialize()`
    /// or after `dispose()`.
    #[error("No active session")]
    NoActiveSession,

    /// File system error outside the taxonomy above.
    #[error("IO error: {message}")]
    Io { message: String },

    /// Anything else; should not happen in normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SweepError {
    /// Creates a StorageUnavailable error.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }

    /// Creates a SerializationFailed error.
    pub fn serialization(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SerializationFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Creates an Io error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a quota error.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded)
    }

    /// Check if this is a serialization error.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::SerializationFailed { .. })
    }

    /// Check if this is the missing-session precondition error.
    pub fn is_no_active_session(&self) -> bool {
        matches!(self, Self::NoActiveSession)
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => Self::QuotaExceeded,
            _ => Self::Io {
                message: format!("{} (kind: {:?})", err, err.kind()),
            },
        }
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SweepError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerializationFailed {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, SweepError>`.
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_to_taxonomy() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            SweepError::from(denied),
            SweepError::PermissionDenied
        ));

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(SweepError::from(missing), SweepError::Io { .. }));
    }

    #[test]
    fn predicates() {
        assert!(SweepError::QuotaExceeded.is_quota_exceeded());
        assert!(SweepError::NoActiveSession.is_no_active_session());
        assert!(SweepError::serialization("JSON", "bad").is_serialization());
    }
}
