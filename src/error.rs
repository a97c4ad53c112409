//! Error types for parcel-mesh
//!
//! Error hierarchy covering:
//! - Identifier parsing
//! - Replicated store access (memory and Redis backends)
//! - Stored record decoding and registration integrity
//! - Peer-site forwarding
//! - Parcel archiving
//! - Configuration
//!
//! Lifecycle operations never surface these to calling WUPs; the agent
//! logs them and degrades to a conservative action suggestion.

use thiserror::Error;

/// Top-level error type for parcel-mesh
#[derive(Error, Debug)]
pub enum MeshError {
    /// Identifier errors
    #[error("Identifier error: {0}")]
    Identity(#[from] IdentityError),

    /// Replicated store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Stored record errors
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Peer-site forwarding errors
    #[error("Forwarding error: {0}")]
    Forward(#[from] ForwardError),

    /// Archive errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifier parsing and derivation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Qualified string had no components
    #[error("Identifier string is empty")]
    Empty,

    /// Parent requested on a single-component identifier
    #[error("Identifier '{0}' has no parent component")]
    EmptyIdentifier(String),

    /// A component was not of the form name=value
    #[error("Malformed identifier component '{component}' in '{qualified}'")]
    MalformedComponent { qualified: String, component: String },

    /// Component name contains characters outside [A-Za-z0-9_-]
    #[error("Invalid component name '{0}'")]
    InvalidName(String),

    /// Percent escape could not be decoded
    #[error("Invalid escape sequence in '{0}'")]
    InvalidEscape(String),
}

/// Replicated store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis connection failed
    #[error("Failed to connect to store at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Store operation failed
    #[error("Store operation failed: {0}")]
    OperationFailed(String),

    /// Notification channel closed
    #[error("Store notification channel closed")]
    Closed,

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

/// Errors about the content of stored records
#[derive(Error, Debug)]
pub enum RecordError {
    /// Stored value does not decode into the expected schema
    #[error("Malformed record at '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Registration converged on a record stored under a different parcel identity
    #[error("Registration collision: expected parcel '{expected}', found '{found}'")]
    RegistrationCollision { expected: String, found: String },

    /// Record could not be encoded
    #[error("Failed to serialize record: {0}")]
    Serialization(String),

    /// Store access failed underneath the record layer
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    /// Check if this error means the stored data itself is bad
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            RecordError::MalformedRecord { .. } | RecordError::RegistrationCollision { .. }
        )
    }
}

/// Peer-site forwarding errors
#[derive(Error, Debug, Clone)]
pub enum ForwardError {
    /// Peer site could not be reached
    #[error("Peer site '{endpoint}' unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// A single delivery attempt timed out
    #[error("Forward to '{endpoint}' timed out after {millis}ms")]
    Timeout { endpoint: String, millis: u64 },

    /// Peer site refused the record
    #[error("Peer site '{endpoint}' rejected record: {reason}")]
    Rejected { endpoint: String, reason: String },
}

/// Parcel archive errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record could not be encoded for archiving
    #[error("Failed to serialize parcel for archive: {0}")]
    Serialization(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Interval must be non-zero
    #[error("Invalid {name} interval: must be greater than zero")]
    InvalidInterval { name: &'static str },

    /// Forward attempt budget out of range
    #[error("Invalid forward attempt budget {attempts}: must be between 1 and {max}")]
    InvalidRetryBudget { attempts: u32, max: u32 },

    /// Peer endpoint could not be used
    #[error("Invalid peer endpoint '{endpoint}': {reason}")]
    InvalidPeer { endpoint: String, reason: String },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Node identity could not be built
    #[error("Invalid node identity: {0}")]
    InvalidIdentity(#[from] IdentityError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MeshError>;

/// Result type for identifier operations
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for typed record access
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Result type for archive operations
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_violation() {
        let malformed = RecordError::MalformedRecord {
            key: "uow=a".into(),
            reason: "missing field".into(),
        };
        assert!(malformed.is_integrity_violation());

        let store = RecordError::Store(StoreError::Closed);
        assert!(!store.is_integrity_violation());
    }

    #[test]
    fn test_error_conversion() {
        let err = IdentityError::Empty;
        let mesh: MeshError = err.into();
        assert!(matches!(mesh, MeshError::Identity(_)));

        let err = StoreError::OperationFailed("boom".into());
        let record: RecordError = err.into();
        assert!(matches!(record, RecordError::Store(_)));
    }
}
