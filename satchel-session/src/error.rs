//! Error types for session operations.

use std::fmt;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Boxed backend failure carried inside [`SessionError::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The storage call that failed. Its `Display` is the fixed prefix of the
/// resulting error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Open,
    Read,
    Write,
    Destroy,
    Gc,
    ValidateId,
    CreateId,
    Connect,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageOp::Open => "could not open session",
            StorageOp::Read => "could not read session",
            StorageOp::Write => "could not update session",
            StorageOp::Destroy => "could not delete session",
            StorageOp::Gc => "could not clean old sessions",
            StorageOp::ValidateId => "could not validate id",
            StorageOp::CreateId => "could not create sid",
            StorageOp::Connect => "could not connect session store",
        })
    }
}

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad option key, id length below the minimum, unknown cipher method.
    #[error("{0}")]
    Configuration(String),

    /// A mutating call was made while a session is running.
    #[error("Session already started")]
    AlreadyStarted,

    /// A backend call failed. The backend's own error is kept as the source.
    #[error("{op}: {source}")]
    Storage {
        op: StorageOp,
        #[source]
        source: BoxError,
    },

    /// Empty key, decryption failure, IV generation failure.
    #[error("{0}")]
    Crypto(String),

    /// Session content could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid connection URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SessionError {
    /// Wrap a backend failure for `op`.
    pub fn storage(op: StorageOp, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            op,
            source: source.into(),
        }
    }

    /// The failed storage operation, if this is a storage error.
    pub fn storage_op(&self) -> Option<StorageOp> {
        match self {
            Self::Storage { op, .. } => Some(*op),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
