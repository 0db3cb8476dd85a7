// Error taxonomy for QRZ Logbook sync
//
// Run-level errors abort an import; record-level failures never do and are
// carried in the ImportReport instead (see sync::report).

use serde::Serialize;
use thiserror::Error;

/// Errors that can abort a fetch or an import run
#[derive(Debug, Error)]
pub enum QrzError {
    /// Response envelope missing or malformed
    #[error("Decode error: {0}")]
    Decode(String),
    /// QRZ rejected the API key (RESULT=AUTH_FAILED)
    #[error("Authentication error: {0}")]
    Auth(String),
    /// QRZ rejected the request (RESULT=FAIL)
    #[error("QRZ API error: {0}")]
    Api(String),
    /// Network failure, timeout or server-side HTTP error
    #[error("Network error: {0}")]
    Transport(String),
    /// No usable credential or invalid option
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Import already running for account {0}")]
    LockContention(String),
    #[error("Import cancelled")]
    Cancelled,
}

impl QrzError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, QrzError::Transport(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QrzError::Decode(_) => ErrorKind::Decode,
            QrzError::Auth(_) => ErrorKind::Auth,
            QrzError::Api(_) => ErrorKind::Api,
            QrzError::Transport(_) => ErrorKind::Transport,
            QrzError::Configuration(_) => ErrorKind::Configuration,
            QrzError::Storage(_) => ErrorKind::Storage,
            QrzError::LockContention(_) => ErrorKind::LockContention,
            QrzError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Serializable error category used in report descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    RecordDecode,
    Validation,
    Auth,
    Api,
    Transport,
    Configuration,
    Storage,
    LockContention,
    Cancelled,
}
