//! Unified error types for freightdesk.
//!
//! Every variant is cheap to clone so a single failure can be handed to all
//! callers waiting on the same deduplicated request.

use std::sync::Arc;

use tokio_rusqlite::rusqlite;

/// Unified error type for the freightdesk client layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or joined against the base URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The server answered with a non-success status.
    #[error("HTTP_ERROR: status {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The transport gave up waiting for a response.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// The exchange could not complete (connect, TLS, body read).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Payload could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(Arc<tokio_rusqlite::Error>),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether this error came from the exchange itself rather than local bookkeeping.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::HttpError { .. } | Error::Timeout(_) | Error::Network(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(err))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::Close(c) => Error::Database(Arc::new(tokio_rusqlite::Error::Close(c))),
            _ => Error::Database(Arc::new(tokio_rusqlite::Error::ConnectionClosed)),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(Arc::new(err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(Arc::new(tokio_rusqlite::Error::Error(err)))
    }
}
