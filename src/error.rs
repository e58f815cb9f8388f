//! Huginn error types
//!
//! Ordinary network and HTTP conditions are never errors in huginn: they are
//! encoded in the `status`/`response` fields of a
//! [`FetchResult`](crate::FetchResult). The error type below covers what
//! remains — storage I/O and configuration problems that a caller cannot
//! reasonably interpret as "no data for this call".

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
