use thiserror::Error;

/// Failure of a single page request against the remote feed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The session token was rejected. Retrying cannot help.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// Network failure or a non-success status that may clear up on its own.
    #[error("transient fetch error: {0}")]
    Transient(String),
    /// The remote answered with a page we cannot decode.
    #[error("malformed page: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Malformed pages are retried like transient failures; auth failures never are.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Auth(_))
    }
}
