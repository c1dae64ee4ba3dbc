use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("The event source did not answer within {0:?}")]
    Timeout(Duration),

    #[error("The event source is unavailable: {0}")]
    Unavailable(String),

    #[error("The HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to deserialize the source response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from source: {0}")]
    InvalidData(String),

    #[error("Failed to read the ledger file: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Maps a transport error, keeping client-side timeouts distinguishable.
    pub(crate) fn from_request(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(timeout)
        } else if err.is_connect() {
            SourceError::Unavailable(err.to_string())
        } else {
            SourceError::Request(err)
        }
    }
}
