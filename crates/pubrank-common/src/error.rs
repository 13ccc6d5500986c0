use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubrankError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PubrankError>;

/// Failure of a single call to an external publication source.
///
/// Kept `Clone` and serialisable because it travels with per-identifier
/// results instead of aborting the aggregate.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("unexpected status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<PubrankError> for SourceError {
    fn from(err: PubrankError) -> Self {
        match err {
            PubrankError::Http(e) => e.into(),
            PubrankError::Serialization(e) => SourceError::Decode(e.to_string()),
            other => SourceError::Network(other.to_string()),
        }
    }
}

/// Account directory lookup failure. Never fatal to resolution.
#[derive(Debug, Error)]
#[error("account lookup failed for {reference}: {reason}")]
pub struct LookupError {
    pub reference: String,
    pub reason: String,
}

impl LookupError {
    pub fn new(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { reference: reference.into(), reason: reason.into() }
    }
}
