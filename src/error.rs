use thiserror::Error;

/// Failure taxonomy for the symbol source and the two retrieval paths.
///
/// Only `SourceUnavailable` is fatal; the fetch and parse variants are
/// contained inside the worker processing the affected symbol.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The symbol universe cannot be read; the batch cannot proceed.
    #[error("symbol source unavailable: {0}")]
    SourceUnavailable(#[from] sqlx::Error),

    /// A network-level failure talking to either source.
    #[error("transient fetch failure: {0}")]
    Transient(#[from] reqwest::Error),

    /// A payload that does not match the expected shape.
    #[error("unexpected payload: {0}")]
    Parse(String),
}

impl From<url::ParseError> for CollectorError {
    fn from(err: url::ParseError) -> Self {
        CollectorError::Parse(err.to_string())
    }
}
