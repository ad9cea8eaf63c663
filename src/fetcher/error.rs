use thiserror::Error;

/// Errors that reject a whole batch. Per-target failures never show up here;
/// they are reported inside the corresponding `FetchResult`.
#[derive(Error, Debug, PartialEq)]
pub enum FetchError {
    #[error("invalid concurrency limit {0}: must be at least 1")]
    InvalidConcurrency(i64),

    #[error("malformed target list: {0}")]
    MalformedTargets(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
