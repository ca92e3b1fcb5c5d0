use thiserror::Error;

/// Fatal conditions detected before an ingestion pass starts.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
