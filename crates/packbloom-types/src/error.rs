use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackbloomError>;

#[derive(Debug, Error)]
pub enum PackbloomError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository not found at '{0}'")]
    RepoNotFound(String),

    #[error("not found: '{0}'")]
    NotFound(String),

    #[error("invalid bloom filter: {0}")]
    InvalidFilter(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unsupported hash count k={0} (only 4 and 5 are supported)")]
    UnsupportedK(u8),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
