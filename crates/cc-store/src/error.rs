use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    AlreadyExists,
    #[error("record is locked by another request")]
    Locked,
    #[error("record has no payload attached")]
    NoPayload,
    #[error("payload compression/decompression failed: {0}")]
    Compression(String),
    #[error("domain memory budget exceeded")]
    OutOfMemory,
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
