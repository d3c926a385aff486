use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] cc_store::StoreError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistent store format error: {0}")]
    StoreFormat(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
