use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("actor has already shut down")]
    ShutDown,
    #[error(transparent)]
    Store(#[from] cc_store::StoreError),
}

pub type ActorResult<T> = Result<T, ActorError>;
