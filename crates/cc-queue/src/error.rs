use thiserror::Error;

/// Error types for [`crate::DynamicQueue`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `put`/`put_timeout` could not insert before the deadline elapsed.
    #[error("put timed out")]
    PutTimedOut,
    /// `get`/`get_timeout` found nothing before the deadline elapsed.
    #[error("get timed out")]
    GetTimedOut,
    /// The queue was closed (quitting) while a caller was waiting on it.
    #[error("queue is closed")]
    Closed,
    /// `put_always` could not grow the queue past [`crate::config::ABSOLUTE_MAX_CAPACITY`].
    #[error("queue exhausted absolute capacity ceiling")]
    AbsoluteCapacityExceeded,
}
