//! The bounded status every request handler returns, regardless of which
//! command it served — callers (the worker loop, tests, the wire protocol
//! layer out of scope here) switch on this rather than matching error types.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// The request could not even be parsed/validated.
    FormatError,
    /// Something on our side went wrong (I/O, out of memory, a panic caught
    /// at the boundary) rather than anything about the request itself.
    InternalError,
    /// The request was well-formed and fully processed, but did not
    /// succeed (key not found, tag mismatch, lock held by someone else).
    Failure,
    Success,
}

impl HandlerStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, HandlerStatus::Success)
    }
}

impl From<&cc_store::StoreError> for HandlerStatus {
    fn from(error: &cc_store::StoreError) -> Self {
        match error {
            cc_store::StoreError::NotFound
            | cc_store::StoreError::AlreadyExists
            | cc_store::StoreError::Locked
            | cc_store::StoreError::NoPayload => HandlerStatus::Failure,
            cc_store::StoreError::InvalidKey(_) => HandlerStatus::FormatError,
            cc_store::StoreError::Compression(_) | cc_store::StoreError::OutOfMemory => {
                HandlerStatus::InternalError
            }
        }
    }
}
