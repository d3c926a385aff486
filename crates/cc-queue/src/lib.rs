//! Dynamic message queue used as the producer/consumer edge between workers,
//! the tag manager, the optimizers, and the main dispatcher.
//!
//! The queue is a bounded, mutex-and-condvar-protected ring buffer that grows
//! by doubling when full (up to a configured maximum), and can be forced to
//! grow past that maximum via [`DynamicQueue::put_always`] for call sites that
//! must never block or fail (see the out-of-order delete-notice path in the
//! optimizer). This mirrors the blocking queue design of the system this
//! crate is part of; it is not a lock-free structure, because growth under
//! load requires exclusive access to the backing array.

mod backoff;
mod config;
mod error;
mod queue;

pub use backoff::Backoff;
pub use config::{
    next_power_of_two, validate_capacity, QueueConfig, ABSOLUTE_MAX_CAPACITY,
    MAX_ALLOWED_CAPACITY, MIN_ALLOWED_CAPACITY,
};
pub use error::QueueError;
pub use queue::{DynamicQueue, QueueMetrics};
