//! The two single-threaded actors that run alongside the stores: the tag
//! manager (FPC tag cross-reference bookkeeping and invalidation sweeps) and
//! the optimizer (per-domain LRU tracking, eviction and re-compression
//! passes). Each owns its working set exclusively and communicates with the
//! rest of the system only through a [`cc_queue::DynamicQueue`] mailbox.

pub mod error;
pub mod lru_chain;
pub mod optimizer;
pub mod tag_manager;

pub use error::{ActorError, ActorResult};
pub use lru_chain::LruChain;
pub use optimizer::{Optimizer, OptimizerMessage, RecordSink};
pub use tag_manager::{TagManager, TagMessage};
