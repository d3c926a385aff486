//! The root shared state a worker thread, the main dispatcher and the two
//! actor threads all hold a handle to.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use cc_actors::{OptimizerMessage, TagMessage};
use cc_queue::DynamicQueue;
use cc_store::{FpcStore, SessionStore};

use crate::config::CoreConfig;

pub struct CoreState {
    pub config: CoreConfig,
    pub session_store: Arc<SessionStore>,
    pub fpc_store: Arc<FpcStore>,
    pub tag_queue: Arc<DynamicQueue<TagMessage>>,
    pub session_optimizer_queue: Arc<DynamicQueue<OptimizerMessage>>,
    pub fpc_optimizer_queue: Arc<DynamicQueue<OptimizerMessage>>,
    pub cpu_load_percent: Arc<AtomicU8>,
}

impl CoreState {
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        let session_store = Arc::new(SessionStore::new(config.session.clone()));
        let fpc_store = Arc::new(FpcStore::new(config.fpc.clone()));
        let tag_queue = Arc::new(DynamicQueue::new(config.queue_config()));
        let session_optimizer_queue = Arc::new(DynamicQueue::new(config.queue_config()));
        let fpc_optimizer_queue = Arc::new(DynamicQueue::new(config.queue_config()));
        Self {
            config,
            session_store,
            fpc_store,
            tag_queue,
            session_optimizer_queue,
            fpc_optimizer_queue,
            cpu_load_percent: Arc::new(AtomicU8::new(0)),
        }
    }
}
