//! Adapts the two domain stores to the [`cc_actors::RecordSink`] contract so
//! an optimizer can evict a record without knowing which store it came from.

use std::sync::Arc;

use cc_actors::{RecordSink, TagMessage};
use cc_queue::DynamicQueue;
use cc_store::{FpcStore, Record, SessionStore};

pub struct SessionSink(pub Arc<SessionStore>);

impl RecordSink for SessionSink {
    fn evict(&self, record: &Arc<Record>) {
        self.0.inner().remove(&record.key);
    }

    fn domain_name(&self) -> &'static str {
        "session"
    }
}

pub struct FpcSink {
    pub store: Arc<FpcStore>,
    pub tag_queue: Arc<DynamicQueue<TagMessage>>,
}

impl RecordSink for FpcSink {
    fn evict(&self, record: &Arc<Record>) {
        let tags = record.tags();
        self.store.inner().remove(&record.key);
        if !tags.is_empty() {
            let _ = self.tag_queue.put_always(TagMessage::Unlink { record: Arc::clone(record), tags });
        }
    }

    fn domain_name(&self) -> &'static str {
        "fpc"
    }
}
