//! Per-domain optimizer: a single thread that maintains four LRU chains (one
//! per user-agent class) and runs eviction and background re-compression
//! passes against them.
//!
//! The optimizer never touches a shard's lock directly — it only receives
//! already-resolved `Arc<Record>` handles from workers and the dispatcher,
//! and asks a [`RecordSink`] to actually remove a record from its store. A
//! `Delete` notice that arrives before the matching `Write` (possible when a
//! worker posts both in quick succession and the queue reorders across
//! producer threads) is retried a bounded number of times rather than
//! dropped silently or blocked on forever.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cc_queue::DynamicQueue;
use cc_store::{CompressorId, GcMode, Record, UserAgentClass};

use crate::lru_chain::LruChain;

/// A store that the optimizer can ask to actually remove a record it has
/// decided to evict.
pub trait RecordSink: Send + Sync {
    fn evict(&self, record: &Arc<Record>);
    fn domain_name(&self) -> &'static str;
}

pub enum OptimizerMessage {
    Write(Arc<Record>),
    Read(Arc<Record>),
    Touch(Arc<Record>),
    Delete(Arc<Record>),
    Gc { mode: GcMode },
    FreeMemory { target_bytes: u64 },
    Reconfigure { recompress_order: Vec<CompressorId>, recompress_threshold: usize },
    Quit,
}

/// The out-of-order retry ceiling for a `Delete` that targets a record the
/// chain has not seen a matching `Write` for yet.
const MAX_DELETE_RETRIES: u8 = 256;

/// Cap on how many compressors the re-compression pass will try in order.
const MAX_RECOMPRESS_ORDER: usize = 8;

pub struct Optimizer {
    chains: [LruChain; 4],
    /// Per-class floor below which a chain is never evicted from, even under
    /// memory pressure or a GC pass. Indexed by `UserAgentClass::index()`.
    retained_minimum: [usize; 4],
    sink: Box<dyn RecordSink>,
    queue: Arc<DynamicQueue<OptimizerMessage>>,
    cpu_load_percent: Arc<AtomicU8>,
    pending_deletes: VecDeque<(Arc<Record>, u8)>,
    recompress_order: Vec<CompressorId>,
    recompress_threshold: usize,
}

impl Optimizer {
    #[must_use]
    pub fn new(
        sink: Box<dyn RecordSink>,
        queue: Arc<DynamicQueue<OptimizerMessage>>,
        cpu_load_percent: Arc<AtomicU8>,
        retained_minimum: [usize; 4],
    ) -> Self {
        Self {
            chains: [LruChain::new(), LruChain::new(), LruChain::new(), LruChain::new()],
            retained_minimum,
            sink,
            queue,
            cpu_load_percent,
            pending_deletes: VecDeque::new(),
            recompress_order: Vec::new(),
            recompress_threshold: 0,
        }
    }

    /// How many records a single maintenance pass (GC walk or
    /// re-compression sweep) may inspect, bucketed by recent CPU load so a
    /// busy server doesn't starve request-handling threads.
    #[must_use]
    fn pass_budget(&self) -> usize {
        match self.cpu_load_percent.load(Ordering::Relaxed) {
            0..=29 => 4096,
            30..=59 => 1024,
            60..=84 => 256,
            _ => 64,
        }
    }

    fn chain_for(&mut self, class: UserAgentClass) -> &mut LruChain {
        &mut self.chains[class.index()]
    }

    /// Runs the actor loop. Blocks on the queue with a timeout so periodic
    /// maintenance (re-compression, retrying stuck deletes) still happens
    /// even when no new messages arrive.
    pub fn run(mut self, idle_tick: Duration) {
        loop {
            match self.queue.get_timeout(idle_tick) {
                Ok(message) => {
                    if !self.handle(message) {
                        break;
                    }
                }
                Err(_timed_out) => {
                    self.retry_pending_deletes();
                    if !self.recompress_order.is_empty() {
                        self.run_recompression_pass();
                    }
                }
            }
        }
    }

    fn handle(&mut self, message: OptimizerMessage) -> bool {
        match message {
            OptimizerMessage::Write(record) => {
                record.flags().set(cc_store::flags::LINKED_BY_OPTIMIZER);
                self.chain_for(record.user_agent_class()).touch(&record);
                self.retry_pending_deletes_for(&record);
            }
            OptimizerMessage::Read(record) | OptimizerMessage::Touch(record) => {
                self.chain_for(record.user_agent_class()).touch(&record);
            }
            OptimizerMessage::Delete(record) => {
                let removed = self.chain_for(record.user_agent_class()).remove(&record);
                if !removed {
                    self.pending_deletes.push_back((record, 0));
                }
            }
            OptimizerMessage::Gc { mode } => self.run_gc_pass(mode),
            OptimizerMessage::FreeMemory { target_bytes } => self.free_memory(target_bytes),
            OptimizerMessage::Reconfigure { mut recompress_order, recompress_threshold } => {
                recompress_order.truncate(MAX_RECOMPRESS_ORDER);
                self.recompress_order = recompress_order;
                self.recompress_threshold = recompress_threshold;
            }
            OptimizerMessage::Quit => return false,
        }
        true
    }

    fn retry_pending_deletes_for(&mut self, record: &Arc<Record>) {
        if let Some(pos) = self.pending_deletes.iter().position(|(r, _)| Arc::ptr_eq(r, record)) {
            let (record, _) = self.pending_deletes.remove(pos).unwrap();
            self.chain_for(record.user_agent_class()).remove(&record);
        }
    }

    fn retry_pending_deletes(&mut self) {
        let mut still_pending = VecDeque::with_capacity(self.pending_deletes.len());
        while let Some((record, attempts)) = self.pending_deletes.pop_front() {
            let class = record.user_agent_class();
            if self.chains[class.index()].remove(&record) {
                continue;
            }
            let attempts = attempts + 1;
            if attempts >= MAX_DELETE_RETRIES {
                tracing::warn!(
                    key = %String::from_utf8_lossy(&record.key),
                    "giving up on out-of-order delete after {attempts} retries"
                );
                continue;
            }
            still_pending.push_back((record, attempts));
        }
        self.pending_deletes = still_pending;
    }

    /// Walks each chain from its LRU end evicting according to `mode`, never
    /// dropping a chain below its configured `retained_minimum`.
    fn run_gc_pass(&mut self, mode: GcMode) {
        let budget = self.pass_budget();
        let now = cc_store::time::now_millis();
        for class in UserAgentClass::ALL {
            let protect = self.retained_minimum[class.index()];
            let mut evicted_from_chain = 0usize;
            loop {
                if evicted_from_chain >= budget || self.chains[class.index()].len() <= protect {
                    break;
                }
                let candidates = self.chains[class.index()].oldest(1);
                let Some(candidate) = candidates.into_iter().next() else { break };

                let should_evict = match mode {
                    GcMode::StrictExpirationLru | GcMode::ExpirationLru => candidate.is_expired(now),
                    GcMode::Lru | GcMode::StrictLru => true,
                };
                if !should_evict {
                    // Strict modes only ever evict from the LRU end, so once
                    // the oldest entry doesn't qualify, none further down the
                    // chain (which are all more recently used) do either.
                    break;
                }

                self.chains[class.index()].remove(&candidate);
                self.sink.evict(&candidate);
                evicted_from_chain += 1;
            }
        }
    }

    /// Evicts least-recently-used records (starting with the least valuable
    /// classes: unknown, then bot, then warmer, then user) until at least
    /// `target_bytes` worth of payload has been freed or every chain is
    /// empty.
    fn free_memory(&mut self, target_bytes: u64) {
        let mut freed = 0u64;
        let order = [
            UserAgentClass::Unknown,
            UserAgentClass::Bot,
            UserAgentClass::Warmer,
            UserAgentClass::User,
        ];
        'outer: for class in order {
            let protect = self.retained_minimum[class.index()];
            while freed < target_bytes && self.chains[class.index()].len() > protect {
                let Some(record) = self.chains[class.index()].pop_lru() else { break };
                freed += record.compressed_len() as u64;
                self.sink.evict(&record);
                if freed >= target_bytes {
                    break 'outer;
                }
            }
        }
        tracing::debug!(domain = self.sink.domain_name(), freed, target_bytes, "free_memory pass complete");
    }

    /// Tries, for each record near the LRU end, the first compressor in
    /// `recompress_order` that differs from what's currently stored. Records
    /// smaller than `recompress_threshold`, or with a live reader or write
    /// lock, are skipped rather than retried later.
    fn run_recompression_pass(&mut self) {
        let budget = self.pass_budget();
        for class in UserAgentClass::ALL {
            for record in self.chains[class.index()].oldest(budget) {
                if record.reader_count() > 0 || record.is_locked() {
                    continue;
                }
                if record.payload_len() < self.recompress_threshold {
                    continue;
                }
                let Some(current) = record.compressor_id() else { continue };
                if let Some(&target) = self.recompress_order.iter().find(|&&c| c != current) {
                    let _ = record.recompress(target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_queue::QueueConfig;
    use cc_store::Domain;
    use std::sync::Mutex;

    struct TestSink {
        evicted: Mutex<Vec<Arc<Record>>>,
    }

    impl RecordSink for TestSink {
        fn evict(&self, record: &Arc<Record>) {
            self.evicted.lock().unwrap().push(Arc::clone(record));
        }

        fn domain_name(&self) -> &'static str {
            "test"
        }
    }

    fn record(key: &[u8]) -> Arc<Record> {
        Arc::new(Record::new(key.to_vec(), Domain::Fpc))
    }

    fn optimizer() -> (Optimizer, Arc<TestSink>) {
        let sink = Arc::new(TestSink { evicted: Mutex::new(Vec::new()) });
        let queue = Arc::new(DynamicQueue::new(QueueConfig::default()));
        let load = Arc::new(AtomicU8::new(0));
        let opt = Optimizer::new(Box::new(TestSinkHandle(Arc::clone(&sink))), queue, load, [0, 0, 0, 0]);
        (opt, sink)
    }

    struct TestSinkHandle(Arc<TestSink>);
    impl RecordSink for TestSinkHandle {
        fn evict(&self, record: &Arc<Record>) {
            self.0.evict(record);
        }
        fn domain_name(&self) -> &'static str {
            self.0.domain_name()
        }
    }

    #[test]
    fn write_then_delete_removes_from_chain() {
        let (mut opt, _sink) = optimizer();
        let r = record(b"a");
        assert!(opt.handle(OptimizerMessage::Write(Arc::clone(&r))));
        assert_eq!(opt.chains[UserAgentClass::Unknown.index()].len(), 1);
        assert!(opt.handle(OptimizerMessage::Delete(Arc::clone(&r))));
        assert_eq!(opt.chains[UserAgentClass::Unknown.index()].len(), 0);
    }

    #[test]
    fn out_of_order_delete_is_retried_until_write_arrives() {
        let (mut opt, _sink) = optimizer();
        let r = record(b"a");
        opt.handle(OptimizerMessage::Delete(Arc::clone(&r)));
        assert_eq!(opt.pending_deletes.len(), 1);
        opt.handle(OptimizerMessage::Write(Arc::clone(&r)));
        assert_eq!(opt.pending_deletes.len(), 0);
        assert_eq!(opt.chains[UserAgentClass::Unknown.index()].len(), 0);
    }

    #[test]
    fn free_memory_evicts_until_target_reached() {
        let (mut opt, sink) = optimizer();
        for k in [b"a", b"b", b"c"] {
            let r = record(k);
            r.install_payload(cc_store::Payload {
                compressor_id: CompressorId::None,
                uncompressed_size: 10,
                bytes: Arc::from(vec![0u8; 10].into_boxed_slice()),
            });
            opt.handle(OptimizerMessage::Write(r));
        }
        opt.handle(OptimizerMessage::FreeMemory { target_bytes: 15 });
        assert_eq!(sink.evicted.lock().unwrap().len(), 2);
    }
}
