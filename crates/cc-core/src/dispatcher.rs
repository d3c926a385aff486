//! The main dispatcher: spawns the tag manager and the two optimizers on
//! their own threads, samples CPU load for their pass-budget bucketing, and
//! coordinates memory reclamation across domains when a store is close to
//! its configured budget.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cc_actors::{Optimizer, TagManager};

use crate::sinks::{FpcSink, SessionSink};
use crate::state::CoreState;

pub struct Dispatcher {
    state: Arc<CoreState>,
    threads: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(state: Arc<CoreState>) -> Self {
        Self { state, threads: Vec::new() }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<CoreState> {
        &self.state
    }

    /// Spawns the tag manager and optimizer actor threads and a background
    /// thread that periodically samples CPU load and, if configured, asks
    /// each domain to auto-save.
    pub fn start(&mut self) {
        let tag_manager =
            TagManager::new(Arc::clone(&self.state.fpc_store), Arc::clone(&self.state.tag_queue));
        self.threads.push(thread::spawn(move || tag_manager.run()));

        let session_optimizer = Optimizer::new(
            Box::new(SessionSink(Arc::clone(&self.state.session_store))),
            Arc::clone(&self.state.session_optimizer_queue),
            Arc::clone(&self.state.cpu_load_percent),
            self.state.config.session.retained_minimum,
        );
        let idle_tick = self.state.config.optimizer_idle_tick();
        self.threads.push(thread::spawn(move || session_optimizer.run(idle_tick)));

        let fpc_optimizer = Optimizer::new(
            Box::new(FpcSink {
                store: Arc::clone(&self.state.fpc_store),
                tag_queue: Arc::clone(&self.state.tag_queue),
            }),
            Arc::clone(&self.state.fpc_optimizer_queue),
            Arc::clone(&self.state.cpu_load_percent),
            self.state.config.fpc.retained_minimum,
        );
        self.threads.push(thread::spawn(move || fpc_optimizer.run(idle_tick)));

        let load_state = Arc::clone(&self.state);
        let sample_interval = Duration::from_millis(self.state.config.load_sample_interval_ms.max(50));
        self.threads.push(thread::spawn(move || Self::sample_load_forever(load_state, sample_interval)));
    }

    fn sample_load_forever(state: Arc<CoreState>, interval: Duration) {
        loop {
            let load = sample_cpu_load_percent();
            state.cpu_load_percent.store(load, Ordering::Relaxed);
            check_memory_budgets(&state);
            thread::sleep(interval);
        }
    }

    /// Asks both domain stores whether they are close enough to their
    /// memory budget to warrant eviction, and if so posts a `FreeMemory`
    /// request to the matching optimizer. This is the coordination point
    /// between "a domain is filling up" and "the optimizer should make
    /// room" — it runs once per load-sample tick and can also be called
    /// directly right after a write that just found its domain full.
    pub fn begin_memory_deallocation(&self) {
        check_memory_budgets(&self.state);
    }

    /// Signals every actor thread to quit and joins them. Used on shutdown.
    pub fn shutdown(mut self) {
        let _ = self.state.tag_queue.put_always(cc_actors::TagMessage::Quit);
        let _ = self.state.session_optimizer_queue.put_always(cc_actors::OptimizerMessage::Quit);
        let _ = self.state.fpc_optimizer_queue.put_always(cc_actors::OptimizerMessage::Quit);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// A domain at or above this fraction of its budget is asked to evict, down
/// to `LOW_WATERMARK`. `account_delta` itself never lets usage exceed the
/// hard budget, so triggering strictly above 100% would never fire; the
/// watermark gives the optimizer room to work before writes start failing.
const HIGH_WATERMARK: f64 = 0.9;
const LOW_WATERMARK: f64 = 0.75;

fn check_memory_budgets(state: &CoreState) {
    request_if_over_watermark(
        state.session_store.inner().memory_used(),
        state.session_store.inner().config.max_memory_bytes,
        &state.session_optimizer_queue,
    );
    request_if_over_watermark(
        state.fpc_store.inner().memory_used(),
        state.fpc_store.inner().config.max_memory_bytes,
        &state.fpc_optimizer_queue,
    );
}

fn request_if_over_watermark(
    used: u64,
    budget: u64,
    queue: &Arc<cc_queue::DynamicQueue<cc_actors::OptimizerMessage>>,
) {
    let high = (budget as f64 * HIGH_WATERMARK) as u64;
    if used < high {
        return;
    }
    let target_used = (budget as f64 * LOW_WATERMARK) as u64;
    let to_free = used.saturating_sub(target_used);
    let _ = queue.put_always(cc_actors::OptimizerMessage::FreeMemory { target_bytes: to_free });
}

/// Rough CPU load sample in `0..=100`, used only to bucket optimizer pass
/// budgets. A real deployment would read `/proc/loadavg` or similar; this
/// crate keeps that detail out of the core engine and just exposes the
/// plumbing — `CoreState::cpu_load_percent` can be set from outside too.
fn sample_cpu_load_percent() -> u8 {
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| s.split_whitespace().next().map(str::to_string))
        .and_then(|s| s.parse::<f32>().ok())
        .map(|load_avg_1m| (load_avg_1m * 25.0).clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    #[test]
    fn begin_memory_deallocation_is_a_no_op_under_budget() {
        let mut config = CoreConfig::default();
        config.fpc.max_memory_bytes = 10_000;
        let state = Arc::new(CoreState::new(config));
        state.fpc_store.inner().account_delta(50).unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&state));
        dispatcher.begin_memory_deallocation();
        assert_eq!(state.fpc_optimizer_queue.len(), 0);
    }
}
