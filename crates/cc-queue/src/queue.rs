use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::{self, QueueConfig};
use crate::error::QueueError;
use crate::Backoff;

struct Inner<T> {
    buffer: Vec<Option<T>>,
    capacity: u32,
    max_capacity: u32,
    count: u32,
    put_index: u32,
    get_index: u32,
    mask: u32,
    closed: bool,
    put_waits: u64,
    reallocations: u64,
    put_always_grows: u64,
    put_always_failures: u64,
}

impl<T> Inner<T> {
    fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity;
        let mut inner = Self {
            buffer: Vec::new(),
            capacity: 0,
            max_capacity: config.max_capacity,
            count: 0,
            put_index: 0,
            get_index: 0,
            mask: 0,
            closed: false,
            put_waits: 0,
            reallocations: 0,
            put_always_grows: 0,
            put_always_failures: 0,
        };
        inner.configure_capacity(capacity);
        inner
    }

    /// Resizes the backing array to `capacity` (already validated by caller),
    /// preserving FIFO order of currently-queued elements.
    fn configure_capacity(&mut self, capacity: u32) {
        if capacity == self.capacity {
            return;
        }
        let mut new_buffer: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        if !self.buffer.is_empty() {
            self.reallocations += 1;
            for i in 0..self.count {
                let j = (self.get_index + i) & self.mask;
                new_buffer[i as usize] = self.buffer[j as usize].take();
            }
        }
        self.buffer = new_buffer;
        self.capacity = capacity;
        self.mask = capacity - 1;
        self.get_index = 0;
        self.put_index = self.count & self.mask;
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    fn push_unchecked(&mut self, item: T) {
        let idx = self.put_index;
        self.buffer[idx as usize] = Some(item);
        self.put_index = (idx + 1) & self.mask;
        self.count += 1;
    }

    fn pop_unchecked(&mut self) -> T {
        let idx = self.get_index;
        let item = self.buffer[idx as usize].take().expect("queue count/index out of sync");
        self.get_index = (idx + 1) & self.mask;
        self.count -= 1;
        item
    }
}

/// Synchronized queue of dynamic capacity.
///
/// If the queue is full and `max_capacity` is bigger than the current
/// capacity, `put` doubles the backing array before inserting; otherwise it
/// blocks until a consumer makes room. `put_always` additionally grows past
/// `max_capacity`, up to [`config::ABSOLUTE_MAX_CAPACITY`], for paths that
/// must never block or fail the caller.
pub struct DynamicQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> DynamicQueue<T> {
    /// Creates a new queue with the given configuration.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new(config)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Current number of queued elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current backing-array capacity.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).capacity
    }

    /// Current configured growth ceiling for ordinary `put`.
    #[must_use]
    pub fn max_capacity(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).max_capacity
    }

    /// Sets the current capacity, rounding up to a power of two and clamping
    /// to `[1, max_capacity]`. Shrinking is bounded below by the current element count (rounded up
    /// to a power of two); this never fails, it may just not shrink as much
    /// as requested.
    pub fn set_capacity(&self, capacity: u32) -> u32 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut capacity = config::validate_capacity(capacity).min(inner.max_capacity);
        let floor = config::next_power_of_two(inner.count);
        if capacity < floor {
            capacity = floor;
        }
        inner.configure_capacity(capacity);
        inner.capacity
    }

    /// Sets the growth ceiling for ordinary `put`. If this is lower than the
    /// current capacity, attempts (but does not guarantee) to shrink first.
    pub fn set_max_capacity(&self, max_capacity: u32) -> u32 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let max_capacity = config::validate_capacity(max_capacity);
        if max_capacity < inner.capacity {
            let floor = config::next_power_of_two(inner.count);
            let target = max_capacity.max(floor);
            inner.configure_capacity(target);
        }
        inner.max_capacity = max_capacity.max(inner.capacity);
        inner.max_capacity
    }

    /// Convenience alias for shrinking towards a target capacity; never grows.
    pub fn reduce_capacity(&self, target: u32) -> u32 {
        let current = self.capacity();
        if target >= current {
            return current;
        }
        self.set_capacity(target)
    }

    /// Blocks until the item is inserted.
    pub fn put(&self, item: T) {
        let mut backoff = Backoff::new();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if inner.is_full() && inner.capacity < inner.max_capacity {
                let doubled = (inner.capacity * 2).min(inner.max_capacity);
                inner.configure_capacity(doubled);
            }
            if !inner.is_full() {
                inner.push_unchecked(item);
                drop(inner);
                self.not_empty.notify_one();
                return;
            }
            inner.put_waits += 1;
            if backoff.is_completed() {
                inner = self
                    .not_full
                    .wait_while(inner, |i| i.is_full())
                    .unwrap_or_else(|e| e.into_inner());
            } else {
                drop(inner);
                backoff.snooze();
                inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            }
        }
    }

    /// Blocks up to `timeout` trying to insert the item; returns it back on
    /// the error path if the deadline elapses first.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), (T, QueueError)> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if inner.is_full() && inner.capacity < inner.max_capacity {
                let doubled = (inner.capacity * 2).min(inner.max_capacity);
                inner.configure_capacity(doubled);
            }
            if !inner.is_full() {
                inner.push_unchecked(item);
                drop(inner);
                self.not_empty.notify_one();
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err((item, QueueError::PutTimedOut));
            }
            inner.put_waits += 1;
            let (guard, result) = self
                .not_full
                .wait_timeout_while(inner, deadline - now, |i| i.is_full())
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if result.timed_out() && inner.is_full() {
                return Err((item, QueueError::PutTimedOut));
            }
        }
    }

    /// Inserts unconditionally, growing the queue past `max_capacity` (up to
    /// the absolute ceiling) rather than blocking. Reserved for paths that
    /// would otherwise deadlock, such as the optimizer's out-of-order
    /// delete-notice path.
    pub fn put_always(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.is_full() {
            let mut target = inner.capacity.saturating_mul(2);
            if target <= inner.capacity {
                target = config::ABSOLUTE_MAX_CAPACITY;
            }
            if target > config::ABSOLUTE_MAX_CAPACITY {
                target = config::ABSOLUTE_MAX_CAPACITY;
            }
            if target <= inner.capacity {
                inner.put_always_failures += 1;
                return Err(QueueError::AbsoluteCapacityExceeded);
            }
            inner.configure_capacity(target);
            inner.max_capacity = inner.max_capacity.max(target);
            inner.put_always_grows += 1;
        }
        inner.push_unchecked(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Non-blocking dequeue.
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.count == 0 {
            return None;
        }
        let item = inner.pop_unchecked();
        drop(inner);
        self.not_full.notify_one();
        Some(item)
    }

    /// Blocks until an item is available.
    pub fn get(&self) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner = self
            .not_empty
            .wait_while(inner, |i| i.count == 0)
            .unwrap_or_else(|e| e.into_inner());
        let item = inner.pop_unchecked();
        drop(inner);
        self.not_full.notify_one();
        item
    }

    /// Blocks up to `timeout` waiting for an item.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, result) = self
            .not_empty
            .wait_timeout_while(inner, timeout, |i| i.count == 0)
            .unwrap_or_else(|e| e.into_inner());
        inner = guard;
        if inner.count == 0 {
            return Err(if result.timed_out() {
                QueueError::GetTimedOut
            } else {
                QueueError::Closed
            });
        }
        let item = inner.pop_unchecked();
        drop(inner);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Marks the queue closed and wakes every waiter; a "quitting" consumer
    /// is expected to drain remaining items with `try_get` afterwards rather
    /// than blocking on `get` forever.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed
    }

    /// Snapshot of internal counters, mainly useful for tests and `INFO`/`STATS`.
    #[must_use]
    pub fn metrics(&self) -> QueueMetrics {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        QueueMetrics {
            capacity: inner.capacity,
            max_capacity: inner.max_capacity,
            count: inner.count,
            put_waits: inner.put_waits,
            reallocations: inner.reallocations,
            put_always_grows: inner.put_always_grows,
            put_always_failures: inner.put_always_failures,
        }
    }
}

/// Point-in-time snapshot of a queue's internal counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMetrics {
    pub capacity: u32,
    pub max_capacity: u32,
    pub count: u32,
    pub put_waits: u64,
    pub reallocations: u64,
    pub put_always_grows: u64,
    pub put_always_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let q = DynamicQueue::new(QueueConfig::new(1, 4));
        q.put(42u32);
        assert_eq!(q.get(), 42);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::new(1, 64));
        for i in 0..40 {
            q.put(i);
        }
        assert!(q.capacity() >= 64.min(64));
        for i in 0..40 {
            assert_eq!(q.get(), i);
        }
    }

    #[test]
    fn put_blocks_at_capacity_equal_to_max() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::new(2, 2));
        q.put(1);
        q.put(2);
        assert_eq!(q.try_get(), Some(1));
        q.put(3);
        assert_eq!(q.get(), 2);
        assert_eq!(q.get(), 3);
    }

    #[test]
    fn put_always_grows_past_max_capacity() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::new(2, 2));
        q.put(1);
        q.put(2);
        assert!(q.put_always(3).is_ok());
        assert!(q.capacity() > 2);
        assert_eq!(q.get(), 1);
        assert_eq!(q.get(), 2);
        assert_eq!(q.get(), 3);
    }

    #[test]
    fn try_get_on_empty_returns_none() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::default());
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn get_timeout_reports_timed_out() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::default());
        let err = q.get_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, QueueError::GetTimedOut);
    }

    #[test]
    fn reduce_capacity_is_bounded_by_element_count() {
        let q: DynamicQueue<u32> = DynamicQueue::new(QueueConfig::new(16, 64));
        for i in 0..10 {
            q.put(i);
        }
        let got = q.reduce_capacity(1);
        assert!(got >= 16); // next_power_of_two(10) == 16
        for i in 0..10 {
            assert_eq!(q.get(), i);
        }
    }

    #[test]
    fn concurrent_put_get_preserves_all_items() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(DynamicQueue::<u32>::new(QueueConfig::new(4, 256)));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..1000 {
                    q.put(i);
                }
            })
        };
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut sum: u64 = 0;
                for _ in 0..1000 {
                    sum += u64::from(q.get());
                }
                sum
            })
        };
        producer.join().unwrap();
        let sum = consumer.join().unwrap();
        assert_eq!(sum, (0..1000u64).sum());
    }
}
