//! The stored entry (`Record`): the payload- or session-bearing object a
//! shard's hash table indexes, a tag list cross-references, and an optimizer
//! places on one of its LRU chains.
//!
//! Three independent groups of fields live on the same `Record`, each owned
//! by exactly one component and synchronized with its own primitive rather
//! than one big lock, because the three components run on different threads
//! and must not block on each other for unrelated reasons:
//! - flags and reader count: accessed from any thread, so atomics/a small
//!   mutex.
//! - the payload slot: guarded by `payload` (written once by a store thread,
//!   then read repeatedly).
//! - the write/session lock: guarded by `lock`, used by the store to
//!   serialize concurrent writers of the same session.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::compressor::CompressorId;
use crate::flags::{self, RecordFlags};
use crate::model::{Domain, UserAgentClass};

pub struct Payload {
    pub compressor_id: CompressorId,
    pub uncompressed_size: usize,
    pub bytes: Arc<[u8]>,
}

impl Payload {
    #[must_use]
    pub fn compressed_size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Default)]
struct LockState {
    locked: bool,
    holder_request_id: Option<u64>,
}

/// Outcome of a session-lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// The previous holder's lock was force-broken after the wait timeout.
    Broken,
}

pub struct Record {
    pub key: Box<[u8]>,
    pub hash: u64,
    pub domain: Domain,
    flags: RecordFlags,
    user_agent: AtomicU8,
    readers: Mutex<u32>,
    readers_drained: Condvar,
    lock: Mutex<LockState>,
    lock_available: Condvar,
    payload: Mutex<Option<Payload>>,
    last_modified: AtomicI64,
    expiration: AtomicI64,
    write_counter: AtomicU32,
    /// FPC-only: names of tags this record is cross-referenced under. Only
    /// ever mutated by the tag manager's single thread.
    tags: Mutex<Vec<Arc<str>>>,
}

impl Record {
    #[must_use]
    pub fn new(key: Vec<u8>, domain: Domain) -> Self {
        let hash = crate::hash::HashAlgorithm::default().hash(&key);
        Self {
            key: key.into_boxed_slice(),
            hash,
            domain,
            flags: RecordFlags::new(),
            user_agent: AtomicU8::new(UserAgentClass::Unknown as u8),
            readers: Mutex::new(0),
            readers_drained: Condvar::new(),
            lock: Mutex::new(LockState::default()),
            lock_available: Condvar::new(),
            payload: Mutex::new(None),
            last_modified: AtomicI64::new(0),
            expiration: AtomicI64::new(0),
            write_counter: AtomicU32::new(0),
            tags: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn flags(&self) -> &RecordFlags {
        &self.flags
    }

    #[must_use]
    pub fn user_agent_class(&self) -> UserAgentClass {
        UserAgentClass::from_index(self.user_agent.load(Ordering::Relaxed) as usize)
    }

    pub fn set_user_agent_class(&self, class: UserAgentClass) {
        self.user_agent.store(class as u8, Ordering::Relaxed);
    }

    #[must_use]
    pub fn last_modified(&self) -> i64 {
        self.last_modified.load(Ordering::Relaxed)
    }

    pub fn touch(&self, now: i64) {
        self.last_modified.store(now, Ordering::Relaxed);
    }

    #[must_use]
    pub fn expiration(&self) -> i64 {
        self.expiration.load(Ordering::Relaxed)
    }

    pub fn set_expiration(&self, at: i64) {
        self.expiration.store(at, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        let exp = self.expiration();
        exp != 0 && exp <= now
    }

    pub fn bump_write_counter(&self) -> u32 {
        self.write_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    // --- reader count -------------------------------------------------

    pub fn add_reader(&self) {
        let mut guard = self.readers.lock();
        *guard += 1;
    }

    pub fn remove_reader(&self) {
        let mut guard = self.readers.lock();
        debug_assert!(*guard > 0, "reader count underflow");
        *guard = guard.saturating_sub(1);
        if *guard == 0 {
            self.readers_drained.notify_all();
        }
    }

    #[must_use]
    pub fn reader_count(&self) -> u32 {
        *self.readers.lock()
    }

    /// Blocks until no [`crate::buffer::SharedBuffer`] holds a reference to
    /// this record's payload. Used before a record's bytes may be replaced
    /// or the record itself recycled.
    pub fn wait_until_no_readers(&self) {
        let mut guard = self.readers.lock();
        while *guard > 0 {
            self.readers_drained.wait(&mut guard);
        }
    }

    // --- payload --------------------------------------------------------

    pub fn install_payload(&self, payload: Payload) {
        self.flags.set(flags::HAS_PAYLOAD);
        *self.payload.lock() = Some(payload);
    }

    pub fn clear_payload(&self) {
        self.flags.clear(flags::HAS_PAYLOAD);
        *self.payload.lock() = None;
    }

    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.lock().as_ref().map_or(0, |p| p.uncompressed_size)
    }

    #[must_use]
    pub fn compressed_len(&self) -> usize {
        self.payload.lock().as_ref().map_or(0, Payload::compressed_size)
    }

    #[must_use]
    pub fn compressor_id(&self) -> Option<CompressorId> {
        self.payload.lock().as_ref().map(|p| p.compressor_id)
    }

    /// Decompresses and returns a copy of the record's payload bytes.
    #[must_use]
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        let guard = self.payload.lock();
        let payload = guard.as_ref()?;
        payload
            .compressor_id
            .compressor()
            .decompress(&payload.bytes, payload.uncompressed_size)
            .ok()
    }

    /// Recompresses the stored payload with a different compressor, leaving
    /// the logical (uncompressed) content unchanged. Used by the optimizer's
    /// background re-compression pass.
    ///
    /// The slow part (decompress, then compress with the candidate) runs
    /// with the payload lock released, so a reader isn't blocked behind a
    /// full recompression cycle; only the final swap takes the lock. The
    /// recompressed bytes are installed only if they're actually smaller
    /// than what's already stored — a candidate that loses is a no-op.
    pub fn recompress(&self, new_compressor: CompressorId) -> Result<(), crate::error::StoreError> {
        let (current_id, uncompressed_size, current_bytes) = {
            let guard = self.payload.lock();
            let payload = guard.as_ref().ok_or(crate::error::StoreError::NoPayload)?;
            if payload.compressor_id == new_compressor {
                return Ok(());
            }
            (payload.compressor_id, payload.uncompressed_size, Arc::clone(&payload.bytes))
        };

        self.flags.set(flags::BEING_OPTIMIZED);
        let outcome = (|| {
            let raw = current_id.compressor().decompress(&current_bytes, uncompressed_size)?;
            new_compressor.compressor().compress(&raw)
        })();
        self.flags.clear(flags::BEING_OPTIMIZED);
        let recompressed = outcome?;

        let mut guard = self.payload.lock();
        let Some(payload) = guard.as_mut() else {
            return Err(crate::error::StoreError::NoPayload);
        };
        // The payload moved on while we were working off-lock; don't clobber
        // whatever replaced it with a result computed against the old bytes.
        if payload.compressor_id != current_id {
            return Ok(());
        }
        if recompressed.len() < payload.bytes.len() {
            payload.compressor_id = new_compressor;
            payload.bytes = Arc::from(recompressed.into_boxed_slice());
            self.flags.set(flags::OPTIMIZED);
        }
        Ok(())
    }

    // --- write/session lock ---------------------------------------------

    /// Acquires the record's exclusive write lock, blocking until available.
    pub fn lock_exclusive(&self) {
        let mut guard = self.lock.lock();
        while guard.locked {
            self.lock_available.wait(&mut guard);
        }
        guard.locked = true;
        guard.holder_request_id = None;
    }

    pub fn unlock(&self) {
        let mut guard = self.lock.lock();
        guard.locked = false;
        guard.holder_request_id = None;
        self.lock_available.notify_one();
    }

    /// Session-store lock acquisition: waits up to `timeout` for the current
    /// holder (if any) to release, then force-breaks the lock and takes it
    /// anyway. `request_id` identifies the new holder for diagnostics.
    #[must_use]
    pub fn lock_session(&self, request_id: u64, timeout: Duration) -> LockOutcome {
        let mut guard = self.lock.lock();
        if !guard.locked {
            guard.locked = true;
            guard.holder_request_id = Some(request_id);
            return LockOutcome::Acquired;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if !guard.locked {
                guard.locked = true;
                guard.holder_request_id = Some(request_id);
                return LockOutcome::Acquired;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    request_id,
                    previous_holder = ?guard.holder_request_id,
                    "breaking stale session lock after timeout"
                );
                guard.locked = true;
                guard.holder_request_id = Some(request_id);
                return LockOutcome::Broken;
            }
            let remaining = deadline - now;
            let timed_out = self.lock_available.wait_for(&mut guard, remaining).timed_out();
            if timed_out {
                continue;
            }
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.lock().locked
    }

    // --- tag cross-references (tag-manager thread only) ------------------

    pub fn set_tags(&self, names: Vec<Arc<str>>) {
        *self.tags.lock() = names;
    }

    #[must_use]
    pub fn tags(&self) -> Vec<Arc<str>> {
        self.tags.lock().clone()
    }

    pub fn clear_tags(&self) {
        self.tags.lock().clear();
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("key", &String::from_utf8_lossy(&self.key))
            .field("domain", &self.domain)
            .field("flags", &self.flags.snapshot())
            .finish()
    }
}
