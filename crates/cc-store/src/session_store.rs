//! Session domain command handlers: `Read`, `Write`, `Destroy`, `GC`.
//!
//! Sessions are single-writer-at-a-time: a `read` acquires the record's
//! session lock for the calling request, the paired `write` (or `destroy`)
//! releases it. A request that never comes back to release the lock (a
//! crashed PHP worker, in the original deployment) is recovered by the next
//! request's `read`, which breaks the stale lock after
//! `default_lock_timeout_ms` rather than waiting forever.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::SharedBuffer;
use crate::error::{StoreError, StoreResult};
use crate::model::Domain;
use crate::record::{LockOutcome, Record};
use crate::store::Store;
use crate::time::now_millis;

pub struct SessionReadResult {
    pub data: Vec<u8>,
    pub lock_broken: bool,
}

pub struct SessionStore {
    store: Store,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: crate::config::DomainConfig) -> Self {
        Self { store: Store::new(Domain::Session, config) }
    }

    #[must_use]
    pub fn inner(&self) -> &Store {
        &self.store
    }

    /// Acquires the session's lock for `request_id` and returns its current
    /// payload. A session that doesn't exist, or has expired, reads back as
    /// empty rather than being created (creation happens on `write`).
    pub fn read(&self, key: &[u8], request_id: u64) -> SessionReadResult {
        let Some(record) = self.store.get(key) else {
            return SessionReadResult { data: Vec::new(), lock_broken: false };
        };
        if record.is_expired(now_millis()) {
            self.store.remove(key);
            return SessionReadResult { data: Vec::new(), lock_broken: false };
        }
        let timeout = Duration::from_millis(self.store.config.default_lock_timeout_ms);
        let outcome = record.lock_session(request_id, timeout);
        SessionReadResult {
            data: record.payload_bytes().unwrap_or_default(),
            lock_broken: outcome == LockOutcome::Broken,
        }
    }

    /// Writes `data` into the session identified by `key` and releases its
    /// lock. `request_id` must match (or forcibly take over) the lock held
    /// by a prior `read`. The first write a session ever receives gets the
    /// domain's default lifetime; later writes leave the expiration alone
    /// (a session's lifetime is set once, not refreshed on every write).
    pub fn write(&self, key: &[u8], request_id: u64, data: Vec<u8>) -> StoreResult<()> {
        let record = self.store.get_or_insert(key);
        if !record.is_locked() {
            let timeout = Duration::from_millis(self.store.config.default_lock_timeout_ms);
            record.lock_session(request_id, timeout);
        }
        self.install(&record, data)?;
        let now = now_millis();
        record.touch(now);
        let write_count = record.bump_write_counter();
        if write_count == 1 && self.store.config.default_lifetime_ms > 0 {
            record.set_expiration(now + self.store.config.default_lifetime_ms as i64);
        }
        record.unlock();
        Ok(())
    }

    fn install(&self, record: &Arc<Record>, data: Vec<u8>) -> StoreResult<()> {
        let before = record.compressed_len();
        let mut buffer = SharedBuffer::from_bytes(data);
        let compressor = if buffer.len() >= self.store.config.compression_threshold {
            self.store.config.default_compressor
        } else {
            crate::compressor::CompressorId::None
        };
        buffer.transfer_into(record, compressor)?;
        let after = record.compressed_len();
        self.store.account_payload_change(before, after)
    }

    /// Removes a session outright. The caller must currently hold its lock
    /// (typically obtained via a preceding `read`).
    pub fn destroy(&self, key: &[u8], request_id: u64) -> StoreResult<()> {
        let record = self.store.get(key).ok_or(StoreError::NotFound)?;
        if record.is_locked() {
            let timeout = Duration::from_millis(self.store.config.default_lock_timeout_ms);
            record.lock_session(request_id, timeout);
        }
        self.store.remove(key);
        Ok(())
    }

    /// Removes every session whose expiration has passed. Returns the number
    /// of sessions collected.
    pub fn gc(&self) -> usize {
        let now = now_millis();
        self.store.retain_remove(|r| r.is_expired(now) && !r.is_locked()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;

    #[test]
    fn write_then_read_round_trips_payload() {
        let store = SessionStore::new(DomainConfig::default());
        store.write(b"sid1", 1, b"payload".to_vec()).unwrap();
        let read = store.read(b"sid1", 2);
        assert_eq!(read.data, b"payload");
        assert!(!read.lock_broken);
        store.write(b"sid1", 2, b"more".to_vec()).unwrap();
    }

    #[test]
    fn destroy_removes_the_session() {
        let store = SessionStore::new(DomainConfig::default());
        store.write(b"sid2", 1, b"x".to_vec()).unwrap();
        store.destroy(b"sid2", 1).unwrap();
        assert!(store.inner().get(b"sid2").is_none());
    }

    #[test]
    fn gc_collects_only_expired_unlocked_sessions() {
        let store = SessionStore::new(DomainConfig::default());
        store.write(b"fresh", 1, b"x".to_vec()).unwrap();
        let record = store.inner().get(b"stale").unwrap_or_else(|| store.inner().get_or_insert(b"stale"));
        record.set_expiration(1);
        assert_eq!(store.gc(), 1);
        assert!(store.inner().get(b"fresh").is_some());
        assert!(store.inner().get(b"stale").is_none());
    }
}
