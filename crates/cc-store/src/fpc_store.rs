//! Full-Page-Cache domain command handlers: `Load`, `Test`, `Save`, `Remove`,
//! `Clean`, `GetFillingPercentage`, `GetMetadatas`, `Touch`, `GetIds`,
//! `GetTags`, and the three `GetIdsMatching*` tag queries.
//!
//! Tag cross-references themselves are owned and mutated by the tag-manager
//! actor in `cc-actors`; this store only reads the names a record currently
//! carries (`Record::tags`). The tag manager calls `Store::get`/`for_each`
//! on the underlying store to resolve the records a tag name refers to.

use std::sync::Arc;

use crate::buffer::SharedBuffer;
use crate::compressor::CompressorId;
use crate::error::{StoreError, StoreResult};
use crate::model::{CleanMode, Domain};
use crate::record::Record;
use crate::store::Store;
use crate::time::now_millis;

pub struct RecordMetadata {
    pub key: Vec<u8>,
    pub size: usize,
    pub last_modified: i64,
    pub expiration: i64,
    pub tags: Vec<Arc<str>>,
}

pub struct FpcStore {
    store: Store,
}

impl FpcStore {
    #[must_use]
    pub fn new(config: crate::config::DomainConfig) -> Self {
        Self { store: Store::new(Domain::Fpc, config) }
    }

    #[must_use]
    pub fn inner(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn test(&self, key: &[u8]) -> bool {
        self.store.get(key).is_some_and(|r| !r.is_expired(now_millis()))
    }

    #[must_use]
    pub fn load(&self, key: &[u8]) -> Option<Vec<u8>> {
        let record = self.store.get(key)?;
        if record.is_expired(now_millis()) {
            return None;
        }
        record.payload_bytes()
    }

    /// Stores `data` under `key` with the given tag names and lifetime, and
    /// returns the record so the caller (the worker handling the request)
    /// can hand it to the tag manager and optimizer queues.
    pub fn save(
        &self,
        key: &[u8],
        data: Vec<u8>,
        ttl_ms: i64,
        tags: Vec<Arc<str>>,
    ) -> StoreResult<Arc<Record>> {
        let record = self.store.get_or_insert(key);
        record.lock_exclusive();
        let result = (|| {
            let before = record.compressed_len();
            let mut buffer = SharedBuffer::from_bytes(data);
            let compressor = if buffer.len() >= self.store.config.compression_threshold {
                self.store.config.default_compressor
            } else {
                CompressorId::None
            };
            buffer.transfer_into(&record, compressor)?;
            let after = record.compressed_len();
            self.store.account_payload_change(before, after)?;
            let now = now_millis();
            record.touch(now);
            record.set_expiration(self.expiration_for(ttl_ms, now));
            record.set_tags(tags);
            Ok(())
        })();
        record.unlock();
        result.map(|()| record)
    }

    pub fn remove(&self, key: &[u8]) -> Option<Arc<Record>> {
        self.store.remove(key)
    }

    pub fn touch(&self, key: &[u8], ttl_ms: i64) -> StoreResult<()> {
        let record = self.store.get(key).ok_or(StoreError::NotFound)?;
        let now = now_millis();
        record.touch(now);
        record.set_expiration(self.expiration_for(ttl_ms, now));
        Ok(())
    }

    /// Resolves a caller-supplied `ttl_ms` into an absolute expiration:
    /// positive is a relative lifetime, zero means "use the domain's
    /// configured default lifetime", and negative means "never expires".
    fn expiration_for(&self, ttl_ms: i64, now: i64) -> i64 {
        if ttl_ms > 0 {
            now + ttl_ms
        } else if ttl_ms == 0 {
            let default = self.store.config.default_lifetime_ms;
            if default > 0 { now + default as i64 } else { 0 }
        } else {
            0
        }
    }

    #[must_use]
    pub fn filling_percentage(&self) -> f64 {
        self.store.filling_percentage()
    }

    #[must_use]
    pub fn get_ids(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.store.for_each(|r| out.push(r.key.to_vec()));
        out
    }

    /// Metadata for a single record, for the `GetMetadatas(id)` command.
    #[must_use]
    pub fn get_metadata(&self, key: &[u8]) -> Option<RecordMetadata> {
        let record = self.store.get(key)?;
        Some(RecordMetadata {
            key: record.key.to_vec(),
            size: record.payload_len(),
            last_modified: record.last_modified(),
            expiration: record.expiration(),
            tags: record.tags(),
        })
    }

    #[must_use]
    pub fn get_ids_matching_any(&self, tags: &[Arc<str>]) -> Vec<Vec<u8>> {
        self.filter_ids(|owned| tags.iter().any(|t| owned.iter().any(|o| o.as_ref() == t.as_ref())))
    }

    #[must_use]
    pub fn get_ids_matching_all(&self, tags: &[Arc<str>]) -> Vec<Vec<u8>> {
        self.filter_ids(|owned| tags.iter().all(|t| owned.iter().any(|o| o.as_ref() == t.as_ref())))
    }

    #[must_use]
    pub fn get_ids_not_matching_any(&self, tags: &[Arc<str>]) -> Vec<Vec<u8>> {
        self.filter_ids(|owned| !tags.iter().any(|t| owned.iter().any(|o| o.as_ref() == t.as_ref())))
    }

    fn filter_ids(&self, predicate: impl Fn(&[Arc<str>]) -> bool) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.store.for_each(|r| {
            if predicate(&r.tags()) {
                out.push(r.key.to_vec());
            }
        });
        out
    }

    /// Invalidates records according to `mode`. `reference_tags` is only
    /// consulted for the three tag-matching modes.
    pub fn clean(&self, mode: CleanMode, reference_tags: &[Arc<str>]) -> usize {
        let now = now_millis();
        let removed = match mode {
            CleanMode::All => self.store.retain_remove(|_| true),
            CleanMode::Old => self.store.retain_remove(|r| r.is_expired(now)),
            CleanMode::MatchingAllTags => self.store.retain_remove(|r| {
                let owned = r.tags();
                reference_tags.iter().all(|t| owned.iter().any(|o| o.as_ref() == t.as_ref()))
            }),
            CleanMode::MatchingAnyTag => self.store.retain_remove(|r| {
                let owned = r.tags();
                reference_tags.iter().any(|t| owned.iter().any(|o| o.as_ref() == t.as_ref()))
            }),
            CleanMode::NotMatchingAnyTag => self.store.retain_remove(|r| {
                let owned = r.tags();
                !reference_tags.iter().any(|t| owned.iter().any(|o| o.as_ref() == t.as_ref()))
            }),
        };
        removed.len()
    }
}
