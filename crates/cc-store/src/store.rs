//! A domain store: the set of shards that together hold every record for
//! one domain (Session or FPC), plus the memory accounting the optimizer's
//! `begin_memory_deallocation` pass consults.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::model::Domain;
use crate::record::Record;
use crate::shard::Shard;
use crate::config::DomainConfig;

pub struct Store {
    pub domain: Domain,
    pub config: DomainConfig,
    shards: Vec<Shard>,
    memory_used: AtomicU64,
}

impl Store {
    #[must_use]
    pub fn new(domain: Domain, config: DomainConfig) -> Self {
        let shards = (0..config.num_shards.max(1))
            .map(|_| {
                Shard::with_tuning(
                    config.initial_buckets_per_shard,
                    config.fill_factor,
                    config.bucket_check_count,
                )
            })
            .collect();
        Self { domain, config, shards, memory_used: AtomicU64::new(0) }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for_hash(&self, hash: u64) -> &Shard {
        let index = (hash as usize) % self.shards.len();
        &self.shards[index]
    }

    #[must_use]
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        self.config.hash_algorithm.hash(key)
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Arc<Record>> {
        let hash = self.hash_key(key);
        self.shard_for_hash(hash).find(hash, key)
    }

    pub fn insert_new(&self, key: &[u8]) -> StoreResult<Arc<Record>> {
        let record = Arc::new(Record::new(key.to_vec(), self.domain));
        self.shard_for_hash(record.hash).insert_if_absent(record)
    }

    pub fn get_or_insert(&self, key: &[u8]) -> Arc<Record> {
        let hash = self.hash_key(key);
        let shard = self.shard_for_hash(hash);
        if let Some(existing) = shard.find(hash, key) {
            return existing;
        }
        let record = Arc::new(Record::new(key.to_vec(), self.domain));
        match shard.insert_if_absent(record) {
            Ok(inserted) => inserted,
            // Lost a race with another writer; whoever won is authoritative.
            Err(_) => shard.find(hash, key).expect("racing insert must have landed"),
        }
    }

    pub fn remove(&self, key: &[u8]) -> Option<Arc<Record>> {
        let hash = self.hash_key(key);
        let record = self.shard_for_hash(hash).remove(hash, key)?;
        if record.flags().test(crate::flags::HAS_PAYLOAD) {
            self.memory_used.fetch_sub(record.compressed_len() as u64, Ordering::Relaxed);
        }
        Some(record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<Record>)) {
        for shard in &self.shards {
            shard.for_each(&mut f);
        }
    }

    /// Removes every record matching `predicate` across all shards.
    pub fn retain_remove(&self, mut predicate: impl FnMut(&Arc<Record>) -> bool) -> Vec<Arc<Record>> {
        let mut removed = Vec::new();
        for shard in &self.shards {
            removed.extend(shard.retain_remove(&mut predicate));
        }
        for record in &removed {
            if record.flags().test(crate::flags::HAS_PAYLOAD) {
                self.memory_used.fetch_sub(record.compressed_len() as u64, Ordering::Relaxed);
            }
        }
        removed
    }

    #[must_use]
    pub fn memory_used(&self) -> u64 {
        self.memory_used.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn filling_percentage(&self) -> f64 {
        if self.config.max_memory_bytes == 0 {
            return 0.0;
        }
        (self.memory_used() as f64 / self.config.max_memory_bytes as f64) * 100.0
    }

    /// Accounts for `delta` bytes being added to (positive) or removed from
    /// (negative) this domain's tracked memory, failing the allocation if it
    /// would push usage past the configured budget.
    pub fn account_delta(&self, delta: i64) -> StoreResult<()> {
        if delta <= 0 {
            self.memory_used.fetch_sub((-delta) as u64, Ordering::Relaxed);
            return Ok(());
        }
        let delta = delta as u64;
        let mut current = self.memory_used.load(Ordering::Relaxed);
        loop {
            let next = current + delta;
            if next > self.config.max_memory_bytes {
                return Err(StoreError::OutOfMemory);
            }
            match self.memory_used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Called after installing/clearing a record's payload to sync the
    /// domain's memory accounting with the new compressed size.
    pub fn account_payload_change(&self, before: usize, after: usize) -> StoreResult<()> {
        self.account_delta(after as i64 - before as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_round_trip() {
        let store = Store::new(Domain::Fpc, DomainConfig::default());
        store.insert_new(b"a").unwrap();
        assert!(store.get(b"a").is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(b"a").is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn get_or_insert_is_idempotent() {
        let store = Store::new(Domain::Session, DomainConfig::default());
        let a = store.get_or_insert(b"sid");
        let b = store.get_or_insert(b"sid");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn account_delta_rejects_growth_past_budget() {
        let mut config = DomainConfig::default();
        config.max_memory_bytes = 100;
        let store = Store::new(Domain::Fpc, config);
        store.account_delta(90).unwrap();
        assert!(store.account_delta(20).is_err());
        store.account_delta(-50).unwrap();
        assert_eq!(store.memory_used(), 40);
    }
}
