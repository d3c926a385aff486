//! A single hash-table shard: a chaining hash table over a record arena,
//! guarded by one dynamic (upgradable) read/write lock.
//!
//! The arena-and-index design keeps records reachable by two independent
//! chains — a `bucket` chain used for key lookup and a `global` chain used to
//! enumerate every record in the shard (for save/scan operations) — without
//! any record needing to *own* its neighbors: slots are addressed by index
//! into `slots`, and a free-list recycles vacated indices. `RwLock` gives
//! every reader a shared view and every mutator a short exclusive section;
//! the upgradable-read guard lets a caller check "does this key exist" and
//! then fall through to a write without releasing and re-acquiring the lock.
//!
//! A record with attached readers (live `SharedBuffer`s) can't be ripped out
//! of its arena slot out from under them, so `remove` only flags it
//! `BEING_DELETED` and defers the actual slot removal to a small per-shard
//! deletion queue, drained a bounded number of entries at a time whenever the
//! shard's lock is next upgraded to exclusive.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::flags;
use crate::record::Record;

/// How many deferred deletions to drain right after a bucket-array resize,
/// while the shard is already under exclusive lock for the resize itself.
const DRAIN_QUOTA_AFTER_RESIZE: usize = 4;

struct PendingDeletion {
    hash: u64,
    key: Box<[u8]>,
    record: Arc<Record>,
}

struct Slot {
    record: Arc<Record>,
    bucket_next: Option<u32>,
    bucket_prev: Option<u32>,
    global_next: Option<u32>,
    global_prev: Option<u32>,
}

struct Table {
    buckets: Vec<Option<u32>>,
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    global_head: Option<u32>,
    global_tail: Option<u32>,
    count: u32,
    fill_factor: f64,
}

impl Table {
    fn new(bucket_count: usize, fill_factor: f64) -> Self {
        Self {
            buckets: vec![None; bucket_count.max(1).next_power_of_two()],
            slots: Vec::new(),
            free: Vec::new(),
            global_head: None,
            global_tail: None,
            count: 0,
            fill_factor: fill_factor.clamp(0.5, 10.0),
        }
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    fn find_index(&self, hash: u64, key: &[u8]) -> Option<u32> {
        let bucket = self.bucket_index(hash);
        let mut cursor = self.buckets[bucket];
        while let Some(idx) = cursor {
            let slot = self.slots[idx as usize].as_ref().expect("live bucket index");
            if slot.record.hash == hash && &*slot.record.key == key {
                return Some(idx);
            }
            cursor = slot.bucket_next;
        }
        None
    }

    fn insert(&mut self, record: Arc<Record>) -> u32 {
        let bucket = self.bucket_index(record.hash);
        let head = self.buckets[bucket];
        let slot = Slot {
            record,
            bucket_next: head,
            bucket_prev: None,
            global_next: None,
            global_prev: self.global_tail,
        };
        let index = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as u32
            }
        };

        if let Some(head_idx) = head {
            self.slots[head_idx as usize].as_mut().unwrap().bucket_prev = Some(index);
        }
        self.buckets[bucket] = Some(index);

        if let Some(tail) = self.global_tail {
            self.slots[tail as usize].as_mut().unwrap().global_next = Some(index);
        } else {
            self.global_head = Some(index);
        }
        self.global_tail = Some(index);

        self.count += 1;
        index
    }

    fn remove_index(&mut self, index: u32) -> Arc<Record> {
        let slot = self.slots[index as usize].take().expect("remove of live index");

        let bucket = self.bucket_index(slot.record.hash);
        match slot.bucket_prev {
            Some(prev) => self.slots[prev as usize].as_mut().unwrap().bucket_next = slot.bucket_next,
            None => self.buckets[bucket] = slot.bucket_next,
        }
        if let Some(next) = slot.bucket_next {
            self.slots[next as usize].as_mut().unwrap().bucket_prev = slot.bucket_prev;
        }

        match slot.global_prev {
            Some(prev) => self.slots[prev as usize].as_mut().unwrap().global_next = slot.global_next,
            None => self.global_head = slot.global_next,
        }
        match slot.global_next {
            Some(next) => self.slots[next as usize].as_mut().unwrap().global_prev = slot.global_prev,
            None => self.global_tail = slot.global_prev,
        }

        self.free.push(index);
        self.count -= 1;
        slot.record
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        let mut cursor = self.global_head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let slot = self.slots[idx as usize].as_ref().expect("live global index");
            cursor = slot.global_next;
            Some(&slot.record)
        })
    }

    /// Returns whether a resize actually happened, so the caller knows
    /// whether it's worth spending the post-resize deletion-drain quota.
    fn maybe_grow(&mut self) -> bool {
        let threshold = (self.buckets.len() as f64 * self.fill_factor) as usize;
        if (self.count as usize) < threshold {
            return false;
        }
        let new_len = self.buckets.len() * 2;
        let mut new_buckets = vec![None; new_len];
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            let bucket = (slot.record.hash as usize) & (new_len - 1);
            slot.bucket_prev = None;
            slot.bucket_next = new_buckets[bucket];
            new_buckets[bucket] = Some(index as u32);
        }
        // Second pass: fix up bucket_prev now that bucket_next is settled.
        for bucket_head in new_buckets.clone() {
            let mut cursor = bucket_head;
            let mut prev: Option<u32> = None;
            while let Some(idx) = cursor {
                let slot = self.slots[idx as usize].as_mut().unwrap();
                slot.bucket_prev = prev;
                prev = Some(idx);
                cursor = slot.bucket_next;
            }
        }
        self.buckets = new_buckets;
        true
    }
}

/// One shard of the overall hash table, protected by its own dynamic lock.
pub struct Shard {
    table: RwLock<Table>,
    deletions: Mutex<VecDeque<PendingDeletion>>,
    drain_quota_ordinary: usize,
}

impl Shard {
    #[must_use]
    pub fn new(initial_buckets: usize) -> Self {
        Self::with_tuning(initial_buckets, 1.5, 64)
    }

    #[must_use]
    pub fn with_tuning(initial_buckets: usize, fill_factor: f64, drain_quota_ordinary: usize) -> Self {
        Self {
            table: RwLock::new(Table::new(initial_buckets, fill_factor)),
            deletions: Mutex::new(VecDeque::new()),
            drain_quota_ordinary: drain_quota_ordinary.max(1),
        }
    }

    /// Named the way the per-shard dynamic lock is described: an upgradable
    /// read is taken for the cheap "does this exist" check, then upgraded to
    /// exclusive only once a mutation is actually needed.
    fn upgrade_lock(upgradable: RwLockUpgradableReadGuard<'_, Table>) -> RwLockWriteGuard<'_, Table> {
        RwLockUpgradableReadGuard::upgrade(upgradable)
    }

    /// The inverse of `upgrade_lock`, handed back to callers that finished
    /// their mutation but want to keep holding at least an upgradable read
    /// (unused today, kept symmetric with `upgrade_lock` for callers that
    /// need to retry the "does this exist" check after mutating).
    #[allow(dead_code)]
    fn downgrade_lock(exclusive: RwLockWriteGuard<'_, Table>) -> RwLockUpgradableReadGuard<'_, Table> {
        RwLockWriteGuard::downgrade_to_upgradable(exclusive)
    }

    /// Attempts to physically remove up to `quota` deferred deletions whose
    /// reader count has since dropped to zero. Entries still blocked on a
    /// live reader are put back for the next drain. Must be called with the
    /// table already under exclusive lock.
    fn drain_deletions(table: &mut Table, pending: &mut VecDeque<PendingDeletion>, quota: usize) {
        let attempts = pending.len().min(quota);
        for _ in 0..attempts {
            let entry = pending.pop_front().expect("attempts bounded by pending.len()");
            if entry.record.reader_count() > 0 {
                pending.push_back(entry);
                continue;
            }
            if let Some(index) = table.find_index(entry.hash, &entry.key) {
                table.remove_index(index);
            }
            entry.record.flags().clear(flags::BEING_DELETED);
            entry.record.flags().set(flags::DELETED);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A record that's been flagged `BEING_DELETED` (removal requested, but
    /// deferred behind live readers) is treated as already gone by lookups
    /// even though its arena slot hasn't been freed yet.
    #[must_use]
    pub fn find(&self, hash: u64, key: &[u8]) -> Option<Arc<Record>> {
        let table = self.table.read();
        let index = table.find_index(hash, key)?;
        let record = &table.slots[index as usize].as_ref().unwrap().record;
        if record.flags().test(flags::BEING_DELETED) {
            return None;
        }
        Some(Arc::clone(record))
    }

    /// Inserts `record` unless a live record with the same key already
    /// exists, in which case the existing record is returned and nothing is
    /// inserted. A key whose only occupant is pending deferred deletion is
    /// treated as free. Uses an upgradable read so the common "does it
    /// already exist" check does not pay for an exclusive lock when the
    /// answer is "no, insert".
    pub fn insert_if_absent(&self, record: Arc<Record>) -> StoreResult<Arc<Record>> {
        let upgradable = self.table.upgradable_read();
        if let Some(index) = upgradable.find_index(record.hash, &record.key) {
            let existing = &upgradable.slots[index as usize].as_ref().unwrap().record;
            if !existing.flags().test(flags::BEING_DELETED) {
                return Err(StoreError::AlreadyExists);
            }
        }
        let mut exclusive = Self::upgrade_lock(upgradable);
        let resized = exclusive.maybe_grow();
        let result = Arc::clone(&record);
        exclusive.insert(record);

        let mut pending = self.deletions.lock();
        let quota = if resized { DRAIN_QUOTA_AFTER_RESIZE } else { self.drain_quota_ordinary };
        Self::drain_deletions(&mut exclusive, &mut pending, quota);
        Ok(result)
    }

    /// Flags the record `BEING_DELETED` so it stops being found by lookups,
    /// then either removes it immediately (no attached readers) or defers
    /// the actual arena-slot removal to the deletion queue, drained a bit at
    /// a time on subsequent shard mutations.
    pub fn remove(&self, hash: u64, key: &[u8]) -> Option<Arc<Record>> {
        let upgradable = self.table.upgradable_read();
        let index = upgradable.find_index(hash, key)?;
        let mut exclusive = Self::upgrade_lock(upgradable);
        let record = Arc::clone(&exclusive.slots[index as usize].as_ref().unwrap().record);
        record.flags().set(flags::BEING_DELETED);

        if record.reader_count() == 0 {
            exclusive.remove_index(index);
            record.flags().clear(flags::BEING_DELETED);
            record.flags().set(flags::DELETED);
        } else {
            let mut pending = self.deletions.lock();
            pending.push_back(PendingDeletion { hash, key: key.to_vec().into_boxed_slice(), record: Arc::clone(&record) });
        }

        let mut pending = self.deletions.lock();
        Self::drain_deletions(&mut exclusive, &mut pending, self.drain_quota_ordinary);
        Some(record)
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<Record>)) {
        let table = self.table.read();
        for record in table.iter() {
            f(record);
        }
    }

    /// Removes every record for which `predicate` returns true. Takes the
    /// exclusive lock for the whole pass, matching the original's GC sweep
    /// which runs with the shard fully locked rather than record-by-record.
    pub fn retain_remove(&self, mut predicate: impl FnMut(&Arc<Record>) -> bool) -> Vec<Arc<Record>> {
        let mut table = self.table.write();
        let doomed: Vec<u32> = table
            .iter()
            .filter(|r| predicate(r))
            .filter_map(|r| table.find_index(r.hash, &r.key))
            .collect();
        doomed.into_iter().map(|idx| table.remove_index(idx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Domain;

    fn record(key: &[u8]) -> Arc<Record> {
        Arc::new(Record::new(key.to_vec(), Domain::Fpc))
    }

    #[test]
    fn insert_find_remove_round_trip() {
        let shard = Shard::new(4);
        let r = record(b"alpha");
        shard.insert_if_absent(Arc::clone(&r)).unwrap();
        assert!(shard.find(r.hash, b"alpha").is_some());
        assert_eq!(shard.len(), 1);
        let removed = shard.remove(r.hash, b"alpha").unwrap();
        assert_eq!(&*removed.key, b"alpha");
        assert!(shard.is_empty());
    }

    #[test]
    fn insert_duplicate_key_is_rejected() {
        let shard = Shard::new(4);
        shard.insert_if_absent(record(b"dup")).unwrap();
        assert!(shard.insert_if_absent(record(b"dup")).is_err());
    }

    #[test]
    fn grows_and_keeps_all_records_reachable() {
        let shard = Shard::new(2);
        for i in 0..200u32 {
            shard.insert_if_absent(record(&i.to_le_bytes())).unwrap();
        }
        assert_eq!(shard.len(), 200);
        for i in 0..200u32 {
            let key = i.to_le_bytes();
            let hash = crate::hash::HashAlgorithm::default().hash(&key);
            assert!(shard.find(hash, &key).is_some(), "missing key {i}");
        }
    }

    #[test]
    fn for_each_visits_every_live_record() {
        let shard = Shard::new(4);
        for i in 0..10u32 {
            shard.insert_if_absent(record(&i.to_le_bytes())).unwrap();
        }
        let mut seen = 0;
        shard.for_each(|_| seen += 1);
        assert_eq!(seen, 10);
    }

    #[test]
    fn retain_remove_evicts_matching_records_only() {
        let shard = Shard::new(4);
        for i in 0..10u32 {
            shard.insert_if_absent(record(&i.to_le_bytes())).unwrap();
        }
        let removed = shard.retain_remove(|r| r.key[0] % 2 == 0);
        assert_eq!(removed.len(), 5);
        assert_eq!(shard.len(), 5);
    }
}
