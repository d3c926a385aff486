//! Atomic bit-flags carried on every stored record.
//!
//! Corresponds to the per-record status bits in `ht_objects.h`: a record is
//! visited by the owning shard, the tag manager and the optimizer from
//! different threads, so the flag word is an `AtomicU32` rather than a plain
//! field.

use std::sync::atomic::{AtomicU32, Ordering};

pub const BEING_DELETED: u32 = 1 << 0;
pub const DELETED: u32 = 1 << 1;
pub const BEING_OPTIMIZED: u32 = 1 << 2;
pub const OPTIMIZED: u32 = 1 << 3;
pub const LINKED_BY_OPTIMIZER: u32 = 1 << 4;
pub const LINKED_BY_TAG_MANAGER: u32 = 1 << 5;
pub const HAS_PAYLOAD: u32 = 1 << 6;

/// Thread-safe bitset wrapper over an `AtomicU32`.
#[derive(Debug, Default)]
pub struct RecordFlags(AtomicU32);

impl RecordFlags {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn set(&self, bits: u32) {
        self.0.fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear(&self, bits: u32) {
        self.0.fetch_and(!bits, Ordering::AcqRel);
    }

    #[must_use]
    pub fn test(&self, bits: u32) -> bool {
        self.0.load(Ordering::Acquire) & bits == bits
    }

    #[must_use]
    pub fn any(&self, bits: u32) -> bool {
        self.0.load(Ordering::Acquire) & bits != 0
    }

    /// Atomically sets `bits` and returns whether they were already set.
    #[must_use]
    pub fn test_and_set(&self, bits: u32) -> bool {
        self.0.fetch_or(bits, Ordering::AcqRel) & bits == bits
    }

    #[must_use]
    pub fn snapshot(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_test_round_trip() {
        let flags = RecordFlags::new();
        assert!(!flags.test(DELETED));
        flags.set(DELETED | BEING_DELETED);
        assert!(flags.test(DELETED));
        assert!(flags.test(BEING_DELETED));
        flags.clear(BEING_DELETED);
        assert!(flags.test(DELETED));
        assert!(!flags.test(BEING_DELETED));
    }

    #[test]
    fn test_and_set_reports_previous_state() {
        let flags = RecordFlags::new();
        assert!(!flags.test_and_set(OPTIMIZED));
        assert!(flags.test_and_set(OPTIMIZED));
    }
}
