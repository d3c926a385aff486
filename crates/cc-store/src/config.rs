use serde::{Deserialize, Serialize};

use crate::compressor::CompressorId;
use crate::hash::HashAlgorithm;

/// Per-domain tunables. One instance each for the Session and FPC stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub num_shards: usize,
    pub initial_buckets_per_shard: usize,
    pub hash_algorithm: HashAlgorithm,
    pub default_compressor: CompressorId,
    /// Payloads at or below this size are never compressed.
    pub compression_threshold: usize,
    /// Soft memory budget for this domain's payload bytes, in bytes.
    pub max_memory_bytes: u64,
    pub default_lock_timeout_ms: u64,
    /// Target load factor (records per bucket) that triggers a shard resize.
    /// Clamped to [0.5, 10.0] by the shard itself.
    pub fill_factor: f64,
    /// How many deferred deletions a shard drains per mutation once it's
    /// already holding the exclusive lock for an ordinary insert or remove.
    pub bucket_check_count: usize,
    /// Lifetime applied when a caller doesn't specify one: FPC's `ttl_ms==0`
    /// and a session's first write. Zero means "no default, never expires".
    pub default_lifetime_ms: u64,
    /// Minimum number of entries kept on each per-user-agent-class LRU chain
    /// even under memory pressure, indexed by `UserAgentClass`.
    pub retained_minimum: [usize; 4],
    /// Compressors tried in order by the optimizer's re-compression pass,
    /// stopping at the first one that differs from what's currently stored.
    /// Capped at 8 entries; empty disables re-compression.
    pub recompress_order: Vec<CompressorId>,
    /// Payloads smaller than this are skipped by the re-compression pass.
    pub recompress_threshold: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            num_shards: 16,
            initial_buckets_per_shard: 64,
            hash_algorithm: HashAlgorithm::XxHash64,
            default_compressor: CompressorId::Zstd,
            compression_threshold: 256,
            max_memory_bytes: 512 * 1024 * 1024,
            default_lock_timeout_ms: 5_000,
            fill_factor: 1.5,
            bucket_check_count: 64,
            default_lifetime_ms: 3_600_000,
            retained_minimum: [0, 0, 0, 0],
            recompress_order: Vec::new(),
            recompress_threshold: 0,
        }
    }
}

// serde needs this to be reachable as a serializable/deserializable type;
// CompressorId and HashAlgorithm already derive what's needed, but Serialize
// on CompressorId's #[repr(u8)] enum needs a manual mapping since it is not
// derived in compressor.rs. See the `impl Serialize`/`Deserialize` below.
impl Serialize for CompressorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for CompressorId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        CompressorId::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown compressor id {value}")))
    }
}

impl Serialize for HashAlgorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            HashAlgorithm::XxHash64 => "xxhash64",
            HashAlgorithm::Murmur3 => "murmur3",
            HashAlgorithm::Fnv1a => "fnv1a",
        };
        serializer.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for HashAlgorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        match name.as_str() {
            "xxhash64" => Ok(HashAlgorithm::XxHash64),
            "murmur3" => Ok(HashAlgorithm::Murmur3),
            "fnv1a" => Ok(HashAlgorithm::Fnv1a),
            other => Err(serde::de::Error::custom(format!("unknown hash algorithm {other}"))),
        }
    }
}
