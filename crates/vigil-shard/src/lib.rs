//! Lease-based shard partitioning.
//!
//! The active rule population is split into a fixed number of shards; each
//! worker leases shards through a compare-and-swap [`ClaimStore`] and only
//! evaluates rules whose shard it currently owns. A worker that disappears
//! simply stops renewing and its claims expire; lease expiry is the sole
//! failure-recovery mechanism.

pub mod claim;
pub mod manager;

#[cfg(test)]
mod tests;

pub use claim::{ClaimStore, MemoryClaimStore, ShardClaim};
pub use manager::ShardManager;

/// Shard manager settings. An explicit immutable struct passed in at
/// construction, with the documented defaults.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Seconds between renew/claim ticks.
    pub interval_secs: u64,
    /// Maximum lifetime of a claim, in seconds.
    pub max_shard_period_secs: u64,
    /// Maximum number of shards a single worker may hold.
    pub max_shard_claims: usize,
    /// Total number of shards the rule id-space is split into.
    pub shard_count: u32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_shard_period_secs: 60,
            max_shard_claims: 500,
            shard_count: 32,
        }
    }
}

/// Map a rule id to its shard: FNV-1a over the id, modulo shard count.
///
/// The hash is computed inline so membership is reproducible across
/// processes and releases without a lookup table.
pub fn shard_for(rule_id: &str, shard_count: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in rule_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % u64::from(shard_count.max(1))) as u32
}
