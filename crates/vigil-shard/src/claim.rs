use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A time-bounded lease granting one worker exclusive evaluation rights
/// over a shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardClaim {
    pub shard_id: u32,
    pub owner_id: String,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ShardClaim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared claim storage with compare-and-swap acquisition.
///
/// At most one non-expired claim exists per shard. The concrete store is an
/// implementation choice; the CAS contract is the requirement.
pub trait ClaimStore: Send + Sync {
    /// Acquire or renew a claim. Succeeds only if no live claim exists for
    /// the shard, or the acquiring worker already owns it. Returns whether
    /// the claim was written.
    fn try_claim(
        &self,
        shard_id: u32,
        owner_id: &str,
        now: DateTime<Utc>,
        period: Duration,
    ) -> Result<bool>;

    /// Drop a claim on worker shutdown. A no-op if the worker does not
    /// hold the claim.
    fn release(&self, shard_id: u32, owner_id: &str) -> Result<()>;

    /// All claims that have not yet expired.
    fn live_claims(&self, now: DateTime<Utc>) -> Result<Vec<ShardClaim>>;
}

/// In-process claim store for tests and single-worker deployments.
#[derive(Default)]
pub struct MemoryClaimStore {
    claims: Mutex<HashMap<u32, ShardClaim>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStore for MemoryClaimStore {
    fn try_claim(
        &self,
        shard_id: u32,
        owner_id: &str,
        now: DateTime<Utc>,
        period: Duration,
    ) -> Result<bool> {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = claims.get(&shard_id) {
            if !existing.is_expired(now) && existing.owner_id != owner_id {
                return Ok(false);
            }
        }
        claims.insert(
            shard_id,
            ShardClaim {
                shard_id,
                owner_id: owner_id.to_string(),
                claimed_at: now,
                expires_at: now + period,
            },
        );
        Ok(true)
    }

    fn release(&self, shard_id: u32, owner_id: &str) -> Result<()> {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if claims
            .get(&shard_id)
            .is_some_and(|c| c.owner_id == owner_id)
        {
            claims.remove(&shard_id);
        }
        Ok(())
    }

    fn live_claims(&self, now: DateTime<Utc>) -> Result<Vec<ShardClaim>> {
        let claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(claims
            .values()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect())
    }
}
