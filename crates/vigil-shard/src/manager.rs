use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::claim::ClaimStore;
use crate::{shard_for, ShardConfig};

/// Per-worker view of the shard lease protocol.
///
/// Each tick renews held claims that are approaching expiry and claims
/// unclaimed-or-expired shards up to the configured maximum. Rebalancing
/// is best-effort and eventually consistent: a lost claim race is expected
/// and self-heals within one interval.
pub struct ShardManager {
    store: Arc<dyn ClaimStore>,
    config: ShardConfig,
    owner_id: String,
    owned: HashSet<u32>,
}

impl ShardManager {
    pub fn new(store: Arc<dyn ClaimStore>, config: ShardConfig, owner_id: String) -> Self {
        Self {
            store,
            config,
            owner_id,
            owned: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Snapshot of the shards this worker currently holds a live claim on.
    pub fn owned(&self) -> &HashSet<u32> {
        &self.owned
    }

    /// Whether this worker owns the shard the rule hashes to.
    pub fn owns(&self, rule_id: &str) -> bool {
        self.owned
            .contains(&shard_for(rule_id, self.config.shard_count))
    }

    /// One renew/claim pass. Run every `interval_secs`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let period = Duration::seconds(self.config.max_shard_period_secs as i64);
        // Renew once less than half the lease remains.
        let renew_below = self.config.max_shard_period_secs as i64 / 2;

        let live = self.store.live_claims(now)?;
        let mut mine: HashMap<u32, DateTime<Utc>> = HashMap::new();
        let mut taken: HashSet<u32> = HashSet::new();
        for claim in live {
            if claim.owner_id == self.owner_id {
                mine.insert(claim.shard_id, claim.expires_at);
            } else {
                taken.insert(claim.shard_id);
            }
        }

        let mut owned = HashSet::new();
        for (shard_id, expires_at) in mine {
            let remaining = (expires_at - now).num_seconds();
            if remaining >= renew_below {
                owned.insert(shard_id);
                continue;
            }
            if self
                .store
                .try_claim(shard_id, &self.owner_id, now, period)?
            {
                owned.insert(shard_id);
            } else {
                // Someone else got in after our claim expired. Expected;
                // self-heals within one interval.
                tracing::debug!(shard_id, "lost renewal race");
            }
        }

        for shard_id in 0..self.config.shard_count {
            if owned.len() >= self.config.max_shard_claims {
                break;
            }
            if owned.contains(&shard_id) || taken.contains(&shard_id) {
                continue;
            }
            if self
                .store
                .try_claim(shard_id, &self.owner_id, now, period)?
            {
                tracing::debug!(shard_id, owner = %self.owner_id, "claimed shard");
                owned.insert(shard_id);
            } else {
                tracing::debug!(shard_id, "lost claim race");
            }
        }

        if owned != self.owned {
            tracing::info!(
                owner = %self.owner_id,
                owned = owned.len(),
                total = self.config.shard_count,
                "shard ownership changed"
            );
        }
        self.owned = owned;
        Ok(())
    }

    /// Explicitly release every held claim (worker shutdown). Shards become
    /// immediately claimable instead of waiting out the lease.
    pub fn release_all(&mut self) -> Result<()> {
        for shard_id in self.owned.drain() {
            self.store.release(shard_id, &self.owner_id)?;
        }
        Ok(())
    }
}
