use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::claim::{ClaimStore, MemoryClaimStore};
use crate::manager::ShardManager;
use crate::{shard_for, ShardConfig};

fn small_config() -> ShardConfig {
    ShardConfig {
        interval_secs: 10,
        max_shard_period_secs: 60,
        max_shard_claims: 500,
        shard_count: 8,
    }
}

#[test]
fn shard_mapping_is_deterministic_and_in_range() {
    for id in ["rule-1", "rule-2", "", "a-very-long-rule-identifier"] {
        let first = shard_for(id, 32);
        assert!(first < 32);
        for _ in 0..10 {
            assert_eq!(shard_for(id, 32), first);
        }
    }
    // Different counts produce in-range shards too.
    assert!(shard_for("rule-1", 1) == 0);
}

#[test]
fn claim_is_exclusive_while_live() {
    let store = MemoryClaimStore::new();
    let now = Utc::now();
    let period = Duration::seconds(60);

    assert!(store.try_claim(3, "worker-a", now, period).unwrap());
    assert!(!store.try_claim(3, "worker-b", now, period).unwrap());
    // The holder may renew its own claim.
    assert!(store
        .try_claim(3, "worker-a", now + Duration::seconds(30), period)
        .unwrap());
}

#[test]
fn expired_claim_is_claimable_by_another_worker() {
    let store = MemoryClaimStore::new();
    let now = Utc::now();
    let period = Duration::seconds(60);

    assert!(store.try_claim(3, "worker-a", now, period).unwrap());
    // worker-a stops renewing; after the max shard period the claim expires.
    let later = now + Duration::seconds(61);
    assert!(store.try_claim(3, "worker-b", later, period).unwrap());

    let live = store.live_claims(later).unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].owner_id, "worker-b");
}

#[test]
fn release_makes_shard_immediately_claimable() {
    let store = MemoryClaimStore::new();
    let now = Utc::now();
    let period = Duration::seconds(60);

    assert!(store.try_claim(5, "worker-a", now, period).unwrap());
    store.release(5, "worker-a").unwrap();
    assert!(store.try_claim(5, "worker-b", now, period).unwrap());
}

#[test]
fn release_ignores_claims_held_by_others() {
    let store = MemoryClaimStore::new();
    let now = Utc::now();
    let period = Duration::seconds(60);

    assert!(store.try_claim(5, "worker-a", now, period).unwrap());
    store.release(5, "worker-b").unwrap();
    assert!(!store.try_claim(5, "worker-b", now, period).unwrap());
}

#[test]
fn single_worker_claims_every_shard() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let mut manager = ShardManager::new(store, small_config(), "worker-a".into());

    manager.tick(Utc::now()).unwrap();
    assert_eq!(manager.owned().len(), 8);
    assert!(manager.owns("rule-1"));
}

#[test]
fn two_workers_split_shards_without_overlap() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let mut a = ShardManager::new(store.clone(), small_config(), "worker-a".into());
    let mut b = ShardManager::new(store.clone(), small_config(), "worker-b".into());

    let now = Utc::now();
    a.tick(now).unwrap();
    b.tick(now).unwrap();

    // Coverage is total and ownership disjoint.
    let union: HashSet<u32> = a.owned().union(b.owned()).copied().collect();
    assert_eq!(union.len(), 8);
    assert!(a.owned().is_disjoint(b.owned()));
}

#[test]
fn max_claims_caps_ownership() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let config = ShardConfig {
        max_shard_claims: 3,
        ..small_config()
    };
    let mut manager = ShardManager::new(store, config, "worker-a".into());

    manager.tick(Utc::now()).unwrap();
    assert_eq!(manager.owned().len(), 3);
}

#[test]
fn dead_worker_shards_are_taken_over_after_lease_expiry() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let mut a = ShardManager::new(store.clone(), small_config(), "worker-a".into());
    let mut b = ShardManager::new(store.clone(), small_config(), "worker-b".into());

    let now = Utc::now();
    a.tick(now).unwrap();
    assert_eq!(a.owned().len(), 8);

    // worker-a dies: no more renewals. worker-b cannot claim before the
    // lease runs out, and takes over everything once it does.
    let before_expiry = now + Duration::seconds(30);
    b.tick(before_expiry).unwrap();
    assert_eq!(b.owned().len(), 0);

    let after_expiry = now + Duration::seconds(61);
    b.tick(after_expiry).unwrap();
    assert_eq!(b.owned().len(), 8);
}

#[test]
fn renewal_keeps_ownership_across_lease_boundaries() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let mut a = ShardManager::new(store.clone(), small_config(), "worker-a".into());
    let mut b = ShardManager::new(store.clone(), small_config(), "worker-b".into());

    let mut now = Utc::now();
    a.tick(now).unwrap();

    // Tick both workers every interval for several lease lifetimes; the
    // live worker renews in time so the other never steals a shard.
    for _ in 0..20 {
        now += Duration::seconds(10);
        a.tick(now).unwrap();
        b.tick(now).unwrap();
        assert_eq!(a.owned().len(), 8);
        assert_eq!(b.owned().len(), 0);
    }
}

#[test]
fn release_all_hands_shards_to_the_next_worker() {
    let store: Arc<MemoryClaimStore> = Arc::new(MemoryClaimStore::new());
    let mut a = ShardManager::new(store.clone(), small_config(), "worker-a".into());
    let mut b = ShardManager::new(store.clone(), small_config(), "worker-b".into());

    let now = Utc::now();
    a.tick(now).unwrap();
    a.release_all().unwrap();
    assert!(a.owned().is_empty());

    b.tick(now + Duration::seconds(1)).unwrap();
    assert_eq!(b.owned().len(), 8);
}
