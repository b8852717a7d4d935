//! Evaluation worker: shard-aware scheduler, no-data suppression and
//! alert delivery, wired together by the `vigil-worker` binary.

pub mod config;
pub mod notify;
pub mod scheduler;
pub mod suppression;


use vigil_common::types::Rule;
use vigil_storage::rule_store::RuleStore;

/// Save-time gate for rule writes: a rule is validated against the backend
/// contract before it is persisted, so the scheduler only ever sees
/// configurations the backends can execute.
pub fn admit_rule(store: &RuleStore, rule: &Rule) -> anyhow::Result<()> {
    vigil_backend::validate(rule)?;
    store.upsert(rule)?;
    Ok(())
}
