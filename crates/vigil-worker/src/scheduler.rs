use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use vigil_backend::{build_plugin, BackendEndpoints, BackendError, BackendPlugin};
use vigil_common::types::{EvaluationResult, NoDataTally, QueryOutcome, Rule};
use vigil_shard::{shard_for, ShardManager};
use vigil_storage::rule_store::RuleStore;

use crate::notify::NotificationSink;
use crate::suppression::NoDataSuppressionController;

/// Builds the backend plugin for a rule. Abstracted so tests can inject
/// stub plugins without HTTP endpoints.
pub trait PluginFactory: Send + Sync {
    fn build(&self, rule: &Rule) -> Result<Box<dyn BackendPlugin>, BackendError>;
}

/// Production factory: HTTP-backed plugins built from configured endpoints.
/// One client (connection pool, fetch timeout) is shared by every plugin
/// the factory hands out.
pub struct HttpPluginFactory {
    endpoints: BackendEndpoints,
    client: reqwest::Client,
}

impl HttpPluginFactory {
    pub fn new(
        endpoints: BackendEndpoints,
        fetch_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self { endpoints, client })
    }
}

impl PluginFactory for HttpPluginFactory {
    fn build(&self, rule: &Rule) -> Result<Box<dyn BackendPlugin>, BackendError> {
        build_plugin(rule, &self.endpoints, self.client.clone())
    }
}

/// Per-worker evaluation loop.
///
/// Each tick takes a snapshot of the shards this worker owns, selects the
/// active rules that hash into them and are due under their frequency, and
/// evaluates each due rule as one spawned task. The cycle joins every task
/// before the next tick, so a rule is never evaluated concurrently with
/// itself. Results are tallied once per cycle for no-data suppression and
/// then forwarded to the notification sink.
pub struct EvaluationScheduler {
    rules: Arc<RuleStore>,
    shard: Arc<Mutex<ShardManager>>,
    factory: Arc<dyn PluginFactory>,
    sink: Arc<dyn NotificationSink>,
    suppression: NoDataSuppressionController,
    tick_secs: u64,
    max_concurrent: usize,
    last_run: HashMap<String, DateTime<Utc>>,
}

impl EvaluationScheduler {
    pub fn new(
        rules: Arc<RuleStore>,
        shard: Arc<Mutex<ShardManager>>,
        factory: Arc<dyn PluginFactory>,
        sink: Arc<dyn NotificationSink>,
        suppression: NoDataSuppressionController,
        tick_secs: u64,
        max_concurrent: usize,
    ) -> Self {
        Self {
            rules,
            shard,
            factory,
            sink,
            suppression,
            tick_secs,
            max_concurrent,
            last_run: HashMap::new(),
        }
    }

    pub fn suppression(&mut self) -> &mut NoDataSuppressionController {
        &mut self.suppression
    }

    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.evaluate_cycle(Utc::now()).await {
                tracing::error!(error = %err, "evaluation cycle failed");
            }
        }
    }

    /// One full evaluation cycle at the given instant.
    pub async fn evaluate_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let (owned, shard_count) = {
            let manager = self
                .shard
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (manager.owned().clone(), manager.config().shard_count)
        };
        if owned.is_empty() {
            return Ok(());
        }

        let rules = self.rules.list_active()?;
        // Drop run markers for rules that were deleted or disabled, so a
        // recreated rule starts fresh and the map does not grow unbounded.
        let active_ids: HashSet<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        self.last_run.retain(|id, _| active_ids.contains(id.as_str()));

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let mut handles = Vec::new();
        for rule in rules {
            if !owned.contains(&shard_for(&rule.id, shard_count)) {
                continue;
            }
            let due = match self.last_run.get(&rule.id) {
                Some(last) => {
                    (now - *last).num_seconds() >= rule.frequency.duration().as_secs() as i64
                }
                None => true,
            };
            if !due {
                continue;
            }
            self.last_run.insert(rule.id.clone(), now);

            let permit = semaphore.clone().acquire_owned().await?;
            let factory = self.factory.clone();
            handles.push(tokio::spawn(async move {
                let results = evaluate_rule(&rule, factory.as_ref(), now).await;
                drop(permit);
                results
            }));
        }

        let mut tally = NoDataTally::default();
        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(rule_results) => {
                    for result in rule_results {
                        tally.observe(&result.rule_id, result.resource_id.as_deref(), result.is_no_data());
                        results.push(result);
                    }
                }
                Err(err) => tracing::error!(error = %err, "evaluation task panicked"),
            }
        }

        if let Some(summary) = self.suppression.observe_cycle(&tally, now) {
            self.sink.notify_suppressed(&summary).await;
        }

        for result in results {
            if !result.is_triggered() {
                continue;
            }
            if self.suppression.is_suppressed() && result.is_no_data() {
                self.suppression.hold(result);
            } else {
                self.sink.notify(&result).await;
            }
        }
        Ok(())
    }
}

/// Evaluate one rule across its resource scopes. Infrastructure failures
/// (unreachable backend, malformed responses) skip the affected scope with
/// a warning; they are not no-data observations.
async fn evaluate_rule(
    rule: &Rule,
    factory: &dyn PluginFactory,
    now: DateTime<Utc>,
) -> Vec<EvaluationResult> {
    let plugin = match factory.build(rule) {
        Ok(plugin) => plugin,
        Err(err) => {
            tracing::error!(rule_id = %rule.id, error = %err, "cannot build backend plugin");
            return Vec::new();
        }
    };

    let scopes: Vec<Option<String>> = if rule.resource_ids.is_empty() {
        vec![None]
    } else {
        rule.resource_ids.iter().cloned().map(Some).collect()
    };

    let mut results = Vec::new();
    'scopes: for scope in scopes {
        let mut merged: Option<QueryOutcome> = None;
        for query in &rule.queries {
            let resolved = rule.resolve(query);
            let outcome = match plugin.execute(&resolved, scope.as_deref()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        resource_id = ?scope,
                        target = %resolved.target,
                        error = %err,
                        "query failed, skipping scope"
                    );
                    continue 'scopes;
                }
            };
            merged = Some(match merged {
                None => outcome,
                Some(previous) => merge_outcomes(previous, outcome),
            });
        }
        if let Some(outcome) = merged {
            results.push(EvaluationResult {
                rule_id: rule.id.clone(),
                resource_id: scope,
                value: outcome.value,
                triggered: outcome.triggered,
                timestamp: now,
            });
        }
    }
    results
}

/// Multi-query rules trigger only when every query triggers; any no-data
/// query makes the whole rule no-data. The reported value is the last
/// query's.
fn merge_outcomes(a: QueryOutcome, b: QueryOutcome) -> QueryOutcome {
    if a.is_no_data() || b.is_no_data() {
        return QueryOutcome::no_data();
    }
    QueryOutcome {
        value: b.value.or(a.value),
        triggered: Some(a.triggered.unwrap_or(false) && b.triggered.unwrap_or(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_requires_all_queries_triggered() {
        let both = merge_outcomes(
            QueryOutcome::evaluated(10.0, true),
            QueryOutcome::evaluated(3.0, true),
        );
        assert_eq!(both.triggered, Some(true));
        assert_eq!(both.value, Some(3.0));

        let one = merge_outcomes(
            QueryOutcome::evaluated(10.0, true),
            QueryOutcome::evaluated(3.0, false),
        );
        assert_eq!(one.triggered, Some(false));
    }

    #[test]
    fn merge_propagates_no_data() {
        let merged = merge_outcomes(QueryOutcome::evaluated(10.0, true), QueryOutcome::no_data());
        assert!(merged.is_no_data());
    }
}
