use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use vigil_shard::ShardManager;
use vigil_storage::claim_store::SqliteClaimStore;
use vigil_storage::rule_store::RuleStore;
use vigil_worker::config::WorkerConfig;
use vigil_worker::notify::{LogSink, NotificationSink, WebhookSink};
use vigil_worker::scheduler::{EvaluationScheduler, HttpPluginFactory};
use vigil_worker::suppression::{NoDataSuppressionController, SuppressionConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info")),
        )
        .init();

    vigil_common::id::init(1, 1);

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/worker.toml".to_string());
    let mut config = match WorkerConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %config_path, error = %err, "config not loaded, using defaults");
            WorkerConfig::default()
        }
    };
    config.apply_env_overrides();

    let worker_id = config
        .worker_id
        .clone()
        .unwrap_or_else(|| format!("worker-{}", vigil_common::id::next_id()));
    tracing::info!(worker_id = %worker_id, db = %config.db_path, "starting evaluation worker");

    let rules = Arc::new(RuleStore::open(&config.db_path)?);
    let claims = Arc::new(SqliteClaimStore::open(&config.db_path)?);

    let shard_config = config.shard_config();
    let shard_interval = Duration::from_secs(shard_config.interval_secs.max(1));
    let manager = Arc::new(Mutex::new(ShardManager::new(
        claims,
        shard_config,
        worker_id.clone(),
    )));

    let shard_loop = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shard_interval);
            loop {
                ticker.tick().await;
                let result = {
                    let mut manager = manager
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    manager.tick(chrono::Utc::now())
                };
                if let Err(err) = result {
                    tracing::error!(error = %err, "shard manager tick failed");
                }
            }
        })
    };

    let sink: Arc<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(reqwest::Client::new(), url.clone())),
        None => Arc::new(LogSink),
    };

    let factory = Arc::new(HttpPluginFactory::new(
        config.backend_endpoints(),
        Duration::from_secs(config.scheduler.fetch_timeout_secs),
    )?);
    let suppression =
        NoDataSuppressionController::new(SuppressionConfig::from(&config.suppression));
    let mut scheduler = EvaluationScheduler::new(
        rules,
        manager.clone(),
        factory,
        sink,
        suppression,
        config.scheduler.tick_secs,
        config.scheduler.max_concurrent,
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down, releasing shard claims");
        }
    }

    shard_loop.abort();
    let mut manager = manager
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    manager.release_all()?;
    Ok(())
}
