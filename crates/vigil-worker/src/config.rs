use serde::{Deserialize, Serialize};

/// Worker process configuration, loaded from TOML. The shard manager and
/// no-data suppression settings can also be set through the environment
/// variables recognized by [`WorkerConfig::apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Stable worker identity for shard claims. Generated when absent.
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub shard: ShardSettings,
    #[serde(default)]
    pub suppression: SuppressionSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub backends: BackendSettings,
    /// Webhook to POST alerts to. Logs only when absent.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            worker_id: None,
            shard: ShardSettings::default(),
            suppression: SuppressionSettings::default(),
            scheduler: SchedulerSettings::default(),
            backends: BackendSettings::default(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSettings {
    #[serde(default = "default_shard_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_shard_period_secs")]
    pub max_shard_period_secs: u64,
    #[serde(default = "default_max_shard_claims")]
    pub max_shard_claims: usize,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

impl Default for ShardSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_shard_interval_secs(),
            max_shard_period_secs: default_max_shard_period_secs(),
            max_shard_claims: default_max_shard_claims(),
            shard_count: default_shard_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_buffer_period_secs")]
    pub buffer_period_secs: u64,
    #[serde(default = "default_nodata_ratio")]
    pub rules_ratio: f64,
    #[serde(default = "default_nodata_ratio")]
    pub machines_ratio: f64,
    /// Base URL for the delete/unsuppress action links embedded in the
    /// suppressed-summary alert.
    #[serde(default = "default_action_base_url")]
    pub action_base_url: String,
}

impl Default for SuppressionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_period_secs: default_buffer_period_secs(),
            rules_ratio: default_nodata_ratio(),
            machines_ratio: default_nodata_ratio(),
            action_base_url: default_action_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            max_concurrent: default_max_concurrent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub graphite_url: Option<String>,
    #[serde(default)]
    pub victoria_url: Option<String>,
}

fn default_db_path() -> String {
    "data/vigil.db".to_string()
}

fn default_shard_interval_secs() -> u64 {
    10
}

fn default_max_shard_period_secs() -> u64 {
    60
}

fn default_max_shard_claims() -> usize {
    500
}

fn default_shard_count() -> u32 {
    32
}

fn default_buffer_period_secs() -> u64 {
    45
}

fn default_nodata_ratio() -> f64 {
    0.2
}

fn default_action_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_tick_secs() -> u64 {
    5
}

fn default_max_concurrent() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    vigil_backend::DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl WorkerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply the documented environment overrides. Unparseable values are
    /// logged and ignored rather than failing startup.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("SHARD_MANAGER_INTERVAL") {
            self.shard.interval_secs = v;
        }
        if let Some(v) = env_parse("SHARD_MANAGER_MAX_SHARD_PERIOD") {
            self.shard.max_shard_period_secs = v;
        }
        if let Some(v) = env_parse("SHARD_MANAGER_MAX_SHARD_CLAIMS") {
            self.shard.max_shard_claims = v;
        }
        if let Some(v) = env_bool("NO_DATA_ALERT_SUPPRESSION") {
            self.suppression.enabled = v;
        }
        if let Some(v) = env_parse("NO_DATA_ALERT_BUFFER_PERIOD") {
            self.suppression.buffer_period_secs = v;
        }
        if let Some(v) = env_parse("NO_DATA_RULES_RATIO") {
            self.suppression.rules_ratio = v;
        }
        if let Some(v) = env_parse("NO_DATA_MACHINES_RATIO") {
            self.suppression.machines_ratio = v;
        }
    }

    pub fn shard_config(&self) -> vigil_shard::ShardConfig {
        vigil_shard::ShardConfig {
            interval_secs: self.shard.interval_secs,
            max_shard_period_secs: self.shard.max_shard_period_secs,
            max_shard_claims: self.shard.max_shard_claims,
            shard_count: self.shard.shard_count,
        }
    }

    pub fn backend_endpoints(&self) -> vigil_backend::BackendEndpoints {
        vigil_backend::BackendEndpoints {
            graphite_url: self.backends.graphite_url.clone(),
            victoria_url: self.backends.victoria_url.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = WorkerConfig::default();
        assert_eq!(config.shard.interval_secs, 10);
        assert_eq!(config.shard.max_shard_period_secs, 60);
        assert_eq!(config.shard.max_shard_claims, 500);
        assert!(!config.suppression.enabled);
        assert_eq!(config.suppression.buffer_period_secs, 45);
        assert_eq!(config.suppression.rules_ratio, 0.2);
        assert_eq!(config.suppression.machines_ratio, 0.2);
        assert_eq!(config.scheduler.fetch_timeout_secs, 15);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: WorkerConfig = toml::from_str(
            r#"
            db_path = "/tmp/vigil-test.db"

            [shard]
            shard_count = 64

            [backends]
            graphite_url = "http://graphite:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, "/tmp/vigil-test.db");
        assert_eq!(config.shard.shard_count, 64);
        assert_eq!(config.shard.interval_secs, 10);
        assert_eq!(
            config.backends.graphite_url.as_deref(),
            Some("http://graphite:8080")
        );
        assert!(config.backends.victoria_url.is_none());
    }

    #[test]
    fn env_overrides_replace_file_settings() {
        std::env::set_var("SHARD_MANAGER_INTERVAL", "3");
        std::env::set_var("NO_DATA_ALERT_SUPPRESSION", "true");
        std::env::set_var("NO_DATA_RULES_RATIO", "0.5");

        let mut config = WorkerConfig::default();
        config.apply_env_overrides();

        std::env::remove_var("SHARD_MANAGER_INTERVAL");
        std::env::remove_var("NO_DATA_ALERT_SUPPRESSION");
        std::env::remove_var("NO_DATA_RULES_RATIO");

        assert_eq!(config.shard.interval_secs, 3);
        assert!(config.suppression.enabled);
        assert_eq!(config.suppression.rules_ratio, 0.5);
    }
}
