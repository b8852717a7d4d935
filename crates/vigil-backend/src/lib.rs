//! Metric backend plugins for the vigil alerting engine.
//!
//! A [`BackendPlugin`] fetches datapoints for one query target over one
//! time window from one backend and reduces them to a trigger decision.
//! Concrete implementations exist for Graphite and VictoriaMetrics; the
//! [`nodata::NoDataPlugin`] decorator wraps any of them to reclassify an
//! empty fetch as a fired no-data alert instead of a skipped evaluation.

pub mod compute;
pub mod error;
pub mod graphite;
pub mod nodata;
pub mod victoria;


use std::time::Duration;

use vigil_common::types::{Backend, QueryOutcome, ResolvedQuery, Rule};

pub use error::{BackendError, ValidationError};

/// Default fetch timeout. Fetches are never retried at this layer; the
/// next scheduled cycle retries naturally.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// A protocol-specific adapter that issues exactly one fetch per call and
/// returns a reduced value plus trigger flag, or
/// [`QueryOutcome::no_data`] when the interval holds no datapoints.
#[async_trait::async_trait]
pub trait BackendPlugin: Send + Sync {
    async fn execute(
        &self,
        query: &ResolvedQuery,
        resource_id: Option<&str>,
    ) -> Result<QueryOutcome, BackendError>;
}

#[async_trait::async_trait]
impl BackendPlugin for Box<dyn BackendPlugin> {
    async fn execute(
        &self,
        query: &ResolvedQuery,
        resource_id: Option<&str>,
    ) -> Result<QueryOutcome, BackendError> {
        (**self).execute(query, resource_id).await
    }
}

/// Base URLs of the configured metric backends.
#[derive(Debug, Clone, Default)]
pub struct BackendEndpoints {
    pub graphite_url: Option<String>,
    pub victoria_url: Option<String>,
}

/// Build the plugin for a rule, wrapped in the no-data decorator when the
/// rule is an absence detector. The caller supplies one shared HTTP client
/// (with its fetch timeout already set); plugins never build their own.
pub fn build_plugin(
    rule: &Rule,
    endpoints: &BackendEndpoints,
    client: reqwest::Client,
) -> Result<Box<dyn BackendPlugin>, BackendError> {
    let inner: Box<dyn BackendPlugin> = match rule.backend {
        Backend::Graphite => {
            let url = endpoints
                .graphite_url
                .clone()
                .ok_or(BackendError::MissingEndpoint("graphite"))?;
            Box::new(graphite::GraphitePlugin::new(client, url, rule.clone()))
        }
        Backend::VictoriaMetrics => {
            let url = endpoints
                .victoria_url
                .clone()
                .ok_or(BackendError::MissingEndpoint("victoriametrics"))?;
            Box::new(victoria::VictoriaPlugin::new(client, url, rule.clone()))
        }
    };
    if rule.no_data {
        Ok(Box::new(nodata::NoDataPlugin::new(inner)))
    } else {
        Ok(inner)
    }
}

/// Static compatibility check run once when a rule is created or edited.
///
/// Rejected configurations never reach the scheduler; nothing here is
/// re-checked per evaluation.
pub fn validate(rule: &Rule) -> Result<(), ValidationError> {
    if rule.is_arbitrary() {
        return Err(ValidationError::ArbitraryQueryUnsupported);
    }
    let primary = rule.primary_query().ok_or(ValidationError::NoQueries)?;
    if primary.target.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }
    if !primary.filters.is_empty() {
        return Err(ValidationError::PrimaryQueryFilters);
    }

    let window_secs = rule.window.duration().as_secs();
    if window_secs == 0 {
        return Err(ValidationError::EmptyWindow);
    }
    // The frequency should be at least 25% of the time window, after
    // rounding the ratio to two decimals.
    let frequency_secs = rule.frequency.duration().as_secs();
    let ratio = (frequency_secs as f64 / window_secs as f64 * 100.0).round() / 100.0;
    if ratio < 0.25 {
        return Err(ValidationError::FrequencyTooDense { ratio });
    }
    Ok(())
}
