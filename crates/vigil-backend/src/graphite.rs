use serde::Deserialize;
use vigil_common::types::{QueryOutcome, ResolvedQuery, Rule};

use crate::compute::compute;
use crate::{BackendError, BackendPlugin};

/// Graphite `/render` backend.
///
/// Issues one `GET {base}/render?target=..&from=-{start}&format=json`
/// request per execution. Relative times use Graphite's own syntax,
/// derived from the rule's window and period unit. The HTTP client is
/// shared across plugins; its timeout is set where it is built.
pub struct GraphitePlugin {
    client: reqwest::Client,
    base_url: String,
    rule: Rule,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphiteSeries {
    pub target: String,
    /// `[[value|null, timestamp], ..]`, in backend order.
    pub datapoints: Vec<(Option<f64>, i64)>,
}

impl GraphitePlugin {
    pub fn new(client: reqwest::Client, base_url: String, rule: Rule) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rule,
        }
    }

    fn start(&self) -> String {
        format!(
            "-{}{}",
            self.rule.window.start,
            self.rule.window.period.short()
        )
    }

    fn stop(&self) -> Option<String> {
        if self.rule.window.stop == 0 {
            return None;
        }
        Some(format!(
            "-{}{}",
            self.rule.window.stop,
            self.rule.window.period.short()
        ))
    }
}

/// Scope a target to a monitored resource. Graphite metrics are laid out
/// as `{resource_id}.{metric.path}`.
pub(crate) fn scoped_target(target: &str, resource_id: Option<&str>) -> String {
    match resource_id {
        Some(rid) => format!("{rid}.{target}"),
        None => target.to_string(),
    }
}

/// Drop null datapoints, preserving backend order.
pub(crate) fn non_null_values(series: &GraphiteSeries) -> Vec<f64> {
    series.datapoints.iter().filter_map(|(v, _)| *v).collect()
}

/// Turn a parsed `/render` response into an outcome. Empty responses and
/// all-null series are no-data; ambiguous or mismatched series are errors
/// the scheduler must treat as a skipped evaluation.
pub(crate) fn classify(
    series: &[GraphiteSeries],
    target: &str,
    query: &ResolvedQuery,
) -> Result<QueryOutcome, BackendError> {
    if series.is_empty() {
        tracing::warn!(target = %target, "no datapoints for target");
        return Ok(QueryOutcome::no_data());
    }

    // A single-target query must come back as a single series.
    if series.len() > 1 {
        tracing::warn!(target = %target, count = series.len(), "got multiple series");
        return Err(BackendError::MultipleSeriesReturned {
            target: target.to_string(),
        });
    }

    // Ensure requested and returned targets match.
    if series[0].target != target {
        tracing::warn!(
            requested = %target,
            returned = %series[0].target,
            "returned target does not match request"
        );
        return Err(BackendError::TargetMismatch {
            requested: target.to_string(),
            returned: series[0].target.clone(),
        });
    }

    let datapoints = non_null_values(&series[0]);
    if datapoints.is_empty() {
        tracing::warn!(target = %target, "all datapoints were null");
        return Ok(QueryOutcome::no_data());
    }

    let (triggered, value) = compute(
        query.operator,
        query.aggregation,
        &datapoints,
        query.threshold,
    );
    Ok(QueryOutcome::evaluated(value, triggered))
}

#[async_trait::async_trait]
impl BackendPlugin for GraphitePlugin {
    async fn execute(
        &self,
        query: &ResolvedQuery,
        resource_id: Option<&str>,
    ) -> Result<QueryOutcome, BackendError> {
        let target = scoped_target(&query.target, resource_id);
        let mut params = vec![
            ("target", target.clone()),
            ("from", self.start()),
            ("format", "json".to_string()),
        ];
        if let Some(until) = self.stop() {
            params.push(("until", until));
        }

        let series: Vec<GraphiteSeries> = self
            .client
            .get(format!("{}/render", self.base_url))
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        classify(&series, &target, query)
    }
}
