use chrono::Utc;
use serde::Deserialize;
use vigil_common::types::{QueryOutcome, ResolvedQuery, Rule};

use crate::compute::compute;
use crate::{BackendError, BackendPlugin};

/// VictoriaMetrics `/api/v1/query_range` backend.
///
/// The query expression is the target name plus a label selector built
/// from the query's filters and, when present, the resource scope. The
/// HTTP client is shared across plugins; its timeout is set where it is
/// built.
pub struct VictoriaPlugin {
    client: reqwest::Client,
    base_url: String,
    rule: Rule,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RangeResponse {
    pub status: String,
    #[serde(default)]
    pub data: RangeData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RangeData {
    #[serde(default)]
    pub result: Vec<RangeSeries>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RangeSeries {
    #[serde(default)]
    pub metric: std::collections::HashMap<String, String>,
    /// `[[unix_ts, "value"], ..]`, in backend order.
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

impl VictoriaPlugin {
    pub fn new(client: reqwest::Client, base_url: String, rule: Rule) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rule,
        }
    }
}

/// Build the PromQL-style selector for a target, its filters and the
/// optional resource scope. Labels are sorted so the expression is stable.
pub(crate) fn selector(query: &ResolvedQuery, resource_id: Option<&str>) -> String {
    let mut labels: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(rid) = resource_id {
        labels.push(("resource_id".to_string(), rid.to_string()));
    }
    if labels.is_empty() {
        return query.target.clone();
    }
    labels.sort();
    let matchers: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{}{{{}}}", query.target, matchers.join(","))
}

/// Parse and null-filter the sample values of a range series, preserving
/// backend order. Non-finite samples count as absent.
pub(crate) fn finite_values(series: &RangeSeries) -> Vec<f64> {
    series
        .values
        .iter()
        .filter_map(|(_, raw)| raw.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

/// Turn a parsed range response into an outcome. A non-success status is a
/// query failure the scheduler must treat as a skipped evaluation, never a
/// no-data observation; only an empty or all-unparseable result is no-data.
pub(crate) fn classify(
    response: &RangeResponse,
    query: &ResolvedQuery,
) -> Result<QueryOutcome, BackendError> {
    if response.status != "success" {
        tracing::warn!(target = %query.target, status = %response.status, "query failed");
        return Err(BackendError::QueryFailed {
            status: response.status.clone(),
        });
    }

    if response.data.result.is_empty() {
        tracing::warn!(target = %query.target, "no datapoints for target");
        return Ok(QueryOutcome::no_data());
    }

    if response.data.result.len() > 1 {
        tracing::warn!(
            target = %query.target,
            count = response.data.result.len(),
            "got multiple series"
        );
        return Err(BackendError::MultipleSeriesReturned {
            target: query.target.clone(),
        });
    }

    let series = &response.data.result[0];
    let returned = series
        .metric
        .get("__name__")
        .cloned()
        .unwrap_or_default();
    if returned != query.target {
        tracing::warn!(
            requested = %query.target,
            returned = %returned,
            "returned target does not match request"
        );
        return Err(BackendError::TargetMismatch {
            requested: query.target.clone(),
            returned,
        });
    }

    let datapoints = finite_values(series);
    if datapoints.is_empty() {
        tracing::warn!(target = %query.target, "all datapoints were null");
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
impl BackendPlugin for VictoriaPlugin {
    async fn execute(
        &self,
        query: &ResolvedQuery,
        resource_id: Option<&str>,
    ) -> Result<QueryOutcome, BackendError> {
        let expr = selector(query, resource_id);
        let now = Utc::now().timestamp();
        let window = &self.rule.window;
        let start = now - (window.start * window.period.secs()) as i64;
        let end = now - (window.stop * window.period.secs()) as i64;
        let step = format!("{}s", window.period.secs());

        let response: RangeResponse = self
            .client
            .get(format!("{}/api/v1/query_range", self.base_url))
            .query(&[
                ("query", expr.as_str()),
                ("start", &start.to_string()),
                ("end", &end.to_string()),
                ("step", &step),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        classify(&response, query)
    }
}
