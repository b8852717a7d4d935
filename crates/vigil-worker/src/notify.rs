use async_trait::async_trait;
use vigil_common::types::EvaluationResult;

use crate::suppression::SuppressedSummary;

/// Destination for triggered alerts and suppression summaries.
///
/// Delivery is best-effort: sinks log failures and move on, the scheduler
/// never blocks a cycle on a slow or broken notification channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, result: &EvaluationResult);

    async fn notify_suppressed(&self, summary: &SuppressedSummary);
}

/// Writes alerts to the structured log. The default sink when no webhook
/// is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, result: &EvaluationResult) {
        if result.is_no_data() {
            tracing::warn!(
                rule_id = %result.rule_id,
                resource_id = ?result.resource_id,
                "alert triggered: no data"
            );
        } else {
            tracing::warn!(
                rule_id = %result.rule_id,
                resource_id = ?result.resource_id,
                value = ?result.value,
                "alert triggered"
            );
        }
    }

    async fn notify_suppressed(&self, summary: &SuppressedSummary) {
        tracing::warn!(
            batch_id = %summary.batch_id,
            nodata_rules = summary.nodata_rules,
            total_rules = summary.total_rules,
            nodata_machines = summary.nodata_machines,
            total_machines = summary.total_machines,
            delete_action = %summary.delete_action,
            unsuppress_action = %summary.unsuppress_action,
            "suppressed no-data summary"
        );
    }
}

/// POSTs alerts as JSON to a configured webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    async fn post<T: serde::Serialize>(&self, kind: &str, payload: &T) {
        let request = self.client.post(&self.url).json(payload).send().await;
        match request {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::error!(kind, status = %response.status(), "webhook rejected alert");
            }
            Err(err) => {
                tracing::error!(kind, error = %err, "webhook delivery failed");
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, result: &EvaluationResult) {
        self.post("alert", result).await;
    }

    async fn notify_suppressed(&self, summary: &SuppressedSummary) {
        self.post("suppressed_summary", summary).await;
    }
}
