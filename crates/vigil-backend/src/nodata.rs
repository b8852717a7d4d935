use vigil_common::types::{QueryOutcome, ResolvedQuery};

use crate::{BackendError, BackendPlugin};

/// Decorator that turns an empty fetch into a fired no-data alert.
///
/// Every other outcome passes through unchanged, so callers treat a
/// wrapped plugin exactly like the plugin it wraps; only the empty-result
/// classification differs.
pub struct NoDataPlugin<P> {
    inner: P,
}

impl<P: BackendPlugin> NoDataPlugin<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<P: BackendPlugin> BackendPlugin for NoDataPlugin<P> {
    async fn execute(
        &self,
        query: &ResolvedQuery,
        resource_id: Option<&str>,
    ) -> Result<QueryOutcome, BackendError> {
        let outcome = self.inner.execute(query, resource_id).await?;
        if outcome.is_no_data() {
            // Data is absent: that is exactly the condition this rule
            // exists to detect. No representative value to report.
            return Ok(QueryOutcome {
                value: None,
                triggered: Some(true),
            });
        }
        Ok(outcome)
    }
}
