/// Errors surfaced by a metric backend plugin during a single fetch.
///
/// An empty response is not an error; plugins return
/// [`QueryOutcome::no_data`](vigil_common::types::QueryOutcome::no_data)
/// for that. These variants cover protocol violations and transport
/// failures that the scheduler must treat as a skipped evaluation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend returned more than one series for a single-target
    /// query. The caller must not guess which series to use.
    #[error("backend returned multiple series for target '{target}'")]
    MultipleSeriesReturned { target: String },

    /// The backend substituted or rewrote the target: the returned series
    /// does not match what was requested.
    #[error("requested target '{requested}' but backend returned '{returned}'")]
    TargetMismatch { requested: String, returned: String },

    /// The backend answered the request but reported the query itself
    /// failed (e.g. a 200 response carrying `status: "error"`). This is a
    /// skipped evaluation, never a no-data observation.
    #[error("backend reported query failure: status '{status}'")]
    QueryFailed { status: String },

    /// An underlying HTTP transport error (including timeouts) from `reqwest`.
    #[error("backend request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body could not be decoded as the expected wire format.
    #[error("backend response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// No endpoint is configured for the rule's backend type.
    #[error("no endpoint configured for backend '{0}'")]
    MissingEndpoint(&'static str),
}

/// Rejections produced by save-time rule validation. These never reach the
/// scheduler: the API layer reports them to the caller synchronously.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Structured-query backends cannot evaluate free-form expressions.
    #[error("arbitrary queries are not supported by this backend")]
    ArbitraryQueryUnsupported,

    /// The frequency must be at least 25% of the time window.
    #[error("frequency/window ratio {ratio:.2} is below the 0.25 minimum")]
    FrequencyTooDense { ratio: f64 },

    /// The primary query of a non-arbitrary rule must carry no filters.
    #[error("filters are not supported on the primary query")]
    PrimaryQueryFilters,

    #[error("rule has no queries")]
    NoQueries,

    #[error("query target must not be empty")]
    EmptyTarget,

    #[error("window must be non-zero")]
    EmptyWindow,
}
