use vigil_common::types::{Aggregation, Operator};

/// Reduce a datapoint sequence and compare it against a threshold.
///
/// Returns `(triggered, value)`. `value` is always the numeric aggregate:
/// mean, minimum, maximum, sum, or the final element in backend order. The
/// trigger decision depends on the aggregation kind:
///
/// * `Avg`, `Sum` and `Last` compare the aggregated value to the threshold.
/// * `Min` lifts the comparison pointwise and takes its minimum: the rule
///   triggers only when every datapoint satisfies the operator.
/// * `Max` takes the pointwise maximum: a single satisfying datapoint
///   triggers.
///
/// Pure and deterministic: the same ordered sequence, aggregation, operator
/// and threshold always produce the same result. `Last` takes the final
/// element of the sequence as returned by the backend; plugins must
/// preserve, never re-sort, that order.
///
/// Callers guarantee a non-empty, null-filtered sequence; an empty fetch is
/// a no-data case handled at the plugin layer and never reaches here.
pub fn compute(
    operator: Operator,
    aggregation: Aggregation,
    datapoints: &[f64],
    threshold: f64,
) -> (bool, f64) {
    debug_assert!(!datapoints.is_empty());
    let value = match aggregation {
        Aggregation::Avg => datapoints.iter().sum::<f64>() / datapoints.len() as f64,
        Aggregation::Min => datapoints.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => datapoints.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Sum => datapoints.iter().sum(),
        Aggregation::Last => *datapoints.last().unwrap_or(&f64::NAN),
    };
    let triggered = match aggregation {
        Aggregation::Min => datapoints.iter().all(|v| operator.check(*v, threshold)),
        Aggregation::Max => datapoints.iter().any(|v| operator.check(*v, threshold)),
        Aggregation::Avg | Aggregation::Sum | Aggregation::Last => {
            operator.check(value, threshold)
        }
    };
    (triggered, value)
}
