use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Time unit used by rule windows and evaluation frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Period {
    pub fn secs(&self) -> u64 {
        match self {
            Period::Seconds => 1,
            Period::Minutes => 60,
            Period::Hours => 3600,
            Period::Days => 86400,
        }
    }

    /// Single-letter suffix used in relative-time query expressions
    /// (e.g. `-10m` for "ten minutes ago").
    pub fn short(&self) -> &'static str {
        match self {
            Period::Seconds => "s",
            Period::Minutes => "m",
            Period::Hours => "h",
            Period::Days => "d",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Seconds => write!(f, "seconds"),
            Period::Minutes => write!(f, "minutes"),
            Period::Hours => write!(f, "hours"),
            Period::Days => write!(f, "days"),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s" | "second" | "seconds" => Ok(Period::Seconds),
            "m" | "minute" | "minutes" => Ok(Period::Minutes),
            "h" | "hour" | "hours" => Ok(Period::Hours),
            "d" | "day" | "days" => Ok(Period::Days),
            _ => Err(format!("unknown period: {s}")),
        }
    }
}

/// The lookback span a query covers: from `start` periods ago until `stop`
/// periods ago (`stop == 0` means "until now").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: u64,
    #[serde(default)]
    pub stop: u64,
    pub period: Period,
}

impl Window {
    /// Full lookback length. The stop offset only shifts the end of the
    /// window; it does not shrink the span used for the frequency ratio.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.start * self.period.secs())
    }
}

/// How often a rule is (re-)evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub every: u64,
    pub period: Period,
}

impl Frequency {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.every * self.period.secs())
    }
}

/// Comparison applied between the aggregated value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Ne => value != threshold,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Gt => write!(f, "gt"),
            Operator::Ge => write!(f, "ge"),
            Operator::Lt => write!(f, "lt"),
            Operator::Le => write!(f, "le"),
            Operator::Eq => write!(f, "eq"),
            Operator::Ne => write!(f, "ne"),
        }
    }
}

impl std::str::FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gt" => Ok(Operator::Gt),
            "ge" | "gte" => Ok(Operator::Ge),
            "lt" => Ok(Operator::Lt),
            "le" | "lte" => Ok(Operator::Le),
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            _ => Err(format!("unknown operator: {s}")),
        }
    }
}

/// Reduction applied to a datapoint sequence before the threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Sum,
    Last,
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Sum => write!(f, "sum"),
            Aggregation::Last => write!(f, "last"),
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avg" | "average" | "mean" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "sum" => Ok(Aggregation::Sum),
            "last" => Ok(Aggregation::Last),
            _ => Err(format!("unknown aggregation: {s}")),
        }
    }
}

/// Supported time-series backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Graphite,
    VictoriaMetrics,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Graphite => write!(f, "graphite"),
            Backend::VictoriaMetrics => write!(f, "victoriametrics"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "graphite" => Ok(Backend::Graphite),
            "victoriametrics" | "victoria" => Ok(Backend::VictoriaMetrics),
            _ => Err(format!("unknown backend: {s}")),
        }
    }
}

/// A single query entry within a rule. Operator, aggregation and threshold
/// default to the parent rule's settings when not set here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub target: String,
    #[serde(default)]
    pub filters: HashMap<String, String>,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// A query with the parent rule's defaults already applied; this is what the
/// backend plugins actually consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    pub target: String,
    pub filters: HashMap<String, String>,
    pub operator: Operator,
    pub aggregation: Aggregation,
    pub threshold: f64,
}

/// A persisted threshold-alert configuration.
///
/// Rules are created and edited by the API layer (which runs validation at
/// save time) and are read-only to the evaluation engine. A rule with
/// `no_data: true` is the per-owner absence detector: it fires when its
/// query returns no datapoints rather than when a threshold is crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub backend: Backend,
    pub window: Window,
    pub frequency: Frequency,
    pub queries: Vec<Query>,
    pub operator: Operator,
    pub aggregation: Aggregation,
    pub threshold: f64,
    /// Free-form query expression vs. structured target + filters.
    #[serde(default)]
    pub arbitrary: bool,
    #[serde(default)]
    pub no_data: bool,
    /// Monitored resources this rule is scoped to. Empty means the rule is
    /// evaluated once, unscoped.
    #[serde(default)]
    pub resource_ids: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn is_arbitrary(&self) -> bool {
        self.arbitrary
    }

    pub fn primary_query(&self) -> Option<&Query> {
        self.queries.first()
    }

    /// Apply the rule's default operator/aggregation/threshold to a query.
    pub fn resolve(&self, query: &Query) -> ResolvedQuery {
        ResolvedQuery {
            target: query.target.clone(),
            filters: query.filters.clone(),
            operator: query.operator.unwrap_or(self.operator),
            aggregation: query.aggregation.unwrap_or(self.aggregation),
            threshold: query.threshold.unwrap_or(self.threshold),
        }
    }
}

/// Result of a single backend query, mirroring the plugin contract
/// `(value, triggered)` with `(None, None)` meaning no usable datapoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub value: Option<f64>,
    pub triggered: Option<bool>,
}

impl QueryOutcome {
    pub fn evaluated(value: f64, triggered: bool) -> Self {
        Self {
            value: Some(value),
            triggered: Some(triggered),
        }
    }

    pub fn no_data() -> Self {
        Self {
            value: None,
            triggered: None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.value.is_none() && self.triggered.is_none()
    }
}

/// Per-cycle output of one rule evaluation. Not persisted by the engine;
/// handed to the notification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub rule_id: String,
    pub resource_id: Option<String>,
    pub value: Option<f64>,
    /// Tri-state: `Some(true)` triggered, `Some(false)` not triggered,
    /// `None` no-data.
    pub triggered: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn is_triggered(&self) -> bool {
        self.triggered == Some(true)
    }

    /// Whether this result reflects a no-data observation: either the
    /// backend returned nothing, or a no-data rule fired (triggered with
    /// no representative value).
    pub fn is_no_data(&self) -> bool {
        self.value.is_none()
    }
}

/// Per-cycle accumulator of no-data observations across the rule and
/// machine populations. Reset at the start of each evaluation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoDataTally {
    nodata_rules: HashSet<String>,
    total_rules: HashSet<String>,
    nodata_machines: HashSet<String>,
    total_machines: HashSet<String>,
}

impl NoDataTally {
    pub fn observe(&mut self, rule_id: &str, resource_id: Option<&str>, no_data: bool) {
        self.total_rules.insert(rule_id.to_string());
        if no_data {
            self.nodata_rules.insert(rule_id.to_string());
        }
        if let Some(rid) = resource_id {
            self.total_machines.insert(rid.to_string());
            if no_data {
                self.nodata_machines.insert(rid.to_string());
            }
        }
    }

    pub fn rules_ratio(&self) -> f64 {
        ratio(self.nodata_rules.len(), self.total_rules.len())
    }

    pub fn machines_ratio(&self) -> f64 {
        ratio(self.nodata_machines.len(), self.total_machines.len())
    }

    pub fn nodata_rules(&self) -> usize {
        self.nodata_rules.len()
    }

    pub fn total_rules(&self) -> usize {
        self.total_rules.len()
    }

    pub fn nodata_machines(&self) -> usize {
        self.nodata_machines.len()
    }

    pub fn total_machines(&self) -> usize {
        self.total_machines.len()
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_check_covers_all_kinds() {
        assert!(Operator::Gt.check(2.0, 1.0));
        assert!(!Operator::Gt.check(1.0, 1.0));
        assert!(Operator::Ge.check(1.0, 1.0));
        assert!(Operator::Lt.check(0.5, 1.0));
        assert!(Operator::Le.check(1.0, 1.0));
        assert!(Operator::Eq.check(1.0, 1.0));
        assert!(Operator::Ne.check(1.5, 1.0));
    }

    #[test]
    fn period_parsing_and_display_round_trip() {
        let p: Period = "minutes".parse().unwrap();
        assert_eq!(p, Period::Minutes);
        assert_eq!(p.short(), "m");
        assert_eq!(p.to_string(), "minutes");
        assert!("fortnights".parse::<Period>().is_err());
    }

    #[test]
    fn window_duration_ignores_stop_offset() {
        let w = Window {
            start: 10,
            stop: 2,
            period: Period::Minutes,
        };
        assert_eq!(w.duration(), Duration::from_secs(600));
    }

    #[test]
    fn resolve_applies_rule_defaults_and_overrides() {
        let rule = sample_rule();
        let resolved = rule.resolve(&rule.queries[0]);
        assert_eq!(resolved.operator, Operator::Gt);
        assert_eq!(resolved.threshold, 90.0);

        let mut q = rule.queries[0].clone();
        q.operator = Some(Operator::Lt);
        q.threshold = Some(5.0);
        let resolved = rule.resolve(&q);
        assert_eq!(resolved.operator, Operator::Lt);
        assert_eq!(resolved.threshold, 5.0);
        assert_eq!(resolved.aggregation, Aggregation::Avg);
    }

    #[test]
    fn tally_ratios_count_distinct_rules_and_machines() {
        let mut tally = NoDataTally::default();
        tally.observe("r1", Some("m1"), true);
        tally.observe("r1", Some("m1"), true); // duplicate observation
        tally.observe("r2", Some("m2"), false);
        tally.observe("r3", Some("m3"), true);
        tally.observe("r4", None, false);

        assert_eq!(tally.total_rules(), 4);
        assert_eq!(tally.nodata_rules(), 2);
        assert_eq!(tally.total_machines(), 3);
        assert_eq!(tally.nodata_machines(), 2);
        assert_eq!(tally.rules_ratio(), 0.5);
        assert!((tally.machines_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tally_has_zero_ratios() {
        let tally = NoDataTally::default();
        assert_eq!(tally.rules_ratio(), 0.0);
        assert_eq!(tally.machines_ratio(), 0.0);
    }

    fn sample_rule() -> Rule {
        Rule {
            id: "rule-1".into(),
            owner_id: "owner-1".into(),
            title: "High CPU".into(),
            backend: Backend::Graphite,
            window: Window {
                start: 1,
                stop: 0,
                period: Period::Minutes,
            },
            frequency: Frequency {
                every: 60,
                period: Period::Seconds,
            },
            queries: vec![Query {
                target: "cpu.user".into(),
                filters: HashMap::new(),
                operator: None,
                aggregation: None,
                threshold: None,
            }],
            operator: Operator::Gt,
            aggregation: Aggregation::Avg,
            threshold: 90.0,
            arbitrary: false,
            no_data: false,
            resource_ids: vec![],
            enabled: true,
        }
    }
}
