use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use vigil_common::types::{EvaluationResult, NoDataTally};

use crate::config::SuppressionSettings;

/// Immutable suppression settings resolved at construction.
#[derive(Debug, Clone)]
pub struct SuppressionConfig {
    pub enabled: bool,
    pub buffer_period: Duration,
    pub rules_ratio: f64,
    pub machines_ratio: f64,
    pub action_base_url: String,
}

impl From<&SuppressionSettings> for SuppressionConfig {
    fn from(settings: &SuppressionSettings) -> Self {
        Self {
            enabled: settings.enabled,
            buffer_period: Duration::seconds(settings.buffer_period_secs as i64),
            rules_ratio: settings.rules_ratio,
            machines_ratio: settings.machines_ratio,
            action_base_url: settings.action_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// The one summary alert emitted in place of a burst of individual
/// no-data alerts.
#[derive(Debug, Clone, Serialize)]
pub struct SuppressedSummary {
    pub batch_id: String,
    pub nodata_rules: usize,
    pub total_rules: usize,
    pub rules_percentage: f64,
    pub nodata_machines: usize,
    pub total_machines: usize,
    pub machines_percentage: f64,
    /// Deletes and forgets every suppressed alert in this batch.
    pub delete_action: String,
    /// Re-arms normal per-rule alerting; held alerts fire again if their
    /// rules re-trigger on the next evaluation cycle.
    pub unsuppress_action: String,
}

/// Decides when a burst of no-data alerts should collapse into one
/// suppressed-summary alert.
///
/// Fed exactly one [`NoDataTally`] snapshot per completed evaluation cycle;
/// ratios are never re-derived per individual rule result. Suppression
/// engages when both ratios stay above their thresholds for the whole
/// buffer period, and disengages after one full buffer period below.
pub struct NoDataSuppressionController {
    config: SuppressionConfig,
    suppressed: bool,
    above_since: Option<DateTime<Utc>>,
    below_since: Option<DateTime<Utc>>,
    held: Vec<EvaluationResult>,
}

impl NoDataSuppressionController {
    pub fn new(config: SuppressionConfig) -> Self {
        Self {
            config,
            suppressed: false,
            above_since: None,
            below_since: None,
            held: Vec::new(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Record an individual no-data alert held back while suppressed.
    pub fn hold(&mut self, result: EvaluationResult) {
        self.held.push(result);
    }

    /// Consume the cycle's tally snapshot. Returns the summary alert when
    /// this cycle flips the controller into the suppressed state.
    pub fn observe_cycle(
        &mut self,
        tally: &NoDataTally,
        now: DateTime<Utc>,
    ) -> Option<SuppressedSummary> {
        if !self.config.enabled {
            return None;
        }

        let above = tally.rules_ratio() > self.config.rules_ratio
            && tally.machines_ratio() > self.config.machines_ratio;

        if above {
            self.below_since = None;
            if self.suppressed {
                return None;
            }
            match self.above_since {
                None => {
                    self.above_since = Some(now);
                    None
                }
                Some(since) if now - since >= self.config.buffer_period => {
                    self.suppressed = true;
                    self.above_since = None;
                    let summary = self.summary(tally);
                    tracing::warn!(
                        batch_id = %summary.batch_id,
                        nodata_rules = summary.nodata_rules,
                        total_rules = summary.total_rules,
                        nodata_machines = summary.nodata_machines,
                        total_machines = summary.total_machines,
                        "no-data alert burst suppressed"
                    );
                    Some(summary)
                }
                Some(_) => None,
            }
        } else {
            self.above_since = None;
            if !self.suppressed {
                self.below_since = None;
                return None;
            }
            match self.below_since {
                None => {
                    self.below_since = Some(now);
                    None
                }
                Some(since) if now - since >= self.config.buffer_period => {
                    tracing::info!(held = self.held.len(), "no-data suppression lifted");
                    self.suppressed = false;
                    self.below_since = None;
                    self.held.clear();
                    None
                }
                Some(_) => None,
            }
        }
    }

    /// Delete and forget every held alert in the current batch. Idempotent.
    pub fn delete_suppressed(&mut self) -> usize {
        let dropped = self.held.len();
        self.held.clear();
        dropped
    }

    /// Re-arm normal per-rule alerting. Held alerts are discarded; their
    /// rules will alert again if re-triggered next cycle. Idempotent.
    pub fn unsuppress(&mut self) {
        self.suppressed = false;
        self.above_since = None;
        self.below_since = None;
        self.held.clear();
    }

    fn summary(&self, tally: &NoDataTally) -> SuppressedSummary {
        let batch_id = vigil_common::id::next_id();
        let base = &self.config.action_base_url;
        SuppressedSummary {
            delete_action: format!("{base}/suppressed/{batch_id}/delete"),
            unsuppress_action: format!("{base}/suppressed/{batch_id}/unsuppress"),
            batch_id,
            nodata_rules: tally.nodata_rules(),
            total_rules: tally.total_rules(),
            rules_percentage: tally.rules_ratio() * 100.0,
            nodata_machines: tally.nodata_machines(),
            total_machines: tally.total_machines(),
            machines_percentage: tally.machines_ratio() * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(enabled: bool) -> SuppressionConfig {
        SuppressionConfig {
            enabled,
            buffer_period: Duration::seconds(45),
            rules_ratio: 0.2,
            machines_ratio: 0.2,
            action_base_url: "http://portal".into(),
        }
    }

    /// 55/200 rules and 30/100 machines in no-data, above the 20% defaults.
    fn stormy_tally() -> NoDataTally {
        let mut tally = NoDataTally::default();
        for i in 0..100 {
            let machine = format!("m{i}");
            tally.observe(&format!("r{i}"), Some(&machine), i < 30);
            tally.observe(&format!("s{i}"), Some(&machine), i < 25);
        }
        tally
    }

    fn quiet_tally() -> NoDataTally {
        let mut tally = NoDataTally::default();
        for i in 0..100 {
            let machine = format!("m{i}");
            tally.observe(&format!("r{i}"), Some(&machine), i < 5);
        }
        tally
    }

    #[test]
    fn activates_after_buffer_period_above_thresholds() {
        let mut controller = NoDataSuppressionController::new(config(true));
        let start = Utc::now();

        assert!(controller.observe_cycle(&stormy_tally(), start).is_none());
        assert!(!controller.is_suppressed());

        // Still inside the buffer period.
        assert!(controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(30))
            .is_none());

        let summary = controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(45))
            .expect("suppression should engage after the buffer period");
        assert!(controller.is_suppressed());
        assert_eq!(summary.nodata_rules, 55);
        assert_eq!(summary.total_rules, 200);
        assert_eq!(summary.nodata_machines, 30);
        assert_eq!(summary.total_machines, 100);
        assert!(summary.delete_action.contains(&summary.batch_id));
        assert!(summary.unsuppress_action.contains(&summary.batch_id));
    }

    #[test]
    fn a_dip_below_thresholds_resets_the_buffer() {
        let mut controller = NoDataSuppressionController::new(config(true));
        let start = Utc::now();

        controller.observe_cycle(&stormy_tally(), start);
        controller.observe_cycle(&quiet_tally(), start + Duration::seconds(30));
        // The storm resumes; the 45s clock starts over.
        controller.observe_cycle(&stormy_tally(), start + Duration::seconds(40));
        assert!(controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(60))
            .is_none());
        assert!(controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(85))
            .is_some());
    }

    #[test]
    fn deactivates_after_one_clean_buffer_period() {
        let mut controller = NoDataSuppressionController::new(config(true));
        let start = Utc::now();

        controller.observe_cycle(&stormy_tally(), start);
        controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(45))
            .expect("should suppress");

        controller.hold(held_result());
        assert_eq!(controller.held_count(), 1);

        // Ratios drop; suppression stays on through the buffer period.
        controller.observe_cycle(&quiet_tally(), start + Duration::seconds(60));
        assert!(controller.is_suppressed());
        controller.observe_cycle(&quiet_tally(), start + Duration::seconds(105));
        assert!(!controller.is_suppressed());
        assert_eq!(controller.held_count(), 0);
    }

    #[test]
    fn requires_both_ratios_above_threshold() {
        let mut controller = NoDataSuppressionController::new(config(true));
        let start = Utc::now();

        // Rules ratio is high but machines ratio stays at zero.
        let mut tally = NoDataTally::default();
        for i in 0..10 {
            tally.observe(&format!("r{i}"), None, i < 5);
        }
        controller.observe_cycle(&tally, start);
        assert!(controller
            .observe_cycle(&tally, start + Duration::seconds(90))
            .is_none());
        assert!(!controller.is_suppressed());
    }

    #[test]
    fn disabled_controller_never_suppresses() {
        let mut controller = NoDataSuppressionController::new(config(false));
        let start = Utc::now();
        controller.observe_cycle(&stormy_tally(), start);
        assert!(controller
            .observe_cycle(&stormy_tally(), start + Duration::seconds(300))
            .is_none());
        assert!(!controller.is_suppressed());
    }

    #[test]
    fn actions_are_idempotent() {
        let mut controller = NoDataSuppressionController::new(config(true));
        let start = Utc::now();
        controller.observe_cycle(&stormy_tally(), start);
        controller.observe_cycle(&stormy_tally(), start + Duration::seconds(45));

        controller.hold(held_result());
        assert_eq!(controller.delete_suppressed(), 1);
        assert_eq!(controller.delete_suppressed(), 0);
        assert!(controller.is_suppressed());

        controller.unsuppress();
        assert!(!controller.is_suppressed());
        controller.unsuppress();
        assert!(!controller.is_suppressed());
        assert_eq!(controller.held_count(), 0);
    }

    fn held_result() -> EvaluationResult {
        EvaluationResult {
            rule_id: "r1".into(),
            resource_id: Some("m1".into()),
            value: None,
            triggered: Some(true),
            timestamp: Utc::now(),
        }
    }
}
