use crate::account::AccountId;
use crate::dispatch::task::Severity;
use crate::error::RuleError;
use crate::event::NormalizedEvent;
use crate::rules::rule::{Condition, Rule, RuleStats};
use bounded_vec_deque::BoundedVecDeque;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// `(rule, event)` produced by the rules engine (spec.md §3).
#[derive(Clone, Debug)]
pub struct TriggeredAlert {
    pub rule_name: String,
    pub severity: Severity,
    pub account: AccountId,
    pub event: NormalizedEvent,
    pub fired_at: Instant,
}

/// Evaluates an ordered, mutable rule set against each normalised event
/// (spec.md §4.4). Owns the bounded event ring and per-rule statistics;
/// single-threaded by design (events are processed serially).
pub struct RulesEngine {
    rules: Vec<Rule>,
    ring: BoundedVecDeque<NormalizedEvent>,
    stats: HashMap<String, RuleStats>,
}

impl RulesEngine {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            rules: Vec::new(),
            ring: BoundedVecDeque::new(ring_capacity),
            stats: HashMap::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.stats.entry(rule.name.clone()).or_default();
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.rules.retain(|rule| rule.name != name);
        self.stats.remove(name);
    }

    pub fn enable_rule(&mut self, name: &str) {
        if let Some(rule) = self.rules.iter_mut().find(|rule| rule.name == name) {
            rule.enabled = true;
        }
    }

    pub fn disable_rule(&mut self, name: &str) {
        if let Some(rule) = self.rules.iter_mut().find(|rule| rule.name == name) {
            rule.enabled = false;
        }
    }

    pub fn rule_stats(&self, name: &str) -> Option<RuleStats> {
        self.stats.get(name).copied()
    }

    /// Evaluate every enabled rule against `event` in declaration order,
    /// then push `event` onto the ring. Rules never short-circuit each
    /// other (spec.md §4.4).
    pub fn evaluate(&mut self, event: NormalizedEvent) -> Vec<TriggeredAlert> {
        let now = event.observed_at;
        let mut alerts = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }

            let stats = self.stats.entry(rule.name.clone()).or_default();
            stats.total_considered += 1;

            let fires = match &rule.condition {
                Condition::PositionSize => event.usd_value.map(|v| v >= rule.threshold).unwrap_or(false),
                Condition::AggregateVolume => {
                    Self::aggregate_volume_fires(&self.ring, &event, rule.time_window_seconds, rule.threshold, now)
                }
                Condition::Frequency => {
                    Self::frequency_fires(&self.ring, &event, rule.time_window_seconds, rule.threshold, now)
                }
                Condition::Custom(predicate) => {
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| predicate(&event))) {
                        Ok(result) => result,
                        Err(payload) => {
                            let message = payload
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| payload.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "unknown panic payload".to_string());
                            let err = RuleError(message);
                            warn!(rule = %rule.name, %err, "custom rule predicate panicked; treating as non-fire");
                            false
                        }
                    }
                }
            };

            if fires {
                stats.triggered_count += 1;
                stats.last_triggered_at = Some(now);
                debug!(rule = %rule.name, account = %event.account, "rule fired");
                alerts.push(TriggeredAlert {
                    rule_name: rule.name.clone(),
                    severity: rule.severity,
                    account: event.account.clone(),
                    event: event.clone(),
                    fired_at: now,
                });
            }
        }

        self.ring.push_back(event);
        alerts
    }

    /// Sum of `usd_value` across ring events (including the current
    /// event) observed within `window_seconds` of `now`.
    fn aggregate_volume_fires(
        ring: &BoundedVecDeque<NormalizedEvent>,
        event: &NormalizedEvent,
        window_seconds: Option<u64>,
        threshold: f64,
        now: Instant,
    ) -> bool {
        let Some(window_seconds) = window_seconds else {
            return false;
        };
        let window = Duration::from_secs(window_seconds);

        let mut total = event.usd_value.unwrap_or(0.0);
        for past in ring.iter() {
            if now.saturating_duration_since(past.observed_at) < window {
                total += past.usd_value.unwrap_or(0.0);
            }
        }

        total >= threshold
    }

    /// Count of ring events (including the current event) for the same
    /// account, observed within `window_seconds` of `now`.
    fn frequency_fires(
        ring: &BoundedVecDeque<NormalizedEvent>,
        event: &NormalizedEvent,
        window_seconds: Option<u64>,
        threshold: f64,
        now: Instant,
    ) -> bool {
        let Some(window_seconds) = window_seconds else {
            return false;
        };
        let window = Duration::from_secs(window_seconds);

        let mut count = 1u64; // the current event
        for past in ring.iter() {
            if past.account == event.account && now.saturating_duration_since(past.observed_at) < window {
                count += 1;
            }
        }

        count as f64 >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FrameKind;
    use serde_json::json;

    fn event(account: &str, usd_value: f64, observed_at: Instant) -> NormalizedEvent {
        NormalizedEvent {
            kind: FrameKind::Fills,
            account: AccountId::from(account),
            coin: Some("BTC".to_string()),
            side: None,
            price: None,
            size: None,
            usd_value: Some(usd_value),
            observed_at,
            raw: json!({}),
        }
    }

    #[test]
    fn test_position_size_fires_at_threshold() {
        // Scenario 1: BTC buy 25@50000 -> usd_value 1_250_000, large_position threshold 100_000.
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new(
            "large_position",
            Severity::High,
            Condition::PositionSize,
            100_000.0,
        ));

        let alerts = engine.evaluate(event("0xabc", 1_250_000.0, Instant::now()));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_name, "large_position");
    }

    #[test]
    fn test_position_size_does_not_fire_below_threshold() {
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("r", Severity::High, Condition::PositionSize, 100_000.0));
        let alerts = engine.evaluate(event("0xabc", 99_999.0, Instant::now()));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_disabled_rule_never_fires() {
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("r", Severity::High, Condition::PositionSize, 1.0).disabled());
        let alerts = engine.evaluate(event("0xabc", 1_000_000.0, Instant::now()));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_frequency_fires_on_tenth_and_subsequent() {
        // Scenario 6: 12 events @ usd_value=5000 from account B within 60s,
        // frequency(threshold=10, window=60s) fires on the 10th and each
        // subsequent event.
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("freq", Severity::Medium, Condition::Frequency, 10.0).with_window(60));

        let start = Instant::now();
        let mut fire_count = 0;
        for i in 0..12 {
            let alerts = engine.evaluate(event("B", 5000.0, start + Duration::from_millis(i * 10)));
            if !alerts.is_empty() {
                fire_count += 1;
            }
        }
        // Fires on events 10, 11, 12 (0-indexed 9, 10, 11) => 3 fires.
        assert_eq!(fire_count, 3);
    }

    #[test]
    fn test_aggregate_volume_includes_current_event() {
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("agg", Severity::Critical, Condition::AggregateVolume, 100.0).with_window(60));

        let start = Instant::now();
        // First event alone is below threshold.
        let alerts = engine.evaluate(event("0xabc", 60.0, start));
        assert!(alerts.is_empty());

        // Second event pushes the window sum (60 + 60 = 120) over threshold.
        let alerts = engine.evaluate(event("0xabc", 60.0, start + Duration::from_secs(1)));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_custom_predicate_exception_counts_as_non_fire() {
        let mut engine = RulesEngine::new(1000);
        let predicate: super::super::rule::CustomPredicate = std::sync::Arc::new(|_event| panic!("boom"));
        engine.add_rule(Rule::new("custom", Severity::Low, Condition::Custom(predicate), 0.0));

        let alerts = engine.evaluate(event("0xabc", 1.0, Instant::now()));
        assert!(alerts.is_empty());
        let stats = engine.rule_stats("custom").unwrap();
        assert_eq!(stats.total_considered, 1);
        assert_eq!(stats.triggered_count, 0);
    }

    #[test]
    fn test_rule_does_not_shortcut_subsequent_rules() {
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("first", Severity::High, Condition::PositionSize, 1.0));
        engine.add_rule(Rule::new("second", Severity::Low, Condition::PositionSize, 1.0));

        let alerts = engine.evaluate(event("0xabc", 1_000_000.0, Instant::now()));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].rule_name, "first");
        assert_eq!(alerts[1].rule_name, "second");
    }

    #[test]
    fn test_mutation_effective_next_event() {
        let mut engine = RulesEngine::new(1000);
        engine.add_rule(Rule::new("r", Severity::High, Condition::PositionSize, 1.0));
        engine.disable_rule("r");

        let alerts = engine.evaluate(event("0xabc", 1_000_000.0, Instant::now()));
        assert!(alerts.is_empty());

        engine.enable_rule("r");
        let alerts = engine.evaluate(event("0xabc", 1_000_000.0, Instant::now()));
        assert_eq!(alerts.len(), 1);
    }
}
