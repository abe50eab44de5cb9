use crate::dispatch::task::Severity;
use crate::event::NormalizedEvent;
use std::fmt;
use std::sync::Arc;

/// The predicate signature for a `custom` [`Condition`]. Exceptions
/// (panics) are caught at the evaluation boundary and counted as
/// non-fires (spec.md §4.4).
pub type CustomPredicate = Arc<dyn Fn(&NormalizedEvent) -> bool + Send + Sync>;

/// The four condition kinds of spec.md §3/§4.4. Unknown condition kinds
/// (not representable here, since this is a closed Rust enum) never
/// fire by construction.
#[derive(Clone)]
pub enum Condition {
    PositionSize,
    AggregateVolume,
    Frequency,
    Custom(CustomPredicate),
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Condition::PositionSize => "position-size",
            Condition::AggregateVolume => "aggregate-volume",
            Condition::Frequency => "frequency",
            Condition::Custom(_) => "custom",
        };
        write!(f, "{s}")
    }
}

/// A declarative rule record (spec.md §3).
#[derive(Clone, Debug)]
pub struct Rule {
    pub name: String,
    pub enabled: bool,
    pub severity: Severity,
    pub condition: Condition,
    pub threshold: f64,
    pub time_window_seconds: Option<u64>,
}

impl Rule {
    pub fn new(name: impl Into<String>, severity: Severity, condition: Condition, threshold: f64) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            severity,
            condition,
            threshold,
            time_window_seconds: None,
        }
    }

    pub fn with_window(mut self, seconds: u64) -> Self {
        self.time_window_seconds = Some(seconds);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Per-rule running statistics (spec.md §4.4).
#[derive(Clone, Copy, Default, Debug)]
pub struct RuleStats {
    pub triggered_count: u64,
    pub total_considered: u64,
    pub last_triggered_at: Option<std::time::Instant>,
}

impl RuleStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_considered == 0 {
            0.0
        } else {
            self.triggered_count as f64 / self.total_considered as f64
        }
    }
}
