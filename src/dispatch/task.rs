use crate::account::AccountId;
use crate::dispatch::channel::ChannelKind;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// Alert severity, mapped to dispatch priority per spec.md §4.5.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }
}

/// A unit of delivery for one channel, subject to rate limiting and
/// retry (spec.md §3's "Dispatch task").
#[derive(Clone, Debug)]
pub struct DispatchTask {
    pub channel: ChannelKind,
    pub account: AccountId,
    pub severity: Severity,
    pub payload: String,
    pub attempt_count: u32,
    pub next_attempt_at: Instant,
    pub created_at: Instant,
}

impl DispatchTask {
    pub fn new(channel: ChannelKind, account: AccountId, severity: Severity, payload: String) -> Self {
        let now = Instant::now();
        Self {
            channel,
            account,
            severity,
            payload,
            attempt_count: 0,
            next_attempt_at: now,
            created_at: now,
        }
    }

    /// `next_attempt_at = now + base_delay * 2^attempt_count`, evaluated
    /// against the attempt count *before* incrementing so the first
    /// retry waits exactly `base_delay` (spec.md §4.5.5, scenario 4:
    /// delays of 5s, 10s, 20s for `base_delay=5s`).
    pub fn schedule_retry(&mut self, base_delay: Duration) {
        let backoff = base_delay.saturating_mul(1 << self.attempt_count.min(16));
        self.attempt_count += 1;
        self.next_attempt_at = Instant::now() + backoff;
    }

    pub fn is_terminally_failed(&self, max_attempts: u32) -> bool {
        self.attempt_count > max_attempts
    }

    /// Rate-limiter partition key: full account identifier, not an
    /// 8-character prefix (Open Question resolved in DESIGN.md).
    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}", self.channel, self.account)
    }
}

/// Ordering for the priority queue: higher severity first, then FIFO by
/// creation time (spec.md §4.4's "within a single event, triggered
/// alerts are emitted... in rule-declaration order" extends naturally
/// to cross-event FIFO within the same priority tier).
impl PartialEq for DispatchTask {
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity && self.created_at == other.created_at
    }
}
impl Eq for DispatchTask {}

impl PartialOrd for DispatchTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DispatchTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity
            .priority()
            .cmp(&other.severity.priority())
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}
