use crate::dispatch::channel::ChannelKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Running counters for one channel (spec.md §4.5 "Stats").
#[derive(Default)]
struct ChannelCounters {
    sends_attempted: AtomicU64,
    sends_succeeded: AtomicU64,
    sends_failed: AtomicU64,
    sends_retried: AtomicU64,
    rate_limit_deferred: AtomicU64,
    total_latency_micros: AtomicU64,
}

/// Point-in-time snapshot of a channel's counters, suitable for display
/// or export (an actual export surface is out of scope per spec.md §1).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelStats {
    pub sends_attempted: u64,
    pub sends_succeeded: u64,
    pub sends_failed: u64,
    pub sends_retried: u64,
    pub rate_limit_deferred: u64,
    pub average_latency: Duration,
}

/// Upstream session statistics (spec.md §4.1 "stats()").
#[derive(Default)]
struct UpstreamCounters {
    total_frames: AtomicU64,
    reconnect_count: AtomicU64,
    consecutive_failures: AtomicU64,
    failed_parses: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpstreamStats {
    pub connected: bool,
    pub total_frames: u64,
    pub reconnect_count: u64,
    pub consecutive_failures: u64,
    pub failed_parses: u64,
    pub time_since_last_frame: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    upstream: UpstreamCounters,
    upstream_connected: std::sync::atomic::AtomicBool,
    last_frame_at: Mutex<Option<Instant>>,
    channels: Mutex<HashMap<ChannelKind, ChannelCounters>>,
    dedup_rejections: AtomicU64,
    router_drops: AtomicU64,
}

/// Explicitly injected metrics sink (spec.md §9's Design Note: "prefer
/// explicit injection... one metrics sink passed into each component").
/// Restored from `utils/metrics.py`'s process-wide collector, but built
/// once at startup and handed to components by reference rather than
/// reached for as a singleton.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_received(&self) {
        self.inner.upstream.total_frames.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_frame_at.lock().expect("metrics mutex poisoned") = Some(Instant::now());
    }

    pub fn record_reconnect(&self) {
        self.inner.upstream.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_consecutive_failures(&self, value: u64) {
        self.inner.upstream.consecutive_failures.store(value, Ordering::Relaxed);
    }

    pub fn record_failed_parse(&self) {
        self.inner.upstream.failed_parses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.upstream_connected.store(connected, Ordering::Relaxed);
    }

    pub fn record_dedup_rejection(&self) {
        self.inner.dedup_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_router_drop(&self) {
        self.inner.router_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_stats(&self) -> UpstreamStats {
        let last_frame_at = *self.inner.last_frame_at.lock().expect("metrics mutex poisoned");
        UpstreamStats {
            connected: self.inner.upstream_connected.load(Ordering::Relaxed),
            total_frames: self.inner.upstream.total_frames.load(Ordering::Relaxed),
            reconnect_count: self.inner.upstream.reconnect_count.load(Ordering::Relaxed),
            consecutive_failures: self.inner.upstream.consecutive_failures.load(Ordering::Relaxed),
            failed_parses: self.inner.upstream.failed_parses.load(Ordering::Relaxed),
            time_since_last_frame: last_frame_at.map(|at| at.elapsed()),
        }
    }

    fn channel_counters(&self, channel: ChannelKind) -> std::sync::MutexGuard<'_, HashMap<ChannelKind, ChannelCounters>> {
        let mut guard = self.inner.channels.lock().expect("metrics mutex poisoned");
        guard.entry(channel).or_default();
        guard
    }

    pub fn record_send_attempted(&self, channel: ChannelKind) {
        let guard = self.channel_counters(channel);
        guard[&channel].sends_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_succeeded(&self, channel: ChannelKind, latency: Duration) {
        let guard = self.channel_counters(channel);
        let counters = &guard[&channel];
        counters.sends_succeeded.fetch_add(1, Ordering::Relaxed);
        counters
            .total_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_send_failed(&self, channel: ChannelKind) {
        let guard = self.channel_counters(channel);
        guard[&channel].sends_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_retried(&self, channel: ChannelKind) {
        let guard = self.channel_counters(channel);
        guard[&channel].sends_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_deferred(&self, channel: ChannelKind) {
        let guard = self.channel_counters(channel);
        guard[&channel].rate_limit_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_stats(&self, channel: ChannelKind) -> ChannelStats {
        let guard = self.inner.channels.lock().expect("metrics mutex poisoned");
        let Some(counters) = guard.get(&channel) else {
            return ChannelStats::default();
        };

        let succeeded = counters.sends_succeeded.load(Ordering::Relaxed);
        let total_latency = counters.total_latency_micros.load(Ordering::Relaxed);
        let average_latency = if succeeded > 0 {
            Duration::from_micros(total_latency / succeeded)
        } else {
            Duration::ZERO
        };

        ChannelStats {
            sends_attempted: counters.sends_attempted.load(Ordering::Relaxed),
            sends_succeeded: succeeded,
            sends_failed: counters.sends_failed.load(Ordering::Relaxed),
            sends_retried: counters.sends_retried.load(Ordering::Relaxed),
            rate_limit_deferred: counters.rate_limit_deferred.load(Ordering::Relaxed),
            average_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_stats_tracks_attempts_and_successes() {
        let metrics = Metrics::new();
        metrics.record_send_attempted(ChannelKind::Discord);
        metrics.record_send_attempted(ChannelKind::Discord);
        metrics.record_send_succeeded(ChannelKind::Discord, Duration::from_millis(100));

        let stats = metrics.channel_stats(ChannelKind::Discord);
        assert_eq!(stats.sends_attempted, 2);
        assert_eq!(stats.sends_succeeded, 1);
        assert_eq!(stats.average_latency, Duration::from_millis(100));
    }

    #[test]
    fn test_upstream_stats_tracks_reconnects() {
        let metrics = Metrics::new();
        metrics.record_reconnect();
        metrics.record_reconnect();
        metrics.set_consecutive_failures(4);

        let stats = metrics.upstream_stats();
        assert_eq!(stats.reconnect_count, 2);
        assert_eq!(stats.consecutive_failures, 4);
    }
}
