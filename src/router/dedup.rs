use std::collections::HashMap;
use std::time::{Duration, Instant};

const SWEEP_AFTER: Duration = Duration::from_secs(60);

/// Bounded mapping from fingerprint to last-seen timestamp (spec.md
/// §4.2.7). Entries older than 60 seconds are swept opportunistically
/// on each check, rather than on a separate timer.
pub struct DedupTable {
    window: Duration,
    last_swept: Instant,
    seen: HashMap<String, Instant>,
}

impl DedupTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_swept: Instant::now(),
            seen: HashMap::new(),
        }
    }

    /// Returns `true` if `fingerprint` was not seen within the
    /// rejection window (and records it), `false` if it is a duplicate.
    pub fn check_and_record(&mut self, fingerprint: String, now: Instant) -> bool {
        self.maybe_sweep(now);

        if let Some(last_seen) = self.seen.get(&fingerprint) {
            if now.duration_since(*last_seen) < self.window {
                return false;
            }
        }

        self.seen.insert(fingerprint, now);
        true
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_swept) < SWEEP_AFTER {
            return;
        }
        self.seen.retain(|_, last_seen| now.duration_since(*last_seen) < SWEEP_AFTER);
        self.last_swept = now;
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_duplicate_within_window() {
        let mut table = DedupTable::new(Duration::from_secs(30));
        let now = Instant::now();

        assert!(table.check_and_record("fp1".to_string(), now));
        assert!(!table.check_and_record("fp1".to_string(), now + Duration::from_secs(10)));
    }

    #[test]
    fn test_allows_repeat_after_window_elapses() {
        let mut table = DedupTable::new(Duration::from_secs(30));
        let now = Instant::now();

        assert!(table.check_and_record("fp1".to_string(), now));
        assert!(table.check_and_record("fp1".to_string(), now + Duration::from_secs(31)));
    }

    #[test]
    fn test_distinct_fingerprints_independent() {
        let mut table = DedupTable::new(Duration::from_secs(30));
        let now = Instant::now();

        assert!(table.check_and_record("fp1".to_string(), now));
        assert!(table.check_and_record("fp2".to_string(), now));
    }

    #[test]
    fn test_sweep_evicts_entries_older_than_60s() {
        let mut table = DedupTable::new(Duration::from_secs(30));
        let now = Instant::now();

        table.check_and_record("fp1".to_string(), now);
        assert_eq!(table.len(), 1);

        table.check_and_record("fp2".to_string(), now + Duration::from_secs(61));
        assert_eq!(table.len(), 1);
    }
}
