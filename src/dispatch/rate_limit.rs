use bounded_vec_deque::BoundedVecDeque;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One of the three admission strategies a channel may be configured
/// with (spec.md §4.5).
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    FixedWindow { window_s: u64, max_requests: u32 },
    SlidingWindow { window_s: u64, max_requests: u32 },
    TokenBucket { burst_capacity: u32, refill_rate: f64 },
}

impl RateLimitStrategy {
    pub fn discord_default() -> Self {
        RateLimitStrategy::SlidingWindow {
            window_s: 60,
            max_requests: 10,
        }
    }

    pub fn telegram_default() -> Self {
        RateLimitStrategy::SlidingWindow {
            window_s: 60,
            max_requests: 20,
        }
    }

    pub fn email_default() -> Self {
        RateLimitStrategy::TokenBucket {
            burst_capacity: 5,
            refill_rate: 0.1,
        }
    }

    pub fn webhook_default() -> Self {
        RateLimitStrategy::SlidingWindow {
            window_s: 60,
            max_requests: 30,
        }
    }
}

/// Per-key admission state. One instance exists per `(channel,
/// account)` partition key, per the Open Question resolved in
/// DESIGN.md: the full account identifier is used as the key rather
/// than an 8-character prefix, to avoid the collision risk spec.md §9
/// calls out.
#[derive(Debug)]
enum KeyState {
    Window {
        sends: BoundedVecDeque<Instant>,
    },
    TokenBucket {
        tokens: f64,
        last_refill: Instant,
    },
}

/// Result of an admission test.
#[derive(Debug, PartialEq)]
pub enum Admission {
    Admitted,
    Wait(Duration),
}

/// Governs admission for a single channel across all of its
/// `(channel, account)` partitions, per spec.md §4.5.
#[derive(Debug)]
pub struct RateLimiter {
    strategy: RateLimitStrategy,
    state: HashMap<String, KeyState>,
}

impl RateLimiter {
    pub fn new(strategy: RateLimitStrategy) -> Self {
        Self {
            strategy,
            state: HashMap::new(),
        }
    }

    /// Test admission for `key` at `now`. On [`Admission::Admitted`] the
    /// send is recorded immediately (a channel worker calling this once
    /// per attempted send is therefore sufficient; no separate
    /// `record_send` call is required).
    pub fn try_admit(&mut self, key: &str, now: Instant) -> Admission {
        match self.strategy {
            RateLimitStrategy::FixedWindow {
                window_s,
                max_requests,
            } => self.admit_fixed_window(key, now, Duration::from_secs(window_s), max_requests),
            RateLimitStrategy::SlidingWindow {
                window_s,
                max_requests,
            } => self.admit_sliding_window(key, now, Duration::from_secs(window_s), max_requests),
            RateLimitStrategy::TokenBucket {
                burst_capacity,
                refill_rate,
            } => self.admit_token_bucket(key, now, burst_capacity, refill_rate),
        }
    }

    fn window_state(&mut self, key: &str, cap: usize) -> &mut BoundedVecDeque<Instant> {
        match self
            .state
            .entry(key.to_owned())
            .or_insert_with(|| KeyState::Window {
                sends: BoundedVecDeque::new(cap),
            }) {
            KeyState::Window { sends } => sends,
            KeyState::TokenBucket { .. } => unreachable!("key state strategy mismatch"),
        }
    }

    fn admit_fixed_window(
        &mut self,
        key: &str,
        now: Instant,
        window: Duration,
        max_requests: u32,
    ) -> Admission {
        let cap = max_requests as usize + 1;
        let sends = self.window_state(key, cap);

        // Fixed window: count sends since `window` ago. Unlike sliding
        // window, the window boundary doesn't shift per-send.
        let count = sends.iter().filter(|&&t| now.duration_since(t) < window).count();

        if count < max_requests as usize {
            sends.push_back(now);
            Admission::Admitted
        } else {
            let oldest = *sends.front().expect("count > 0 implies non-empty");
            let wait = window.saturating_sub(now.duration_since(oldest));
            Admission::Wait(wait)
        }
    }

    fn admit_sliding_window(
        &mut self,
        key: &str,
        now: Instant,
        window: Duration,
        max_requests: u32,
    ) -> Admission {
        let cap = max_requests as usize + 1;
        let sends = self.window_state(key, cap);

        while let Some(&oldest) = sends.front() {
            if now.duration_since(oldest) >= window {
                sends.pop_front();
            } else {
                break;
            }
        }

        if sends.len() < max_requests as usize {
            sends.push_back(now);
            Admission::Admitted
        } else {
            let oldest = *sends.front().expect("len >= max_requests > 0");
            let wait = window.saturating_sub(now.duration_since(oldest));
            Admission::Wait(wait)
        }
    }

    fn admit_token_bucket(
        &mut self,
        key: &str,
        now: Instant,
        burst_capacity: u32,
        refill_rate: f64,
    ) -> Admission {
        let entry = self
            .state
            .entry(key.to_owned())
            .or_insert_with(|| KeyState::TokenBucket {
                tokens: burst_capacity as f64,
                last_refill: now,
            });

        let (tokens, last_refill) = match entry {
            KeyState::TokenBucket { tokens, last_refill } => (tokens, last_refill),
            KeyState::Window { .. } => unreachable!("key state strategy mismatch"),
        };

        let elapsed = now.duration_since(*last_refill).as_secs_f64();
        *tokens = (*tokens + elapsed * refill_rate).min(burst_capacity as f64);
        *last_refill = now;

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Admission::Admitted
        } else {
            let deficit = 1.0 - *tokens;
            let wait_secs = deficit / refill_rate;
            Admission::Wait(Duration::from_secs_f64(wait_secs.max(0.0)))
        }
    }

    /// Diagnostic snapshot of outstanding admission state per key,
    /// restored from `utils/rate_limiter.py`'s `snapshot()`.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.state
            .iter()
            .map(|(key, state)| {
                let depth = match state {
                    KeyState::Window { sends } => sends.len(),
                    KeyState::TokenBucket { tokens, .. } => tokens.floor() as usize,
                };
                (key.clone(), depth)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sliding_window_defers_eleventh_send() {
        // Scenario 3: 11 identical sends to Discord in 60s w/ sliding-window(10/60s).
        let mut limiter = RateLimiter::new(RateLimitStrategy::SlidingWindow {
            window_s: 60,
            max_requests: 10,
        });
        let start = Instant::now();

        for i in 0..10 {
            let now = start + Duration::from_millis(i * 10);
            assert_eq!(
                limiter.try_admit("discord:0xabc", now),
                Admission::Admitted,
                "send {i} should be admitted"
            );
        }

        let eleventh = start + Duration::from_millis(100);
        match limiter.try_admit("discord:0xabc", eleventh) {
            Admission::Wait(wait) => assert!(wait > Duration::ZERO),
            Admission::Admitted => panic!("11th send should be deferred"),
        }
    }

    #[test]
    fn test_fixed_window_resets_on_window_boundary() {
        let mut limiter = RateLimiter::new(RateLimitStrategy::FixedWindow {
            window_s: 10,
            max_requests: 2,
        });
        let start = Instant::now();

        assert_eq!(limiter.try_admit("k", start), Admission::Admitted);
        assert_eq!(
            limiter.try_admit("k", start + Duration::from_secs(1)),
            Admission::Admitted
        );
        assert!(matches!(
            limiter.try_admit("k", start + Duration::from_secs(2)),
            Admission::Wait(_)
        ));

        // After the window elapses entirely, admission resumes.
        assert_eq!(
            limiter.try_admit("k", start + Duration::from_secs(11)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_token_bucket_refills_over_time() {
        let mut limiter = RateLimiter::new(RateLimitStrategy::TokenBucket {
            burst_capacity: 1,
            refill_rate: 1.0,
        });
        let start = Instant::now();

        assert_eq!(limiter.try_admit("k", start), Admission::Admitted);
        assert!(matches!(
            limiter.try_admit("k", start + Duration::from_millis(100)),
            Admission::Wait(_)
        ));
        assert_eq!(
            limiter.try_admit("k", start + Duration::from_secs(1)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_partitioned_by_key() {
        let mut limiter = RateLimiter::new(RateLimitStrategy::FixedWindow {
            window_s: 60,
            max_requests: 1,
        });
        let now = Instant::now();
        assert_eq!(limiter.try_admit("a", now), Admission::Admitted);
        // Different key is independent admission state.
        assert_eq!(limiter.try_admit("b", now), Admission::Admitted);
        assert!(matches!(limiter.try_admit("a", now), Admission::Wait(_)));
    }
}
