use crate::event::NormalizedEvent;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Monetary-value classification thresholds (spec.md §4.3). Runtime
/// configurable; ordering `whale > large > medium > notable` must hold
/// or construction fails (see [`Thresholds::validate`]).
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct Thresholds {
    pub whale: f64,
    pub large: f64,
    pub medium: f64,
    pub notable: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            whale: 1_000_000.0,
            large: 100_000.0,
            medium: 10_000.0,
            notable: 1_000.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> bool {
        self.whale > self.large && self.large > self.medium && self.medium > self.notable
    }
}

/// Size class assigned to an event's `usd_value` (spec.md §3, §4.3).
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Notable,
    Medium,
    Large,
    Whale,
}

impl Display for SizeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizeClass::Whale => "whale",
            SizeClass::Large => "large",
            SizeClass::Medium => "medium",
            SizeClass::Notable => "notable",
            SizeClass::Small => "small",
        };
        write!(f, "{s}")
    }
}

/// Ancillary metadata produced alongside a [`SizeClass`] (spec.md §4.3).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Classification {
    pub class: SizeClass,
    pub confidence: f64,
}

/// Pure classifier over `usd_value`, configured once with [`Thresholds`].
#[derive(Clone, Debug)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        debug_assert!(
            thresholds.validate(),
            "threshold ordering whale>large>medium>notable violated"
        );
        Self { thresholds }
    }

    /// Classify a `usd_value`, returning `None` if threshold ordering is
    /// violated (spec.md §4.3: "classification fails").
    pub fn classify_value(&self, usd_value: f64) -> Option<SizeClass> {
        if !self.thresholds.validate() {
            return None;
        }

        Some(if usd_value >= self.thresholds.whale {
            SizeClass::Whale
        } else if usd_value >= self.thresholds.large {
            SizeClass::Large
        } else if usd_value >= self.thresholds.medium {
            SizeClass::Medium
        } else if usd_value >= self.thresholds.notable {
            SizeClass::Notable
        } else {
            SizeClass::Small
        })
    }

    /// Classify a [`NormalizedEvent`], deriving confidence from how much
    /// of the event's pricing data was present (spec.md §4.3).
    pub fn classify(&self, event: &NormalizedEvent) -> Option<Classification> {
        let usd_value = event.usd_value?;
        let class = self.classify_value(usd_value)?;

        let mut confidence = 1.0_f64;
        if event.price.is_none() || event.size.is_none() {
            confidence *= 0.8;
        }
        if usd_value < 100.0 {
            confidence *= 0.6;
        }
        if usd_value >= self.thresholds.whale {
            confidence *= 1.2;
        }
        confidence = confidence.clamp(0.0, 1.0);

        Some(Classification { class, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use serde_json::json;
    use std::time::Instant;

    fn event_with_value(usd_value: Option<f64>, price: Option<f64>, size: Option<f64>) -> NormalizedEvent {
        NormalizedEvent {
            kind: crate::event::FrameKind::Fills,
            account: AccountId::from("0xabc"),
            coin: Some("BTC".to_string()),
            side: None,
            price,
            size,
            usd_value,
            observed_at: Instant::now(),
            raw: json!({}),
        }
    }

    #[test]
    fn test_classify_value_thresholds() {
        struct TestCase {
            usd_value: f64,
            expected: SizeClass,
        }

        let cases = vec![
            TestCase {
                usd_value: 2_000_000.0,
                expected: SizeClass::Whale,
            },
            TestCase {
                usd_value: 1_000_000.0,
                expected: SizeClass::Whale,
            },
            TestCase {
                usd_value: 500_000.0,
                expected: SizeClass::Large,
            },
            TestCase {
                usd_value: 50_000.0,
                expected: SizeClass::Medium,
            },
            TestCase {
                usd_value: 5_000.0,
                expected: SizeClass::Notable,
            },
            TestCase {
                usd_value: 500.0,
                expected: SizeClass::Small,
            },
        ];

        let classifier = Classifier::new(Thresholds::default());
        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                classifier.classify_value(test.usd_value),
                Some(test.expected),
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_classify_fails_on_bad_ordering() {
        let bad = Thresholds {
            whale: 10.0,
            large: 100.0,
            medium: 1.0,
            notable: 0.1,
        };
        let classifier = Classifier::new(bad);
        assert_eq!(classifier.classify_value(50.0), None);
    }

    #[test]
    fn test_confidence_scoring() {
        struct TestCase {
            event: NormalizedEvent,
            expected_confidence: f64,
        }

        let cases = vec![
            TestCase {
                // Full data, mid-range value: no penalty, no boost.
                event: event_with_value(Some(50_000.0), Some(100.0), Some(500.0)),
                expected_confidence: 1.0,
            },
            TestCase {
                // Missing price: 0.8 penalty.
                event: event_with_value(Some(50_000.0), None, Some(500.0)),
                expected_confidence: 0.8,
            },
            TestCase {
                // Below $100: 0.6 penalty.
                event: event_with_value(Some(50.0), Some(1.0), Some(50.0)),
                expected_confidence: 0.6,
            },
            TestCase {
                // Whale boost: 1.0 * 1.2, clamped to 1.0.
                event: event_with_value(Some(2_000_000.0), Some(1.0), Some(1.0)),
                expected_confidence: 1.0,
            },
        ];

        let classifier = Classifier::new(Thresholds::default());
        for (index, test) in cases.into_iter().enumerate() {
            let classification = classifier.classify(&test.event).expect("usd_value present");
            assert!(
                (classification.confidence - test.expected_confidence).abs() < 1e-9,
                "TC{index} failed: got {}",
                classification.confidence
            );
        }
    }

    #[test]
    fn test_round_trip_price_times_size() {
        // Frame with price=100, size=5 and no usd_value -> classifier sees usd_value=500.
        let usd_value = 100.0_f64 * 5.0_f64;
        let classifier = Classifier::new(Thresholds::default());
        assert_eq!(classifier.classify_value(usd_value), Some(SizeClass::Notable));
    }
}
