use crate::account::AccountId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::time::Instant;

/// Subscription kind tagged onto a raw upstream frame (spec.md §3). Only
/// `Fills`, `UserEvents`, and `OrderUpdates` ever produce normalised
/// events downstream.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    Fills,
    UserEvents,
    OrderUpdates,
    SubscriptionAck,
    Error,
    Other,
}

impl FrameKind {
    /// Whether this frame kind is event-bearing, i.e. may produce a
    /// normalised event once routed.
    pub fn is_event_bearing(&self) -> bool {
        matches!(
            self,
            FrameKind::Fills | FrameKind::UserEvents | FrameKind::OrderUpdates
        )
    }

    /// Map an upstream `channel` tag (spec.md §6) onto a [`FrameKind`].
    pub fn from_channel_tag(tag: &str) -> Self {
        match tag {
            "userFills" => FrameKind::Fills,
            "userEvents" => FrameKind::UserEvents,
            "orderUpdates" => FrameKind::OrderUpdates,
            "subscriptionResponse" => FrameKind::SubscriptionAck,
            "error" => FrameKind::Error,
            _ => FrameKind::Other,
        }
    }
}

impl Display for FrameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameKind::Fills => "fills",
            FrameKind::UserEvents => "user-events",
            FrameKind::OrderUpdates => "order-updates",
            FrameKind::SubscriptionAck => "subscription-ack",
            FrameKind::Error => "error",
            FrameKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// An unparsed payload handed from the upstream client to the router.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub kind: FrameKind,
    pub payload: Value,
    pub received_at: Instant,
}

impl RawFrame {
    pub fn new(kind: FrameKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            received_at: Instant::now(),
        }
    }
}

/// Trade/position side. `Unknown` is used when the upstream payload
/// carries no side information rather than dropping the field.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
    Long,
    Short,
    Unknown,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Long => "long",
            Side::Short => "short",
            Side::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The canonical internal record produced by the router (spec.md §3).
#[derive(Clone, Debug)]
pub struct NormalizedEvent {
    pub kind: FrameKind,
    pub account: AccountId,
    pub coin: Option<String>,
    pub side: Option<Side>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub usd_value: Option<f64>,
    pub observed_at: Instant,
    pub raw: Value,
}

impl NormalizedEvent {
    /// Deterministic dedup fingerprint: pipe-joined tuple of
    /// `(kind, account, coin, side, usd_value, size, price)`, absent
    /// fields rendered as empty (spec.md §4.2.7).
    pub fn fingerprint(&self) -> String {
        fn opt<T: Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        }

        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.kind,
            self.account,
            self.coin.clone().unwrap_or_default(),
            opt(&self.side),
            opt(&self.usd_value),
            opt(&self.size),
            opt(&self.price),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_event() -> NormalizedEvent {
        NormalizedEvent {
            kind: FrameKind::Fills,
            account: AccountId::from("0xabc"),
            coin: Some("BTC".to_string()),
            side: Some(Side::Buy),
            price: Some(50_000.0),
            size: Some(25.0),
            usd_value: Some(1_250_000.0),
            observed_at: Instant::now(),
            raw: json!({}),
        }
    }

    #[test]
    fn test_fingerprint_stable_under_unchanged_inputs() {
        let a = base_event();
        let b = base_event();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinct_under_single_field_change() {
        struct TestCase {
            mutate: fn(&mut NormalizedEvent),
        }

        let cases = vec![
            TestCase {
                mutate: |e| e.coin = Some("ETH".to_string()),
            },
            TestCase {
                mutate: |e| e.side = Some(Side::Sell),
            },
            TestCase {
                mutate: |e| e.usd_value = Some(1.0),
            },
            TestCase {
                mutate: |e| e.size = Some(1.0),
            },
            TestCase {
                mutate: |e| e.price = Some(1.0),
            },
            TestCase {
                mutate: |e| e.account = AccountId::from("0xdef"),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let base = base_event();
            let mut mutated = base_event();
            (test.mutate)(&mut mutated);
            assert_ne!(
                base.fingerprint(),
                mutated.fingerprint(),
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_frame_kind_from_channel_tag() {
        struct TestCase {
            input: &'static str,
            expected: FrameKind,
        }

        let cases = vec![
            TestCase {
                input: "userFills",
                expected: FrameKind::Fills,
            },
            TestCase {
                input: "userEvents",
                expected: FrameKind::UserEvents,
            },
            TestCase {
                input: "orderUpdates",
                expected: FrameKind::OrderUpdates,
            },
            TestCase {
                input: "subscriptionResponse",
                expected: FrameKind::SubscriptionAck,
            },
            TestCase {
                input: "error",
                expected: FrameKind::Error,
            },
            TestCase {
                input: "somethingElse",
                expected: FrameKind::Other,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                FrameKind::from_channel_tag(test.input),
                test.expected,
                "TC{index} failed"
            );
        }
    }
}
