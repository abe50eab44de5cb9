//! Turns raw upstream frames into normalized, deduplicated events
//! (spec.md §4.2).

pub mod dedup;
pub mod extract;

use crate::account::WatchedAccounts;
use crate::error::RouterError;
use crate::event::{FrameKind, NormalizedEvent, RawFrame};
use crate::metrics::Metrics;
use crate::router::dedup::DedupTable;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct EventRouter {
    dedup: DedupTable,
    metrics: Metrics,
}

impl EventRouter {
    pub fn new(dedup_window: Duration, metrics: Metrics) -> Self {
        Self {
            dedup: DedupTable::new(dedup_window),
            metrics,
        }
    }

    /// Route one raw frame, per the algorithm of spec.md §4.2. Returns
    /// zero or more normalized events (zero or more than one only for
    /// event-bearing kinds whose `data` body is a list).
    pub fn route(&mut self, frame: RawFrame, watched: &WatchedAccounts) -> Vec<NormalizedEvent> {
        match frame.kind {
            FrameKind::Error => {
                warn!(payload = %frame.payload, "upstream reported an error frame");
                Vec::new()
            }
            FrameKind::SubscriptionAck => {
                debug!("subscription acknowledged");
                Vec::new()
            }
            FrameKind::Other => Vec::new(),
            kind if kind.is_event_bearing() => self.route_event_bearing(kind, frame, watched),
            _ => Vec::new(),
        }
    }

    fn route_event_bearing(
        &mut self,
        kind: FrameKind,
        frame: RawFrame,
        watched: &WatchedAccounts,
    ) -> Vec<NormalizedEvent> {
        let Some(account) = extract::extract_account(&frame.payload) else {
            self.metrics.record_router_drop();
            warn!(err = %RouterError::NoAccount, "dropping frame");
            return Vec::new();
        };

        if !watched.contains(&account) {
            self.metrics.record_router_drop();
            debug!(err = %RouterError::UnwatchedAccount(account.0.clone()), "dropping frame");
            return Vec::new();
        }

        let now = Instant::now();
        let mut events = Vec::new();

        for record in extract::payload_records(&frame.payload) {
            let event = NormalizedEvent {
                kind,
                account: account.clone(),
                coin: extract::extract_coin(record),
                side: extract::extract_side(record),
                price: extract::extract_price(record),
                size: extract::extract_size(record),
                usd_value: extract::extract_usd_value(record),
                observed_at: now,
                raw: record.clone(),
            };

            if self.dedup.check_and_record(event.fingerprint(), now) {
                events.push(event);
            } else {
                self.metrics.record_dedup_rejection();
            }
        }

        events
    }
}
