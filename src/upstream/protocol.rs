use serde::{Deserialize, Serialize};

/// Wire subscription kind (spec.md §6). Distinct from [`crate::event::FrameKind`]:
/// this is what we ask for, the other is what we get back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionKind {
    Fills,
    UserEvents,
    OrderUpdates,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 3] = [
        SubscriptionKind::Fills,
        SubscriptionKind::UserEvents,
        SubscriptionKind::OrderUpdates,
    ];

    fn wire_type(&self) -> &'static str {
        match self {
            SubscriptionKind::Fills => "userFills",
            SubscriptionKind::UserEvents => "userEvents",
            SubscriptionKind::OrderUpdates => "orderUpdates",
        }
    }
}

#[derive(Serialize)]
struct SubscriptionBody<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    user: &'a str,
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    method: &'a str,
    subscription: SubscriptionBody<'a>,
}

/// Build `{"method":"subscribe","subscription":{"type":<kind>,"user":<account>}}`
/// (spec.md §6).
pub fn subscribe_request(account: &str, kind: SubscriptionKind) -> String {
    let request = SubscribeRequest {
        method: "subscribe",
        subscription: SubscriptionBody {
            kind: kind.wire_type(),
            user: account,
        },
    };
    serde_json::to_string(&request).expect("subscribe request is always serializable")
}

#[derive(Serialize)]
struct PingRequest {
    method: &'static str,
    id: u64,
}

/// Build `{"method":"ping","id":<uint64>}` (spec.md §6).
pub fn ping_request(id: u64) -> String {
    serde_json::to_string(&PingRequest { method: "ping", id })
        .expect("ping request is always serializable")
}

/// The only field of an incoming frame the transport layer needs: the
/// `channel` tag used to determine [`crate::event::FrameKind`].
#[derive(Deserialize)]
pub struct FrameEnvelope {
    pub channel: String,
}
