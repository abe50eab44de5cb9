use thiserror::Error;

/// Transport-level failure from the upstream session. All variants are
/// recoverable; the upstream client reconnects on every one of them.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to connect to upstream: {0}")]
    Connect(String),

    #[error("websocket send failed: {0}")]
    Send(String),

    #[error("websocket read failed: {0}")]
    Read(String),

    #[error("session closed by peer")]
    Closed,

    #[error("liveness probe failed twice consecutively")]
    ProbeTimeout,
}

/// Per-frame failure in the router. Never propagated past the router;
/// counted in [`crate::metrics::Metrics`] and the frame is discarded.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("failed to parse frame payload: {0}")]
    Parse(String),

    #[error("no watched account found in frame")]
    NoAccount,

    #[error("account {0} is not in the watched set")]
    UnwatchedAccount(String),
}

/// Failure evaluating a `custom` rule predicate. Caught at the rules
/// engine boundary; the rule is treated as non-firing for that event.
#[derive(Debug, Error)]
#[error("custom rule predicate panicked or returned an error: {0}")]
pub struct RuleError(pub String);

/// Outcome of a dispatch send attempt, per spec.md §6 & §7.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transient send failure: {0}")]
    Transient(String),

    #[error("terminal send failure: {0}")]
    Terminal(String),
}

impl DispatchError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchError::Terminal(_))
    }
}

/// Fatal at startup; the only error kind that aborts the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("watched_accounts must be non-empty")]
    EmptyWatchedAccounts,

    #[error("threshold ordering must satisfy whale > large > medium > notable, got {0:?}")]
    InvalidThresholdOrdering(crate::classifier::Thresholds),

    #[error("invalid upstream_url: {0}")]
    InvalidUpstreamUrl(String),

    #[error("channel {channel} is enabled but missing required credential {field}")]
    MissingCredential {
        channel: &'static str,
        field: &'static str,
    },
}

/// Top-level error for any API that must return a single error type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
