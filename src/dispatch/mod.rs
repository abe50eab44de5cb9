//! Per-channel rate limiting, queuing, and retried delivery of
//! triggered alerts (spec.md §4.5).

pub mod channel;
pub mod rate_limit;
pub mod retry;
pub mod task;
pub mod worker;

use crate::account::AccountId;
use crate::config::ChannelsConfig;
use crate::dispatch::channel::{ChannelKind, ChannelSender};
use crate::dispatch::task::DispatchTask;
use crate::dispatch::worker::{run_channel_worker, ChannelTarget, WorkerConfig};
use crate::error::ConfigError;
use crate::format::AlertFormatter;
use crate::metrics::Metrics;
use crate::rules::TriggeredAlert;
use crate::shutdown::ShutdownListener;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const PENDING_QUEUE_CAPACITY: usize = 4_096;

/// Resolve the enabled channels and their targets from configuration,
/// one `(ChannelKind, ChannelTarget, rate_limit)` triple per enabled
/// channel. `rate_limit` is the channel's configured override, or `None`
/// if the channel should fall back to its documented default.
pub fn resolve_targets(
    channels: &ChannelsConfig,
) -> Result<Vec<(ChannelKind, ChannelTarget, Option<rate_limit::RateLimitStrategy>)>, ConfigError> {
    let mut targets = Vec::new();

    if channels.discord.enabled {
        targets.push((
            ChannelKind::Discord,
            ChannelTarget::Discord {
                webhook_url: channels.discord.webhook_url.clone().ok_or(ConfigError::MissingCredential {
                    channel: "discord",
                    field: "webhook_url",
                })?,
            },
            channels.discord.rate_limit,
        ));
    }

    if channels.telegram.enabled {
        targets.push((
            ChannelKind::Telegram,
            ChannelTarget::Telegram {
                bot_token: channels.telegram.bot_token.clone().ok_or(ConfigError::MissingCredential {
                    channel: "telegram",
                    field: "bot_token",
                })?,
                chat_id: channels.telegram.chat_id.clone().ok_or(ConfigError::MissingCredential {
                    channel: "telegram",
                    field: "chat_id",
                })?,
            },
            channels.telegram.rate_limit,
        ));
    }

    if channels.email.enabled {
        targets.push((
            ChannelKind::Email,
            ChannelTarget::Email {
                smtp_server: channels.email.smtp_server.clone().ok_or(ConfigError::MissingCredential {
                    channel: "email",
                    field: "smtp_server",
                })?,
                username: channels.email.username.clone().unwrap_or_default(),
                password: channels.email.password.clone().unwrap_or_default(),
                to: channels.email.to.clone().ok_or(ConfigError::MissingCredential {
                    channel: "email",
                    field: "to",
                })?,
            },
            channels.email.rate_limit,
        ));
    }

    if channels.webhook.enabled {
        targets.push((
            ChannelKind::Webhook,
            ChannelTarget::Webhook {
                url: channels.webhook.url.clone().ok_or(ConfigError::MissingCredential {
                    channel: "webhook",
                    field: "url",
                })?,
                headers: channels.webhook.headers.clone(),
            },
            channels.webhook.rate_limit,
        ));
    }

    Ok(targets)
}

fn default_rate_limit(kind: ChannelKind) -> rate_limit::RateLimitStrategy {
    match kind {
        ChannelKind::Discord => rate_limit::RateLimitStrategy::discord_default(),
        ChannelKind::Telegram => rate_limit::RateLimitStrategy::telegram_default(),
        ChannelKind::Email => rate_limit::RateLimitStrategy::email_default(),
        ChannelKind::Webhook => rate_limit::RateLimitStrategy::webhook_default(),
    }
}

/// Handle to a running dispatcher: the alert ingestion sender, plus the
/// tasks it spawned (for awaiting shutdown completion).
pub struct Dispatcher {
    alert_tx: mpsc::Sender<TriggeredAlert>,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn one worker task per enabled channel, one shared retry
    /// sweeper, and one fan-out task that turns each [`TriggeredAlert`]
    /// into one [`DispatchTask`] per enabled channel (spec.md §4.5.1).
    pub fn spawn(
        channels: &ChannelsConfig,
        max_retries: u32,
        retry_base_delay_seconds: u64,
        sender: Arc<dyn ChannelSender>,
        formatter: Arc<dyn AlertFormatter>,
        metrics: Metrics,
        shutdown: ShutdownListener,
    ) -> Result<Self, ConfigError> {
        let targets = resolve_targets(channels)?;
        let retry_base_delay = Duration::from_secs(retry_base_delay_seconds);

        let mut pending_txs = HashMap::new();
        let mut handles = Vec::new();
        let (failed_tx, failed_rx) = mpsc::channel(PENDING_QUEUE_CAPACITY);

        for (kind, target, rate_limit) in targets {
            let (pending_tx, pending_rx) = mpsc::channel(PENDING_QUEUE_CAPACITY);
            pending_txs.insert(kind, pending_tx);

            let config = WorkerConfig {
                channel: kind,
                target,
                rate_limit: rate_limit.unwrap_or_else(|| default_rate_limit(kind)),
                max_retries,
                retry_base_delay,
            };

            let handle = tokio::spawn(run_channel_worker(
                config,
                pending_rx,
                failed_tx.clone(),
                Arc::clone(&sender),
                metrics.clone(),
                shutdown.clone(),
            ));
            handles.push(handle);
        }
        drop(failed_tx);

        let retry_handle = tokio::spawn(retry::run_retry_sweeper(
            failed_rx,
            pending_txs.clone(),
            shutdown.clone(),
        ));
        handles.push(retry_handle);

        let (alert_tx, alert_rx) = mpsc::channel(PENDING_QUEUE_CAPACITY);
        let fan_out_handle = tokio::spawn(run_fan_out(alert_rx, pending_txs, formatter, shutdown));
        handles.push(fan_out_handle);

        Ok(Self { alert_tx, handles })
    }

    pub fn alert_sender(&self) -> mpsc::Sender<TriggeredAlert> {
        self.alert_tx.clone()
    }

    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Fan out each alert to every enabled channel's pending queue, one
/// [`DispatchTask`] per channel (spec.md §4.5.1). The alert queue itself
/// must never drop (spec.md §5); it is a bounded `mpsc` channel whose
/// `send` backpressures the rules engine upstream.
async fn run_fan_out(
    mut alert_rx: mpsc::Receiver<TriggeredAlert>,
    pending_txs: HashMap<ChannelKind, mpsc::Sender<DispatchTask>>,
    formatter: Arc<dyn AlertFormatter>,
    mut shutdown: ShutdownListener,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => break,

            maybe_alert = alert_rx.recv() => {
                let Some(alert) = maybe_alert else { break };
                let payload = formatter.format(&alert);
                let account: AccountId = alert.account.clone();

                for (kind, tx) in &pending_txs {
                    let task = DispatchTask::new(*kind, account.clone(), alert.severity, payload.text.clone());
                    debug!(channel = %kind, account = %account, rule = %alert.rule_name, "enqueuing dispatch task");
                    if tx.send(task).await.is_err() {
                        debug!(channel = %kind, "channel worker gone, dropping task");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelsConfig, DiscordConfig};

    #[test]
    fn test_resolve_targets_only_includes_enabled_channels() {
        let mut channels = ChannelsConfig::default();
        channels.discord = DiscordConfig {
            enabled: true,
            webhook_url: Some("https://discord.example/hook".to_string()),
            rate_limit: None,
        };

        let targets = resolve_targets(&channels).expect("valid config");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, ChannelKind::Discord);
        assert_eq!(targets[0].2, None);
    }

    #[test]
    fn test_resolve_targets_errors_on_missing_credential() {
        let mut channels = ChannelsConfig::default();
        channels.discord.enabled = true;
        channels.discord.webhook_url = None;

        assert!(matches!(
            resolve_targets(&channels),
            Err(ConfigError::MissingCredential { channel: "discord", .. })
        ));
    }

    #[test]
    fn test_resolve_targets_carries_configured_rate_limit_override() {
        let mut channels = ChannelsConfig::default();
        channels.discord = DiscordConfig {
            enabled: true,
            webhook_url: Some("https://discord.example/hook".to_string()),
            rate_limit: Some(rate_limit::RateLimitStrategy::TokenBucket {
                burst_capacity: 2,
                refill_rate: 0.5,
            }),
        };

        let targets = resolve_targets(&channels).expect("valid config");
        assert_eq!(
            targets[0].2,
            Some(rate_limit::RateLimitStrategy::TokenBucket {
                burst_capacity: 2,
                refill_rate: 0.5,
            })
        );
    }

    #[test]
    fn test_spawn_uses_configured_rate_limit_over_default() {
        let mut channels = ChannelsConfig::default();
        channels.discord = DiscordConfig {
            enabled: true,
            webhook_url: Some("https://discord.example/hook".to_string()),
            rate_limit: Some(rate_limit::RateLimitStrategy::TokenBucket {
                burst_capacity: 2,
                refill_rate: 0.5,
            }),
        };

        let targets = resolve_targets(&channels).expect("valid config");
        let (kind, _target, configured) = &targets[0];
        let resolved = configured.unwrap_or_else(|| default_rate_limit(*kind));
        assert_eq!(
            resolved,
            rate_limit::RateLimitStrategy::TokenBucket {
                burst_capacity: 2,
                refill_rate: 0.5,
            }
        );
    }
}
