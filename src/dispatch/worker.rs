use crate::dispatch::channel::{ChannelKind, ChannelSender, NotificationPayload};
use crate::dispatch::rate_limit::{Admission, RateLimitStrategy, RateLimiter};
use crate::dispatch::task::DispatchTask;
use crate::metrics::Metrics;
use crate::shutdown::ShutdownListener;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

/// The resolved destination a channel worker sends to, bound once at
/// spawn time from [`crate::config::ChannelsConfig`]. Unlike
/// [`DispatchTask::account`], a channel's destination does not vary
/// per-account: one Discord webhook, one Telegram chat, one email
/// recipient, one generic webhook per configured channel.
#[derive(Clone, Debug)]
pub enum ChannelTarget {
    Discord { webhook_url: String },
    Telegram { bot_token: String, chat_id: String },
    Email { smtp_server: String, username: String, password: String, to: String },
    Webhook { url: String, headers: std::collections::HashMap<String, String> },
}

/// Configuration a channel worker is spawned with.
pub struct WorkerConfig {
    pub channel: ChannelKind,
    pub target: ChannelTarget,
    pub rate_limit: RateLimitStrategy,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

/// Runs one channel's dispatch loop: pop the highest-priority pending
/// task, honour the rate limiter, send, and on transient failure hand
/// the task to the shared retry sweeper (spec.md §4.5, §5).
///
/// Incoming tasks land on a plain FIFO `mpsc` channel, but are never sent
/// to the channel primitive in arrival order: each iteration first drains
/// whatever has already arrived into a `BinaryHeap` ordered by
/// [`DispatchTask`]'s `Ord` impl, so a `critical` alert queued behind ten
/// `info` alerts is popped and sent first.
pub async fn run_channel_worker(
    config: WorkerConfig,
    mut pending_rx: mpsc::Receiver<DispatchTask>,
    retry_tx: mpsc::Sender<DispatchTask>,
    sender: Arc<dyn ChannelSender>,
    metrics: Metrics,
    mut shutdown: ShutdownListener,
) {
    let mut limiter = RateLimiter::new(config.rate_limit);
    let mut pending: BinaryHeap<DispatchTask> = BinaryHeap::new();
    let mut channel_closed = false;
    info!(channel = %config.channel, "channel worker starting");

    loop {
        if shutdown.shutdown {
            info!(channel = %config.channel, "channel worker shutting down");
            break;
        }

        loop {
            match pending_rx.try_recv() {
                Ok(task) => pending.push(task),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    channel_closed = true;
                    break;
                }
            }
        }

        let mut task = match pending.pop() {
            Some(task) => task,
            None if channel_closed => break,
            None => {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        info!(channel = %config.channel, "channel worker shutting down");
                        break;
                    }

                    maybe_task = pending_rx.recv() => {
                        match maybe_task {
                            Some(task) => task,
                            None => break,
                        }
                    }
                }
            }
        };

        let key = task.rate_limit_key();
        match limiter.try_admit(&key, std::time::Instant::now()) {
            Admission::Admitted => {}
            Admission::Wait(wait) => {
                metrics.record_rate_limit_deferred(config.channel);
                debug!(channel = %config.channel, account = %task.account, wait_ms = wait.as_millis(), "rate limited");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.recv() => {
                        info!(channel = %config.channel, "channel worker shutting down mid-wait");
                        break;
                    }
                }
            }
        }

        let start = std::time::Instant::now();
        metrics.record_send_attempted(config.channel);
        let result = send(&*sender, &config.target, &task).await;
        let latency = start.elapsed();

        match result {
            Ok(()) => {
                metrics.record_send_succeeded(config.channel, latency);
                debug!(channel = %config.channel, account = %task.account, "send succeeded");
            }
            Err(err) if err.is_terminal() => {
                metrics.record_send_failed(config.channel);
                error!(channel = %config.channel, account = %task.account, %err, "terminal send failure");
            }
            Err(err) => {
                task.schedule_retry(config.retry_base_delay);
                if task.is_terminally_failed(config.max_retries) {
                    metrics.record_send_failed(config.channel);
                    error!(channel = %config.channel, account = %task.account, attempts = task.attempt_count, "exceeded max retries");
                } else {
                    metrics.record_send_retried(config.channel);
                    warn!(channel = %config.channel, account = %task.account, %err, attempt = task.attempt_count, "transient send failure, scheduling retry");
                    if retry_tx.send(task).await.is_err() {
                        warn!(channel = %config.channel, "retry sweeper channel closed, dropping task");
                    }
                }
            }
        }
    }
}

async fn send(
    sender: &dyn ChannelSender,
    target: &ChannelTarget,
    task: &DispatchTask,
) -> Result<(), crate::error::DispatchError> {
    let payload = NotificationPayload {
        subject: String::new(),
        text: task.payload.clone(),
        html: None,
    };

    match target {
        ChannelTarget::Discord { webhook_url } => sender.send_chat_webhook(webhook_url, &payload).await,
        ChannelTarget::Telegram { bot_token, chat_id } => {
            sender.send_chat_bot(bot_token, chat_id, &payload.text).await
        }
        ChannelTarget::Email { smtp_server, username, password, to } => {
            sender.send_email(smtp_server, username, password, to, &payload).await
        }
        ChannelTarget::Webhook { url, headers } => sender.send_http_webhook(url, headers, &payload.text).await,
    }
}
