use crate::account::WatchedAccounts;
use crate::error::UpstreamError;
use crate::event::{FrameKind, RawFrame};
use crate::metrics::{Metrics, UpstreamStats};
use crate::shutdown::ShutdownListener;
use crate::upstream::protocol::{ping_request, subscribe_request, FrameEnvelope, SubscriptionKind};
use crate::upstream::transport::{Transport, WsTransport};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const SUBSCRIBE_PACING: Duration = Duration::from_millis(300);

/// Maintains a single authenticated subscription session across
/// transient failures and delivers raw frames in arrival order
/// (spec.md §4.1).
pub struct UpstreamClient {
    url: String,
    metrics: Metrics,
}

impl UpstreamClient {
    pub fn new(url: String, metrics: Metrics) -> Self {
        Self { url, metrics }
    }

    /// Blocks until `shutdown` fires; repeatedly (re)connects, subscribes,
    /// and forwards frames to `frame_sink`. The sink must accept or drop:
    /// it is a bounded, droppable queue (spec.md §5), so `try_send` is
    /// used rather than blocking the read loop.
    pub async fn run(
        &self,
        watched_accounts: WatchedAccounts,
        frame_sink: mpsc::Sender<RawFrame>,
        mut shutdown: ShutdownListener,
    ) {
        let mut consecutive_failures: u32 = 0;
        let mut first_connection = true;

        loop {
            if shutdown.shutdown {
                break;
            }

            if !first_connection {
                self.metrics.record_reconnect();
            }
            first_connection = false;

            match WsTransport::connect(&self.url).await {
                Ok(transport) => {
                    self.metrics.set_connected(true);
                    info!(url = %self.url, "upstream session established");
                    let delivered_any = self
                        .run_session(
                            transport,
                            &watched_accounts,
                            &frame_sink,
                            consecutive_failures,
                            &mut shutdown,
                        )
                        .await;
                    self.metrics.set_connected(false);

                    if delivered_any {
                        consecutive_failures = 0;
                    } else {
                        consecutive_failures += 1;
                    }
                }
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(%err, attempt = consecutive_failures, "upstream connect failed");
                }
            }

            self.metrics.set_consecutive_failures(consecutive_failures as u64);

            if shutdown.shutdown {
                break;
            }

            let delay = reconnect_delay(consecutive_failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        info!("upstream client shut down");
    }

    pub fn stats(&self) -> UpstreamStats {
        self.metrics.upstream_stats()
    }

    /// Runs one connected session to completion: subscribes, then reads
    /// frames and runs the health probe concurrently until the peer
    /// closes, a transport error occurs, or shutdown fires. Returns
    /// whether any frame was delivered (spec.md §4.1.5).
    async fn run_session(
        &self,
        mut transport: impl Transport,
        watched_accounts: &WatchedAccounts,
        frame_sink: &mpsc::Sender<RawFrame>,
        consecutive_failures: u32,
        shutdown: &mut ShutdownListener,
    ) -> bool {
        if let Err(err) = subscribe_all(&mut transport, watched_accounts).await {
            warn!(%err, "failed to send subscriptions");
            return false;
        }

        let mut delivered_any = false;
        let mut consecutive_probe_failures = 0u32;
        let mut frame_since_last_probe = false;
        let mut probe_id = 0u64;

        let interval_secs = health_probe_interval_secs(consecutive_failures);
        let mut probe_tick = tokio::time::interval(Duration::from_secs(interval_secs));
        probe_tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => return delivered_any,

                _ = probe_tick.tick() => {
                    if frame_since_last_probe {
                        consecutive_probe_failures = 0;
                    } else {
                        consecutive_probe_failures += 1;
                    }
                    frame_since_last_probe = false;

                    if consecutive_probe_failures >= 2 {
                        warn!("two consecutive failed liveness probes, closing session");
                        return delivered_any;
                    }

                    probe_id += 1;
                    if transport.send_text(ping_request(probe_id)).await.is_err() {
                        return delivered_any;
                    }
                }

                maybe_text = transport.recv_text() => {
                    match maybe_text {
                        Some(Ok(text)) => {
                            frame_since_last_probe = true;
                            delivered_any = true;
                            self.metrics.record_frame_received();

                            match parse_frame(&text) {
                                Some(frame) => {
                                    if frame_sink.try_send(frame).is_err() {
                                        warn!("frame sink full or closed, dropping frame");
                                    }
                                }
                                None => self.metrics.record_failed_parse(),
                            }
                        }
                        Some(Err(err)) => {
                            warn!(%err, "read error, closing session");
                            return delivered_any;
                        }
                        None => return delivered_any,
                    }
                }
            }
        }
    }
}

async fn subscribe_all(
    transport: &mut impl Transport,
    watched_accounts: &WatchedAccounts,
) -> Result<(), UpstreamError> {
    for account in watched_accounts.iter() {
        for kind in SubscriptionKind::ALL {
            transport.send_text(subscribe_request(&account.0, kind)).await?;
            tokio::time::sleep(SUBSCRIBE_PACING).await;
        }
    }
    Ok(())
}

fn parse_frame(text: &str) -> Option<RawFrame> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let channel = serde_json::from_value::<FrameEnvelope>(value.clone())
        .map(|envelope| envelope.channel)
        .unwrap_or_default();
    Some(RawFrame::new(FrameKind::from_channel_tag(&channel), value))
}

fn health_probe_interval_secs(consecutive_failures: u32) -> u64 {
    (5 + 2 * consecutive_failures as u64).min(30)
}

fn reconnect_delay(consecutive_failures: u32) -> Duration {
    if consecutive_failures <= 3 {
        Duration::from_secs(2)
    } else if consecutive_failures <= 10 {
        Duration::from_secs(5)
    } else {
        Duration::from_secs(consecutive_failures.min(30) as u64)
    }
}
