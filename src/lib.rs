#![warn(rust_2018_idioms)]

//! Watches a configured set of accounts on a real-time exchange feed,
//! classifies their activity by monetary significance, evaluates it
//! against a rule set, and dispatches rate-limited notifications across
//! pluggable channels (spec.md §1-§2).

pub mod account;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod format;
pub mod metrics;
pub mod rules;
pub mod router;
pub mod shutdown;
pub mod upstream;

use crate::account::WatchedAccounts;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::dispatch::channel::{ChannelKind, ChannelSender};
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::format::AlertFormatter;
use crate::metrics::{ChannelStats, Metrics, UpstreamStats};
use crate::router::EventRouter;
use crate::rules::{Rule, RulesEngine};
use crate::shutdown::ShutdownListener;
use crate::upstream::UpstreamClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub use crate::shutdown::{shutdown_channel, ShutdownNotifier};

const FRAME_QUEUE_CAPACITY: usize = 1024;

/// Point-in-time snapshot across every component (spec.md §4.1, §4.5
/// "Stats"), returned by [`Core::stats`].
#[derive(Clone, Debug)]
pub struct CoreStats {
    pub upstream: UpstreamStats,
    pub channels: HashMap<ChannelKind, ChannelStats>,
}

/// Top-level orchestration: wires the upstream client, event router,
/// rules engine, and dispatcher together per the task/ownership model
/// of spec.md §5.
pub struct Core {
    config: Config,
    metrics: Metrics,
    rules: Vec<Rule>,
    channel_sender: Arc<dyn ChannelSender>,
    formatter: Arc<dyn AlertFormatter>,
}

impl Core {
    /// Validates `config` and constructs a [`Core`] ready to run.
    /// Validation is the only fatal error path (spec.md §7).
    pub fn new(
        config: Config,
        channel_sender: Arc<dyn ChannelSender>,
        formatter: Arc<dyn AlertFormatter>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: Metrics::new(),
            rules: Vec::new(),
            channel_sender,
            formatter,
        })
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// A handle to the shared metrics sink, for exposing `stats()` to a
    /// caller while [`Core::run`] is in progress.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Snapshot of upstream and per-channel stats (spec.md §4.1, §4.5).
    pub fn stats(&self) -> CoreStats {
        let channels = [ChannelKind::Discord, ChannelKind::Telegram, ChannelKind::Email, ChannelKind::Webhook]
            .into_iter()
            .map(|kind| (kind, self.metrics.channel_stats(kind)))
            .collect();

        CoreStats {
            upstream: self.metrics.upstream_stats(),
            channels,
        }
    }

    /// Runs until `shutdown` fires: spawns the upstream reader (which
    /// owns its own concurrent health-probe, spec.md §4.1), the
    /// router+engine task, and the dispatcher's channel workers plus
    /// retry sweeper (spec.md §5), then waits for all of them to exit.
    pub async fn run(self, shutdown: ShutdownListener) -> Result<(), CoreError> {
        let watched_accounts = WatchedAccounts::new(self.config.watched_accounts.clone());
        let upstream = UpstreamClient::new(self.config.upstream_url.clone(), self.metrics.clone());

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);

        let dispatcher = Dispatcher::spawn(
            &self.config.channels,
            self.config.max_retries,
            self.config.retry_base_delay_seconds,
            Arc::clone(&self.channel_sender),
            Arc::clone(&self.formatter),
            self.metrics.clone(),
            shutdown.clone(),
        )?;

        let upstream_handle = {
            let watched = watched_accounts.clone();
            let upstream_shutdown = shutdown.clone();
            tokio::spawn(async move {
                upstream.run(watched, frame_tx, upstream_shutdown).await;
            })
        };

        let router_handle = {
            let mut router = EventRouter::new(
                Duration::from_secs(self.config.dedup_window_seconds),
                self.metrics.clone(),
            );
            let mut engine = RulesEngine::new(self.config.ring_capacity);
            for rule in self.rules {
                engine.add_rule(rule);
            }
            let classifier = Classifier::new(self.config.thresholds);
            let alert_tx = dispatcher.alert_sender();
            let watched = watched_accounts.clone();
            let mut engine_shutdown = shutdown.clone();

            tokio::spawn(async move {
                run_router_engine(
                    &mut router,
                    &mut engine,
                    &classifier,
                    frame_rx,
                    alert_tx,
                    &watched,
                    &mut engine_shutdown,
                )
                .await;
            })
        };

        let _ = tokio::join!(upstream_handle, router_handle);
        dispatcher.join().await;

        Ok(())
    }
}

/// The router+engine task (spec.md §5): owns the dedup table, event
/// ring, and rule stats; single-threaded, events processed serially.
async fn run_router_engine(
    router: &mut EventRouter,
    engine: &mut RulesEngine,
    classifier: &Classifier,
    mut frame_rx: mpsc::Receiver<event::RawFrame>,
    alert_tx: mpsc::Sender<rules::TriggeredAlert>,
    watched: &WatchedAccounts,
    shutdown: &mut ShutdownListener,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => break,

            maybe_frame = frame_rx.recv() => {
                let Some(frame) = maybe_frame else { break };

                for event in router.route(frame, watched) {
                    if let Some(classification) = classifier.classify(&event) {
                        debug!(
                            account = %event.account,
                            class = %classification.class,
                            confidence = classification.confidence,
                            "event classified"
                        );
                    }

                    for alert in engine.evaluate(event) {
                        if alert_tx.send(alert).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
