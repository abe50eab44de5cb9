use crate::dispatch::channel::ChannelKind;
use crate::dispatch::task::DispatchTask;
use crate::shutdown::ShutdownListener;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Recommended cap on a channel's retry list (spec.md §5).
pub const RETRY_LIST_CAP: usize = 10_000;

/// Shared retry worker: wakes every 5s, scans each channel's retry
/// list, and re-submits tasks whose `next_attempt_at` has elapsed
/// (spec.md §4.5.7). This consolidates the source's two independent
/// retry loops into the single worker the spec calls for (spec.md §9).
pub async fn run_retry_sweeper(
    mut failed_rx: mpsc::Receiver<DispatchTask>,
    pending_txs: HashMap<ChannelKind, mpsc::Sender<DispatchTask>>,
    mut shutdown: ShutdownListener,
) {
    let mut retry_lists: HashMap<ChannelKind, Vec<DispatchTask>> = HashMap::new();
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(5));

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                debug!("retry sweeper draining final cycle before shutdown");
                sweep(&mut retry_lists, &pending_txs).await;
                break;
            }

            maybe_task = failed_rx.recv() => {
                let Some(task) = maybe_task else { break };
                let list = retry_lists.entry(task.channel).or_default();
                if list.len() >= RETRY_LIST_CAP {
                    warn!(channel = %task.channel, "retry list at capacity, dropping oldest");
                    list.remove(0);
                }
                list.push(task);
            }

            _ = tick.tick() => {
                sweep(&mut retry_lists, &pending_txs).await;
            }
        }
    }
}

async fn sweep(
    retry_lists: &mut HashMap<ChannelKind, Vec<DispatchTask>>,
    pending_txs: &HashMap<ChannelKind, mpsc::Sender<DispatchTask>>,
) {
    let now = Instant::now();

    for (channel, list) in retry_lists.iter_mut() {
        let mut ready = Vec::new();
        list.retain(|task| {
            if task.next_attempt_at <= now {
                ready.push(task.clone());
                false
            } else {
                true
            }
        });

        if ready.is_empty() {
            continue;
        }

        if let Some(tx) = pending_txs.get(channel) {
            for task in ready {
                if tx.send(task).await.is_err() {
                    warn!(%channel, "pending queue closed, dropping retried task");
                }
            }
        }
    }
}
