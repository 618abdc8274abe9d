//! Periodic drip tick.
//!
//! Spawns a tokio task that runs one sequencer tick per interval. The first
//! tick fires on startup so a restarted service catches up immediately.
//! Overlap with an externally triggered tick is harmless: the sequencer's
//! claim set and the store's unique step index keep each step single.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::sequencer::DripSequencer;

/// Handle for the background tick task.
///
/// Dropping the handle signals shutdown; `stop()` also waits for the task.
pub struct DripTickHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DripTickHandle {
    /// Request shutdown. A tick already in progress runs to completion.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Request shutdown and wait for the task to exit.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Drip tick task ended abnormally");
            }
        }
    }
}

impl Drop for DripTickHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start ticking every `interval`. Must be called inside a tokio runtime.
pub fn start_drip_ticker(sequencer: Arc<DripSequencer>, interval: Duration) -> DripTickHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Drip ticker started");
        tick_loop(&sequencer, interval, shutdown_rx).await;
        tracing::info!("Drip ticker stopped");
    });

    DripTickHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn tick_loop(sequencer: &DripSequencer, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if let Err(e) = sequencer.run_tick(None).await {
                    tracing::warn!(error = %e, "Scheduled drip tick failed, retrying next interval");
                }
            }
        }
    }
}
