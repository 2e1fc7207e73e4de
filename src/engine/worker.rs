//! Claim loop: N slots, each repeatedly checking the environment, claiming
//! one item and running it

use super::{PipelineEngine, RunOutcome};
use crate::error::{Error, Result};
use crate::tracker::TrackerClient;
use crate::types::Event;
use crate::upload::ConcurrencyGate;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Long-running worker that keeps every slot busy until shutdown
///
/// All slots share one [`PipelineEngine`]. Each slot runs one item at a time
/// and every run owns its own [`WorkItem`](crate::WorkItem), so this behaves
/// like one engine per slot.
pub struct Worker {
    engine: Arc<PipelineEngine>,
    tracker: Arc<dyn TrackerClient>,
    upload_gate: Option<ConcurrencyGate>,
    downloader: String,
    version: String,
    slots: usize,
    poll_interval: Duration,
}

impl Worker {
    /// Create a worker
    pub fn new(
        engine: Arc<PipelineEngine>,
        tracker: Arc<dyn TrackerClient>,
        downloader: impl Into<String>,
        version: impl Into<String>,
        slots: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            tracker,
            upload_gate: None,
            downloader: downloader.into(),
            version: version.into(),
            slots: slots.max(1),
            poll_interval,
        }
    }

    /// Close `gate` when an environmental error stops the worker
    ///
    /// Items still waiting for an upload slot are then abandoned instead of
    /// transferring captures made in a broken environment.
    pub fn with_upload_gate(mut self, gate: ConcurrencyGate) -> Self {
        self.upload_gate = Some(gate);
        self
    }

    /// Run until `shutdown` is cancelled or an environmental error occurs
    ///
    /// Cancelling stops new claims; items already inside the pipeline run to
    /// the end. An environmental error in any slot cancels the token, closes
    /// the upload gate and is returned once every slot has stopped.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut slots = JoinSet::new();
        for slot in 0..self.slots {
            let ctx = SlotContext {
                slot,
                engine: self.engine.clone(),
                tracker: self.tracker.clone(),
                downloader: self.downloader.clone(),
                version: self.version.clone(),
                poll_interval: self.poll_interval,
                shutdown: shutdown.clone(),
            };
            slots.spawn(ctx.run());
        }
        tracing::info!(slots = self.slots, "worker started");

        let mut first_error = None;
        while let Some(joined) = slots.join_next().await {
            let result = joined.map_err(|e| Error::Other(format!("worker slot panicked: {e}")));
            if let Err(e) = result.and_then(|r| r) {
                shutdown.cancel();
                if let Some(gate) = &self.upload_gate {
                    gate.close();
                }
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        tracing::info!("worker stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct SlotContext {
    slot: usize,
    engine: Arc<PipelineEngine>,
    tracker: Arc<dyn TrackerClient>,
    downloader: String,
    version: String,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl SlotContext {
    async fn run(self) -> Result<()> {
        let slot = self.slot;
        while !self.shutdown.is_cancelled() {
            let preflight = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.engine.preflight() => result,
            };
            if let Err(e) = preflight {
                if e.is_environmental() {
                    tracing::error!(slot, error = %e, "environment is unusable, stopping worker");
                    self.shutdown.cancel();
                    return Err(e);
                }
                tracing::warn!(slot, error = %e, "environment check failed");
                self.idle().await;
                continue;
            }

            let Some(item) = self.claim().await else {
                break;
            };

            self.engine.emit(Event::ItemClaimed { item: item.clone() });
            match self.engine.process(&item).await {
                Ok(RunOutcome::Completed) => {}
                Ok(RunOutcome::Abandoned { stage, error }) => {
                    tracing::warn!(slot, item = %item, stage, error = %error, "item abandoned");
                }
                Ok(RunOutcome::Rejected { reason }) => {
                    tracing::warn!(slot, item = %item, reason = %reason, "item rejected");
                }
                Err(e) => {
                    tracing::error!(slot, item = %item, error = %e, "environment is unusable, stopping worker");
                    self.shutdown.cancel();
                    return Err(e);
                }
            }
        }
        tracing::debug!(slot, "slot stopped");
        Ok(())
    }

    /// Poll the tracker until it hands out an item; `None` on shutdown
    async fn claim(&self) -> Option<String> {
        let slot = self.slot;
        while !self.shutdown.is_cancelled() {
            let claim = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                claim = self.tracker.claim_item(&self.downloader, &self.version) => claim,
            };

            match claim {
                Ok(Some(item)) => return Some(item),
                Ok(None) => {
                    self.engine.emit(Event::NoWorkAvailable);
                    tracing::debug!(slot, delay_secs = self.poll_interval.as_secs(), "no work available");
                }
                Err(e) => {
                    tracing::warn!(slot, error = %e, "failed to claim item");
                }
            }
            self.idle().await;
        }
        None
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }
}
