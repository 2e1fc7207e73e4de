//! # archive-worker
//!
//! Distributed-crawling worker: claims items from a tracker, captures them
//! with an external downloader and ships the resulting WARC to long-term
//! storage.
//!
//! Each worker slot runs a fixed stage list:
//!
//! ```text
//! EnvironmentCheck → claim → PrepareStaging → Fetch (retry policy)
//!     → CollectStats → Finalize → Upload (concurrency gate) → ReportDone
//! ```
//!
//! The first failing stage abandons the item: its local files are removed and
//! the tracker is never told it is done, so another worker can pick it up.
//! Proxy interference and missing tools stop the whole worker instead.
//!
//! ## Quick Start
//!
//! ```no_run
//! use archive_worker::{Config, PipelineDeps, PipelineEngine, Worker, run_with_shutdown};
//! use archive_worker::fetch::CliFetcher;
//! use archive_worker::stages::{CheckSchedule, SystemResolver};
//! use archive_worker::tracker::HttpTracker;
//! use archive_worker::upload::{ConcurrencyGate, RsyncUploader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("worker.toml".as_ref())?;
//!     let tracker = Arc::new(HttpTracker::new(&config.tracker, &config.project.name)?);
//!
//!     let gate = ConcurrencyGate::new(config.upload.concurrency);
//!     let engine = Arc::new(PipelineEngine::standard(PipelineDeps {
//!         provenance: archive_worker::utils::provenance(&config),
//!         tracker: tracker.clone(),
//!         fetcher: Arc::new(CliFetcher::from_config(&config.fetch)?),
//!         uploader: Arc::new(RsyncUploader::from_config(&config.upload)?),
//!         resolver: Arc::new(SystemResolver),
//!         gate: gate.clone(),
//!         check_schedule: Arc::new(CheckSchedule::new(config.environment.check_interval)),
//!         config: config.clone(),
//!     }));
//!
//!     let worker = Worker::new(
//!         engine,
//!         tracker,
//!         config.downloader.clone(),
//!         config.project.version.clone(),
//!         config.concurrent_items,
//!         config.tracker.poll_interval,
//!     )
//!     .with_upload_gate(gate);
//!     run_with_shutdown(&worker).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Pipeline engine and worker loop
pub mod engine;
/// Error types
pub mod error;
/// Downloader boundary and exit-status retry policy
pub mod fetch;
/// Retry logic with exponential backoff
pub mod retry;
/// Pipeline stages
pub mod stages;
/// Item-type vocabulary and target expansion
pub mod targets;
/// Tracker protocol client
pub mod tracker;
/// Core types and events
pub mod types;
/// Artifact transfer and the upload gate
pub mod upload;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use engine::{PipelineDeps, PipelineEngine, RunOutcome, Worker};
pub use error::{
    EnvironmentError, Error, FetchError, ItemError, Result, StagingError, TrackerError,
    UploadError,
};
pub use stages::Stage;
pub use targets::{ItemType, expand};
pub use types::{Event, ItemStats, ProvenanceId, WorkItem};

use tokio_util::sync::CancellationToken;

/// Run the worker until a termination signal arrives.
///
/// On SIGTERM/SIGINT (Ctrl+C elsewhere) no new items are claimed and the
/// items already in flight run to completion. An environmental error ends
/// the worker early and is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(worker: &Worker) -> Result<()> {
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let signals = tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("shutting down, waiting for in-flight items");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });

    let result = worker.run(shutdown.clone()).await;
    shutdown.cancel();
    signals.await.ok();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
