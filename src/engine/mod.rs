//! Pipeline engine: drives one item through the ordered stage list
//!
//! Stages run strictly in order; the first failure skips the rest, removes
//! the item's local files and leaves the tracker untouched so the item can
//! be handed out again. Only environmental errors escape [`PipelineEngine::run`];
//! every other failure is reported as [`RunOutcome::Abandoned`].
//!
//! [`PipelineEngine::preflight`] runs the sampled environment check. Callers
//! run it before claiming the next item.

mod worker;

pub use worker::Worker;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{FetchArgs, Fetcher, RetryPolicy};
use crate::stages::{
    CheckSchedule, CollectStats, EnvironmentCheck, FetchStage, Finalize, GatedStage,
    PrepareStaging, ReportDone, Resolver, Stage, UploadStage,
};
use crate::tracker::TrackerClient;
use crate::types::{Event, ProvenanceId, WorkItem};
use crate::upload::{ConcurrencyGate, UploadOptions, Uploader};
use crate::utils::{remove_dir_if_exists, remove_file_if_exists};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How one run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage succeeded
    Completed,
    /// A stage failed; local files were removed and no done report was sent
    Abandoned {
        /// Stage that failed
        stage: &'static str,
        /// Error message
        error: String,
    },
    /// The item name was unusable and no stage ran
    Rejected {
        /// Why the item was rejected
        reason: String,
    },
}

/// Collaborators for [`PipelineEngine::standard`]
pub struct PipelineDeps {
    /// Validated configuration
    pub config: Config,
    /// Provenance identifiers computed at startup
    pub provenance: ProvenanceId,
    /// Tracker client
    pub tracker: Arc<dyn TrackerClient>,
    /// Downloader handler
    pub fetcher: Arc<dyn Fetcher>,
    /// Transfer handler
    pub uploader: Arc<dyn Uploader>,
    /// Name resolver for the environment check
    pub resolver: Arc<dyn Resolver>,
    /// Upload gate shared with every other engine in the process
    pub gate: ConcurrencyGate,
    /// Environment check sampling counter shared with every other engine in the process
    pub check_schedule: Arc<CheckSchedule>,
}

/// Runs items through an ordered list of stages
///
/// Stages keep no per-item state, so one engine may run several items at
/// once; each run owns its [`WorkItem`].
pub struct PipelineEngine {
    preflight: Option<EnvironmentCheck>,
    stages: Vec<Box<dyn Stage>>,
    data_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
}

impl PipelineEngine {
    /// Create an engine with an explicit stage list
    pub fn new(stages: Vec<Box<dyn Stage>>, data_dir: impl Into<PathBuf>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            preflight: None,
            stages,
            data_dir: data_dir.into(),
            event_tx,
        }
    }

    /// Run `check` from [`preflight`](Self::preflight)
    pub fn with_preflight(mut self, check: EnvironmentCheck) -> Self {
        self.preflight = Some(check);
        self
    }

    /// Create an engine with the standard stage order
    pub fn standard(deps: PipelineDeps) -> Self {
        let PipelineDeps {
            config,
            provenance,
            tracker,
            fetcher,
            uploader,
            resolver,
            gate,
            check_schedule,
        } = deps;

        let preflight = config.environment.enabled.then(|| {
            EnvironmentCheck::from_config(&config.environment, resolver, check_schedule)
        });

        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(6);
        stages.push(Box::new(PrepareStaging::new(
            config.project.warc_prefix.clone(),
        )));
        stages.push(Box::new(FetchStage::new(
            fetcher,
            FetchArgs::new(&config, &provenance),
            RetryPolicy::from_config(&config.fetch),
        )));
        stages.push(Box::new(CollectStats::new(
            config.downloader.clone(),
            config.project.version.clone(),
            provenance,
        )));
        stages.push(Box::new(Finalize));
        stages.push(Box::new(GatedStage::new(
            gate,
            Box::new(UploadStage::new(
                tracker.clone(),
                uploader,
                config.downloader.clone(),
                config.project.version.clone(),
                UploadOptions::from_config(&config.upload),
                config.upload.retry.clone(),
            )),
        )));
        stages.push(Box::new(ReportDone::new(tracker)));

        let engine = Self::new(stages, config.data_dir);
        match preflight {
            Some(check) => engine.with_preflight(check),
            None => engine,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Names of the configured stages, in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Shared staging root
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Emit an event; having no subscribers is fine
    pub fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Run the sampled environment check, if one is configured
    ///
    /// Proxy detection is environmental and should stop the caller before it
    /// claims anything. A failed lookup is not; the next call checks again.
    pub async fn preflight(&self) -> Result<()> {
        if let Some(check) = &self.preflight {
            check.run_sampled().await?;
        }
        Ok(())
    }

    /// Parse a claimed item name and run it
    pub async fn process(&self, item_name: &str) -> Result<RunOutcome> {
        match WorkItem::new(item_name, self.data_dir.clone()) {
            Ok(item) => self.run(item).await,
            Err(e) => {
                tracing::warn!(item = %item_name, error = %e, "rejecting item");
                self.emit(Event::ItemRejected {
                    item: item_name.to_string(),
                    reason: e.to_string(),
                });
                Ok(RunOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run every stage against the item
    ///
    /// Returns `Err` only for environmental errors, after cleaning up.
    pub async fn run(&self, mut item: WorkItem) -> Result<RunOutcome> {
        let name = item.name().to_string();
        tracing::info!(item = %name, "starting item");

        for stage in &self.stages {
            let stage_name = stage.name();
            self.emit(Event::StageStarted {
                item: name.clone(),
                stage: stage_name,
            });

            match stage.run(&mut item).await {
                Ok(()) => {
                    tracing::debug!(item = %name, stage = stage_name, "stage completed");
                    self.emit(Event::StageCompleted {
                        item: name.clone(),
                        stage: stage_name,
                    });
                }
                Err(e) => {
                    tracing::error!(item = %name, stage = stage_name, error = %e, "stage failed, abandoning item");
                    self.cleanup(&item).await;
                    self.emit(Event::ItemAbandoned {
                        item: name.clone(),
                        stage: stage_name,
                        error: e.to_string(),
                    });

                    if e.is_environmental() {
                        return Err(e);
                    }
                    return Ok(RunOutcome::Abandoned {
                        stage: stage_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Finalize removes it already; this covers stage lists without Finalize
        if let Some(dir) = &item.item_dir
            && let Err(e) = remove_dir_if_exists(dir).await
        {
            tracing::warn!(item = %name, dir = %dir.display(), error = %e, "failed to remove item directory");
        }

        tracing::info!(item = %name, "item completed");
        self.emit(Event::ItemCompleted { item: name });
        Ok(RunOutcome::Completed)
    }

    /// Remove everything an abandoned item left on disk
    async fn cleanup(&self, item: &WorkItem) {
        if let Some(dir) = &item.item_dir {
            match remove_dir_if_exists(dir).await {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(item = %item.name(), dir = %dir.display(), error = %e, "failed to remove item directory");
                }
            }
        }
        if let Some(artifact) = &item.artifact {
            match remove_file_if_exists(artifact).await {
                Ok(true) => {
                    tracing::info!(item = %item.name(), artifact = %artifact.display(), "removed abandoned artifact");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(item = %item.name(), artifact = %artifact.display(), error = %e, "failed to remove artifact");
                }
            }
        }
    }
}
