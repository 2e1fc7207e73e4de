//! Test configuration and engine builders

use super::fixtures::{
    FetchScript, RecordingTracker, RecordingUploader, ScriptedFetcher, StaticResolver,
};
use archive_worker::config::{Config, RetryConfig};
use archive_worker::stages::CheckSchedule;
use archive_worker::upload::ConcurrencyGate;
use archive_worker::{PipelineDeps, PipelineEngine, ProvenanceId};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Retry settings that never wait long
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// A valid configuration rooted at `data_dir` with all delays shortened
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config {
        downloader: "alice".to_string(),
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    config.fetch.retry_delay = Duration::ZERO;
    config.tracker.poll_interval = Duration::from_millis(10);
    config.upload.retry = fast_retry(1);
    config
}

/// Fixed provenance for assertions on the done payload
pub fn test_provenance() -> ProvenanceId {
    ProvenanceId {
        pipeline_hash: "0123456789abcdef".to_string(),
        script_hash: Some("fedcba9876543210".to_string()),
        runtime_version: "archive-worker/test".to_string(),
    }
}

/// Mock collaborators wired into a standard engine
pub struct Harness {
    /// Engine under test
    pub engine: Arc<PipelineEngine>,
    /// Fetch mock
    pub fetcher: Arc<ScriptedFetcher>,
    /// Tracker mock
    pub tracker: Arc<RecordingTracker>,
    /// Upload mock
    pub uploader: Arc<RecordingUploader>,
    /// Resolver mock
    pub resolver: Arc<StaticResolver>,
    /// Gate shared by every item in the harness
    pub gate: ConcurrencyGate,
}

impl Harness {
    /// Build a standard engine over mocks
    pub fn new(
        config: Config,
        fetcher: ScriptedFetcher,
        uploader: RecordingUploader,
        resolver: StaticResolver,
        tracker: RecordingTracker,
    ) -> Self {
        let fetcher = Arc::new(fetcher);
        let tracker = Arc::new(tracker);
        let uploader = Arc::new(uploader);
        let resolver = Arc::new(resolver);
        let gate = ConcurrencyGate::new(config.upload.concurrency);

        let engine = Arc::new(PipelineEngine::standard(PipelineDeps {
            provenance: test_provenance(),
            tracker: tracker.clone(),
            fetcher: fetcher.clone(),
            uploader: uploader.clone(),
            resolver: resolver.clone(),
            gate: gate.clone(),
            check_schedule: Arc::new(CheckSchedule::new(config.environment.check_interval)),
            config,
        }));

        Self {
            engine,
            fetcher,
            tracker,
            uploader,
            resolver,
            gate,
        }
    }

    /// Standard engine where every fetch succeeds with a compressed capture
    pub fn succeeding(data_dir: &Path) -> Self {
        Self::new(
            test_config(data_dir),
            ScriptedFetcher::always(FetchScript::compressed(0)),
            RecordingUploader::new(),
            StaticResolver::distinct(),
            RecordingTracker::new(),
        )
    }
}
