//! Artifact transfer and the gate around it

use super::Stage;
use crate::config::RetryConfig;
use crate::error::{Error, ItemError, Result, UploadError};
use crate::retry::{IsRetryable, retry_with_backoff};
use crate::tracker::TrackerClient;
use crate::types::WorkItem;
use crate::upload::{ConcurrencyGate, UploadOptions, UploadRequest, Uploader};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Asks the tracker for a target and transfers the finalized artifact
pub struct UploadStage {
    tracker: Arc<dyn TrackerClient>,
    uploader: Arc<dyn Uploader>,
    downloader: String,
    version: String,
    options: UploadOptions,
    retry: RetryConfig,
}

impl UploadStage {
    /// Create the stage
    pub fn new(
        tracker: Arc<dyn TrackerClient>,
        uploader: Arc<dyn Uploader>,
        downloader: impl Into<String>,
        version: impl Into<String>,
        options: UploadOptions,
        retry: RetryConfig,
    ) -> Self {
        Self {
            tracker,
            uploader,
            downloader: downloader.into(),
            version: version.into(),
            options,
            retry,
        }
    }

    fn request_for(&self, item: &WorkItem, target: String) -> Result<UploadRequest> {
        let artifact = item.artifact.as_deref().ok_or_else(|| ItemError::MissingField {
            item: item.name().to_string(),
            field: "artifact",
        })?;
        let file_name = artifact
            .strip_prefix(item.data_dir())
            .map(PathBuf::from)
            .map_err(|_| {
                Error::Other(format!(
                    "artifact {} is outside {}",
                    artifact.display(),
                    item.data_dir().display()
                ))
            })?;

        Ok(UploadRequest {
            item: item.name().to_string(),
            files: vec![file_name],
            source_root: item.data_dir().to_path_buf(),
            target,
            options: self.options.clone(),
        })
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let target = self
            .tracker
            .upload_target(&self.downloader, &self.version)
            .await?;
        let request = self.request_for(item, target)?;

        let uploader = &self.uploader;
        let req = &request;
        retry_with_backoff(&self.retry, "upload", move || uploader.upload(req))
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    UploadError::Exhausted {
                        attempts: self.retry.max_attempts + 1,
                        reason: e.to_string(),
                    }
                    .into()
                } else {
                    e
                }
            })?;

        tracing::info!(
            item = %item.name(),
            uploader = self.uploader.name(),
            target = %request.target,
            "artifact uploaded"
        );
        Ok(())
    }
}

/// Runs the wrapped stage only while holding a gate slot
pub struct GatedStage {
    gate: ConcurrencyGate,
    inner: Box<dyn Stage>,
}

impl GatedStage {
    /// Wrap a stage
    pub fn new(gate: ConcurrencyGate, inner: Box<dyn Stage>) -> Self {
        Self { gate, inner }
    }
}

#[async_trait]
impl Stage for GatedStage {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        tracing::debug!(
            item = %item.name(),
            stage = self.inner.name(),
            available = self.gate.available(),
            "waiting for gate"
        );
        let _permit = self.gate.acquire().await?;
        self.inner.run(item).await
    }
}
