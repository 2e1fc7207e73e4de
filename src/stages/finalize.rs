//! Moves the finished capture into the shared data directory

use super::Stage;
use crate::error::{Result, StagingError};
use crate::types::WorkItem;
use crate::utils::remove_dir_if_exists;
use async_trait::async_trait;

/// Checks the capture, moves it to `data_dir` and removes `item_dir`
#[derive(Debug, Default, Clone, Copy)]
pub struct Finalize;

#[async_trait]
impl Stage for Finalize {
    fn name(&self) -> &'static str {
        "finalize"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let uncompressed = item.uncompressed_artifact_path()?;
        if tokio::fs::try_exists(&uncompressed).await? {
            return Err(StagingError::MissingCompression { path: uncompressed }.into());
        }

        let staged = item.staged_artifact_path()?;
        if !tokio::fs::try_exists(&staged).await? {
            return Err(StagingError::ArtifactMissing { path: staged }.into());
        }

        let dest = item.final_artifact_path()?;
        tokio::fs::rename(&staged, &dest)
            .await
            .map_err(|e| StagingError::MoveFailed {
                source_path: staged.clone(),
                dest_path: dest.clone(),
                reason: e.to_string(),
            })?;
        item.artifact = Some(dest.clone());

        remove_dir_if_exists(item.require_item_dir()?).await?;

        tracing::info!(item = %item.name(), artifact = %dest.display(), "artifact finalized");
        Ok(())
    }
}
