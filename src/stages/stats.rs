//! Accounting data for the done report

use super::Stage;
use crate::error::Result;
use crate::types::{ItemStats, ProvenanceId, WorkItem};
use async_trait::async_trait;

/// File group the capture is accounted under
pub const DATA_FILE_GROUP: &str = "data";

/// Assembles the stats payload; never fails the run
pub struct CollectStats {
    downloader: String,
    version: String,
    provenance: ProvenanceId,
}

impl CollectStats {
    /// Create the stage
    pub fn new(downloader: impl Into<String>, version: impl Into<String>, provenance: ProvenanceId) -> Self {
        Self {
            downloader: downloader.into(),
            version: version.into(),
            provenance,
        }
    }

    async fn artifact_size(item: &WorkItem) -> u64 {
        let path = match item.staged_artifact_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(item = %item.name(), error = %e, "no artifact path for stats");
                return 0;
            }
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(item = %item.name(), path = %path.display(), error = %e, "failed to stat artifact");
                0
            }
        }
    }
}

#[async_trait]
impl Stage for CollectStats {
    fn name(&self) -> &'static str {
        "collect-stats"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let mut stats = ItemStats {
            downloader: self.downloader.clone(),
            version: self.version.clone(),
            id: self.provenance.clone(),
            extra: item.extra.clone(),
            ..Default::default()
        };
        let size = Self::artifact_size(item).await;
        stats.bytes.insert(DATA_FILE_GROUP.to_string(), size);

        tracing::debug!(item = %item.name(), bytes = size, "stats collected");
        item.stats = Some(stats);
        Ok(())
    }
}
