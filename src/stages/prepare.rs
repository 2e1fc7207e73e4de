//! Per-item scratch directory setup

use super::Stage;
use crate::error::Result;
use crate::types::WorkItem;
use crate::utils::{escape_item_name, remove_dir_if_exists, warc_file_base};
use async_trait::async_trait;

/// Derives the item's staging paths and recreates its scratch directory
///
/// Any leftover directory from an earlier run of the same item is removed
/// first. An empty placeholder is created at the artifact path so the
/// downloader always finds it writable.
pub struct PrepareStaging {
    warc_prefix: String,
}

impl PrepareStaging {
    /// Create the stage with the project's WARC file prefix
    pub fn new(warc_prefix: impl Into<String>) -> Self {
        Self {
            warc_prefix: warc_prefix.into(),
        }
    }
}

#[async_trait]
impl Stage for PrepareStaging {
    fn name(&self) -> &'static str {
        "prepare-staging"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let item_dir = item.data_dir().join(escape_item_name(item.name()));

        if remove_dir_if_exists(&item_dir).await? {
            tracing::debug!(item = %item.name(), dir = %item_dir.display(), "removed stale item directory");
        }
        tokio::fs::create_dir_all(&item_dir).await?;

        item.item_dir = Some(item_dir);
        item.warc_file_base = Some(warc_file_base(
            &self.warc_prefix,
            item.name(),
            chrono::Utc::now(),
        ));

        let placeholder = item.staged_artifact_path()?;
        tokio::fs::File::create(&placeholder).await?;

        tracing::debug!(
            item = %item.name(),
            artifact = %placeholder.display(),
            "staging prepared"
        );
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_directory_and_placeholder() {
        let temp = TempDir::new().unwrap();
        let mut item = WorkItem::new("verizon36pack:ab", temp.path()).unwrap();

        PrepareStaging::new("verizon").run(&mut item).await.unwrap();

        let item_dir = item.item_dir.clone().unwrap();
        assert_eq!(item_dir, temp.path().join("verizon36pack_ab"));
        assert!(item_dir.is_dir());

        let base = item.warc_file_base.clone().unwrap();
        assert!(base.starts_with("verizon-verizon36pack_ab-"));

        let placeholder = item.staged_artifact_path().unwrap();
        assert_eq!(std::fs::metadata(&placeholder).unwrap().len(), 0);
        assert_eq!(std::fs::read_dir(&item_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_stale_contents_are_removed() {
        let temp = TempDir::new().unwrap();
        let stale_dir = temp.path().join("verizon_abc");
        std::fs::create_dir_all(stale_dir.join("nested")).unwrap();
        std::fs::write(stale_dir.join("old.warc.gz"), b"stale").unwrap();

        let mut item = WorkItem::new("verizon:abc", temp.path()).unwrap();
        PrepareStaging::new("verizon").run(&mut item).await.unwrap();

        assert!(!stale_dir.join("old.warc.gz").exists());
        assert!(!stale_dir.join("nested").exists());
    }
}
