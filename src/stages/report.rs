//! Completion signal to the tracker

use super::Stage;
use crate::error::{ItemError, Result};
use crate::tracker::TrackerClient;
use crate::types::WorkItem;
use async_trait::async_trait;
use std::sync::Arc;

/// Sends the done report with the collected stats
pub struct ReportDone {
    tracker: Arc<dyn TrackerClient>,
}

impl ReportDone {
    /// Create the stage
    pub fn new(tracker: Arc<dyn TrackerClient>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Stage for ReportDone {
    fn name(&self) -> &'static str {
        "report-done"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let stats = item.stats.as_ref().ok_or_else(|| ItemError::MissingField {
            item: item.name().to_string(),
            field: "stats",
        })?;
        self.tracker.report_done(item.name(), stats).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ItemStats;
    use std::sync::Mutex;

    #[derive(Default)]
    struct DoneRecorder {
        reports: Mutex<Vec<(String, ItemStats)>>,
    }

    #[async_trait]
    impl TrackerClient for DoneRecorder {
        async fn claim_item(&self, _: &str, _: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn upload_target(&self, _: &str, _: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn report_done(&self, item: &str, stats: &ItemStats) -> Result<()> {
            self.reports
                .lock()
                .unwrap()
                .push((item.to_string(), stats.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reports_collected_stats() {
        let tracker = Arc::new(DoneRecorder::default());
        let mut item = WorkItem::new("verizon:abc", "/tmp").unwrap();
        let mut stats = ItemStats {
            downloader: "alice".to_string(),
            version: "20140928.02".to_string(),
            ..Default::default()
        };
        stats.bytes.insert("data".to_string(), 42);
        item.stats = Some(stats);

        ReportDone::new(tracker.clone()).run(&mut item).await.unwrap();

        let reports = tracker.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "verizon:abc");
        assert_eq!(reports[0].1.bytes["data"], 42);
    }

    #[tokio::test]
    async fn test_missing_stats_is_reported_not_sent() {
        let tracker = Arc::new(DoneRecorder::default());
        let mut item = WorkItem::new("verizon:abc", "/tmp").unwrap();

        let err = ReportDone::new(tracker.clone())
            .run(&mut item)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Item(ItemError::MissingField { field: "stats", .. })
        ));
        assert!(tracker.reports.lock().unwrap().is_empty());
    }
}
