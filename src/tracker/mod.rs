//! Tracker protocol client
//!
//! The tracker hands out items, tells uploaders where to send artifacts and
//! records completion. The engine only depends on [`TrackerClient`];
//! [`HttpTracker`] speaks the real HTTP protocol.

mod http;

pub use http::HttpTracker;

use crate::types::ItemStats;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// API version sent with claim requests
pub const API_VERSION: &str = "2";

/// Body of a claim request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Downloader nickname
    pub downloader: String,
    /// Tracker API version
    pub api_version: String,
    /// Pipeline version
    pub version: String,
}

/// Body of a successful claim response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    /// Item assigned to this downloader
    pub item_name: String,
}

/// Body of an upload-target request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTargetRequest {
    /// Downloader nickname
    pub downloader: String,
    /// Pipeline version
    pub version: String,
}

/// Body of a done report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    /// Item being reported
    pub item: String,
    /// Accounting data (downloader, version, bytes, id, extras)
    #[serde(flatten)]
    pub stats: ItemStats,
}

/// Trait for talking to the tracker
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Ask for an item. `Ok(None)` means no work is available right now.
    async fn claim_item(&self, downloader: &str, version: &str) -> crate::Result<Option<String>>;

    /// Ask where to upload artifacts
    async fn upload_target(&self, downloader: &str, version: &str) -> crate::Result<String>;

    /// Report an item as done, with its accounting data
    async fn report_done(&self, item: &str, stats: &ItemStats) -> crate::Result<()>;
}

/// Substitute the downloader nickname into an upload target template
///
/// ```
/// use archive_worker::tracker::interpolate_target;
///
/// assert_eq!(
///     interpolate_target("rsync://host/module/:downloader/", "alice"),
///     "rsync://host/module/alice/"
/// );
/// ```
pub fn interpolate_target(template: &str, downloader: &str) -> String {
    template.trim().replace(":downloader", downloader)
}
