//! Artifact transfer to long-term storage
//!
//! [`Uploader`] is the transport boundary; [`RsyncUploader`] drives the rsync
//! binary. [`ConcurrencyGate`] bounds how many transfers run at once across
//! every item in the process.

mod gate;
mod rsync;

pub use gate::{ConcurrencyGate, GatePermit};
pub use rsync::RsyncUploader;

use crate::config::UploadConfig;
use async_trait::async_trait;
use std::path::PathBuf;

/// Transfer options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Transfer directories recursively
    pub recursive: bool,
    /// Keep partially transferred files so an interrupted transfer can resume
    pub partial: bool,
    /// Where the receiving side keeps partial files
    pub partial_dir: Option<String>,
    /// Delete local files once they have been transferred
    pub remove_source_files: bool,
}

impl UploadOptions {
    /// Options from the upload section of the configuration
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            recursive: true,
            partial: true,
            partial_dir: Some(config.partial_dir.clone()).filter(|d| !d.is_empty()),
            remove_source_files: config.remove_source_files,
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// One transfer: `files` are paths relative to `source_root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Item the files belong to (for logging)
    pub item: String,
    /// Files to send, relative to `source_root`
    pub files: Vec<PathBuf>,
    /// Local directory the file list is relative to
    pub source_root: PathBuf,
    /// Remote destination as returned by the tracker
    pub target: String,
    /// Transfer options
    pub options: UploadOptions,
}

/// Trait for bulk file transfer implementations
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer the files; any error means nothing may be assumed about the remote side
    async fn upload(&self, request: &UploadRequest) -> crate::Result<()>;

    /// Handler name for logging
    fn name(&self) -> &'static str;
}
