//! Traits and types for running the downloader

use async_trait::async_trait;
use std::path::PathBuf;

/// One downloader invocation, fully resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Item the invocation belongs to (for logging)
    pub item: String,
    /// Command-line arguments, flags first and target URLs last
    pub args: Vec<String>,
    /// Extra environment variables for the process
    pub env: Vec<(String, String)>,
    /// Scratch directory the downloader writes into
    pub item_dir: PathBuf,
    /// Compressed WARC the downloader is expected to produce
    pub artifact: PathBuf,
}

/// Trait for running the downloader
///
/// Implementations return the process exit code, or `None` when the process
/// was terminated by a signal. Failing to start the process at all is an
/// error, not an exit status.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Run one invocation to completion
    async fn fetch(&self, request: &FetchRequest) -> crate::Result<Option<i32>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
