//! Downloader handler that spawns the external wget-lua binary

use super::traits::{FetchRequest, Fetcher};
use crate::config::FetchConfig;
use crate::error::{EnvironmentError, FetchError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Runs the downloader executable as a child process
///
/// Output goes to the log file named in the arguments, so the child's own
/// stdout/stderr are discarded.
pub struct CliFetcher {
    binary_path: PathBuf,
}

impl CliFetcher {
    /// Create a handler with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find a binary by name in PATH
    pub fn from_path(name: &str) -> Option<Self> {
        which::which(name).ok().map(Self::new)
    }

    /// Use the configured path, falling back to a PATH lookup
    pub fn from_config(config: &FetchConfig) -> crate::Result<Self> {
        match &config.executable {
            Some(path) if path.is_file() => Ok(Self::new(path.clone())),
            Some(path) => Err(EnvironmentError::ExecutableNotFound {
                name: path.display().to_string(),
            }
            .into()),
            None => Self::from_path(&config.executable_name).ok_or_else(|| {
                EnvironmentError::ExecutableNotFound {
                    name: config.executable_name.clone(),
                }
                .into()
            }),
        }
    }

    /// Path of the binary this handler runs
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }
}

#[async_trait]
impl Fetcher for CliFetcher {
    async fn fetch(&self, request: &FetchRequest) -> crate::Result<Option<i32>> {
        tracing::debug!(
            item = %request.item,
            binary = %self.binary_path.display(),
            arg_count = request.args.len(),
            "spawning downloader"
        );

        let status = Command::new(&self.binary_path)
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| FetchError::SpawnFailed {
                program: self.binary_path.clone(),
                reason: e.to_string(),
            })?;

        Ok(status.code())
    }

    fn name(&self) -> &'static str {
        "cli-wget-lua"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn request(args: &[&str]) -> FetchRequest {
        FetchRequest {
            item: "verizon:abc".into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: vec![],
            item_dir: PathBuf::from("/tmp"),
            artifact: PathBuf::from("/tmp/x.warc.gz"),
        }
    }

    #[test]
    fn test_missing_configured_binary_is_environmental() {
        let config = FetchConfig {
            executable: Some(PathBuf::from("/nonexistent/wget-lua-xyz")),
            ..Default::default()
        };
        let err = CliFetcher::from_config(&config).err().unwrap();
        assert!(err.is_environmental());
    }

    #[test]
    fn test_from_path_consistency_with_which_crate() {
        let which_result = which::which("nonexistent-wget-lua-binary-xyz");
        let from_path_result = CliFetcher::from_path("nonexistent-wget-lua-binary-xyz");
        assert_eq!(which_result.is_ok(), from_path_result.is_some());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let fetcher = CliFetcher::new(PathBuf::from("/nonexistent/wget-lua-xyz"));
        let result = fetcher.fetch(&request(&[])).await;
        assert!(matches!(
            result,
            Err(Error::Fetch(FetchError::SpawnFailed { .. }))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let fetcher = CliFetcher::new(PathBuf::from("/bin/sh"));
        let code = fetcher.fetch(&request(&["-c", "exit 4"])).await.unwrap();
        assert_eq!(code, Some(4));
    }
}
