//! Uploader that drives the external rsync binary

use super::{UploadRequest, Uploader};
use crate::config::UploadConfig;
use crate::error::{EnvironmentError, Error, UploadError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Server and connect timeout passed to rsync, in seconds
const RSYNC_TIMEOUT_SECS: u32 = 300;

/// Runs rsync with the file list fed on stdin (`--files-from=-`)
pub struct RsyncUploader {
    binary_path: PathBuf,
}

impl RsyncUploader {
    /// Create an uploader with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find rsync in PATH
    pub fn from_path() -> Option<Self> {
        which::which("rsync").ok().map(Self::new)
    }

    /// Use the configured path, falling back to a PATH lookup
    pub fn from_config(config: &UploadConfig) -> crate::Result<Self> {
        match &config.rsync_path {
            Some(path) if path.is_file() => Ok(Self::new(path.clone())),
            Some(path) => Err(EnvironmentError::ExecutableNotFound {
                name: path.display().to_string(),
            }
            .into()),
            None => Self::from_path().ok_or_else(|| {
                EnvironmentError::ExecutableNotFound {
                    name: "rsync".into(),
                }
                .into()
            }),
        }
    }

    /// Path of the binary this uploader runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command-line arguments for one request
    pub fn args(request: &UploadRequest) -> Vec<String> {
        let mut args = vec![
            "-av".to_string(),
            "--no-motd".to_string(),
            format!("--timeout={RSYNC_TIMEOUT_SECS}"),
            format!("--contimeout={RSYNC_TIMEOUT_SECS}"),
            "--files-from=-".to_string(),
        ];
        let options = &request.options;
        if options.recursive {
            args.push("--recursive".into());
        }
        if options.partial {
            args.push("--partial".into());
            if let Some(dir) = &options.partial_dir {
                args.push("--partial-dir".into());
                args.push(dir.clone());
            }
        }
        if options.remove_source_files {
            args.push("--remove-source-files".into());
        }

        // trailing slash: the file list is relative to the root's contents
        let mut root = request.source_root.display().to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        args.push(root);
        args.push(request.target.clone());
        args
    }

    /// Newline-separated file list written to rsync's stdin
    fn file_list(request: &UploadRequest) -> String {
        request
            .files
            .iter()
            .map(|f| format!("{}\n", f.display()))
            .collect()
    }
}

#[async_trait]
impl Uploader for RsyncUploader {
    async fn upload(&self, request: &UploadRequest) -> crate::Result<()> {
        tracing::info!(
            item = %request.item,
            target = %request.target,
            files = request.files.len(),
            "starting rsync transfer"
        );

        let mut child = Command::new(&self.binary_path)
            .args(Self::args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Other(format!(
                    "failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // an early exit shows up as a broken pipe; the exit status reports it
            if let Err(e) = stdin.write_all(Self::file_list(request).as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }
            // closing stdin ends the file list
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            tracing::info!(item = %request.item, "rsync transfer finished");
            return Ok(());
        }

        Err(UploadError::TransferFailed {
            target: request.target.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }

    fn name(&self) -> &'static str {
        "cli-rsync"
    }
}
