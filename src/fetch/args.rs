//! Downloader command-line construction

use super::traits::FetchRequest;
use crate::config::Config;
use crate::types::{ProvenanceId, WorkItem};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Length of the config-hash prefix stamped into the `pipeline-version` WARC header
const PIPELINE_HASH_PREFIX: usize = 12;

/// Static part of the downloader command line, resolved once at startup
#[derive(Debug, Clone)]
pub struct FetchArgs {
    user_agent: String,
    script: PathBuf,
    request_timeout: Duration,
    domains: Vec<String>,
    project: String,
    version: String,
    pipeline_hash: String,
    downloader: String,
    bind_address: Option<IpAddr>,
}

impl FetchArgs {
    /// Resolve the static flags from configuration and provenance
    pub fn new(config: &Config, provenance: &ProvenanceId) -> Self {
        Self {
            user_agent: config.project.user_agent.clone(),
            script: config.fetch.script.clone(),
            request_timeout: config.fetch.request_timeout,
            domains: config.fetch.domains.clone(),
            project: config.project.name.clone(),
            version: config.project.version.clone(),
            pipeline_hash: provenance.pipeline_hash.clone(),
            downloader: config.downloader.clone(),
            bind_address: config.fetch.bind_address,
        }
    }

    /// Value of the `pipeline-version` WARC header
    pub fn pipeline_version(&self) -> String {
        let hash = self
            .pipeline_hash
            .get(..PIPELINE_HASH_PREFIX)
            .unwrap_or(&self.pipeline_hash);
        format!("{}-{}", self.version, hash)
    }

    /// Build the full invocation for one item; its staging fields must be set
    pub fn request_for(&self, item: &WorkItem) -> crate::Result<FetchRequest> {
        let item_dir = item.require_item_dir()?.to_path_buf();
        let timeout = self.request_timeout.as_secs().to_string();

        let mut args: Vec<String> = vec![
            "-U".into(),
            self.user_agent.clone(),
            "-nv".into(),
            "--lua-script".into(),
            self.script.display().to_string(),
            "-o".into(),
            item_dir.join("wget.log").display().to_string(),
            "--no-check-certificate".into(),
            "--output-document".into(),
            item_dir.join("wget.tmp").display().to_string(),
            "--truncate-output".into(),
            "-e".into(),
            "robots=off".into(),
            "--no-cookies".into(),
            "--rotate-dns".into(),
            "--recursive".into(),
            "--level=inf".into(),
            "--no-parent".into(),
            "--page-requisites".into(),
            "--timeout".into(),
            timeout.clone(),
            "--tries".into(),
            "inf".into(),
            "--span-hosts".into(),
            "--waitretry".into(),
            timeout,
            "--domains".into(),
            self.domains.join(","),
            "--warc-file".into(),
            item.warc_prefix_path()?.display().to_string(),
            "--warc-header".into(),
            "operator: Archive Team".into(),
            "--warc-header".into(),
            format!("{}-dld-script-version: {}", self.project, self.version),
            "--warc-header".into(),
            format!("pipeline-version: {}", self.pipeline_version()),
            "--warc-header".into(),
            format!("{}-user: {}", self.project, item.name()),
        ];

        if let Some(addr) = self.bind_address {
            args.push("--bind-address".into());
            args.push(addr.to_string());
        }

        args.extend(item.targets());

        let env = vec![
            ("item_dir".to_string(), item_dir.display().to_string()),
            ("item_value".to_string(), item.value().to_string()),
            ("item_type".to_string(), item.item_type().to_string()),
            ("downloader".to_string(), self.downloader.clone()),
        ];

        Ok(FetchRequest {
            item: item.name().to_string(),
            args,
            env,
            artifact: item.staged_artifact_path()?,
            item_dir,
        })
    }
}
