//! Configuration types for archive-worker
//!
//! Configuration is read from a TOML file ([`Config::from_file`]); every field
//! except `downloader` has a default, so a minimal file is a single line:
//!
//! ```toml
//! downloader = "alice"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for concurrent uploads accepted by the tracker
pub const MAX_UPLOAD_CONCURRENCY: usize = 4;

/// Top-level worker configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Nickname reported to the tracker with every request
    #[serde(default)]
    pub downloader: String,

    /// Number of items processed in parallel (default: 1)
    #[serde(default = "default_concurrent_items")]
    pub concurrent_items: usize,

    /// Shared staging root; finished artifacts wait here for upload (default: "data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Project identity
    #[serde(default)]
    pub project: ProjectConfig,

    /// Tracker connection
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Downloader invocation
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Artifact upload
    #[serde(default)]
    pub upload: UploadConfig,

    /// Network environment sampling
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            downloader: String::new(),
            concurrent_items: default_concurrent_items(),
            data_dir: default_data_dir(),
            project: ProjectConfig::default(),
            tracker: TrackerConfig::default(),
            fetch: FetchConfig::default(),
            upload: UploadConfig::default(),
            environment: EnvironmentConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file without validating it
    ///
    /// For callers that override values before calling [`validate`](Self::validate).
    pub fn read_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config",
                format!("failed to read '{}': {}", path.display(), e),
            )
        })?;
        Self::parse(&text)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Self::parse(text)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.downloader.trim().is_empty() {
            return Err(Error::config("downloader", "a downloader nickname is required"));
        }
        if self.concurrent_items == 0 {
            return Err(Error::config("concurrent_items", "must be at least 1"));
        }
        if !(1..=MAX_UPLOAD_CONCURRENCY).contains(&self.upload.concurrency) {
            return Err(Error::config(
                "upload.concurrency",
                format!(
                    "must be between 1 and {MAX_UPLOAD_CONCURRENCY}, got {}",
                    self.upload.concurrency
                ),
            ));
        }
        if self.fetch.max_tries == 0 {
            return Err(Error::config("fetch.max_tries", "must be at least 1"));
        }
        if !self.fetch.accept_exit_codes.contains(&0) {
            return Err(Error::config(
                "fetch.accept_exit_codes",
                "exit code 0 must be accepted",
            ));
        }
        if self.environment.enabled && self.environment.reference_hosts.is_empty() {
            return Err(Error::config(
                "environment.reference_hosts",
                "at least one reference host is required when the check is enabled",
            ));
        }
        url::Url::parse(&self.tracker.url)
            .map_err(|e| Error::config("tracker.url", format!("invalid URL: {e}")))?;
        Ok(())
    }
}

/// Project identity, stamped into WARC headers and tracker reports
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Tracker project name (default: "verizon")
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Pipeline version; bump on every non-cosmetic change (default: "20140928.02")
    #[serde(default = "default_version")]
    pub version: String,

    /// Prefix of generated WARC file names (default: "verizon")
    #[serde(default = "default_project_name")]
    pub warc_prefix: String,

    /// User agent sent by the downloader (default: "ArchiveTeam")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            version: default_version(),
            warc_prefix: default_project_name(),
            user_agent: default_user_agent(),
        }
    }
}

/// Tracker connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker base URL; the project name is appended (default: "http://tracker.archiveteam.org")
    #[serde(default = "default_tracker_url")]
    pub url: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_tracker_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// How long an idle slot waits before asking for work again (default: 30 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Backoff for transient tracker failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: default_tracker_url(),
            timeout: default_tracker_timeout(),
            poll_interval: default_poll_interval(),
            retry: RetryConfig::default(),
        }
    }
}

/// Downloader (wget-lua) invocation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Path to the downloader executable (searched in PATH if None)
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Executable name looked up in PATH when `executable` is not set (default: "wget-lua")
    #[serde(default = "default_executable_name")]
    pub executable_name: String,

    /// Fetch-policy script passed with `--lua-script` (default: "verizon.lua")
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Per-request network timeout handed to the downloader (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Total attempts per item, including the first (default: 2)
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Exit codes that count as a usable capture (default: [0, 4, 7, 8])
    ///
    /// Non-zero entries represent partial outcomes (some pages missing or
    /// refused). The table is kept as-is rather than derived.
    #[serde(default = "default_accept_exit_codes")]
    pub accept_exit_codes: Vec<i32>,

    /// Pause between a failed attempt and the next one (default: 30 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Local address the downloader binds to (default: system choice)
    #[serde(default)]
    pub bind_address: Option<IpAddr>,

    /// Hosts the downloader may span to (default: both member-page sites)
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            executable: None,
            executable_name: default_executable_name(),
            script: default_script(),
            request_timeout: default_request_timeout(),
            max_tries: default_max_tries(),
            accept_exit_codes: default_accept_exit_codes(),
            retry_delay: default_retry_delay(),
            bind_address: None,
            domains: default_domains(),
        }
    }
}

/// Upload settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum concurrent uploads across all items, 1..=4 (default: 1)
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,

    /// Path to rsync (searched in PATH if None)
    #[serde(default)]
    pub rsync_path: Option<PathBuf>,

    /// Directory on the receiving side for partially transferred files (default: ".rsync-tmp")
    #[serde(default = "default_partial_dir")]
    pub partial_dir: String,

    /// Delete the local artifact once it has been transferred (default: false)
    #[serde(default)]
    pub remove_source_files: bool,

    /// Backoff for transient transfer failures (default: 3 retries)
    #[serde(default = "default_upload_retry")]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_upload_concurrency(),
            rsync_path: None,
            partial_dir: default_partial_dir(),
            remove_source_files: false,
            retry: default_upload_retry(),
        }
    }
}

/// Proxy/firewall detection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Run the check at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hosts that must all resolve to different addresses
    #[serde(default = "default_reference_hosts")]
    pub reference_hosts: Vec<String>,

    /// Items skipped between two checks (default: 10)
    #[serde(default = "default_check_interval")]
    pub check_interval: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_hosts: default_reference_hosts(),
            check_interval: default_check_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

// Default value functions
fn default_concurrent_items() -> usize {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_project_name() -> String {
    "verizon".into()
}

fn default_version() -> String {
    "20140928.02".into()
}

fn default_user_agent() -> String {
    "ArchiveTeam".into()
}

fn default_tracker_url() -> String {
    "http://tracker.archiveteam.org".into()
}

fn default_tracker_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_executable_name() -> String {
    "wget-lua".into()
}

fn default_script() -> PathBuf {
    PathBuf::from("verizon.lua")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_tries() -> u32 {
    2
}

fn default_accept_exit_codes() -> Vec<i32> {
    vec![0, 4, 7, 8]
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_domains() -> Vec<String> {
    crate::targets::all_site_hosts()
}

fn default_upload_concurrency() -> usize {
    1
}

fn default_partial_dir() -> String {
    ".rsync-tmp".into()
}

fn default_upload_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(120),
        ..RetryConfig::default()
    }
}

fn default_reference_hosts() -> Vec<String> {
    vec![
        "twitter.com".into(),
        "facebook.com".into(),
        "youtube.com".into(),
        "microsoft.com".into(),
        "icanhas.cheezburger.com".into(),
        "archiveteam.org".into(),
    ]
}

fn default_check_interval() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = Config::from_toml(r#"downloader = "alice""#).unwrap();

        assert_eq!(config.downloader, "alice");
        assert_eq!(config.concurrent_items, 1);
        assert_eq!(config.upload.concurrency, 1);
        assert_eq!(config.fetch.max_tries, 2);
        assert_eq!(config.fetch.accept_exit_codes, vec![0, 4, 7, 8]);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(config.environment.check_interval, 10);
        assert_eq!(config.environment.reference_hosts.len(), 6);
        assert!(config.fetch.bind_address.is_none());
        assert!(!config.upload.remove_source_files);
    }

    #[test]
    fn test_nested_sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            downloader = "bob"
            concurrent_items = 3

            [fetch]
            bind_address = "192.0.2.10"
            request_timeout = 45

            [upload]
            concurrency = 4

            [tracker]
            url = "http://localhost:9080"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrent_items, 3);
        assert_eq!(
            config.fetch.bind_address,
            Some("192.0.2.10".parse().unwrap())
        );
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(45));
        assert_eq!(config.upload.concurrency, 4);
        assert_eq!(config.tracker.url, "http://localhost:9080");
    }

    #[test]
    fn test_missing_downloader_is_rejected() {
        let err = Config::from_toml("").unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "downloader"));
    }

    #[test]
    fn test_read_file_defers_validation() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("worker.toml");
        std::fs::write(&path, "[upload]\nconcurrency = 2\n").unwrap();

        assert!(Config::from_file(&path).is_err());

        let mut config = Config::read_file(&path).unwrap();
        assert_eq!(config.upload.concurrency, 2);
        config.downloader = "alice".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = Config::read_file(Path::new("/nonexistent/worker.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_upload_concurrency_range() {
        for bad in [0, 5] {
            let text = format!("downloader = \"a\"\n[upload]\nconcurrency = {bad}\n");
            let err = Config::from_toml(&text).unwrap_err();
            assert!(
                matches!(err, Error::Config { key: Some(ref k), .. } if k == "upload.concurrency"),
                "concurrency {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_exit_code_zero_must_be_accepted() {
        let err = Config::from_toml("downloader = \"a\"\n[fetch]\naccept_exit_codes = [4]\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_invalid_tracker_url() {
        let err = Config::from_toml("downloader = \"a\"\n[tracker]\nurl = \"not a url\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "tracker.url"));
    }

    #[test]
    fn test_serialization_is_stable() {
        let config = Config {
            downloader: "alice".into(),
            ..Default::default()
        };
        let first = serde_json::to_string(&config).unwrap();
        let second = serde_json::to_string(&config.clone()).unwrap();
        assert_eq!(first, second);
    }
}
