//! Error types for archive-worker
//!
//! Errors fall into three groups that the engine treats differently:
//! - Environmental errors ([`Error::is_environmental`]) stop the whole worker,
//!   because every later capture would be corrupted as well.
//! - Everything else raised by a stage aborts only the current item. The item
//!   is cleaned up locally and left undone at the tracker.
//! - Transient failures are retried locally (see [`crate::retry::IsRetryable`])
//!   and only surface here once their retry budget is spent.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for archive-worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for archive-worker
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload.concurrency")
        key: Option<String>,
    },

    /// The worker's surroundings are unfit for capturing
    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// The claimed item itself is unusable
    #[error("item error: {0}")]
    Item(#[from] ItemError),

    /// The fetch stage failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Local staging of the item's files failed
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// Transfer of the artifact to long-term storage failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// The tracker answered with something we could not use
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not claiming new items
    #[error("shutdown in progress: not claiming new items")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error must stop the worker process instead of just the current item
    pub fn is_environmental(&self) -> bool {
        match self {
            Error::Environment(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Errors about the worker's network and tool environment
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Reference hosts resolved to fewer distinct addresses than expected
    #[error(
        "reference hosts resolved to {distinct} distinct addresses, expected {expected}: \
         are you behind a firewall or proxy? {addresses:?}"
    )]
    ProxyDetected {
        /// Number of distinct addresses seen
        distinct: usize,
        /// Number of distinct addresses required
        expected: usize,
        /// The addresses that were resolved
        addresses: Vec<std::net::IpAddr>,
    },

    /// A reference host could not be resolved at all
    #[error("failed to resolve reference host {host}: {reason}")]
    ResolutionFailed {
        /// The host name that failed to resolve
        host: String,
        /// The resolver's error message
        reason: String,
    },

    /// A required external executable could not be found
    #[error("no usable {name} executable found")]
    ExecutableNotFound {
        /// Human-readable name of the executable
        name: String,
    },
}

impl EnvironmentError {
    /// Proxy interference and missing executables stop the worker; a failed
    /// lookup only costs the current item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnvironmentError::ProxyDetected { .. } | EnvironmentError::ExecutableNotFound { .. }
        )
    }
}

/// Errors about a claimed item's identity
#[derive(Debug, Error)]
pub enum ItemError {
    /// Item name does not split into `<type>:<value>`
    #[error("malformed item name {name:?}: expected exactly one ':' between type and value")]
    MalformedName {
        /// The offending item name
        name: String,
    },

    /// Item type outside the closed set of known kinds
    #[error("unknown item type {item_type:?}")]
    UnknownItemType {
        /// The unrecognised type tag
        item_type: String,
    },

    /// A stage needed a field that an earlier stage should have set
    #[error("item {item} has no {field}; stage order is broken")]
    MissingField {
        /// The item name
        item: String,
        /// The field that was not set
        field: &'static str,
    },
}

/// Fetch stage errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every allowed attempt ended in a non-acceptable exit status
    #[error("fetch for {item} failed after {attempts} attempt(s), last exit status {last_status:?}")]
    Exhausted {
        /// The item name
        item: String,
        /// Attempts made
        attempts: u32,
        /// Exit code of the last attempt (`None` if killed by a signal)
        last_status: Option<i32>,
    },

    /// The downloader process could not be started
    #[error("failed to start {program}: {reason}")]
    SpawnFailed {
        /// Program that failed to start
        program: PathBuf,
        /// Underlying error message
        reason: String,
    },
}

/// Local staging errors (prepare and finalize stages)
#[derive(Debug, Error)]
pub enum StagingError {
    /// The downloader wrote an uncompressed WARC; it must be built with zlib support
    #[error("uncompressed output found at {path}: the downloader is missing compression support")]
    MissingCompression {
        /// Path of the uncompressed WARC
        path: PathBuf,
    },

    /// The expected compressed artifact is not there
    #[error("expected artifact {path} does not exist")]
    ArtifactMissing {
        /// Path where the artifact was expected
        path: PathBuf,
    },

    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },
}

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The transfer tool exited unsuccessfully
    #[error("transfer to {target} failed with exit status {code:?}: {stderr}")]
    TransferFailed {
        /// Upload target
        target: String,
        /// Exit code (`None` if killed by a signal)
        code: Option<i32>,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// The transfer kept failing until the retry budget ran out
    #[error("upload gave up after {attempts} attempt(s): {reason}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },
}

/// Tracker protocol errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Tracker replied with a status the protocol does not expect
    #[error("tracker returned {status} for {endpoint}: {body}")]
    UnexpectedStatus {
        /// Endpoint that was called (e.g. "request", "done")
        endpoint: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Tracker reply could not be interpreted
    #[error("invalid response from tracker {endpoint}: {reason}")]
    InvalidResponse {
        /// Endpoint that was called
        endpoint: &'static str,
        /// What was wrong
        reason: String,
    },
}
