//! Mock collaborators: downloader, tracker, uploader and resolver

use archive_worker::fetch::{FetchRequest, Fetcher};
use archive_worker::stages::Resolver;
use archive_worker::tracker::TrackerClient;
use archive_worker::upload::{UploadRequest, Uploader};
use archive_worker::{Error, ItemStats, Result, UploadError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Payload written as a fake capture
pub const FAKE_WARC: &[u8] = b"WARC/1.0\r\nWARC-Type: warcinfo\r\n\r\n";

/// Truncated capture left behind by an interrupted run
pub const PARTIAL_WARC: &[u8] = b"WARC/1.0\r\nWARC-Type: req";

/// What one scripted downloader run does
#[derive(Debug, Clone, Copy)]
pub struct FetchScript {
    /// Exit status to report
    pub status: Option<i32>,
    /// Write the compressed capture
    pub write_compressed: bool,
    /// Write an uncompressed capture next to it
    pub write_uncompressed: bool,
    /// Bytes written for the capture
    pub payload: &'static [u8],
}

impl FetchScript {
    /// Writes a compressed capture and exits with `status`
    pub fn compressed(status: i32) -> Self {
        Self {
            status: Some(status),
            write_compressed: true,
            write_uncompressed: false,
            payload: FAKE_WARC,
        }
    }

    /// Writes a truncated compressed capture and exits with `status`
    pub fn partial(status: i32) -> Self {
        Self {
            payload: PARTIAL_WARC,
            ..Self::compressed(status)
        }
    }

    /// Writes an uncompressed capture (downloader built without zlib)
    pub fn uncompressed(status: i32) -> Self {
        Self {
            status: Some(status),
            write_compressed: false,
            write_uncompressed: true,
            payload: FAKE_WARC,
        }
    }

    /// Writes nothing and exits with `status`
    pub fn failing(status: i32) -> Self {
        Self {
            status: Some(status),
            write_compressed: false,
            write_uncompressed: false,
            payload: FAKE_WARC,
        }
    }
}

/// Downloader mock that follows a script per call
pub struct ScriptedFetcher {
    scripts: Mutex<VecDeque<FetchScript>>,
    fallback: FetchScript,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    /// Every call follows the same script
    pub fn always(script: FetchScript) -> Self {
        Self::sequence(Vec::new(), script)
    }

    /// Calls follow `scripts` in order, then `fallback`
    pub fn sequence(scripts: Vec<FetchScript>, fallback: FetchScript) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of downloader invocations
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Option<i32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        if script.write_compressed {
            tokio::fs::write(&request.artifact, script.payload).await?;
        }
        if script.write_uncompressed {
            // <base>.warc.gz -> <base>.warc
            tokio::fs::write(request.artifact.with_extension(""), script.payload).await?;
        }
        Ok(script.status)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Tracker mock that hands out a fixed queue and records done reports
pub struct RecordingTracker {
    items: Mutex<VecDeque<String>>,
    done: Mutex<Vec<(String, ItemStats)>>,
    target_requests: AtomicUsize,
}

impl RecordingTracker {
    /// Tracker with no items
    pub fn new() -> Self {
        Self::with_items(&[])
    }

    /// Tracker that hands out `items` in order
    pub fn with_items(items: &[&str]) -> Self {
        Self {
            items: Mutex::new(items.iter().map(|s| s.to_string()).collect()),
            done: Mutex::new(Vec::new()),
            target_requests: AtomicUsize::new(0),
        }
    }

    /// Done reports received, in order
    pub fn done_reports(&self) -> Vec<(String, ItemStats)> {
        self.done.lock().unwrap().clone()
    }

    /// Items not yet handed out
    pub fn pending(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Number of upload-target requests
    pub fn target_requests(&self) -> usize {
        self.target_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackerClient for RecordingTracker {
    async fn claim_item(&self, _downloader: &str, _version: &str) -> Result<Option<String>> {
        Ok(self.items.lock().unwrap().pop_front())
    }

    async fn upload_target(&self, downloader: &str, _version: &str) -> Result<String> {
        self.target_requests.fetch_add(1, Ordering::SeqCst);
        Ok(format!("rsync://upload.example.org/verizon/{downloader}/"))
    }

    async fn report_done(&self, item: &str, stats: &ItemStats) -> Result<()> {
        self.done
            .lock()
            .unwrap()
            .push((item.to_string(), stats.clone()));
        Ok(())
    }
}

/// Upload mock that records when each transfer ran
pub struct RecordingUploader {
    hold: Duration,
    fail: bool,
    intervals: Mutex<Vec<(Instant, Instant)>>,
    requests: Mutex<Vec<UploadRequest>>,
}

impl RecordingUploader {
    /// Uploader that succeeds immediately
    pub fn new() -> Self {
        Self::holding(Duration::ZERO)
    }

    /// Uploader that takes `hold` per transfer
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            fail: false,
            intervals: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Uploader whose every transfer fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Start/end instants of every transfer
    pub fn intervals(&self) -> Vec<(Instant, Instant)> {
        self.intervals.lock().unwrap().clone()
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<UploadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, request: &UploadRequest) -> Result<()> {
        let start = Instant::now();
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.hold).await;
        self.intervals
            .lock()
            .unwrap()
            .push((start, Instant::now()));

        if self.fail {
            return Err(Error::from(UploadError::TransferFailed {
                target: request.target.clone(),
                code: Some(12),
                stderr: "protocol data stream error".to_string(),
            }));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Resolver mock with a fixed answer policy
pub struct StaticResolver {
    shared: Option<IpAddr>,
    assigned: Mutex<HashMap<String, IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    /// Every host gets its own address
    pub fn distinct() -> Self {
        Self {
            shared: None,
            assigned: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Every host resolves to the same address, as behind a transparent proxy
    pub fn proxied() -> Self {
        Self {
            shared: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            ..Self::distinct()
        }
    }

    /// Number of lookups performed
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<IpAddr> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(ip) = self.shared {
            return Ok(ip);
        }
        let mut assigned = self.assigned.lock().unwrap();
        let next = assigned.len() as u8 + 1;
        Ok(*assigned
            .entry(host.to_string())
            .or_insert(IpAddr::V4(Ipv4Addr::new(192, 0, 2, next))))
    }
}
