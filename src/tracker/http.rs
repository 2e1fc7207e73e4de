//! HTTP implementation of the tracker protocol

use super::{
    API_VERSION, ClaimRequest, ClaimResponse, DonePayload, TrackerClient, UploadTargetRequest,
};
use crate::config::{RetryConfig, TrackerConfig};
use crate::error::{Error, Result, TrackerError};
use crate::retry::retry_with_backoff;
use crate::types::ItemStats;
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

/// Maximum number of body bytes kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Tracker client over HTTP (JSON request bodies)
pub struct HttpTracker {
    client: reqwest::Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpTracker {
    /// Create a client for `<config.url>/<project>/`
    pub fn new(config: &TrackerConfig, project: &str) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| Error::config("tracker.url", format!("invalid URL: {e}")))?;
        {
            let mut segments = base
                .path_segments_mut()
                .map_err(|_| Error::config("tracker.url", "URL cannot be a base"))?;
            segments.pop_if_empty().push(project).push("");
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            retry: config.retry.clone(),
        })
    }

    /// Project URL all endpoints hang off
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base
            .join(name)
            .map_err(|e| Error::Other(format!("failed to build tracker URL for {name}: {e}")))
    }

    async fn post<B: serde::Serialize + Sync>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(endpoint)?;
        retry_with_backoff(&self.retry, endpoint, || {
            let request = self.client.post(url.clone()).json(body);
            async move {
                let response = request.send().await?;
                if response.status().is_server_error() {
                    return Err(unexpected(endpoint, response).await);
                }
                Ok(response)
            }
        })
        .await
    }
}

async fn unexpected(endpoint: &'static str, response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    TrackerError::UnexpectedStatus {
        endpoint,
        status,
        body,
    }
    .into()
}

#[async_trait]
impl TrackerClient for HttpTracker {
    async fn claim_item(&self, downloader: &str, version: &str) -> Result<Option<String>> {
        let body = ClaimRequest {
            downloader: downloader.to_string(),
            api_version: API_VERSION.to_string(),
            version: version.to_string(),
        };
        let response = self.post("request", &body).await?;

        match response.status() {
            StatusCode::OK => {
                let claim: ClaimResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| TrackerError::InvalidResponse {
                            endpoint: "request",
                            reason: e.to_string(),
                        })?;
                tracing::info!(item = %claim.item_name, "claimed item from tracker");
                Ok(Some(claim.item_name))
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!("tracker has no items available");
                Ok(None)
            }
            status if status.as_u16() == 420 || status == StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!(status = status.as_u16(), "tracker rate limiting, backing off");
                Ok(None)
            }
            _ => Err(unexpected("request", response).await),
        }
    }

    async fn upload_target(&self, downloader: &str, version: &str) -> Result<String> {
        let body = UploadTargetRequest {
            downloader: downloader.to_string(),
            version: version.to_string(),
        };
        let response = self.post("upload", &body).await?;

        if response.status() != StatusCode::OK {
            return Err(unexpected("upload", response).await);
        }

        let text = response.text().await?;
        let target = super::interpolate_target(&text, downloader);
        if target.is_empty() {
            return Err(TrackerError::InvalidResponse {
                endpoint: "upload",
                reason: "empty upload target".into(),
            }
            .into());
        }
        Ok(target)
    }

    async fn report_done(&self, item: &str, stats: &ItemStats) -> Result<()> {
        let body = DonePayload {
            item: item.to_string(),
            stats: stats.clone(),
        };
        let response = self.post("done", &body).await?;

        if response.status() != StatusCode::OK {
            return Err(unexpected("done", response).await);
        }
        tracing::info!(item, "tracker acknowledged done");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracker_for(server: &MockServer) -> HttpTracker {
        let config = TrackerConfig {
            url: server.uri(),
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        };
        HttpTracker::new(&config, "verizon").unwrap()
    }

    #[tokio::test]
    async fn test_base_url_includes_project() {
        let server = MockServer::start().await;
        let tracker = tracker_for(&server);
        assert!(tracker.base_url().as_str().ends_with("/verizon/"));
    }

    #[tokio::test]
    async fn test_claim_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/request"))
            .and(body_partial_json(serde_json::json!({
                "downloader": "alice",
                "api_version": "2",
                "version": "20140928.02"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"item_name": "verizon:abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let item = tracker_for(&server)
            .claim_item("alice", "20140928.02")
            .await
            .unwrap();
        assert_eq!(item.as_deref(), Some("verizon:abc"));
    }

    #[tokio::test]
    async fn test_claim_no_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/request"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let item = tracker_for(&server).claim_item("alice", "v").await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_claim_rate_limited_is_no_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/request"))
            .respond_with(ResponseTemplate::new(420))
            .mount(&server)
            .await;

        let item = tracker_for(&server).claim_item("alice", "v").await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/request"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = tracker_for(&server)
            .claim_item("alice", "v")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Tracker(TrackerError::UnexpectedStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_target_interpolates_downloader() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("rsync://up.example.org/verizon/:downloader/\n"),
            )
            .mount(&server)
            .await;

        let target = tracker_for(&server)
            .upload_target("alice", "v")
            .await
            .unwrap();
        assert_eq!(target, "rsync://up.example.org/verizon/alice/");
    }

    #[tokio::test]
    async fn test_report_done_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/done"))
            .and(body_partial_json(serde_json::json!({
                "item": "verizon:abc",
                "downloader": "alice",
                "version": "20140928.02",
                "bytes": {"data": 42},
                "id": {"pipeline_hash": "ph", "runtime_version": "rt"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let mut stats = ItemStats {
            downloader: "alice".into(),
            version: "20140928.02".into(),
            ..Default::default()
        };
        stats.bytes.insert("data".into(), 42);
        stats.id.pipeline_hash = "ph".into();
        stats.id.runtime_version = "rt".into();

        tracker_for(&server)
            .report_done("verizon:abc", &stats)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_report_done_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verizon/done"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown item"))
            .expect(1)
            .mount(&server)
            .await;

        let err = tracker_for(&server)
            .report_done("verizon:abc", &ItemStats::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Tracker(TrackerError::UnexpectedStatus { status: 400, .. })
        ));
    }
}
