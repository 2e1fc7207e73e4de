//! Downloader invocation under the exit-status retry policy

use super::Stage;
use crate::error::{FetchError, Result};
use crate::fetch::{FetchArgs, Fetcher, RetryPolicy, RetryState};
use crate::types::WorkItem;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the downloader against the item's targets
pub struct FetchStage {
    fetcher: Arc<dyn Fetcher>,
    args: FetchArgs,
    policy: RetryPolicy,
}

impl FetchStage {
    /// Create the stage
    pub fn new(fetcher: Arc<dyn Fetcher>, args: FetchArgs, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            args,
            policy,
        }
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn run(&self, item: &mut WorkItem) -> Result<()> {
        let request = self.args.request_for(item)?;
        tracing::info!(
            item = %item.name(),
            fetcher = self.fetcher.name(),
            targets = item.targets().len(),
            "starting fetch"
        );

        let fetcher = &self.fetcher;
        let req = &request;
        let state = self
            .policy
            .run(item.name(), move |_| fetcher.fetch(req))
            .await?;

        item.extra
            .insert("fetch_attempts".into(), state.attempts().into());

        match state {
            RetryState::Succeeded { .. } => Ok(()),
            RetryState::AcceptablePartial { status, .. } => {
                item.extra
                    .insert("fetch_exit_status".into(), status.into());
                Ok(())
            }
            RetryState::ExhaustedFailed {
                attempts,
                last_status,
            } => Err(FetchError::Exhausted {
                item: item.name().to_string(),
                attempts,
                last_status,
            }
            .into()),
            RetryState::Attempting { .. } | RetryState::Retrying { .. } => {
                Err(crate::error::Error::Other(format!(
                    "fetch for {} stopped in non-terminal state {state:?}",
                    item.name()
                )))
            }
        }
    }
}
