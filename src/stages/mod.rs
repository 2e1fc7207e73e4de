//! Pipeline stages
//!
//! Every stage implements [`Stage`]: it gets exclusive access to one
//! [`WorkItem`] and either succeeds (possibly after mutating the item) or
//! fails with an error that aborts the rest of the run. Stages keep no
//! per-item state between calls; anything shared across items lives in
//! explicitly injected dependencies such as [`CheckSchedule`] or
//! [`ConcurrencyGate`](crate::upload::ConcurrencyGate).
//!
//! [`EnvironmentCheck`] runs first, before the item is claimed
//! ([`PipelineEngine::preflight`](crate::PipelineEngine::preflight)). The
//! per-item order after the claim is:
//!
//! 1. [`PrepareStaging`]
//! 2. [`FetchStage`]
//! 3. [`CollectStats`]
//! 4. [`Finalize`]
//! 5. [`UploadStage`] inside a [`GatedStage`]
//! 6. [`ReportDone`]

mod environment;
mod fetch;
mod finalize;
mod prepare;
mod report;
mod stats;
mod upload;

pub use environment::{CheckSchedule, EnvironmentCheck, Resolver, SystemResolver};
pub use fetch::FetchStage;
pub use finalize::Finalize;
pub use prepare::PrepareStaging;
pub use report::ReportDone;
pub use stats::CollectStats;
pub use upload::{GatedStage, UploadStage};

use crate::types::WorkItem;
use async_trait::async_trait;

/// One step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs and events
    fn name(&self) -> &'static str;

    /// Run the stage against an item
    async fn run(&self, item: &mut WorkItem) -> crate::Result<()>;
}
