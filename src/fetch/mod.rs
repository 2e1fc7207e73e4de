//! Downloader process boundary
//!
//! The capture itself is done by an external downloader (wget with Lua
//! scripting). This module builds its command line, runs it, and decides from
//! the exit status whether the capture is usable.
//!
//! ## Architecture
//!
//! - [`Fetcher`]: runs one downloader invocation and returns its exit status
//! - [`CliFetcher`]: spawns the real executable
//! - [`FetchArgs`]: turns configuration plus an item into a [`FetchRequest`]
//! - [`RetryPolicy`]: classifies exit statuses and re-invokes up to a bound

mod args;
mod cli;
mod policy;
mod traits;

pub use args::FetchArgs;
pub use cli::CliFetcher;
pub use policy::{ExitClass, RetryPolicy, RetryState};
pub use traits::{FetchRequest, Fetcher};
