//! Exit-status retry policy for the downloader
//!
//! ```text
//!             status 0                 accepted non-zero
//!   Attempting ───────▶ Succeeded      ───────▶ AcceptablePartial
//!       │  ▲
//!       │  └──── Retrying ◀── other status, attempts left
//!       │
//!       └── other status, no attempts left ──▶ ExhaustedFailed
//! ```

use crate::config::FetchConfig;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// How one exit status is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Status 0
    Success,
    /// Non-zero status from the accept table; the capture is usable
    AcceptablePartial,
    /// Anything else, including termination by a signal
    Retryable,
}

/// Position in the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is about to run or running
    Attempting {
        /// Current attempt number
        attempt: u32,
    },
    /// Attempt `attempt` failed and another one is allowed
    Retrying {
        /// The attempt that failed
        attempt: u32,
        /// Its exit status
        last_status: Option<i32>,
    },
    /// Clean exit
    Succeeded {
        /// Attempts used
        attempts: u32,
    },
    /// Accepted partial exit
    AcceptablePartial {
        /// Attempts used
        attempts: u32,
        /// The accepted exit status
        status: i32,
    },
    /// Every attempt failed
    ExhaustedFailed {
        /// Attempts used
        attempts: u32,
        /// Exit status of the last attempt
        last_status: Option<i32>,
    },
}

impl RetryState {
    /// Initial state
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Whether the machine has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. }
                | RetryState::AcceptablePartial { .. }
                | RetryState::ExhaustedFailed { .. }
        )
    }

    /// Whether the pipeline may continue past the fetch
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::AcceptablePartial { .. }
        )
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        match *self {
            RetryState::Attempting { attempt } => attempt.saturating_sub(1),
            RetryState::Retrying { attempt, .. }
            | RetryState::Succeeded { attempts: attempt }
            | RetryState::AcceptablePartial {
                attempts: attempt, ..
            }
            | RetryState::ExhaustedFailed {
                attempts: attempt, ..
            } => attempt,
        }
    }
}

/// Bounded re-invocation of the downloader, driven by exit status
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_tries: u32,
    accept: BTreeSet<i32>,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_tries` counts every attempt including the first
    pub fn new(max_tries: u32, accept: impl IntoIterator<Item = i32>, retry_delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            accept: accept.into_iter().collect(),
            retry_delay,
        }
    }

    /// Policy from the fetch section of the configuration
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.max_tries,
            config.accept_exit_codes.iter().copied(),
            config.retry_delay,
        )
    }

    /// Maximum number of attempts
    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Classify one exit status (`None` means killed by a signal)
    pub fn classify(&self, status: Option<i32>) -> ExitClass {
        match status {
            Some(0) => ExitClass::Success,
            Some(code) if self.accept.contains(&code) => ExitClass::AcceptablePartial,
            _ => ExitClass::Retryable,
        }
    }

    /// Feed the exit status of the current attempt into the machine.
    ///
    /// Only `Attempting` reacts to a status; every other state is returned unchanged.
    pub fn on_exit(&self, state: RetryState, status: Option<i32>) -> RetryState {
        let RetryState::Attempting { attempt } = state else {
            return state;
        };

        match (self.classify(status), status) {
            (ExitClass::Success, _) => RetryState::Succeeded { attempts: attempt },
            (ExitClass::AcceptablePartial, Some(code)) => RetryState::AcceptablePartial {
                attempts: attempt,
                status: code,
            },
            _ if attempt < self.max_tries => RetryState::Retrying {
                attempt,
                last_status: status,
            },
            _ => RetryState::ExhaustedFailed {
                attempts: attempt,
                last_status: status,
            },
        }
    }

    /// Leave `Retrying` for the next attempt; other states are unchanged
    pub fn next_attempt(&self, state: RetryState) -> RetryState {
        match state {
            RetryState::Retrying { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    /// Run `attempt` until the machine reaches a terminal state.
    ///
    /// The closure receives the 1-based attempt number and returns the exit
    /// status. An `Err` from the closure (the process could not be started)
    /// ends the run immediately without consuming further attempts.
    pub async fn run<F, Fut>(&self, item: &str, mut attempt: F) -> crate::Result<RetryState>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::Result<Option<i32>>>,
    {
        let mut state = RetryState::start();

        loop {
            let RetryState::Attempting { attempt: number } = state else {
                return Ok(state);
            };

            let status = attempt(number).await?;
            state = self.on_exit(state, status);

            match state {
                RetryState::Succeeded { .. } => {
                    info!(item, attempt = number, "downloader finished cleanly");
                }
                RetryState::AcceptablePartial { status, .. } => {
                    info!(item, attempt = number, exit_code = status, "downloader finished with accepted partial status");
                }
                RetryState::Retrying { last_status, .. } => {
                    warn!(
                        item,
                        attempt = number,
                        max_tries = self.max_tries,
                        exit_code = ?last_status,
                        delay_secs = self.retry_delay.as_secs(),
                        "downloader failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    state = self.next_attempt(state);
                }
                RetryState::ExhaustedFailed { last_status, .. } => {
                    warn!(
                        item,
                        attempts = number,
                        exit_code = ?last_status,
                        "downloader failed, no attempts left"
                    );
                }
                RetryState::Attempting { .. } => {}
            }
        }
    }
}
