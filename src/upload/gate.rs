//! Process-wide limit on concurrent transfers

use crate::config::MAX_UPLOAD_CONCURRENCY;
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore shared by every item that reaches the upload stage
///
/// Cloning shares the same slots. A slot is held by the returned
/// [`GatePermit`] and given back when the permit is dropped, whether the
/// transfer succeeded, failed or panicked.
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held while inside the gate; dropping it frees the slot
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate; the capacity is clamped to `1..=MAX_UPLOAD_CONCURRENCY`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_UPLOAD_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Stop handing out slots; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Configured number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
