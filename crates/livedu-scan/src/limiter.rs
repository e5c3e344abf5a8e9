//! Process-wide bound on filesystem operations in flight.

use std::future::Future;

use tokio::sync::{Semaphore, SemaphorePermit};

use livedu_core::ScanError;

/// Bounds the number of simultaneous `readdir`/`stat`/estimation calls.
///
/// Slots are handed out in arrival order (the underlying semaphore is fair).
/// A slot is held by a [`SemaphorePermit`] and returned when the permit is
/// dropped, so cancelled or failed operations always give their slot back.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, ScanError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| ScanError::Interrupted)
    }

    /// Run `op` while holding a slot.
    ///
    /// The slot is released when `op` settles, whatever it returns, or when
    /// the returned future is dropped.
    pub async fn scoped<F: Future>(&self, op: F) -> Result<F::Output, ScanError> {
        let _permit = self.acquire().await?;
        Ok(op.await)
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(livedu_core::DEFAULT_CONCURRENCY)
    }
}
