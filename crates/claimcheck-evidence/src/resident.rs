//! Single resident source slot
//!
//! At most one downloaded source (dataset file or text payload) may be
//! held process-wide. A batch takes the slot before fetching and gives
//! it back only after the source has been evicted.

use claimcheck_core::AcquisitionError;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

#[derive(Debug, Default)]
struct SlotCounters {
    live: AtomicUsize,
    high_water: AtomicUsize,
    acquisitions: AtomicU64,
}

/// One-permit gate around resident sources
#[derive(Debug, Clone)]
pub struct ResidentSlot {
    semaphore: Arc<Semaphore>,
    counters: Arc<SlotCounters>,
}

impl Default for ResidentSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ResidentSlot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            counters: Arc::new(SlotCounters::default()),
        }
    }

    /// Wait for the slot
    pub async fn acquire(&self) -> Result<ResidentPermit, AcquisitionError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AcquisitionError::SlotClosed)?;

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.high_water.fetch_max(live, Ordering::SeqCst);
        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        trace!(live, "resident slot acquired");

        Ok(ResidentPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Sources currently resident (0 or 1)
    #[must_use]
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Most sources ever resident at once
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.counters.high_water.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.counters.acquisitions.load(Ordering::Relaxed)
    }

    /// Refuse further acquisitions; waiters get `SlotClosed`
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Proof of slot ownership; releasing it frees the slot
#[derive(Debug)]
pub struct ResidentPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<SlotCounters>,
}

impl ResidentPermit {
    /// Release after the resident source has been evicted
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ResidentPermit {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        trace!("resident slot released");
    }
}
