//! Evidence cache for the dataset-reuse path
//!
//! Registered sources are tried newest first; the first one the
//! applicability oracle clears at or above the reuse threshold is handed
//! out and its `reuse_count` bumped. Entries are append-only for the
//! lifetime of a run.

use claimcheck_core::{ApplicabilityOracle, EvidenceSource};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub lookups: u64,
    pub hits: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: Vec<EvidenceSource>,
    next_seq: u64,
    lookups: u64,
    hits: u64,
}

/// Run-scoped registry of reusable dataset sources
pub struct EvidenceCache {
    // Held across oracle awaits so lookup and register never interleave.
    state: Mutex<CacheState>,
    oracle: Arc<dyn ApplicabilityOracle>,
    reuse_threshold: f64,
}

impl fmt::Debug for EvidenceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceCache")
            .field("reuse_threshold", &self.reuse_threshold)
            .finish_non_exhaustive()
    }
}

impl EvidenceCache {
    #[must_use]
    pub fn new(oracle: Arc<dyn ApplicabilityOracle>, reuse_threshold: f64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            oracle,
            reuse_threshold,
        }
    }

    #[inline]
    #[must_use]
    pub fn reuse_threshold(&self) -> f64 {
        self.reuse_threshold
    }

    /// Find a registered source that can answer `claim_text`.
    ///
    /// Returns the updated entry (with its incremented `reuse_count`), or
    /// `None` when no entry clears the threshold. An oracle error on one
    /// entry skips that entry.
    pub async fn lookup(&self, claim_text: &str) -> Option<EvidenceSource> {
        let mut state = self.state.lock().await;
        state.lookups += 1;

        let mut chosen = None;
        for idx in (0..state.entries.len()).rev() {
            let descriptor = state.entries[idx].descriptor();
            match self.oracle.assess(claim_text, &descriptor).await {
                Ok(verdict) if verdict.clears(self.reuse_threshold) => {
                    chosen = Some((idx, verdict.confidence));
                    break;
                }
                Ok(verdict) => {
                    debug!(
                        source_id = %descriptor.source_id,
                        applicable = verdict.applicable,
                        confidence = verdict.confidence,
                        "cached source not applicable"
                    );
                }
                Err(e) => {
                    warn!(source_id = %descriptor.source_id, error = %e, "applicability check failed, skipping entry");
                }
            }
        }

        let (idx, confidence) = chosen?;
        state.hits += 1;
        let entry = &mut state.entries[idx];
        entry.reuse_count += 1;
        info!(
            source_id = %entry.source_id,
            confidence,
            reuse_count = entry.reuse_count,
            "reusing cached dataset"
        );
        Some(entry.clone())
    }

    /// Register a newly found source.
    ///
    /// A source id that is already registered counts as a reuse of the
    /// existing entry, which keeps its origin and sequence.
    pub async fn register(&self, mut source: EvidenceSource) -> EvidenceSource {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .entries
            .iter_mut()
            .find(|e| e.source_id == source.source_id)
        {
            existing.reuse_count += 1;
            debug!(
                source_id = %existing.source_id,
                reuse_count = existing.reuse_count,
                claim = %source.origin_claim_id,
                "source already registered, counted as reuse"
            );
            return existing.clone();
        }

        source.registered_seq = state.next_seq;
        state.next_seq += 1;
        debug!(
            source_id = %source.source_id,
            seq = source.registered_seq,
            origin = %source.origin_claim_id,
            "registered dataset source"
        );
        state.entries.push(source.clone());
        source
    }

    pub async fn get(&self, source_id: &str) -> Option<EvidenceSource> {
        let state = self.state.lock().await;
        state.entries.iter().find(|e| e.source_id == source_id).cloned()
    }

    /// Entries in registration order
    pub async fn snapshot(&self) -> Vec<EvidenceSource> {
        self.state.lock().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            lookups: state.lookups,
            hits: state.hits,
        }
    }

    /// Drop every entry. Only for the caller's cleanup after a run.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.entries.len();
        *state = CacheState::default();
        debug!(dropped, "evidence cache cleared");
    }
}
