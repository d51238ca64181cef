//! Citation batches
//!
//! Claims sharing a citation key are verified against one download:
//! 1. Resolve a fetchable descriptor from the claims' citation details
//! 2. Take the resident slot, then fetch under the acquisition timeout
//! 3. On failure, fail every claim in the batch with the same reason
//! 4. On success, verify each claim against the resident source
//! 5. Evict, then release the slot
//!
//! Batches may overlap in everything except residency.

use claimcheck_core::{
    AcquisitionError, BatchRecord, CitationKey, Claim, ClaimKind, Collaborators, Lane,
    ResidentHandle, SourceClient, SourceDescriptor, ValidationConfig, ValidationMethod,
    ValidationResult,
};
use claimcheck_evidence::ResidentSlot;
use claimcheck_verify::{QualitativeVerifier, QuantitativeVerifier};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Results and bookkeeping for one batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<ValidationResult>,
    pub record: BatchRecord,
}

pub struct BatchExecutor {
    sources: Arc<dyn SourceClient>,
    quantitative: QuantitativeVerifier,
    qualitative: QualitativeVerifier,
    slot: ResidentSlot,
    acquisition_timeout: Duration,
    verify_concurrency: usize,
    batch_concurrency: usize,
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("acquisition_timeout", &self.acquisition_timeout)
            .field("verify_concurrency", &self.verify_concurrency)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    #[must_use]
    pub fn new(collaborators: &Collaborators, config: &ValidationConfig, slot: ResidentSlot) -> Self {
        Self {
            sources: Arc::clone(&collaborators.sources),
            quantitative: QuantitativeVerifier::from_config(
                Arc::clone(&collaborators.synthesis),
                Arc::clone(&collaborators.sandbox),
                config,
            ),
            qualitative: QualitativeVerifier::new(Arc::clone(&collaborators.quotes), config),
            slot,
            acquisition_timeout: config.acquisition_timeout(),
            verify_concurrency: config.verify_concurrency.max(1),
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn slot(&self) -> &ResidentSlot {
        &self.slot
    }

    /// Group `claims` by citation key (first-seen order) and run every batch
    pub async fn run_batches(&self, claims: Vec<Claim>, kind: ClaimKind) -> Vec<BatchOutcome> {
        let groups = group_by_citation(claims);
        info!(kind = %kind, batches = groups.len(), "running citation batches");

        let executor = self;
        stream::iter(groups)
            .map(move |(key, group)| async move { executor.run_batch(&key, &group, kind).await })
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }

    /// Download once, verify every claim in `claims`, evict
    #[instrument(skip(self, claims), fields(citation_key = %key, claims = claims.len()))]
    pub async fn run_batch(&self, key: &CitationKey, claims: &[Claim], kind: ClaimKind) -> BatchOutcome {
        let lane = match kind {
            ClaimKind::Quantitative => Lane::QuantCited,
            ClaimKind::Qualitative => Lane::QualCited,
        };

        let descriptor = match resolve_descriptor(key, claims) {
            Ok(descriptor) => descriptor,
            Err(e) => return self.fail_batch(key, lane, claims, &e),
        };

        let permit = match self.slot.acquire().await {
            Ok(permit) => permit,
            Err(e) => return self.fail_batch(key, lane, claims, &e),
        };

        let fetched = tokio::time::timeout(
            self.acquisition_timeout,
            self.sources.fetch(&descriptor, kind.modality()),
        )
        .await
        .unwrap_or_else(|_| Err(AcquisitionError::timeout(self.acquisition_timeout)));

        let handle = match fetched {
            Ok(handle) => handle,
            Err(e) => {
                permit.release();
                return self.fail_batch(key, lane, claims, &e);
            }
        };
        info!(handle = %handle.id, "source resident");

        let results: Vec<ValidationResult> = stream::iter(claims)
            .map(|claim| self.verify_one(kind, claim, &handle))
            .buffered(self.verify_concurrency)
            .collect()
            .await;

        if let Err(e) = self.sources.evict(&handle).await {
            warn!(handle = %handle.id, error = %e, "eviction failed");
        }
        permit.release();

        let passed = results.iter().filter(|r| r.passed).count();
        info!(passed, total = results.len(), "batch complete");

        BatchOutcome {
            results,
            record: BatchRecord {
                citation_key: key.clone(),
                lane,
                claim_ids: claims.iter().map(|c| c.id.clone()).collect(),
                download_ok: true,
                resident_handle: Some(handle.id.clone()),
                notes: format!("{passed}/{} passed", claims.len()),
            },
        }
    }

    async fn verify_one(&self, kind: ClaimKind, claim: &Claim, handle: &ResidentHandle) -> ValidationResult {
        match kind {
            ClaimKind::Quantitative => self.quantitative.verify(claim, handle).await,
            ClaimKind::Qualitative => self.qualitative.verify(claim, handle).await,
        }
    }

    fn fail_batch(
        &self,
        key: &CitationKey,
        lane: Lane,
        claims: &[Claim],
        reason: &AcquisitionError,
    ) -> BatchOutcome {
        error!(citation_key = %key, error = %reason, claims = claims.len(), "batch failed");
        let reason = reason.to_string();

        let results = claims
            .iter()
            .map(|claim| {
                ValidationResult::failure(
                    claim,
                    lane,
                    ValidationMethod::BatchFailed,
                    format!("Source for citation {key} could not be acquired"),
                    reason.clone(),
                )
            })
            .collect();

        BatchOutcome {
            results,
            record: BatchRecord {
                citation_key: key.clone(),
                lane,
                claim_ids: claims.iter().map(|c| c.id.clone()).collect(),
                download_ok: false,
                resident_handle: None,
                notes: reason,
            },
        }
    }
}

/// Claims grouped by citation key, keys in first-seen order
#[must_use]
pub fn group_by_citation(claims: Vec<Claim>) -> IndexMap<CitationKey, Vec<Claim>> {
    let mut groups: IndexMap<CitationKey, Vec<Claim>> = IndexMap::new();
    for claim in claims {
        let key = claim
            .citation_key
            .clone()
            .unwrap_or_else(|| CitationKey::new(""));
        groups.entry(key).or_default().push(claim);
    }
    groups
}

/// Descriptor for the batch's source, from the first claim with a locator
pub fn resolve_descriptor(key: &CitationKey, claims: &[Claim]) -> Result<SourceDescriptor, AcquisitionError> {
    if key.as_str().trim().is_empty() {
        return Err(AcquisitionError::Unresolvable("claim has no citation key".to_string()));
    }

    claims
        .iter()
        .filter_map(|c| c.citation.as_ref())
        .find_map(|citation| {
            citation.locator().map(|url| {
                let source_type = if key.is_synthetic() { "dataset" } else { "citation" };
                let descriptor = SourceDescriptor::new(key.as_str(), url, source_type);
                match &citation.title {
                    Some(title) => descriptor.with_title(title.clone()),
                    None => descriptor,
                }
            })
        })
        .ok_or_else(|| AcquisitionError::Unresolvable(format!("citation {key} has no URL or DOI")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimcheck_core::CitationDetails;
    use claimcheck_test_utils::{cited, quant, FakeWorld, ScriptedSources};
    use pretty_assertions::assert_eq;

    #[test]
    fn grouping_keeps_first_seen_order() {
        let claims = vec![
            cited(quant("a", "x"), "ref2", "https://d/2"),
            cited(quant("b", "y"), "ref1", "https://d/1"),
            cited(quant("c", "z"), "ref2", "https://d/2"),
        ];
        let groups = group_by_citation(claims);
        let keys: Vec<&str> = groups.keys().map(CitationKey::as_str).collect();
        assert_eq!(keys, vec!["ref2", "ref1"]);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn descriptor_prefers_first_locator_and_falls_back_to_doi() {
        let key = CitationKey::new("ref3");
        let claims = vec![
            quant("a", "x").with_citation_key("ref3"),
            quant("b", "y")
                .with_citation_key("ref3")
                .with_citation(CitationDetails::new("Smith 2020").with_doi("10.1000/xyz")),
        ];
        let descriptor = resolve_descriptor(&key, &claims).unwrap();
        assert_eq!(descriptor.url, "https://doi.org/10.1000/xyz");
        assert_eq!(descriptor.source_id, "ref3");

        let bare = vec![quant("c", "z").with_citation_key("ref3")];
        assert!(matches!(
            resolve_descriptor(&key, &bare),
            Err(AcquisitionError::Unresolvable(_))
        ));
    }

    #[tokio::test]
    async fn unresolvable_citation_fails_without_fetching() {
        let world = FakeWorld::new();
        let executor = BatchExecutor::new(&world.collaborators(), &ValidationConfig::default(), ResidentSlot::new());
        let claims = vec![quant("a", "x").with_citation_key("ref9")];

        let outcome = executor
            .run_batch(&CitationKey::new("ref9"), &claims, ClaimKind::Quantitative)
            .await;

        assert!(!outcome.record.download_ok);
        assert_eq!(outcome.results[0].method, ValidationMethod::BatchFailed);
        assert_eq!(world.sources.calls().count("fetch"), 0);
        assert_eq!(executor.slot().live(), 0);
    }

    #[tokio::test]
    async fn successful_batch_evicts_and_releases() {
        let world = FakeWorld::new().with_sources(ScriptedSources::new());
        let executor = BatchExecutor::new(&world.collaborators(), &ValidationConfig::default(), ResidentSlot::new());
        let claims = vec![
            cited(quant("a", "GDP grew"), "ref1", "https://d/1"),
            cited(quant("b", "GDP fell"), "ref1", "https://d/1"),
        ];

        let outcome = executor
            .run_batch(&CitationKey::new("ref1"), &claims, ClaimKind::Quantitative)
            .await;

        assert!(outcome.record.download_ok);
        assert_eq!(outcome.record.resident_handle.as_deref(), Some("ref1-resident-handle"));
        assert_eq!(world.sources.evictions("ref1-resident-handle"), 1);
        assert_eq!(world.sources.live(), 0);
        assert_eq!(executor.slot().live(), 0);
    }

    #[tokio::test]
    async fn failed_eviction_is_not_a_claim_failure() {
        let world = FakeWorld::new().with_sources(ScriptedSources::new().with_failing_evict());
        let executor = BatchExecutor::new(&world.collaborators(), &ValidationConfig::default(), ResidentSlot::new());
        let claims = vec![cited(quant("a", "GDP grew"), "ref1", "https://d/1")];

        let outcome = executor
            .run_batch(&CitationKey::new("ref1"), &claims, ClaimKind::Quantitative)
            .await;

        assert!(outcome.results[0].passed);
        assert_eq!(executor.slot().live(), 0);
    }
}
