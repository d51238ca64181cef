//! Claim router
//!
//! Top-level state machine for one run. Lanes are processed in a fixed
//! order: `qual_uncited`, `quant_uncited`, `quant_cited`, `qual_cited`.
//!
//! The run is an explicit two-phase pipeline:
//! - Phase 1 (`resolve_uncited`) ends every uncited claim or re-routes it
//!   into `quant_cited` with a synthetic citation
//! - Phase 2 (`execute_cited`) batches every cited claim, re-routed ones
//!   included
//!
//! Nothing from phase 2 starts before phase 1 has returned.

use crate::batch::{BatchExecutor, BatchOutcome};
use crate::report::RunReport;
use chrono::Utc;
use claimcheck_core::{
    BatchRecord, Claim, ClaimId, ClaimKind, Collaborators, Lane, RatingStance, RunError,
    ValidationConfig, ValidationMethod, ValidationResult,
};
use claimcheck_evidence::{DatasetLocator, EvidenceCache, ResidentSlot};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

/// Outcome of phase 1
#[derive(Debug, Clone, Default)]
pub struct UncitedResolution {
    /// Claims that ended in an uncited lane
    pub terminal: Vec<ValidationResult>,
    /// Quantitative claims carrying a synthetic citation, bound for `quant_cited`
    pub rerouted: Vec<Claim>,
}

/// Outcome of phase 2
#[derive(Debug, Clone, Default)]
pub struct CitedExecution {
    /// One result per cited claim, batch by batch
    pub results: Vec<ValidationResult>,
    /// One record per citation batch, in execution order
    pub batches: Vec<BatchRecord>,
}

/// Result of the two cheap checks shared by both uncited lanes
enum Screening {
    Conclusive(ValidationResult),
    Inconclusive {
        confidence: f64,
        errors: Vec<String>,
    },
}

#[derive(Debug)]
pub struct ClaimRouter {
    config: ValidationConfig,
    collaborators: Collaborators,
    cache: Arc<EvidenceCache>,
    locator: DatasetLocator,
    executor: BatchExecutor,
}

impl ClaimRouter {
    /// Build a router for one run; the evidence cache lives as long as the router
    pub fn new(collaborators: Collaborators, config: ValidationConfig) -> Result<Self, RunError> {
        Self::with_slot(collaborators, config, ResidentSlot::new())
    }

    /// Build a router sharing an existing resident slot
    pub fn with_slot(
        collaborators: Collaborators,
        config: ValidationConfig,
        slot: ResidentSlot,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let cache = Arc::new(EvidenceCache::new(
            Arc::clone(&collaborators.applicability),
            config.reuse_threshold,
        ));
        let locator = DatasetLocator::new(
            Arc::clone(&cache),
            Arc::clone(&collaborators.sources),
            config.min_source_relevance,
            config.acquisition_timeout(),
        );
        let executor = BatchExecutor::new(&collaborators, &config, slot);

        Ok(Self {
            config,
            collaborators,
            cache,
            locator,
            executor,
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<EvidenceCache> {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn resident_slot(&self) -> &ResidentSlot {
        self.executor.slot()
    }

    /// Reject claim sets that break the upstream contract
    pub fn validate_claims(claims: &[Claim]) -> Result<(), RunError> {
        let mut seen: HashSet<&ClaimId> = HashSet::with_capacity(claims.len());
        for (index, claim) in claims.iter().enumerate() {
            if claim.id.as_str().trim().is_empty() {
                return Err(RunError::EmptyClaimId { index });
            }
            if claim.kind.is_none() {
                return Err(RunError::MissingKind {
                    claim_id: claim.id.clone(),
                });
            }
            if !seen.insert(&claim.id) {
                return Err(RunError::DuplicateClaimId {
                    claim_id: claim.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run every claim to exactly one result, in input order
    pub async fn run(&self, claims: Vec<Claim>) -> Result<RunReport, RunError> {
        Self::validate_claims(&claims)?;

        let run_id = Ulid::new();
        let started_at = Utc::now();
        let span = info_span!("run", %run_id, claims = claims.len());

        async {
            let phase1 = self.resolve_uncited(&claims).await;
            info!(
                terminal = phase1.terminal.len(),
                rerouted = phase1.rerouted.len(),
                "uncited lanes resolved"
            );

            let mut cited: Vec<Claim> = claims.iter().filter(|c| c.is_cited()).cloned().collect();
            cited.extend(phase1.rerouted);
            let phase2 = self.execute_cited(cited).await;

            let mut produced = phase1.terminal;
            produced.extend(phase2.results);
            let results = merge_in_input_order(&claims, produced)?;

            Ok::<_, RunError>(RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                results,
                batches: phase2.batches,
                evidence: self.cache.snapshot().await,
            })
        }
        .instrument(span)
        .await
    }

    /// Phase 1: `qual_uncited` then `quant_uncited`
    pub async fn resolve_uncited(&self, claims: &[Claim]) -> UncitedResolution {
        let in_lane = |lane: Lane| claims.iter().filter(move |c| Lane::classify(c) == Some(lane));

        let qual: Vec<ValidationResult> = stream::iter(in_lane(Lane::QualUncited))
            .map(|claim| self.resolve_qualitative(claim))
            .buffered(self.config.oracle_concurrency.max(1))
            .collect()
            .await;

        // Sequential, so a dataset registered for one claim is visible to the next.
        let mut resolution = UncitedResolution {
            terminal: qual,
            rerouted: Vec::new(),
        };
        for claim in in_lane(Lane::QuantUncited) {
            match self.resolve_quantitative(claim).await {
                Ok(result) => resolution.terminal.push(result),
                Err(rerouted) => resolution.rerouted.push(rerouted),
            }
        }
        resolution
    }

    /// Phase 2: `quant_cited` then `qual_cited`
    pub async fn execute_cited(&self, claims: Vec<Claim>) -> CitedExecution {
        let (quant, qual): (Vec<Claim>, Vec<Claim>) = claims
            .into_iter()
            .partition(|c| c.kind == Some(ClaimKind::Quantitative));

        let mut execution = CitedExecution::default();
        for (lane_claims, kind) in [(quant, ClaimKind::Quantitative), (qual, ClaimKind::Qualitative)] {
            if lane_claims.is_empty() {
                continue;
            }
            for BatchOutcome { results, record } in self.executor.run_batches(lane_claims, kind).await {
                execution.results.extend(results);
                execution.batches.push(record);
            }
        }
        execution
    }

    async fn resolve_qualitative(&self, claim: &Claim) -> ValidationResult {
        match self.screen(claim, Lane::QualUncited).await {
            Screening::Conclusive(result) => result,
            Screening::Inconclusive { confidence, errors } => {
                let result = ValidationResult::verdict(
                    claim,
                    Lane::QualUncited,
                    ValidationMethod::Inconclusive,
                    false,
                    confidence,
                    "Neither fact-check nor plausibility assessment was conclusive",
                );
                if errors.len() == 2 {
                    result.with_error(errors.join("; "))
                } else {
                    result
                }
            }
        }
    }

    /// `Ok` ends the claim here; `Err` carries the re-routed claim
    async fn resolve_quantitative(&self, claim: &Claim) -> Result<ValidationResult, Claim> {
        if let Screening::Conclusive(result) = self.screen(claim, Lane::QuantUncited).await {
            return Ok(result);
        }

        match self.locator.locate(claim).await {
            Ok(Some(source)) => {
                info!(claim_id = %claim.id, source_id = %source.source_id, "re-routing with synthetic citation");
                Err(claim
                    .clone()
                    .with_synthetic_citation(source.citation_key(), source.citation_details()))
            }
            Ok(None) => Ok(ValidationResult::failure(
                claim,
                Lane::QuantUncited,
                ValidationMethod::SourceSearch,
                "No relevant dataset found for this claim",
                "no dataset found",
            )),
            Err(e) => {
                warn!(claim_id = %claim.id, error = %e, "dataset search failed");
                Ok(ValidationResult::failure(
                    claim,
                    Lane::QuantUncited,
                    ValidationMethod::SourceSearch,
                    "Dataset search failed",
                    e.to_string(),
                ))
            }
        }
    }

    /// Fact-check first, plausibility only if the fact-check is inconclusive
    async fn screen(&self, claim: &Claim, lane: Lane) -> Screening {
        let mut errors = Vec::new();
        let mut confidence: f64 = 0.0;

        match self.collaborators.fact_check.lookup(&claim.text).await {
            Ok(verdict) if verdict.conclusive(self.config.truth_table_threshold) => {
                let stance = verdict.stance();
                debug!(claim_id = %claim.id, rating = %verdict.rating, ?stance, "fact-check conclusive");
                return Screening::Conclusive(
                    ValidationResult::verdict(
                        claim,
                        lane,
                        ValidationMethod::FactCheck,
                        stance == RatingStance::Supports,
                        verdict.confidence,
                        format!("Fact-check rating: {}", verdict.rating),
                    )
                    .with_sources(verdict.sources),
                );
            }
            Ok(verdict) => {
                if verdict.found {
                    confidence = confidence.max(verdict.confidence);
                }
            }
            Err(e) => {
                warn!(claim_id = %claim.id, error = %e, "fact-check lookup failed");
                errors.push(format!("fact-check: {e}"));
            }
        }

        match self.collaborators.plausibility.assess(&claim.text).await {
            Ok(verdict) if verdict.conclusive(self.config.llm_confidence_threshold) => {
                debug!(claim_id = %claim.id, plausible = verdict.plausible, "plausibility conclusive");
                return Screening::Conclusive(ValidationResult::verdict(
                    claim,
                    lane,
                    ValidationMethod::Plausibility,
                    verdict.plausible,
                    verdict.confidence,
                    verdict.reasoning,
                ));
            }
            Ok(verdict) => confidence = confidence.max(verdict.confidence),
            Err(e) => {
                warn!(claim_id = %claim.id, error = %e, "plausibility assessment failed");
                errors.push(format!("plausibility: {e}"));
            }
        }

        Screening::Inconclusive { confidence, errors }
    }
}

/// Restore input order and check every claim has exactly one result
fn merge_in_input_order(
    claims: &[Claim],
    produced: Vec<ValidationResult>,
) -> Result<Vec<ValidationResult>, RunError> {
    let mut by_id: HashMap<ClaimId, ValidationResult> = HashMap::with_capacity(produced.len());
    for result in produced {
        let claim_id = result.claim_id.clone();
        if by_id.insert(claim_id.clone(), result).is_some() {
            return Err(RunError::ResultMismatch {
                claim_id,
                reason: "produced more than one result".to_string(),
            });
        }
    }

    let mut ordered = Vec::with_capacity(claims.len());
    for claim in claims {
        let result = by_id.remove(&claim.id).ok_or_else(|| RunError::ResultMismatch {
            claim_id: claim.id.clone(),
            reason: "no result produced".to_string(),
        })?;
        ordered.push(result);
    }

    if let Some(stray) = by_id.into_keys().next() {
        return Err(RunError::ResultMismatch {
            claim_id: stray,
            reason: "result for a claim that was never submitted".to_string(),
        });
    }
    Ok(ordered)
}
