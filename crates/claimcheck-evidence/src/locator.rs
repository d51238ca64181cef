//! Dataset location for uncited quantitative claims
//!
//! Cache first, then an external search bounded by the acquisition
//! timeout. A found source is registered so later claims can reuse it.

use crate::cache::EvidenceCache;
use claimcheck_core::{
    AcquisitionError, Claim, EvidenceSource, Modality, SourceCandidate, SourceClient,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct DatasetLocator {
    cache: Arc<EvidenceCache>,
    sources: Arc<dyn SourceClient>,
    min_relevance: f64,
    search_timeout: Duration,
}

impl fmt::Debug for DatasetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetLocator")
            .field("min_relevance", &self.min_relevance)
            .field("search_timeout", &self.search_timeout)
            .finish_non_exhaustive()
    }
}

impl DatasetLocator {
    #[must_use]
    pub fn new(
        cache: Arc<EvidenceCache>,
        sources: Arc<dyn SourceClient>,
        min_relevance: f64,
        search_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            sources,
            min_relevance,
            search_timeout,
        }
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<EvidenceCache> {
        &self.cache
    }

    /// Find a dataset for `claim`.
    ///
    /// `Ok(None)` means the search ran and nothing relevant came back.
    #[instrument(skip(self, claim), fields(claim_id = %claim.id))]
    pub async fn locate(&self, claim: &Claim) -> Result<Option<EvidenceSource>, AcquisitionError> {
        if let Some(cached) = self.cache.lookup(&claim.text).await {
            return Ok(Some(cached));
        }

        let candidates = tokio::time::timeout(
            self.search_timeout,
            self.sources.search(&claim.text, Modality::Dataset),
        )
        .await
        .map_err(|_| AcquisitionError::timeout(self.search_timeout))??;

        debug!(candidates = candidates.len(), "dataset search returned");

        let Some(best) = best_candidate(candidates, self.min_relevance) else {
            info!("no dataset above minimum relevance");
            return Ok(None);
        };

        let registered = self
            .cache
            .register(EvidenceSource::from_candidate(&best, claim.id.clone()))
            .await;
        info!(
            source_id = %registered.source_id,
            confidence = registered.confidence,
            "dataset found and registered"
        );
        Ok(Some(registered))
    }
}

/// Highest-confidence candidate at or above `min_relevance`; earliest wins ties
fn best_candidate(candidates: Vec<SourceCandidate>, min_relevance: f64) -> Option<SourceCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.confidence >= min_relevance)
        .fold(None, |best: Option<SourceCandidate>, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimcheck_core::{Applicability, ClaimKind, SourceDescriptor};
    use claimcheck_test_utils::{ScriptedApplicability, ScriptedSources};

    fn candidate(id: &str, confidence: f64) -> SourceCandidate {
        SourceCandidate::new(
            SourceDescriptor::new(id, format!("https://data.example/{id}"), "kaggle"),
            confidence,
        )
    }

    fn locator(sources: ScriptedSources, applicable: Applicability) -> (DatasetLocator, Arc<ScriptedSources>) {
        let sources = Arc::new(sources);
        let cache = Arc::new(EvidenceCache::new(
            Arc::new(ScriptedApplicability::new(applicable)),
            0.75,
        ));
        let locator = DatasetLocator::new(
            cache,
            Arc::clone(&sources) as Arc<dyn SourceClient>,
            0.5,
            Duration::from_secs(30),
        );
        (locator, sources)
    }

    #[test]
    fn best_candidate_prefers_confidence_then_order() {
        let picked = best_candidate(
            vec![candidate("a", 0.6), candidate("b", 0.9), candidate("c", 0.9)],
            0.5,
        )
        .unwrap();
        assert_eq!(picked.descriptor.source_id, "b");
        assert!(best_candidate(vec![candidate("a", 0.4)], 0.5).is_none());
    }

    #[tokio::test]
    async fn second_claim_is_served_from_cache() {
        let sources = ScriptedSources::new().with_search("GDP", vec![candidate("gdp", 0.9)]);
        let (locator, sources) = locator(sources, Applicability::new(true, 0.8));

        let first = Claim::new("c1", "GDP grew 2% in 2020", ClaimKind::Quantitative);
        let second = Claim::new("c2", "GDP per capita doubled", ClaimKind::Quantitative);

        let found = locator.locate(&first).await.unwrap().unwrap();
        assert_eq!(found.reuse_count, 0);

        let reused = locator.locate(&second).await.unwrap().unwrap();
        assert_eq!(reused.source_id, "gdp");
        assert_eq!(reused.reuse_count, 1);
        assert_eq!(sources.calls().count("search"), 1);
    }

    #[tokio::test]
    async fn irrelevant_results_yield_none() {
        let sources = ScriptedSources::new().with_search("rain", vec![candidate("weather", 0.3)]);
        let (locator, _) = locator(sources, Applicability::new(false, 0.0));

        let claim = Claim::new("c1", "rain fell 40mm", ClaimKind::Quantitative);
        assert!(locator.locate(&claim).await.unwrap().is_none());
        assert!(locator.cache().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_search_times_out() {
        let sources = ScriptedSources::new()
            .with_search("GDP", vec![candidate("gdp", 0.9)])
            .with_search_delay(Duration::from_secs(60));
        let (locator, _) = locator(sources, Applicability::new(false, 0.0));

        let claim = Claim::new("c1", "GDP grew", ClaimKind::Quantitative);
        let err = locator.locate(&claim).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
