//! Qualitative verification
//!
//! Chunk the resident text, pick the top-K chunks by TF-IDF similarity
//! (first K in document order when ranking degrades), and ask the quote
//! verification oracle whether the chunks support the claim.

use crate::chunking::chunk_text;
use crate::retrieval::retrieve_top_k;
use claimcheck_core::{
    Claim, EvidenceChunk, Lane, QuoteVerificationOracle, ResidentHandle, ValidationConfig,
    ValidationMethod, ValidationResult,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct QualitativeVerifier {
    oracle: Arc<dyn QuoteVerificationOracle>,
    chunk_size: usize,
    top_k: usize,
    max_features: usize,
}

impl fmt::Debug for QualitativeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualitativeVerifier")
            .field("chunk_size", &self.chunk_size)
            .field("top_k", &self.top_k)
            .field("max_features", &self.max_features)
            .finish_non_exhaustive()
    }
}

impl QualitativeVerifier {
    #[must_use]
    pub fn new(oracle: Arc<dyn QuoteVerificationOracle>, config: &ValidationConfig) -> Self {
        Self {
            oracle,
            chunk_size: config.chunk_size,
            top_k: config.top_k,
            max_features: config.max_features,
        }
    }

    /// Chunks handed to the oracle for `claim_text`, best first
    #[must_use]
    pub fn select_chunks(&self, handle_id: &str, text: &str, claim_text: &str) -> Vec<EvidenceChunk> {
        let chunks = chunk_text(text, self.chunk_size);
        if chunks.is_empty() {
            return Vec::new();
        }

        let picked: Vec<(usize, f64)> =
            match retrieve_top_k(claim_text, &chunks, self.top_k, self.max_features) {
                Ok(scored) => scored.into_iter().map(|s| (s.index, s.score)).collect(),
                Err(degradation) => {
                    warn!(%degradation, "retrieval degraded, using leading chunks");
                    (0..chunks.len().min(self.top_k)).map(|i| (i, 0.0)).collect()
                }
            };

        picked
            .into_iter()
            .map(|(index, score)| EvidenceChunk {
                id: format!("{handle_id}#chunk-{index}"),
                index,
                text: chunks[index].clone(),
                score,
            })
            .collect()
    }

    /// Verify `claim` against the resident text `handle`
    #[instrument(skip_all, fields(claim_id = %claim.id, handle = %handle.id))]
    pub async fn verify(&self, claim: &Claim, handle: &ResidentHandle) -> ValidationResult {
        let lane = Lane::QualCited;
        let method = ValidationMethod::RetrievalVerification;

        let Some(text) = handle.as_text() else {
            return ValidationResult::failure(
                claim,
                lane,
                method,
                "Resident source is not text",
                format!("expected text, got {:?}", handle.modality()),
            )
            .with_sources(vec![handle.id.clone()]);
        };

        let chunks = self.select_chunks(&handle.id, text, &claim.text);
        debug!(chunks = chunks.len(), "chunks selected");

        match self.oracle.verify(&claim.text, &chunks).await {
            Ok(verdict) => {
                let sources = locate_quotes(&verdict.quotes, &chunks)
                    .unwrap_or_else(|| vec![handle.id.clone()]);
                ValidationResult::verdict(
                    claim,
                    lane,
                    method,
                    verdict.supported,
                    verdict.confidence,
                    verdict.reasoning,
                )
                .with_sources(sources)
            }
            Err(e) => {
                warn!(error = %e, "quote verification failed");
                ValidationResult::failure(
                    claim,
                    lane,
                    method,
                    "Quote verification could not be completed",
                    e.to_string(),
                )
                .with_sources(vec![handle.id.clone()])
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ids of the chunks containing each quote, in quote order, deduplicated
fn locate_quotes(quotes: &[String], chunks: &[EvidenceChunk]) -> Option<Vec<String>> {
    let normalized: Vec<String> = chunks.iter().map(|c| normalize(&c.text)).collect();
    let mut ids: Vec<String> = Vec::new();
    for quote in quotes {
        let needle = normalize(quote);
        if needle.is_empty() {
            continue;
        }
        if let Some(pos) = normalized.iter().position(|c| c.contains(&needle)) {
            if !ids.contains(&chunks[pos].id) {
                ids.push(chunks[pos].id.clone());
            }
        }
    }
    (!ids.is_empty()).then_some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimcheck_core::{ClaimKind, OracleError, QuoteVerdict, SourceDescriptor};
    use claimcheck_test_utils::ScriptedQuotes;
    use pretty_assertions::assert_eq;

    const REPORT: &str = "The committee met in March. Members reviewed the annual budget. \
        The museum attracted two million visitors last year. Attendance records were broken in July. \
        Renovation of the east wing is planned for next spring.";

    fn handle(text: &str) -> ResidentHandle {
        ResidentHandle::text(
            "ref9-resident-handle",
            SourceDescriptor::new("ref9", "https://example.org/report", "citation"),
            text,
        )
    }

    fn claim(text: &str) -> Claim {
        Claim::new("q1", text, ClaimKind::Qualitative).with_citation_key("ref9")
    }

    fn verifier(quotes: ScriptedQuotes) -> QualitativeVerifier {
        QualitativeVerifier::new(Arc::new(quotes), &ValidationConfig::default().with_chunk_size(60))
    }

    #[test]
    fn relevant_chunk_is_selected_first() {
        let v = verifier(ScriptedQuotes::new());
        let chunks = v.select_chunks("h", REPORT, "museum visitors two million");
        assert!(chunks[0].text.contains("two million visitors"));
        assert!(chunks[0].id.starts_with("h#chunk-"));
        assert!(chunks.len() <= 3);
    }

    #[test]
    fn degraded_ranking_falls_back_to_leading_chunks() {
        let v = verifier(ScriptedQuotes::new());
        let chunks = v.select_chunks("h", REPORT, "quantum chromodynamics");
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(chunks.iter().all(|c| c.score == 0.0));
    }

    #[tokio::test]
    async fn supported_claim_cites_quoted_chunk() {
        let quotes = ScriptedQuotes::new().with_verdict(
            "museum",
            QuoteVerdict {
                supported: true,
                confidence: 0.9,
                quotes: vec!["attracted two million   visitors".into()],
                reasoning: "report states the figure".into(),
            },
        );
        let result = verifier(quotes)
            .verify(&claim("The museum drew two million visitors"), &handle(REPORT))
            .await;

        assert!(result.passed);
        assert_eq!(result.method, ValidationMethod::RetrievalVerification);
        assert_eq!(result.sources_used.len(), 1);
        assert!(result.sources_used[0].starts_with("ref9-resident-handle#chunk-"));
    }

    #[tokio::test]
    async fn unlocatable_quotes_fall_back_to_handle() {
        let quotes = ScriptedQuotes::new().with_verdict(
            "museum",
            QuoteVerdict {
                supported: false,
                confidence: 0.7,
                quotes: vec!["not in the text".into()],
                reasoning: "no support".into(),
            },
        );
        let result = verifier(quotes)
            .verify(&claim("The museum closed"), &handle(REPORT))
            .await;
        assert!(!result.passed);
        assert_eq!(result.sources_used, vec!["ref9-resident-handle".to_string()]);
    }

    #[tokio::test]
    async fn oracle_error_is_a_loud_failure() {
        let quotes = ScriptedQuotes::new().with_error("museum", OracleError::Failed("503".into()));
        let result = verifier(quotes)
            .verify(&claim("The museum closed"), &handle(REPORT))
            .await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn empty_text_still_reaches_the_oracle() {
        let quotes = Arc::new(ScriptedQuotes::new());
        let v = QualitativeVerifier::new(
            Arc::clone(&quotes) as Arc<dyn QuoteVerificationOracle>,
            &ValidationConfig::default(),
        );
        let result = v.verify(&claim("anything"), &handle("")).await;

        assert_eq!(quotes.calls().count("verify"), 1);
        assert!(!result.passed);
        assert_eq!(result.sources_used, vec!["ref9-resident-handle".to_string()]);
    }

    #[tokio::test]
    async fn repeated_verification_is_identical() {
        let v = verifier(ScriptedQuotes::new());
        let h = handle(REPORT);
        let c = claim("Attendance records were broken");
        let first = v.verify(&c, &h).await;
        let second = v.verify(&c, &h).await;
        assert_eq!(first, second);
    }
}
