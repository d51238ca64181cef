//! Collaborator contracts
//!
//! Everything the engine consumes but does not build: source search and
//! download, language-model judgements, code synthesis and the sandbox
//! that runs generated checks. Implementations are injected as
//! `Arc<dyn Trait>` and can be swapped without touching orchestration.

use crate::error::{AcquisitionError, OracleError, SandboxError};
use crate::model::{DatasetSchema, Modality, ResidentHandle, SourceCandidate, SourceDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Search for and download evidence sources
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Find candidate sources for a claim. May return an empty list.
    async fn search(
        &self,
        claim_text: &str,
        modality: Modality,
    ) -> Result<Vec<SourceCandidate>, AcquisitionError>;

    /// Download a source and make it resident
    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        modality: Modality,
    ) -> Result<ResidentHandle, AcquisitionError>;

    /// Drop a resident source (delete files, free buffers)
    async fn evict(&self, handle: &ResidentHandle) -> Result<(), AcquisitionError> {
        let _ = handle;
        Ok(())
    }
}

/// Whether a known source can answer a new claim
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Applicability {
    pub applicable: bool,
    pub confidence: f64,
}

impl Applicability {
    #[inline]
    #[must_use]
    pub fn new(applicable: bool, confidence: f64) -> Self {
        Self {
            applicable,
            confidence,
        }
    }

    /// Applicable with confidence at or above `threshold`
    #[inline]
    #[must_use]
    pub fn clears(&self, threshold: f64) -> bool {
        self.applicable && self.confidence >= threshold
    }
}

/// Decides whether a cached dataset can be reused for a claim
#[async_trait]
pub trait ApplicabilityOracle: Send + Sync {
    async fn assess(
        &self,
        claim_text: &str,
        source: &SourceDescriptor,
    ) -> Result<Applicability, OracleError>;
}

/// Generated program that checks one claim against a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableCheck {
    /// Interpreter language, e.g. `python`
    pub language: String,
    pub source: String,
}

impl ExecutableCheck {
    #[must_use]
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
        }
    }

    /// Build a check from a raw model response, stripping a markdown fence
    #[must_use]
    pub fn from_response(language: impl Into<String>, response: &str) -> Self {
        Self::new(language, strip_code_fence(response))
    }
}

fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[open + 3..];
    // skip the info string (`python`, `py`, ...)
    let body_start = after_open.find('\n').map_or(0, |nl| nl + 1);
    let body = &after_open[body_start..];
    match body.rfind("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Fixed output record every check must print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckOutput {
    pub passed: bool,
    pub confidence: f64,
    pub explanation: String,
}

impl CheckOutput {
    /// Parse the record out of a check's standard output.
    ///
    /// The record is the outermost JSON object in the output; log lines
    /// before or after it are ignored.
    pub fn parse(stdout: &str) -> Result<Self, SandboxError> {
        let start = stdout
            .find('{')
            .ok_or_else(|| SandboxError::MalformedOutput("no JSON object in output".into()))?;
        let end = stdout
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| SandboxError::MalformedOutput("unterminated JSON object".into()))?;

        let output: Self = serde_json::from_str(&stdout[start..=end])
            .map_err(|e| SandboxError::MalformedOutput(e.to_string()))?;

        if !output.confidence.is_finite() || !(0.0..=1.0).contains(&output.confidence) {
            return Err(SandboxError::MalformedOutput(format!(
                "confidence {} outside [0, 1]",
                output.confidence
            )));
        }
        Ok(output)
    }
}

/// Produces executable checks for quantitative claims
#[async_trait]
pub trait CodeSynthesisOracle: Send + Sync {
    async fn synthesize_check(
        &self,
        claim_text: &str,
        schema: &DatasetSchema,
    ) -> Result<ExecutableCheck, OracleError>;
}

/// Runs a generated check in isolation
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(
        &self,
        check: &ExecutableCheck,
        dataset: &ResidentHandle,
        timeout: Duration,
    ) -> Result<CheckOutput, SandboxError>;
}

/// Reading of a fact-check rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingStance {
    Supports,
    Refutes,
    Mixed,
    Unverified,
}

const REFUTING_RATINGS: &[&str] = &[
    "false",
    "incorrect",
    "inaccurate",
    "untrue",
    "misleading",
    "debunked",
    "unproven",
    "fake",
    "wrong",
    "pants on fire",
];
const MIXED_RATINGS: &[&str] = &["mixed", "mixture", "half", "partly", "partially", "somewhat"];
const SUPPORTING_RATINGS: &[&str] = &["true", "correct", "accurate", "verified", "confirmed"];

impl RatingStance {
    /// Interpret a free-text rating such as "Mostly True" or "Pants on Fire".
    ///
    /// Refuting keywords are checked first: "incorrect" contains "correct".
    #[must_use]
    pub fn interpret(rating: &str) -> Self {
        let rating = rating.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| rating.contains(w));

        if has(REFUTING_RATINGS) {
            Self::Refutes
        } else if has(MIXED_RATINGS) {
            Self::Mixed
        } else if has(SUPPORTING_RATINGS) {
            Self::Supports
        } else {
            Self::Unverified
        }
    }
}

/// Fact-check database answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckVerdict {
    pub found: bool,
    pub rating: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

impl FactCheckVerdict {
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            found: false,
            rating: "unverified".to_string(),
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn hit(rating: impl Into<String>, confidence: f64, sources: Vec<String>) -> Self {
        Self {
            found: true,
            rating: rating.into(),
            confidence,
            sources,
        }
    }

    #[inline]
    #[must_use]
    pub fn stance(&self) -> RatingStance {
        RatingStance::interpret(&self.rating)
    }

    /// Found with confidence at or above `threshold`
    #[inline]
    #[must_use]
    pub fn conclusive(&self, threshold: f64) -> bool {
        self.found && self.confidence >= threshold
    }
}

/// Looks claims up in fact-check databases
#[async_trait]
pub trait FactCheckOracle: Send + Sync {
    async fn lookup(&self, claim_text: &str) -> Result<FactCheckVerdict, OracleError>;
}

/// Language-model plausibility judgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityVerdict {
    pub plausible: bool,
    pub confidence: f64,
    pub reasoning: String,
}

impl PlausibilityVerdict {
    #[inline]
    #[must_use]
    pub fn conclusive(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

#[async_trait]
pub trait PlausibilityOracle: Send + Sync {
    async fn assess(&self, claim_text: &str) -> Result<PlausibilityVerdict, OracleError>;
}

/// Text excerpt handed to quote verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    /// `<handle-id>#chunk-<index>`
    pub id: String,
    pub index: usize,
    pub text: String,
    /// Retrieval similarity; 0.0 for fallback chunks
    pub score: f64,
}

/// Quote verification answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteVerdict {
    pub supported: bool,
    pub confidence: f64,
    pub quotes: Vec<String>,
    pub reasoning: String,
}

/// Verifies a claim against retrieved excerpts
#[async_trait]
pub trait QuoteVerificationOracle: Send + Sync {
    async fn verify(
        &self,
        claim_text: &str,
        chunks: &[EvidenceChunk],
    ) -> Result<QuoteVerdict, OracleError>;
}

/// Every collaborator the router needs, bundled for injection
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceClient>,
    pub applicability: Arc<dyn ApplicabilityOracle>,
    pub synthesis: Arc<dyn CodeSynthesisOracle>,
    pub sandbox: Arc<dyn Sandbox>,
    pub fact_check: Arc<dyn FactCheckOracle>,
    pub plausibility: Arc<dyn PlausibilityOracle>,
    pub quotes: Arc<dyn QuoteVerificationOracle>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
