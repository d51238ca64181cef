//! Core data model
//!
//! Defines the values that flow through the validation engine:
//! - Claims and their citation metadata
//! - Processing lanes
//! - Evidence sources and resident handles
//! - Validation results and batch records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Unique claim identifier, stable across the whole run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub String);

impl ClaimId {
    /// Create a claim identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as `&str`
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClaimId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Grouping key tying claims to a single evidence source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CitationKey(pub String);

impl CitationKey {
    pub const SYNTHETIC_PREFIX: &'static str = "synthetic:";

    /// Create a citation key
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key attached to claims whose source was found rather than cited.
    ///
    /// Derived from the source id so that claims reusing one cached
    /// source land in the same batch.
    #[inline]
    #[must_use]
    pub fn synthetic(source_id: &str) -> Self {
        Self(format!("{}{source_id}", Self::SYNTHETIC_PREFIX))
    }

    #[inline]
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(Self::SYNTHETIC_PREFIX)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CitationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Claim kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    /// Numeric claim, verified against a dataset
    Quantitative,
    /// Descriptive claim, verified against text
    Qualitative,
}

impl ClaimKind {
    /// Evidence modality used to verify this kind of claim
    #[inline]
    #[must_use]
    pub fn modality(self) -> Modality {
        match self {
            Self::Quantitative => Modality::Dataset,
            Self::Qualitative => Modality::Text,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quantitative => "quantitative",
            Self::Qualitative => "qualitative",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Dataset,
    Text,
}

/// Bibliographic details carried by a citation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CitationDetails {
    /// Citation as it appeared in the document
    pub raw_text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
}

impl CitationDetails {
    /// Create details from the raw citation text
    #[inline]
    #[must_use]
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    /// Location the source can be fetched from.
    ///
    /// Prefers an explicit URL, then a DOI resolved through doi.org.
    #[must_use]
    pub fn locator(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_string());
        }
        self.doi
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|doi| format!("https://doi.org/{doi}"))
    }
}

/// An extracted factual statement to be verified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub text: String,
    /// Missing only when the extraction stage broke its contract
    #[serde(default)]
    pub kind: Option<ClaimKind>,
    #[serde(default)]
    pub citation_key: Option<CitationKey>,
    #[serde(default)]
    pub citation: Option<CitationDetails>,
    /// Conclusion of the analysed document itself rather than a cited one
    #[serde(default)]
    pub is_original: bool,
    /// Citation was attached by the engine, not found in the document
    #[serde(default)]
    pub synthetic: bool,
}

impl Claim {
    /// Create an uncited claim
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, kind: ClaimKind) -> Self {
        Self {
            id: ClaimId::new(id),
            text: text.into(),
            kind: Some(kind),
            citation_key: None,
            citation: None,
            is_original: false,
            synthetic: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_citation_key(mut self, key: impl Into<String>) -> Self {
        self.citation_key = Some(CitationKey::new(key));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_citation(mut self, details: CitationDetails) -> Self {
        self.citation = Some(details);
        self
    }

    #[inline]
    #[must_use]
    pub fn as_original(mut self) -> Self {
        self.is_original = true;
        self
    }

    /// Attach a substitute citation found for an uncited claim
    #[must_use]
    pub fn with_synthetic_citation(mut self, key: CitationKey, details: CitationDetails) -> Self {
        self.citation_key = Some(key);
        self.citation = Some(details);
        self.synthetic = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_cited(&self) -> bool {
        self.citation_key.is_some()
    }
}

/// Processing lane, declared in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    QualUncited,
    QuantUncited,
    QuantCited,
    QualCited,
}

impl Lane {
    /// All lanes in processing order
    pub const ALL: [Lane; 4] = [
        Lane::QualUncited,
        Lane::QuantUncited,
        Lane::QuantCited,
        Lane::QualCited,
    ];

    /// Classify a claim. `None` when the claim has no kind.
    #[must_use]
    pub fn classify(claim: &Claim) -> Option<Self> {
        let lane = match (claim.kind?, claim.is_cited()) {
            (ClaimKind::Qualitative, false) => Self::QualUncited,
            (ClaimKind::Quantitative, false) => Self::QuantUncited,
            (ClaimKind::Quantitative, true) => Self::QuantCited,
            (ClaimKind::Qualitative, true) => Self::QualCited,
        };
        Some(lane)
    }

    #[inline]
    #[must_use]
    pub fn kind(self) -> ClaimKind {
        match self {
            Self::QualUncited | Self::QualCited => ClaimKind::Qualitative,
            Self::QuantUncited | Self::QuantCited => ClaimKind::Quantitative,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cited(self) -> bool {
        matches!(self, Self::QuantCited | Self::QualCited)
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualUncited => "qual_uncited",
            Self::QuantUncited => "quant_uncited",
            Self::QuantCited => "quant_cited",
            Self::QualCited => "qual_cited",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a source can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub url: String,
    /// Repository or platform, e.g. `data.gov`
    pub source_type: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl SourceDescriptor {
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        url: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            source_type: source_type.into(),
            title: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Search hit returned by a source client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub descriptor: SourceDescriptor,
    /// Relevance (0.0 - 1.0)
    pub confidence: f64,
}

impl SourceCandidate {
    #[inline]
    #[must_use]
    pub fn new(descriptor: SourceDescriptor, confidence: f64) -> Self {
        Self {
            descriptor,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Reusable dataset source owned by the evidence cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub source_type: String,
    pub url: String,
    pub source_id: String,
    /// Relevance at discovery time (0.0 - 1.0)
    pub confidence: f64,
    /// Number of other claims served by this source; never decreases
    pub reuse_count: u32,
    pub origin_claim_id: ClaimId,
    /// Registration order, assigned by the cache
    pub registered_seq: u64,
}

impl EvidenceSource {
    /// Build an unregistered source from a search hit
    #[must_use]
    pub fn from_candidate(candidate: &SourceCandidate, origin_claim_id: ClaimId) -> Self {
        Self {
            source_type: candidate.descriptor.source_type.clone(),
            url: candidate.descriptor.url.clone(),
            source_id: candidate.descriptor.source_id.clone(),
            confidence: candidate.confidence.clamp(0.0, 1.0),
            reuse_count: 0,
            origin_claim_id,
            registered_seq: 0,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(&self.source_id, &self.url, &self.source_type)
    }

    /// Key under which claims served by this source are batched
    #[inline]
    #[must_use]
    pub fn citation_key(&self) -> CitationKey {
        CitationKey::synthetic(&self.source_id)
    }

    /// Citation details attached to a re-routed claim
    #[must_use]
    pub fn citation_details(&self) -> CitationDetails {
        CitationDetails {
            raw_text: format!("Found dataset: {}", self.url),
            title: Some(format!("Dataset from {}", self.source_type)),
            url: Some(self.url.clone()),
            doi: None,
        }
    }
}

/// Column layout of a resident dataset, handed to code synthesis
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// File format, e.g. `csv`
    pub format: String,
    pub columns: Vec<String>,
}

impl DatasetSchema {
    #[must_use]
    pub fn new(format: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            format: format.into(),
            columns,
        }
    }

    /// One-line description
    #[must_use]
    pub fn describe(&self) -> String {
        if self.columns.is_empty() {
            format!("{} dataset (columns unknown)", self.format)
        } else {
            format!("{} dataset with columns: {}", self.format, self.columns.join(", "))
        }
    }
}

/// Payload of a resident source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResidentPayload {
    /// Dataset materialized on disk
    Dataset { path: PathBuf, schema: DatasetSchema },
    /// Extracted text held in memory
    Text { content: String },
}

/// The single evidence payload currently held for batch processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentHandle {
    /// Identifier cited in `sources_used`
    pub id: String,
    pub descriptor: SourceDescriptor,
    pub payload: ResidentPayload,
}

impl ResidentHandle {
    #[must_use]
    pub fn dataset(
        id: impl Into<String>,
        descriptor: SourceDescriptor,
        path: impl Into<PathBuf>,
        schema: DatasetSchema,
    ) -> Self {
        Self {
            id: id.into(),
            descriptor,
            payload: ResidentPayload::Dataset {
                path: path.into(),
                schema,
            },
        }
    }

    #[must_use]
    pub fn text(id: impl Into<String>, descriptor: SourceDescriptor, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            descriptor,
            payload: ResidentPayload::Text {
                content: content.into(),
            },
        }
    }

    #[must_use]
    pub fn modality(&self) -> Modality {
        match self.payload {
            ResidentPayload::Dataset { .. } => Modality::Dataset,
            ResidentPayload::Text { .. } => Modality::Text,
        }
    }

    #[must_use]
    pub fn as_dataset(&self) -> Option<(&Path, &DatasetSchema)> {
        match &self.payload {
            ResidentPayload::Dataset { path, schema } => Some((path.as_path(), schema)),
            ResidentPayload::Text { .. } => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ResidentPayload::Text { content } => Some(content),
            ResidentPayload::Dataset { .. } => None,
        }
    }
}

/// How a result was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    /// Fact-check database hit
    FactCheck,
    /// Language-model plausibility judgement
    Plausibility,
    /// Neither uncited check was conclusive
    Inconclusive,
    /// Substitute source search found nothing usable
    SourceSearch,
    /// Generated check executed against a dataset
    GeneratedCheck,
    /// Retrieval over text plus quote verification
    RetrievalVerification,
    /// Shared source could not be acquired
    BatchFailed,
}

impl ValidationMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FactCheck => "fact_check",
            Self::Plausibility => "plausibility",
            Self::Inconclusive => "inconclusive",
            Self::SourceSearch => "source_search",
            Self::GeneratedCheck => "generated_check",
            Self::RetrievalVerification => "retrieval_verification",
            Self::BatchFailed => "batch_failed",
        }
    }
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output unit, exactly one per claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub claim_id: ClaimId,
    pub kind: ClaimKind,
    pub lane: Lane,
    pub method: ValidationMethod,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    pub passed: bool,
    pub explanation: String,
    pub sources_used: Vec<String>,
    pub error: Option<String>,
    /// Claim was verified against a found, not cited, source
    #[serde(default)]
    pub synthetic_citation: bool,
    /// Source of the executed check, when one ran
    #[serde(default)]
    pub check_source: Option<String>,
}

impl ValidationResult {
    /// Create a verdict for a claim
    #[must_use]
    pub fn verdict(
        claim: &Claim,
        lane: Lane,
        method: ValidationMethod,
        passed: bool,
        confidence: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            claim_id: claim.id.clone(),
            kind: lane.kind(),
            lane,
            method,
            confidence: clamp_confidence(confidence),
            passed,
            explanation: explanation.into(),
            sources_used: Vec::new(),
            error: None,
            synthetic_citation: claim.synthetic,
            check_source: None,
        }
    }

    /// Create a failed result carrying an error reason
    #[must_use]
    pub fn failure(
        claim: &Claim,
        lane: Lane,
        method: ValidationMethod,
        explanation: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::verdict(claim, lane, method, false, 0.0, explanation).with_error(error)
    }

    #[inline]
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources_used = sources;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_check_source(mut self, source: impl Into<String>) -> Self {
        self.check_source = Some(source.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Outcome of one batch, kept for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub citation_key: CitationKey,
    pub lane: Lane,
    pub claim_ids: Vec<ClaimId>,
    pub download_ok: bool,
    pub resident_handle: Option<String>,
    pub notes: String,
}
