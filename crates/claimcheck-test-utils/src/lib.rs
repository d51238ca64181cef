//! Testing utilities for the ClaimCheck workspace
//!
//! Scripted stand-ins for every collaborator, each keyed on substrings of
//! the claim text, plus claim fixtures. Every fake records its calls in a
//! shared `CallLog` so tests can assert what was (not) invoked.

#![allow(missing_docs)]

use async_trait::async_trait;
use claimcheck_core::{
    AcquisitionError, Applicability, ApplicabilityOracle, CheckOutput, CitationDetails, Claim,
    ClaimKind, CodeSynthesisOracle, Collaborators, DatasetSchema, EvidenceChunk, ExecutableCheck,
    FactCheckOracle, FactCheckVerdict, Modality, OracleError, PlausibilityOracle,
    PlausibilityVerdict, QuoteVerdict, QuoteVerificationOracle, ResidentHandle, Sandbox,
    SandboxError, SourceCandidate, SourceClient, SourceDescriptor,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn quant(id: &str, text: &str) -> Claim {
    Claim::new(id, text, ClaimKind::Quantitative)
}

pub fn qual(id: &str, text: &str) -> Claim {
    Claim::new(id, text, ClaimKind::Qualitative)
}

/// Attach a citation key and a fetchable URL
pub fn cited(claim: Claim, key: &str, url: &str) -> Claim {
    claim
        .with_citation_key(key)
        .with_citation(CitationDetails::new(format!("[{key}]")).with_url(url))
}

/// Handle id the scripted source client gives a fetched source
pub fn handle_id(source_id: &str) -> String {
    format!("{source_id}-resident-handle")
}

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CallLog {
    counts: Arc<DashMap<String, usize>>,
}

impl CallLog {
    pub fn record(&self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).map_or(0, |c| *c)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|e| *e.value()).sum()
    }
}

fn first_match<'a, T>(rules: &'a [(String, T)], text: &str) -> Option<&'a T> {
    rules
        .iter()
        .find(|(needle, _)| text.contains(needle.as_str()))
        .map(|(_, value)| value)
}

// ---------------------------------------------------------------------------
// Source client
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScriptedSources {
    searches: Vec<(String, Result<Vec<SourceCandidate>, AcquisitionError>)>,
    texts: HashMap<String, String>,
    schemas: HashMap<String, DatasetSchema>,
    fetch_errors: HashMap<String, AcquisitionError>,
    search_delay: Option<Duration>,
    fetch_delay: Option<Duration>,
    evict_fails: bool,
    calls: CallLog,
    live: AtomicUsize,
    max_live: AtomicUsize,
    evicted: DashMap<String, usize>,
}

impl ScriptedSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims containing `needle` get these search results
    pub fn with_search(mut self, needle: &str, candidates: Vec<SourceCandidate>) -> Self {
        self.searches.push((needle.to_string(), Ok(candidates)));
        self
    }

    pub fn with_search_error(mut self, needle: &str, error: AcquisitionError) -> Self {
        self.searches.push((needle.to_string(), Err(error)));
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    /// Text served when `url` is fetched
    pub fn with_text(mut self, url: &str, content: &str) -> Self {
        self.texts.insert(url.to_string(), content.to_string());
        self
    }

    pub fn with_schema(mut self, url: &str, schema: DatasetSchema) -> Self {
        self.schemas.insert(url.to_string(), schema);
        self
    }

    pub fn with_fetch_error(mut self, url: &str, error: AcquisitionError) -> Self {
        self.fetch_errors.insert(url.to_string(), error);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn with_failing_evict(mut self) -> Self {
        self.evict_fails = true;
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    /// Sources fetched and not yet evicted
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most sources ever resident at once
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn evictions(&self, handle_id: &str) -> usize {
        self.evicted.get(handle_id).map_or(0, |c| *c)
    }
}

#[async_trait]
impl SourceClient for ScriptedSources {
    async fn search(
        &self,
        claim_text: &str,
        _modality: Modality,
    ) -> Result<Vec<SourceCandidate>, AcquisitionError> {
        self.calls.record("search");
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        first_match(&self.searches, claim_text)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        modality: Modality,
    ) -> Result<ResidentHandle, AcquisitionError> {
        self.calls.record("fetch");
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fetch_errors.get(&descriptor.url) {
            return Err(error.clone());
        }

        let id = handle_id(&descriptor.source_id);
        let handle = match modality {
            Modality::Text => ResidentHandle::text(
                id,
                descriptor.clone(),
                self.texts.get(&descriptor.url).cloned().unwrap_or_default(),
            ),
            Modality::Dataset => {
                let schema = self.schemas.get(&descriptor.url).cloned().unwrap_or_else(|| {
                    DatasetSchema::new("csv", vec!["year".to_string(), "value".to_string()])
                });
                let path = std::env::temp_dir().join(format!("{id}.csv"));
                ResidentHandle::dataset(id, descriptor.clone(), path, schema)
            }
        };

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(handle)
    }

    async fn evict(&self, handle: &ResidentHandle) -> Result<(), AcquisitionError> {
        self.calls.record("evict");
        self.live.fetch_sub(1, Ordering::SeqCst);
        *self.evicted.entry(handle.id.clone()).or_insert(0) += 1;
        if self.evict_fails {
            return Err(AcquisitionError::Network("evict failed".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Applicability
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedApplicability {
    default: Applicability,
    rules: Vec<(String, String, Applicability)>,
    failing: Vec<String>,
    calls: CallLog,
}

impl ScriptedApplicability {
    pub fn new(default: Applicability) -> Self {
        Self {
            default,
            rules: Vec::new(),
            failing: Vec::new(),
            calls: CallLog::default(),
        }
    }

    /// Claims containing `needle` assessed against `source_id`
    pub fn with_rule(mut self, needle: &str, source_id: &str, verdict: Applicability) -> Self {
        self.rules
            .push((needle.to_string(), source_id.to_string(), verdict));
        self
    }

    /// Assessments against `source_id` fail
    pub fn failing_for(mut self, source_id: &str) -> Self {
        self.failing.push(source_id.to_string());
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

#[async_trait]
impl ApplicabilityOracle for ScriptedApplicability {
    async fn assess(
        &self,
        claim_text: &str,
        source: &SourceDescriptor,
    ) -> Result<Applicability, OracleError> {
        self.calls.record("assess");
        if self.failing.contains(&source.source_id) {
            return Err(OracleError::Unavailable("scripted failure".to_string()));
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, id, _)| claim_text.contains(needle.as_str()) && *id == source.source_id)
            .map_or(self.default, |(_, _, verdict)| *verdict))
    }
}

// ---------------------------------------------------------------------------
// Code synthesis and sandbox
// ---------------------------------------------------------------------------

/// Emits the claim text as the check source so sandbox rules can key on it
#[derive(Debug, Default)]
pub struct ScriptedSynthesis {
    failing: Vec<String>,
    calls: CallLog,
}

impl ScriptedSynthesis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

#[async_trait]
impl CodeSynthesisOracle for ScriptedSynthesis {
    async fn synthesize_check(
        &self,
        claim_text: &str,
        _schema: &DatasetSchema,
    ) -> Result<ExecutableCheck, OracleError> {
        self.calls.record("synthesize");
        if self.failing.iter().any(|n| claim_text.contains(n.as_str())) {
            return Err(OracleError::Failed("synthesis refused".to_string()));
        }
        Ok(ExecutableCheck::new("python", claim_text))
    }
}

#[derive(Debug, Clone)]
pub enum SandboxScript {
    Output(CheckOutput),
    Fail(SandboxError),
    Sleep(Duration),
}

#[derive(Debug)]
pub struct ScriptedSandbox {
    default: CheckOutput,
    rules: Vec<(String, SandboxScript)>,
    calls: CallLog,
    handles: DashMap<String, usize>,
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self {
            default: CheckOutput {
                passed: true,
                confidence: 0.9,
                explanation: "check passed".to_string(),
            },
            rules: Vec::new(),
            calls: CallLog::default(),
            handles: DashMap::new(),
        }
    }
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, needle: &str, output: CheckOutput) -> Self {
        self.rules
            .push((needle.to_string(), SandboxScript::Output(output)));
        self
    }

    pub fn with_error(mut self, needle: &str, error: SandboxError) -> Self {
        self.rules.push((needle.to_string(), SandboxScript::Fail(error)));
        self
    }

    /// Sleep before answering with the default output
    pub fn with_delay(mut self, needle: &str, delay: Duration) -> Self {
        self.rules.push((needle.to_string(), SandboxScript::Sleep(delay)));
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    /// Checks run against `handle_id`
    pub fn runs_against(&self, handle_id: &str) -> usize {
        self.handles.get(handle_id).map_or(0, |c| *c)
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn run(
        &self,
        check: &ExecutableCheck,
        dataset: &ResidentHandle,
        _timeout: Duration,
    ) -> Result<CheckOutput, SandboxError> {
        self.calls.record("run");
        *self.handles.entry(dataset.id.clone()).or_insert(0) += 1;
        match first_match(&self.rules, &check.source) {
            Some(SandboxScript::Output(output)) => Ok(output.clone()),
            Some(SandboxScript::Fail(error)) => Err(error.clone()),
            Some(SandboxScript::Sleep(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(self.default.clone())
            }
            None => Ok(self.default.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Fact check, plausibility, quotes
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScriptedFactCheck {
    rules: Vec<(String, Result<FactCheckVerdict, OracleError>)>,
    calls: CallLog,
}

impl ScriptedFactCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hit(mut self, needle: &str, rating: &str, confidence: f64) -> Self {
        self.rules.push((
            needle.to_string(),
            Ok(FactCheckVerdict::hit(
                rating,
                confidence,
                vec![format!("https://factcheck.example/{}", needle.replace(' ', "-"))],
            )),
        ));
        self
    }

    pub fn with_error(mut self, needle: &str, error: OracleError) -> Self {
        self.rules.push((needle.to_string(), Err(error)));
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

#[async_trait]
impl FactCheckOracle for ScriptedFactCheck {
    async fn lookup(&self, claim_text: &str) -> Result<FactCheckVerdict, OracleError> {
        self.calls.record("lookup");
        first_match(&self.rules, claim_text)
            .cloned()
            .unwrap_or_else(|| Ok(FactCheckVerdict::not_found()))
    }
}

#[derive(Debug)]
pub struct ScriptedPlausibility {
    default: PlausibilityVerdict,
    rules: Vec<(String, Result<PlausibilityVerdict, OracleError>)>,
    calls: CallLog,
}

impl Default for ScriptedPlausibility {
    fn default() -> Self {
        Self {
            default: PlausibilityVerdict {
                plausible: false,
                confidence: 0.3,
                reasoning: "insufficient signal".to_string(),
            },
            rules: Vec::new(),
            calls: CallLog::default(),
        }
    }
}

impl ScriptedPlausibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, needle: &str, plausible: bool, confidence: f64) -> Self {
        self.rules.push((
            needle.to_string(),
            Ok(PlausibilityVerdict {
                plausible,
                confidence,
                reasoning: format!("scripted judgement for '{needle}'"),
            }),
        ));
        self
    }

    pub fn with_error(mut self, needle: &str, error: OracleError) -> Self {
        self.rules.push((needle.to_string(), Err(error)));
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

#[async_trait]
impl PlausibilityOracle for ScriptedPlausibility {
    async fn assess(&self, claim_text: &str) -> Result<PlausibilityVerdict, OracleError> {
        self.calls.record("assess");
        first_match(&self.rules, claim_text)
            .cloned()
            .unwrap_or_else(|| Ok(self.default.clone()))
    }
}

/// Supports a claim by quoting the start of the first chunk it receives
#[derive(Debug, Default)]
pub struct ScriptedQuotes {
    rules: Vec<(String, Result<QuoteVerdict, OracleError>)>,
    calls: CallLog,
}

impl ScriptedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, needle: &str, verdict: QuoteVerdict) -> Self {
        self.rules.push((needle.to_string(), Ok(verdict)));
        self
    }

    pub fn with_error(mut self, needle: &str, error: OracleError) -> Self {
        self.rules.push((needle.to_string(), Err(error)));
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

#[async_trait]
impl QuoteVerificationOracle for ScriptedQuotes {
    async fn verify(
        &self,
        claim_text: &str,
        chunks: &[EvidenceChunk],
    ) -> Result<QuoteVerdict, OracleError> {
        self.calls.record("verify");
        if let Some(scripted) = first_match(&self.rules, claim_text) {
            return scripted.clone();
        }
        Ok(match chunks.first() {
            Some(chunk) => QuoteVerdict {
                supported: true,
                confidence: 0.85,
                quotes: vec![chunk.text.chars().take(40).collect::<String>().trim().to_string()],
                reasoning: "quoted passage supports the claim".to_string(),
            },
            None => QuoteVerdict {
                supported: false,
                confidence: 0.2,
                quotes: Vec::new(),
                reasoning: "no passages to quote".to_string(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Every fake in one place, each reachable for call assertions
#[derive(Debug, Clone)]
pub struct FakeWorld {
    pub sources: Arc<ScriptedSources>,
    pub applicability: Arc<ScriptedApplicability>,
    pub synthesis: Arc<ScriptedSynthesis>,
    pub sandbox: Arc<ScriptedSandbox>,
    pub fact_check: Arc<ScriptedFactCheck>,
    pub plausibility: Arc<ScriptedPlausibility>,
    pub quotes: Arc<ScriptedQuotes>,
}

impl Default for FakeWorld {
    fn default() -> Self {
        Self {
            sources: Arc::new(ScriptedSources::new()),
            applicability: Arc::new(ScriptedApplicability::new(Applicability::new(false, 0.0))),
            synthesis: Arc::new(ScriptedSynthesis::new()),
            sandbox: Arc::new(ScriptedSandbox::new()),
            fact_check: Arc::new(ScriptedFactCheck::new()),
            plausibility: Arc::new(ScriptedPlausibility::new()),
            quotes: Arc::new(ScriptedQuotes::new()),
        }
    }
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(mut self, sources: ScriptedSources) -> Self {
        self.sources = Arc::new(sources);
        self
    }

    pub fn with_applicability(mut self, oracle: ScriptedApplicability) -> Self {
        self.applicability = Arc::new(oracle);
        self
    }

    pub fn with_synthesis(mut self, oracle: ScriptedSynthesis) -> Self {
        self.synthesis = Arc::new(oracle);
        self
    }

    pub fn with_sandbox(mut self, sandbox: ScriptedSandbox) -> Self {
        self.sandbox = Arc::new(sandbox);
        self
    }

    pub fn with_fact_check(mut self, oracle: ScriptedFactCheck) -> Self {
        self.fact_check = Arc::new(oracle);
        self
    }

    pub fn with_plausibility(mut self, oracle: ScriptedPlausibility) -> Self {
        self.plausibility = Arc::new(oracle);
        self
    }

    pub fn with_quotes(mut self, oracle: ScriptedQuotes) -> Self {
        self.quotes = Arc::new(oracle);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            sources: self.sources.clone(),
            applicability: self.applicability.clone(),
            synthesis: self.synthesis.clone(),
            sandbox: self.sandbox.clone(),
            fact_check: self.fact_check.clone(),
            plausibility: self.plausibility.clone(),
            quotes: self.quotes.clone(),
        }
    }
}
