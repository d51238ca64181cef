//! Seeded run simulator
//!
//! Generates a claim set plus simulated collaborators whose every answer
//! is decided up front from the seed, runs the router, and checks the
//! run-level guarantees:
//! - every claim has exactly one result
//! - a failed batch fails all of its claims with one reason
//! - a successful batch verifies all of its claims against one source
//! - at most one source is resident at any moment, and none after the run

use crate::report::RunReport;
use crate::router::ClaimRouter;
use async_trait::async_trait;
use claimcheck_core::{
    AcquisitionError, Applicability, ApplicabilityOracle, BatchRecord, CheckOutput,
    CitationDetails, CitationKey, Claim, ClaimId, ClaimKind, CodeSynthesisOracle, Collaborators,
    DatasetSchema, EvidenceChunk, ExecutableCheck, FactCheckOracle, FactCheckVerdict, Modality,
    OracleError, PlausibilityOracle, PlausibilityVerdict, QuoteVerdict, QuoteVerificationOracle,
    ResidentHandle, Sandbox, SandboxError, SourceCandidate, SourceClient, SourceDescriptor,
    ValidationConfig, ValidationMethod, ValidationResult,
};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

const TOPICS: [&str; 6] = ["inflation", "unemployment", "exports", "housing", "wages", "emissions"];
const RATINGS: [&str; 5] = ["true", "false", "mostly true", "half true", "pants on fire"];

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Claims to generate
    pub claims: usize,
    /// Probability that a source download or an oracle call fails
    pub failure_rate: f64,
    /// Share of claims carrying a citation
    pub cited_share: f64,
    /// Share of claims that are quantitative
    pub quantitative_share: f64,
    /// Upper bound on simulated download latency
    pub max_fetch_delay_ms: u64,
    pub validation: ValidationConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            claims: 200,
            failure_rate: 0.1,
            cited_share: 0.5,
            quantitative_share: 0.5,
            max_fetch_delay_ms: 3,
            validation: ValidationConfig::default()
                .with_batch_concurrency(4)
                .with_verify_concurrency(4),
        }
    }
}

/// A broken run-level guarantee
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The router refused or aborted the run
    RunAborted { reason: String },
    ResultCountMismatch { claims: usize, results: usize },
    LostClaim { claim_id: ClaimId },
    DuplicatedClaim { claim_id: ClaimId },
    /// A batch neither fully failed nor fully succeeded on one source
    BatchNotAtomic { citation_key: String, details: String },
    /// A download that was meant to fail did not fail its batch
    UnexpectedOutcome { citation_key: String, details: String },
    ResidentBoundExceeded { max_live: usize },
    ResidentLeaked { live: usize },
}

/// Counters collected from one simulated run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulatorStats {
    pub claims: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub rerouted: usize,
    pub cache_reuses: u64,
    pub fetches: u64,
    pub evictions: u64,
    pub max_live: usize,
    pub per_method: HashMap<String, usize>,
    pub elapsed_ms: u128,
}

/// Final report from the simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if the simulation upheld every guarantee
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate a text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== ClaimCheck Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Failure rate: {:.2}\n", self.config.failure_rate));
        report.push_str(&format!("Claims: {}\n", self.stats.claims));
        report.push_str(&format!("Passed: {}\n", self.stats.passed));
        report.push_str(&format!("Failed: {}\n", self.stats.failed));
        report.push_str(&format!("Errored: {}\n", self.stats.errored));
        report.push_str(&format!(
            "Batches: {} ({} failed)\n",
            self.stats.batches, self.stats.failed_batches
        ));
        report.push_str(&format!("Re-routed: {}\n", self.stats.rerouted));
        report.push_str(&format!("Cache reuses: {}\n", self.stats.cache_reuses));
        report.push_str(&format!(
            "Fetches: {} / Evictions: {}\n",
            self.stats.fetches, self.stats.evictions
        ));
        report.push_str(&format!("Max resident: {}\n", self.stats.max_live));
        report.push_str(&format!("Elapsed: {}ms\n", self.stats.elapsed_ms));

        if !self.stats.per_method.is_empty() {
            let mut methods: Vec<_> = self.stats.per_method.iter().collect();
            methods.sort();
            report.push_str("\n--- Methods ---\n");
            for (method, count) in methods {
                report.push_str(&format!("{method:<24} {count}\n"));
            }
        }

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Everything the simulated collaborators will answer, decided from the seed
#[derive(Debug, Default)]
struct Script {
    /// URLs whose download fails
    broken_urls: HashSet<String>,
    /// Topics with a searchable dataset
    datasets: HashSet<&'static str>,
    fact_checks: HashMap<String, FactCheckVerdict>,
    fact_check_errors: HashSet<String>,
    plausibility: HashMap<String, PlausibilityVerdict>,
    checks: HashMap<String, bool>,
    quotes: HashMap<String, bool>,
    fetch_delay_ms: HashMap<String, u64>,
}

/// Generated claims and the script behind them
struct Scenario {
    claims: Vec<Claim>,
    script: Script,
}

fn generate_scenario(config: &SimulatorConfig) -> Scenario {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut script = Script::default();

    for topic in TOPICS {
        if rng.gen_bool(0.7) {
            script.datasets.insert(topic);
        }
    }

    let key_pool = (config.claims / 3).max(1);
    let mut key_urls: HashMap<usize, Option<String>> = HashMap::new();
    let mut claims = Vec::with_capacity(config.claims);

    for i in 0..config.claims {
        let topic = TOPICS[rng.gen_range(0..TOPICS.len())];
        let kind = if rng.gen_bool(config.quantitative_share.clamp(0.0, 1.0)) {
            ClaimKind::Quantitative
        } else {
            ClaimKind::Qualitative
        };
        let text = match kind {
            ClaimKind::Quantitative => {
                format!("Claim {i}: {topic} changed by {}%", rng.gen_range(1..40))
            }
            ClaimKind::Qualitative => format!("Claim {i}: the {topic} report describes a shift"),
        };

        script.checks.insert(text.clone(), rng.gen_bool(0.6));
        script.quotes.insert(text.clone(), rng.gen_bool(0.6));

        if rng.gen_bool(config.failure_rate.clamp(0.0, 1.0) / 2.0) {
            script.fact_check_errors.insert(text.clone());
        } else if rng.gen_bool(0.25) {
            let rating = RATINGS[rng.gen_range(0..RATINGS.len())];
            let confidence = rng.gen_range(0.5..1.0);
            script.fact_checks.insert(
                text.clone(),
                FactCheckVerdict::hit(rating, confidence, vec![format!("https://factcheck.sim/{i}")]),
            );
        }
        script.plausibility.insert(
            text.clone(),
            PlausibilityVerdict {
                plausible: rng.gen_bool(0.5),
                confidence: rng.gen_range(0.0..1.0),
                reasoning: format!("simulated judgement for claim {i}"),
            },
        );

        let mut claim = Claim::new(format!("claim-{i}"), text, kind);
        if rng.gen_bool(config.cited_share.clamp(0.0, 1.0)) {
            let key = rng.gen_range(0..key_pool);
            let url = key_urls
                .entry(key)
                .or_insert_with(|| rng.gen_bool(0.9).then(|| format!("https://sources.sim/ref{key}")))
                .clone();
            claim = claim.with_citation_key(format!("ref{key}")).as_original();
            if let Some(url) = url {
                claim = claim.with_citation(CitationDetails::new(format!("Source {key}")).with_url(url));
            }
        }
        claims.push(claim);
    }

    let mut urls: Vec<String> = key_urls
        .into_values()
        .flatten()
        .chain(TOPICS.iter().map(|t| dataset_url(t)))
        .collect();
    urls.sort();
    for url in urls {
        if rng.gen_bool(config.failure_rate.clamp(0.0, 1.0)) {
            script.broken_urls.insert(url.clone());
        }
        let delay = rng.gen_range(0..=config.max_fetch_delay_ms);
        script.fetch_delay_ms.insert(url, delay);
    }

    Scenario { claims, script }
}

fn dataset_url(topic: &str) -> String {
    format!("https://data.sim/{topic}.csv")
}

fn topic_of(text: &str) -> Option<&'static str> {
    TOPICS.iter().copied().find(|t| text.contains(t))
}

/// Simulated world shared by every collaborator
struct SimWorld {
    script: Script,
    live: AtomicUsize,
    max_live: AtomicUsize,
    fetches: AtomicU64,
    evictions: AtomicU64,
    resident: Mutex<HashSet<String>>,
}

impl SimWorld {
    fn new(script: Script) -> Self {
        Self {
            script,
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            fetches: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            resident: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl SourceClient for SimWorld {
    async fn search(
        &self,
        claim_text: &str,
        _modality: Modality,
    ) -> Result<Vec<SourceCandidate>, AcquisitionError> {
        let candidates = topic_of(claim_text)
            .filter(|t| self.script.datasets.contains(t))
            .map(|topic| {
                let descriptor = SourceDescriptor::new(format!("dataset-{topic}"), dataset_url(topic), "dataset")
                    .with_title(format!("{topic} series"));
                SourceCandidate::new(descriptor, 0.8)
            })
            .into_iter()
            .collect();
        Ok(candidates)
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        modality: Modality,
    ) -> Result<ResidentHandle, AcquisitionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.fetch_delay_ms.get(&descriptor.url).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.script.broken_urls.contains(&descriptor.url) {
            return Err(AcquisitionError::Network(format!("503 from {}", descriptor.url)));
        }

        let id = format!("{}-{}", descriptor.source_id, Uuid::new_v4().simple());
        let handle = match modality {
            Modality::Dataset => ResidentHandle::dataset(
                id.clone(),
                descriptor.clone(),
                format!("/sim/{}.csv", descriptor.source_id),
                DatasetSchema::new("csv", vec!["year".into(), "value".into()]),
            ),
            Modality::Text => {
                let topic = topic_of(&descriptor.url).unwrap_or("general");
                ResidentHandle::text(
                    id.clone(),
                    descriptor.clone(),
                    format!(
                        "The {topic} report was published this year. It describes a shift in recent figures. \
                         Analysts noted the change was larger than expected. Further revisions are planned."
                    ),
                )
            }
        };

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.resident.lock().insert(id);
        Ok(handle)
    }

    async fn evict(&self, handle: &ResidentHandle) -> Result<(), AcquisitionError> {
        if self.resident.lock().remove(&handle.id) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.evictions.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ApplicabilityOracle for SimWorld {
    async fn assess(
        &self,
        claim_text: &str,
        source: &SourceDescriptor,
    ) -> Result<Applicability, OracleError> {
        let same_topic = topic_of(claim_text)
            .is_some_and(|t| source.source_id.strip_prefix("dataset-") == Some(t));
        Ok(if same_topic {
            Applicability::new(true, 0.9)
        } else {
            Applicability::new(false, 0.1)
        })
    }
}

#[async_trait]
impl CodeSynthesisOracle for SimWorld {
    async fn synthesize_check(
        &self,
        claim_text: &str,
        schema: &DatasetSchema,
    ) -> Result<ExecutableCheck, OracleError> {
        Ok(ExecutableCheck::new(
            "python",
            format!("# {}\n# {claim_text}", schema.describe()),
        ))
    }
}

#[async_trait]
impl Sandbox for SimWorld {
    async fn run(
        &self,
        check: &ExecutableCheck,
        _dataset: &ResidentHandle,
        _timeout: Duration,
    ) -> Result<CheckOutput, SandboxError> {
        let claim_text = check.source.lines().last().unwrap_or_default().trim_start_matches("# ");
        let passed = self.script.checks.get(claim_text).copied().unwrap_or(false);
        Ok(CheckOutput {
            passed,
            confidence: if passed { 0.85 } else { 0.7 },
            explanation: format!("simulated check {}", if passed { "held" } else { "did not hold" }),
        })
    }
}

#[async_trait]
impl FactCheckOracle for SimWorld {
    async fn lookup(&self, claim_text: &str) -> Result<FactCheckVerdict, OracleError> {
        if self.script.fact_check_errors.contains(claim_text) {
            return Err(OracleError::Unavailable("simulated fact-check outage".into()));
        }
        Ok(self
            .script
            .fact_checks
            .get(claim_text)
            .cloned()
            .unwrap_or_else(FactCheckVerdict::not_found))
    }
}

#[async_trait]
impl PlausibilityOracle for SimWorld {
    async fn assess(&self, claim_text: &str) -> Result<PlausibilityVerdict, OracleError> {
        self.script
            .plausibility
            .get(claim_text)
            .cloned()
            .ok_or_else(|| OracleError::Malformed("claim was not scripted".into()))
    }
}

#[async_trait]
impl QuoteVerificationOracle for SimWorld {
    async fn verify(
        &self,
        claim_text: &str,
        chunks: &[EvidenceChunk],
    ) -> Result<QuoteVerdict, OracleError> {
        let supported = !chunks.is_empty() && self.script.quotes.get(claim_text).copied().unwrap_or(false);
        let quotes = chunks
            .first()
            .filter(|_| supported)
            .map(|c| c.text.split_whitespace().take(5).collect::<Vec<_>>().join(" "))
            .into_iter()
            .collect();
        Ok(QuoteVerdict {
            supported,
            confidence: if supported { 0.8 } else { 0.4 },
            quotes,
            reasoning: "simulated quote verification".into(),
        })
    }
}

fn collaborators(world: &Arc<SimWorld>) -> Collaborators {
    Collaborators {
        sources: Arc::clone(world) as Arc<dyn SourceClient>,
        applicability: Arc::clone(world) as Arc<dyn ApplicabilityOracle>,
        synthesis: Arc::clone(world) as Arc<dyn CodeSynthesisOracle>,
        sandbox: Arc::clone(world) as Arc<dyn Sandbox>,
        fact_check: Arc::clone(world) as Arc<dyn FactCheckOracle>,
        plausibility: Arc::clone(world) as Arc<dyn PlausibilityOracle>,
        quotes: Arc::clone(world) as Arc<dyn QuoteVerificationOracle>,
    }
}

/// Run the simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let Scenario { claims, script } = generate_scenario(&config);
    let world = Arc::new(SimWorld::new(script));
    let start = Instant::now();

    info!(seed = config.seed, claims = claims.len(), "simulation starting");

    let outcome = match ClaimRouter::new(collaborators(&world), config.validation.clone()) {
        Ok(router) => router.run(claims.clone()).await,
        Err(e) => Err(e),
    };

    let mut stats = SimulatorStats {
        claims: claims.len(),
        fetches: world.fetches.load(Ordering::SeqCst),
        evictions: world.evictions.load(Ordering::SeqCst),
        max_live: world.max_live.load(Ordering::SeqCst),
        elapsed_ms: start.elapsed().as_millis(),
        ..SimulatorStats::default()
    };

    let mut violations = Vec::new();
    match outcome {
        Ok(report) => {
            record_stats(&mut stats, &report);
            violations.extend(check_conservation(&claims, &report.results));
            violations.extend(check_batches(&report, &claims, &world.script));
        }
        Err(e) => violations.push(Violation::RunAborted {
            reason: e.to_string(),
        }),
    }

    if stats.max_live > 1 {
        violations.push(Violation::ResidentBoundExceeded {
            max_live: stats.max_live,
        });
    }
    let live = world.live.load(Ordering::SeqCst);
    if live != 0 {
        violations.push(Violation::ResidentLeaked { live });
    }

    info!(violations = violations.len(), "simulation finished");

    SimulatorReport {
        config,
        stats,
        violations,
    }
}

fn record_stats(stats: &mut SimulatorStats, report: &RunReport) {
    let summary = report.summary();
    stats.passed = summary.passed;
    stats.failed = summary.failed;
    stats.errored = summary.errored;
    stats.rerouted = summary.synthetic_citations;
    stats.batches = report.batches.len();
    stats.failed_batches = report.failed_batches().count();
    stats.cache_reuses = report.evidence.iter().map(|e| u64::from(e.reuse_count)).sum();
    stats.per_method = summary
        .methods
        .iter()
        .map(|(m, n)| (m.as_str().to_string(), *n))
        .collect();
}

/// Exactly one result per claim
fn check_conservation(claims: &[Claim], results: &[ValidationResult]) -> Vec<Violation> {
    let mut violations = Vec::new();
    if claims.len() != results.len() {
        violations.push(Violation::ResultCountMismatch {
            claims: claims.len(),
            results: results.len(),
        });
    }

    let mut seen: HashSet<&ClaimId> = HashSet::new();
    for r in results {
        if !seen.insert(&r.claim_id) {
            violations.push(Violation::DuplicatedClaim {
                claim_id: r.claim_id.clone(),
            });
        }
    }
    for c in claims {
        if !seen.contains(&c.id) {
            violations.push(Violation::LostClaim {
                claim_id: c.id.clone(),
            });
        }
    }
    violations
}

/// Every batch is all-failed with one reason, or all verified on one source
fn check_batches(report: &RunReport, claims: &[Claim], script: &Script) -> Vec<Violation> {
    let by_id: HashMap<&ClaimId, &ValidationResult> =
        report.results.iter().map(|r| (&r.claim_id, r)).collect();
    let mut violations = Vec::new();

    for batch in &report.batches {
        let key = batch.citation_key.as_str().to_string();
        if batch.download_ok && script.broken_urls.contains(&batch_url(batch, claims)) {
            violations.push(Violation::UnexpectedOutcome {
                citation_key: key.clone(),
                details: "download of a broken source succeeded".to_string(),
            });
        }

        let results: Vec<&ValidationResult> = batch
            .claim_ids
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();

        match (&batch.resident_handle, batch.download_ok) {
            (Some(handle), true) => {
                for r in &results {
                    if r.sources_used.is_empty() || !r.sources_used.iter().all(|s| s.starts_with(handle.as_str())) {
                        violations.push(Violation::BatchNotAtomic {
                            citation_key: key.clone(),
                            details: format!("{} not verified against {handle}", r.claim_id),
                        });
                    }
                }
            }
            _ => {
                let reasons: HashSet<Option<&str>> = results.iter().map(|r| r.error.as_deref()).collect();
                if results.iter().any(|r| r.passed || r.method != ValidationMethod::BatchFailed)
                    || reasons.len() > 1
                    || reasons.contains(&None)
                {
                    violations.push(Violation::BatchNotAtomic {
                        citation_key: key.clone(),
                        details: format!("failed batch has mixed outcomes: {reasons:?}"),
                    });
                }
            }
        }
    }

    violations
}

/// URL the batch was fetched from
fn batch_url(batch: &BatchRecord, claims: &[Claim]) -> String {
    if let Some(source_id) = batch
        .citation_key
        .as_str()
        .strip_prefix(CitationKey::SYNTHETIC_PREFIX)
    {
        return source_id
            .strip_prefix("dataset-")
            .map(dataset_url)
            .unwrap_or_default();
    }
    claims
        .iter()
        .filter(|c| batch.claim_ids.contains(&c.id))
        .find_map(|c| c.citation.as_ref().and_then(CitationDetails::locator))
        .unwrap_or_default()
}
