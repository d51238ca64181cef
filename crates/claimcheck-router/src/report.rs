//! Run reports
//!
//! The report stores results (input order) and batch records. Lane
//! groupings and the summary are derived on demand, never stored.

use chrono::{DateTime, Utc};
use claimcheck_core::{BatchRecord, EvidenceSource, Lane, ValidationMethod, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use ulid::Ulid;

/// Summary file written next to the lane files
pub const SUMMARY_FILE: &str = "summary.json";

/// Failure writing or reading lane files
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Filesystem access failed for `path`
    #[error("report I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Lane file contents could not be (de)serialized
    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Ulid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One per input claim, in input order
    pub results: Vec<ValidationResult>,
    pub batches: Vec<BatchRecord>,
    /// Dataset sources registered during the run
    pub evidence: Vec<EvidenceSource>,
}

/// Pass/fail counts for one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Aggregate counts over a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failed with an error attached (timeouts, batch failures, oracle errors)
    pub errored: usize,
    pub synthetic_citations: usize,
    pub lanes: BTreeMap<Lane, LaneSummary>,
    pub methods: BTreeMap<ValidationMethod, usize>,
}

impl RunSummary {
    #[must_use]
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ValidationResult>) -> Self {
        let mut summary = Self {
            lanes: Lane::ALL.iter().map(|l| (*l, LaneSummary::default())).collect(),
            ..Self::default()
        };
        for r in results {
            summary.total += 1;
            let lane = summary.lanes.entry(r.lane).or_default();
            lane.total += 1;
            if r.passed {
                summary.passed += 1;
                lane.passed += 1;
            } else {
                summary.failed += 1;
                lane.failed += 1;
            }
            if r.is_error() {
                summary.errored += 1;
            }
            if r.synthetic_citation {
                summary.synthetic_citations += 1;
            }
            *summary.methods.entry(r.method).or_insert(0) += 1;
        }
        summary
    }

    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }

    /// Human-readable rendering
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        out.push_str("=== ClaimCheck Summary ===\n\n");
        out.push_str(&format!("Claims:  {}\n", self.total));
        out.push_str(&format!("Passed:  {} ({:.1}%)\n", self.passed, self.pass_rate() * 100.0));
        out.push_str(&format!("Failed:  {}\n", self.failed));
        out.push_str(&format!("Errored: {}\n", self.errored));
        out.push_str(&format!("Synthetic citations: {}\n", self.synthetic_citations));

        out.push_str("\n--- Lanes ---\n");
        for (lane, s) in &self.lanes {
            out.push_str(&format!(
                "{:<14} total {:>4}  passed {:>4}  failed {:>4}\n",
                lane.as_str(),
                s.total,
                s.passed,
                s.failed
            ));
        }

        if !self.methods.is_empty() {
            out.push_str("\n--- Methods ---\n");
            for (method, count) in &self.methods {
                out.push_str(&format!("{:<24} {count}\n", method.as_str()));
            }
        }
        out
    }
}

impl RunReport {
    /// Results grouped by terminal lane, lanes in processing order
    #[must_use]
    pub fn by_lane(&self) -> BTreeMap<Lane, Vec<&ValidationResult>> {
        let mut lanes: BTreeMap<Lane, Vec<&ValidationResult>> =
            Lane::ALL.iter().map(|l| (*l, Vec::new())).collect();
        for r in &self.results {
            lanes.entry(r.lane).or_default().push(r);
        }
        lanes
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    #[must_use]
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchRecord> {
        self.batches.iter().filter(|b| !b.download_ok)
    }

    /// Write `<lane>_results.json` for every lane plus `summary.json`
    pub async fn write_lane_files(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ReportError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ReportError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut written = Vec::with_capacity(Lane::ALL.len() + 1);
        for (lane, results) in self.by_lane() {
            let path = lane_file(dir, lane);
            write_json(&path, &results).await?;
            written.push(path);
        }

        let path = dir.join(SUMMARY_FILE);
        write_json(&path, &self.summary()).await?;
        written.push(path);

        info!(dir = %dir.display(), files = written.len(), "lane files written");
        Ok(written)
    }
}

#[must_use]
pub fn lane_file(dir: &Path, lane: Lane) -> PathBuf {
    dir.join(format!("{}_results.json", lane.as_str()))
}

/// Read back every lane file present in `dir`, lanes in processing order
pub async fn read_lane_files(dir: impl AsRef<Path>) -> Result<Vec<ValidationResult>, ReportError> {
    let dir = dir.as_ref();
    let mut results = Vec::new();
    for lane in Lane::ALL {
        let path = lane_file(dir, lane);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(ReportError::Io { path, source }),
        };
        let lane_results: Vec<ValidationResult> = serde_json::from_slice(&raw)?;
        results.extend(lane_results);
    }
    Ok(results)
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ReportError> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
}
