//! Run configuration
//!
//! Loaded from TOML, every field defaulted, overridable through
//! `CLAIMCHECK_*` environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Policy constants and bounds for one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Applicability confidence needed to reuse a cached dataset
    pub reuse_threshold: f64,
    /// Plausibility confidence needed to end an uncited claim
    pub llm_confidence_threshold: f64,
    /// Fact-check confidence needed to end an uncited claim
    pub truth_table_threshold: f64,
    /// Wall-clock bound on one generated check
    pub check_timeout_secs: u64,
    /// Bound on one search or download call
    pub acquisition_timeout_secs: u64,
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Chunks handed to quote verification
    pub top_k: usize,
    /// Search candidates below this are ignored
    pub min_source_relevance: f64,
    /// TF-IDF vocabulary cap
    pub max_features: usize,
    /// Concurrent claim verifications inside one batch
    pub verify_concurrency: usize,
    /// Concurrent oracle calls in the uncited lanes
    pub oracle_concurrency: usize,
    /// Batches whose search/setup may overlap
    pub batch_concurrency: usize,
    /// Interpreter used by the process sandbox
    pub interpreter: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            reuse_threshold: 0.75,
            llm_confidence_threshold: 0.6,
            truth_table_threshold: 0.7,
            check_timeout_secs: 30,
            acquisition_timeout_secs: 30,
            chunk_size: 500,
            top_k: 3,
            min_source_relevance: 0.5,
            max_features: 1000,
            verify_concurrency: 4,
            oracle_concurrency: 4,
            batch_concurrency: 2,
            interpreter: "python3".to_string(),
        }
    }
}

impl ValidationConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Effective configuration: the file at `path` (or `fallback` when
    /// there is none), then `CLAIMCHECK_*` overrides from `lookup`, then
    /// validation.
    pub fn resolve<F>(path: Option<&Path>, fallback: Self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match path {
            Some(path) => Self::load(path)?,
            None => fallback,
        };
        let config = base.with_overrides_from(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    #[inline]
    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn with_reuse_threshold(mut self, threshold: f64) -> Self {
        self.reuse_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_llm_confidence_threshold(mut self, threshold: f64) -> Self {
        self.llm_confidence_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_truth_table_threshold(mut self, threshold: f64) -> Self {
        self.truth_table_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout_secs = timeout.as_secs();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout_secs = timeout.as_secs();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_size = chars;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_verify_concurrency(mut self, n: usize) -> Self {
        self.verify_concurrency = n;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_batch_concurrency(mut self, n: usize) -> Self {
        self.batch_concurrency = n;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Apply `CLAIMCHECK_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "CLAIMCHECK_REUSE_THRESHOLD", "reuse_threshold", &mut self.reuse_threshold)?;
        override_value(
            &lookup,
            "CLAIMCHECK_LLM_CONFIDENCE_THRESHOLD",
            "llm_confidence_threshold",
            &mut self.llm_confidence_threshold,
        )?;
        override_value(
            &lookup,
            "CLAIMCHECK_TRUTH_TABLE_THRESHOLD",
            "truth_table_threshold",
            &mut self.truth_table_threshold,
        )?;
        override_value(
            &lookup,
            "CLAIMCHECK_CHECK_TIMEOUT_SECS",
            "check_timeout_secs",
            &mut self.check_timeout_secs,
        )?;
        override_value(
            &lookup,
            "CLAIMCHECK_ACQUISITION_TIMEOUT_SECS",
            "acquisition_timeout_secs",
            &mut self.acquisition_timeout_secs,
        )?;
        if let Some(interpreter) = lookup("CLAIMCHECK_INTERPRETER") {
            self.interpreter = interpreter;
        }
        Ok(self)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("reuse_threshold", self.reuse_threshold),
            ("llm_confidence_threshold", self.llm_confidence_threshold),
            ("truth_table_threshold", self.truth_table_threshold),
            ("min_source_relevance", self.min_source_relevance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }

        for (field, value) in [
            ("check_timeout_secs", self.check_timeout_secs as usize),
            ("acquisition_timeout_secs", self.acquisition_timeout_secs as usize),
            ("chunk_size", self.chunk_size),
            ("top_k", self.top_k),
            ("max_features", self.max_features),
            ("verify_concurrency", self.verify_concurrency),
            ("oracle_concurrency", self.oracle_concurrency),
            ("batch_concurrency", self.batch_concurrency),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "interpreter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn override_value<F, T>(
    lookup: &F,
    key: &str,
    field: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            field,
            reason: format!("{key}={raw}: {e}"),
        })?;
        tracing::debug!(key, field, "config override applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ValidationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reuse_threshold, 0.75);
        assert_eq!(config.check_timeout(), Duration::from_secs(30));
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ValidationConfig::from_toml_str("top_k = 5\nreuse_threshold = 0.8\n").unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.reuse_threshold, 0.8);
        assert_eq!(config.chunk_size, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            ValidationConfig::from_toml_str("reuse_treshold = 0.8"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claimcheck.toml");
        let config = ValidationConfig::new().with_top_k(7).with_interpreter("python3.12");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(ValidationConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ValidationConfig::load("/nonexistent/claimcheck.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/claimcheck.toml"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad = ValidationConfig::new().with_reuse_threshold(1.2);
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Invalid { field: "reuse_threshold", .. })
        ));

        let bad = ValidationConfig::new().with_top_k(0);
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field: "top_k", .. })));

        let bad = ValidationConfig::new().with_check_timeout(Duration::ZERO);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let env: HashMap<&str, &str> = [
            ("CLAIMCHECK_REUSE_THRESHOLD", "0.9"),
            ("CLAIMCHECK_CHECK_TIMEOUT_SECS", "10"),
            ("CLAIMCHECK_INTERPRETER", "pypy3"),
        ]
        .into_iter()
        .collect();
        let config = ValidationConfig::new()
            .with_overrides_from(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.reuse_threshold, 0.9);
        assert_eq!(config.check_timeout_secs, 10);
        assert_eq!(config.interpreter, "pypy3");

        let err = ValidationConfig::new()
            .with_overrides_from(|k| (k == "CLAIMCHECK_TRUTH_TABLE_THRESHOLD").then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "truth_table_threshold", .. }));
    }

    #[test]
    fn resolve_applies_overrides_with_or_without_a_file() {
        let env = |k: &str| (k == "CLAIMCHECK_CHECK_TIMEOUT_SECS").then(|| "12".to_string());

        let fallback = ValidationConfig::new().with_batch_concurrency(4);
        let config = ValidationConfig::resolve(None, fallback, env).unwrap();
        assert_eq!(config.check_timeout_secs, 12);
        assert_eq!(config.batch_concurrency, 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claimcheck.toml");
        std::fs::write(&path, "top_k = 6\n").unwrap();
        let config = ValidationConfig::resolve(Some(path.as_path()), ValidationConfig::new(), env).unwrap();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.check_timeout_secs, 12);
    }

    #[test]
    fn resolve_rejects_overrides_that_fail_validation() {
        let err = ValidationConfig::resolve(None, ValidationConfig::new(), |k| {
            (k == "CLAIMCHECK_REUSE_THRESHOLD").then(|| "1.5".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "reuse_threshold", .. }));
    }
}
