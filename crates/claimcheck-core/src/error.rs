//! Error types for ClaimCheck
//!
//! Failures are split by blast radius:
//! - `AcquisitionError` fails a whole batch
//! - `SandboxError` and `OracleError` fail a single claim
//! - `RunError` aborts the whole run (upstream contract violations)
//!
//! Everything except `RunError` is converted into a `ValidationResult`
//! before it leaves a batch or lane.

use crate::model::ClaimId;
use std::time::Duration;

/// Source could not be acquired
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquisitionError {
    /// Citation carries nothing that can be fetched
    #[error("unresolvable citation: {0}")]
    Unresolvable(String),

    /// Transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Payload could not be parsed
    #[error("unsupported or malformed source: {0}")]
    Format(String),

    /// Source does not exist
    #[error("source not found: {0}")]
    NotFound(String),

    /// Search or download exceeded its bound
    #[error("acquisition timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Resident slot was shut down
    #[error("resident slot closed")]
    SlotClosed,
}

impl AcquisitionError {
    /// Timeout error for a bound
    #[inline]
    #[must_use]
    pub fn timeout(bound: Duration) -> Self {
        Self::Timeout {
            duration_secs: bound.as_secs(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// External judgement call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call failed: {0}")]
    Failed(String),

    #[error("malformed oracle response: {0}")]
    Malformed(String),

    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// Generated check could not produce a verdict
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// Exceeded the wall-clock bound
    #[error("timeout")]
    Timeout,

    /// Non-zero exit or uncaught exception
    #[error("check failed: {0}")]
    Runtime(String),

    /// Output did not match the `{passed, confidence, explanation}` record
    #[error("malformed check output: {0}")]
    MalformedOutput(String),

    /// Interpreter could not be started
    #[error("failed to start check: {0}")]
    Spawn(String),
}

impl SandboxError {
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Run-fatal errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Claim arrived without a kind
    #[error("claim {claim_id} has no kind")]
    MissingKind { claim_id: ClaimId },

    /// Claim arrived without an id
    #[error("claim at position {index} has an empty id")]
    EmptyClaimId { index: usize },

    /// Two claims share an id
    #[error("duplicate claim id: {claim_id}")]
    DuplicateClaimId { claim_id: ClaimId },

    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Output does not cover the input exactly once
    #[error("result set mismatch for claim {claim_id}: {reason}")]
    ResultMismatch { claim_id: ClaimId, reason: String },
}

impl RunError {
    /// Upstream component violated its contract
    #[inline]
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingKind { .. } | Self::EmptyClaimId { .. } | Self::DuplicateClaimId { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_timeout_display() {
        let err = AcquisitionError::timeout(Duration::from_secs(30));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "acquisition timed out after 30s");
    }

    #[test]
    fn sandbox_timeout_renders_as_bare_reason() {
        assert_eq!(SandboxError::Timeout.to_string(), "timeout");
        assert!(!SandboxError::Runtime("exit 1".into()).is_timeout());
    }

    #[test]
    fn contract_violations_are_classified() {
        assert!(RunError::MissingKind {
            claim_id: ClaimId::new("c1")
        }
        .is_contract_violation());
        assert!(RunError::DuplicateClaimId {
            claim_id: ClaimId::new("c1")
        }
        .is_contract_violation());
        assert!(!RunError::ResultMismatch {
            claim_id: ClaimId::new("c1"),
            reason: "missing".into()
        }
        .is_contract_violation());
    }
}
