//! ClaimCheck Core
//!
//! Shared vocabulary for the claim validation engine:
//! - Claims, lanes, evidence sources and validation results
//! - Collaborator contracts (source client, oracles, sandbox)
//! - Error taxonomy separating per-claim failures from run-fatal ones
//! - Run configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use claimcheck_core::{Claim, ClaimKind, Lane};
//!
//! let claim = Claim::new("c1", "Inflation rose 3%", ClaimKind::Quantitative)
//!     .with_citation_key("ref5");
//! assert_eq!(Lane::classify(&claim), Some(Lane::QuantCited));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod oracle;

pub use config::ValidationConfig;
pub use error::{AcquisitionError, ConfigError, OracleError, RunError, SandboxError};
pub use model::{
    BatchRecord, CitationDetails, CitationKey, Claim, ClaimId, ClaimKind, DatasetSchema,
    EvidenceSource, Lane, Modality, ResidentHandle, ResidentPayload, SourceCandidate,
    SourceDescriptor, ValidationMethod, ValidationResult,
};
pub use oracle::{
    Applicability, ApplicabilityOracle, CheckOutput, CodeSynthesisOracle, Collaborators,
    EvidenceChunk, ExecutableCheck, FactCheckOracle, FactCheckVerdict, PlausibilityOracle,
    PlausibilityVerdict, QuoteVerdict, QuoteVerificationOracle, RatingStance, Sandbox,
    SourceClient,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with ClaimCheck
    pub use crate::{
        Claim, ClaimId, ClaimKind, Collaborators, Lane, ValidationConfig, ValidationMethod,
        ValidationResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
