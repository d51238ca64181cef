//! ClaimCheck Verify
//!
//! The two per-claim verification strategies:
//! - `QuantitativeVerifier`: synthesize a check, run it against the resident dataset under a hard timeout
//! - `QualitativeVerifier`: chunk the resident text, retrieve the top-K chunks, ask for supporting quotes
//!
//! Both are pure functions of `(claim, resident source)` and always
//! return a `ValidationResult`; failures never escape as errors.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod chunking;
pub mod qualitative;
pub mod quantitative;
pub mod retrieval;
pub mod sandbox;

pub use chunking::{chunk_text, split_sentences};
pub use qualitative::QualitativeVerifier;
pub use quantitative::QuantitativeVerifier;
pub use retrieval::{retrieve_top_k, RetrievalDegradation, ScoredChunk, TfIdfIndex};
pub use sandbox::ProcessSandbox;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
