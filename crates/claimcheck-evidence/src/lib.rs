//! ClaimCheck Evidence
//!
//! Evidence bookkeeping for a single run:
//! - `EvidenceCache`: reusable dataset sources, consulted through an applicability oracle
//! - `DatasetLocator`: cache first, then external search, then registration
//! - `ResidentSlot`: at most one downloaded source held at any instant

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod locator;
pub mod resident;

pub use cache::{CacheStats, EvidenceCache};
pub use locator::DatasetLocator;
pub use resident::{ResidentPermit, ResidentSlot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
