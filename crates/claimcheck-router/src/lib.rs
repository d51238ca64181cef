//! ClaimCheck Router
//!
//! Orchestration layer of the claim validation engine:
//! - `ClaimRouter` classifies claims into lanes and drives the two-phase run
//! - `BatchExecutor` verifies claims sharing a citation against one download
//! - `RunReport` holds the results in input order plus batch bookkeeping
//! - `simulator` exercises the whole pipeline against seeded collaborators
//!
//! # Example
//!
//! ```rust,ignore
//! use claimcheck_router::ClaimRouter;
//!
//! let router = ClaimRouter::new(collaborators, ValidationConfig::default())?;
//! let report = router.run(claims).await?;
//! report.write_lane_files("results").await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod batch;
pub mod report;
pub mod router;
pub mod simulator;

pub use batch::{group_by_citation, resolve_descriptor, BatchExecutor, BatchOutcome};
pub use report::{read_lane_files, LaneSummary, ReportError, RunReport, RunSummary};
pub use router::{CitedExecution, ClaimRouter, UncitedResolution};
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, SimulatorStats, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
