//! Stage and time-step driver loop for the Torus multi-physics framework.
//!
//! The [`Driver`] owns the assembled [`TaskCollections`](torus_task::TaskCollections)
//! and the outer time-step loop: per step, per stage, it drives the start,
//! run, and end lists to completion in that order, detects stalls, reduces
//! the next timestep over all registered physics modules, and records
//! per-step metrics.

#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod driver;
pub mod metrics;

pub use config::DriverConfig;
pub use driver::{Driver, DriverError, DriverState, RunSummary};
pub use metrics::StepMetrics;
