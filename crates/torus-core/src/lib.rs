//! Core types and traits for the Torus multi-physics driver.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Torus workspace:
//! task identifiers and id sets, task status codes, time-integrator
//! coefficient tables, the parameter store, and core traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod integrator;
pub mod params;
pub mod status;
pub mod traits;

pub use error::ParameterError;
pub use id::{TaskId, TaskIdSet, TaskIdSetIter};
pub use integrator::TimeIntegrator;
pub use params::ParameterInput;
pub use status::TaskStatus;
pub use traits::PhysicsModule;
