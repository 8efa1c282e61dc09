//! Task-graph scheduler for the Torus multi-physics driver.
//!
//! Physics modules append operators ([`Task`]s) into three shared phase
//! lists ([`TaskCollections`]) at setup. Each task names its dependencies
//! as a set of previously registered [`TaskId`](torus_core::TaskId)s;
//! the list execution engine ([`TaskList::run_available`]) repeatedly
//! scans a list and invokes every task whose dependency set is covered
//! by the completion mask, until the list reports complete. Non-blocking
//! communication operators report
//! [`Incomplete`](torus_core::TaskStatus::Incomplete) and are polled on
//! later passes rather than blocking the control thread.

#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod collections;
pub mod context;
pub mod list;
pub mod task;

pub use collections::{AssemblyError, TaskCollections, TaskPhase, TaskRegistry};
pub use torus_core::TaskId;
pub use context::StageContext;
pub use list::{PassOutcome, StuckTask, TaskError, TaskList};
pub use task::{Task, TaskFn};
