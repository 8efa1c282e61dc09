//! Torus: a multi-physics time-integration driver built on a task-graph
//! scheduler.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Torus sub-crates. For most users, adding `torus` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use torus::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // A single advected fluid over four 1-D mesh blocks.
//! let pin = ParameterInput::new();
//! let pack = MeshBlockPack { nmb: 4, nx: 16, ng: 2, dx: 1.0 / 64.0 };
//! let hydro = Rc::new(RefCell::new(
//!     Hydro::from_params("hydro", &pin, &pack).unwrap(),
//! ));
//! hydro.borrow_mut().set_profile(|x| 1.0 + 0.1 * x, |_| 0.0);
//!
//! // Each module contributes its operator chain to the shared task
//! // collections; the driver schedules them per stage.
//! let mut tasks = TaskCollections::new();
//! torus::physics::hydro::assemble_tasks(&hydro, &mut tasks).unwrap();
//!
//! let config = DriverConfig {
//!     integrator: "rk2".to_string(),
//!     tlim: 0.05,
//!     nlim: Some(10),
//!     cfl: 0.4,
//!     max_stage_passes: None,
//! };
//! let module: Rc<RefCell<dyn PhysicsModule>> = hydro.clone();
//! let mut driver = Driver::new(config, tasks, vec![module]).unwrap();
//! let summary = driver.execute().unwrap();
//! assert!(summary.ncycle > 0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `torus-core` | Task ids, statuses, integrators, parameters |
//! | [`task`] | `torus-task` | Task lists, collections, graph validation |
//! | [`driver`] | `torus-driver` | The stage loop, timestep control, metrics |
//! | [`mesh`] | `torus-mesh` | Mesh-block packs and halo exchange |
//! | [`physics`] | `torus-physics` | The fluid, field, and coupling modules |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Task ids, statuses, integrator tables, and parameter input
/// (`torus-core`).
pub use torus_core as types;

/// Task registration, phase lists, and graph validation (`torus-task`).
///
/// [`task::TaskCollections`] is the assembly surface modules add their
/// operator chains to.
pub use torus_task as task;

/// The stage loop and timestep control (`torus-driver`).
///
/// [`driver::Driver`] owns the task collections and the registered
/// modules and advances the simulation to its time limit.
pub use torus_driver as driver;

/// Mesh-block packs and non-blocking halo exchange (`torus-mesh`).
pub use torus_mesh as mesh;

/// Physics modules (`torus-physics`).
///
/// [`physics::Hydro`], [`physics::Mhd`], [`physics::IonNeutral`],
/// [`physics::Viscosity`], and [`physics::WaveField`], each with an
/// `assemble_tasks` function and a public task-id handle.
pub use torus_physics as physics;

/// Common imports for typical Torus usage.
///
/// ```rust
/// use torus::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use torus_core::{
        ParameterInput, PhysicsModule, TaskId, TaskStatus, TimeIntegrator,
    };

    // Errors
    pub use torus_core::ParameterError;
    pub use torus_task::{AssemblyError, TaskError};

    // Task assembly
    pub use torus_task::{StageContext, TaskCollections, TaskPhase};

    // Driver
    pub use torus_driver::{
        Driver, DriverConfig, DriverError, DriverState, RunSummary, StepMetrics,
    };

    // Mesh
    pub use torus_mesh::{BlockField, FaceField, HaloExchange, MeshBlockPack};

    // Physics modules
    pub use torus_physics::{Hydro, IonNeutral, Mhd, Viscosity, WaveField};
}
