//! Physics modules for the Torus driver.
//!
//! Each module owns its per-block state and a halo-exchange endpoint,
//! reads its parameters from its own input block, and contributes a
//! chain of operators to the shared task collections through an
//! `assemble_tasks` function that returns a handle struct of public
//! task ids. Cross-module coupling happens through those ids: a
//! diffusion operator wires itself between its host's flux and update
//! tasks, and the two-fluid module assembles the combined list for both
//! of its fluids itself.
//!
//! The numerical kernels are deliberately minimal 1-D stand-ins; the
//! point of this crate is the task-chain shapes and the coupling
//! patterns, not the hydrodynamics.

#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::TaskStatus;
use torus_task::{StageContext, TaskFn};

pub mod hydro;
pub mod ion_neutral;
pub mod mhd;
pub mod viscosity;
pub mod wave_field;

pub use hydro::{Hydro, HydroTaskIds};
pub use ion_neutral::{IonNeutral, IonNeutralTaskIds};
pub use mhd::{Mhd, MhdTaskIds};
pub use viscosity::{ViscosityTaskIds, Viscosity, ViscousHost};
pub use wave_field::{WaveField, WaveFieldTaskIds};

/// Wrap a module method as a boxed operator capturing the module handle.
///
/// Every operator in this crate is an inherent method with the shape
/// `fn(&mut M, &StageContext<'_>) -> TaskStatus`; the returned closure
/// borrows the cell only for the duration of one invocation.
pub(crate) fn module_op<M: 'static>(
    this: &Rc<RefCell<M>>,
    f: fn(&mut M, &StageContext<'_>) -> TaskStatus,
) -> TaskFn {
    let this = Rc::clone(this);
    Box::new(move |ctx| f(&mut this.borrow_mut(), ctx))
}
