//! The per-stage execution context handed to every operator.

use torus_core::TimeIntegrator;

/// Read-only view of the driver's stage state, passed to every operator
/// invocation.
///
/// This is the only call shape the scheduler ever invokes: operators see
/// the current stage index, the step's `dt` and simulation time, and the
/// integrator coefficient tables. They must be safe to call repeatedly
/// within one stage (a prior pass may have left them incomplete) and must
/// not assume any particular list-scan order.
pub struct StageContext<'a> {
    /// Current stage, 1-based.
    pub stage: usize,
    /// Timestep for the current step.
    pub dt: f64,
    /// Simulation time at the start of the current step.
    pub time: f64,
    /// Coefficient tables of the active integration scheme.
    pub integrator: &'a TimeIntegrator,
}
