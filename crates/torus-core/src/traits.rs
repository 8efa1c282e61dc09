//! Core abstraction traits.

/// A physics module registered with the driver.
///
/// This is the only module-facing interface the driver itself consumes:
/// a name for diagnostics and the module's current stable-timestep
/// estimate. Everything else a module contributes flows through the task
/// lists at assembly time; the driver never inspects module state.
pub trait PhysicsModule {
    /// Module name for diagnostics (matches its parameter block name).
    fn name(&self) -> &str;

    /// The module's most recent stable-timestep estimate, before CFL
    /// scaling. Updated by the module's own `new_dt` task each stage.
    fn new_dt(&self) -> f64;
}
