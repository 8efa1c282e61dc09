//! Driver configuration, read from the `<time>` parameter block.

use torus_core::{ParameterError, ParameterInput};

/// Configuration for the [`Driver`](crate::Driver).
///
/// Mirrors the `<time>` block of the parameter input. `max_stage_passes`
/// is the retry-ceiling policy for pollable-but-stuck stages: stall
/// detection (a pass with zero completions and zero invocations) is
/// always on, while the ceiling additionally bounds stages where pending
/// receives are polled forever without arriving. `None` means unbounded.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Integration scheme name (`rk1`, `rk2`, `rk3`, `imex2`, `imex2+`).
    pub integrator: String,
    /// Simulation time limit.
    pub tlim: f64,
    /// Step-count limit; `None` means limited by `tlim` only.
    pub nlim: Option<u64>,
    /// CFL safety factor applied to the module timestep reduction.
    pub cfl: f64,
    /// Optional ceiling on passes per list per stage.
    pub max_stage_passes: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            integrator: "rk2".to_string(),
            tlim: 1.0,
            nlim: None,
            cfl: 0.4,
            max_stage_passes: None,
        }
    }
}

impl DriverConfig {
    /// Read the `<time>` block. Absent keys fall back to the defaults;
    /// `nlim < 0` and `max_stage_passes = 0` mean unbounded.
    pub fn from_params(pin: &ParameterInput) -> Result<Self, ParameterError> {
        let defaults = Self::default();
        let nlim = pin.get_int_or("time", "nlim", -1)?;
        let max_passes = pin.get_int_or("time", "max_stage_passes", 0)?;
        Ok(Self {
            integrator: pin.get_str_or("time", "integrator", &defaults.integrator).to_string(),
            tlim: pin.get_real_or("time", "tlim", defaults.tlim)?,
            nlim: u64::try_from(nlim).ok(),
            cfl: pin.get_real_or("time", "cfl_number", defaults.cfl)?,
            max_stage_passes: u64::try_from(max_passes).ok().filter(|&p| p > 0),
        })
    }
}
