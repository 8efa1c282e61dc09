//! Per-step scheduling metrics.

/// Pass and invocation counts for a single time step, summed over stages.
///
/// Populated by the driver after each step; consumers read them from the
/// most recent step for telemetry or scheduling diagnostics. All
/// durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step, in microseconds.
    pub total_us: u64,
    /// Number of stages executed.
    pub stages: usize,
    /// Passes over the start list, summed over stages.
    pub start_passes: u64,
    /// Passes over the run list, summed over stages.
    pub run_passes: u64,
    /// Passes over the end list, summed over stages.
    pub end_passes: u64,
    /// Total operator invocations, including incomplete re-polls.
    pub operator_invocations: u64,
}
