//! Contract for the external simulation backend.
//!
//! The estimation core never integrates the model itself; it consumes the
//! backend purely through [`SimulationStepper::step`]: apply an initial
//! state and parameter vector, simulate one interval, hand back the final
//! state and the named output series. Any simulation technology that can do
//! that can sit behind the filter.

use std::collections::HashMap;

use ndarray::Array1;

use crate::error::EstimatorError;

/// Result of simulating one interval.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// State vector at the end of the interval.
    pub final_state: Array1<f64>,
    /// Full time grid produced by the backend over `[t0, t1]`.
    pub time_grid: Vec<f64>,
    /// Named result series, one entry per grid point.
    pub outputs: HashMap<String, Vec<f64>>,
}

impl StepOutput {
    /// Value of a named output at the end of the interval.
    pub fn final_output(&self, name: &str) -> Option<f64> {
        self.outputs.get(name).and_then(|series| series.last().copied())
    }
}

/// One-interval simulation of the process model.
///
/// Implementations must be callable from multiple pool workers at once;
/// each invocation is fully independent (no shared mutable simulation
/// state). A failed invocation signals a simulation error for that
/// invocation only.
pub trait SimulationStepper: Send + Sync {
    fn step(
        &self,
        state: &Array1<f64>,
        parameters: &Array1<f64>,
        t0: f64,
        t1: f64,
    ) -> Result<StepOutput, EstimatorError>;
}
