//! Joint state and parameter estimation for simulated dynamical systems.
//!
//! This crate couples an Unscented Kalman Filter to a black-box step-wise
//! simulation backend: given a process model exposed as an opaque
//! simulate-one-interval function and recorded input/output measurements,
//! it produces best estimates of unmeasured internal states and uncertain
//! parameters over time, with uncertainty bounds.
//!
//! Three tightly coupled pieces make up the core:
//!
//! - [`interpolation::TimeSeriesInterpolator`] aligns irregular measurement
//!   samples to the filter's integration grid;
//! - [`pool::SimulationPool`] evaluates batches of independent simulation
//!   runs concurrently with ordered results;
//! - [`filters::UnscentedKalmanEstimator`] orchestrates sigma-point
//!   generation, nonlinear propagation through the backend, the
//!   measurement update, and constraint enforcement.
//!
//! The simulation backend itself, model metadata loading, measurement file
//! parsing, and plotting are external collaborators; the backend is
//! consumed purely through the [`backend::SimulationStepper`] trait and
//! measurements through validated [`variables::DataSeries`] values.

pub mod backend;
pub mod error;
pub mod filters;
pub mod interpolation;
pub mod pool;
pub mod types;
pub mod variables;

pub use backend::{SimulationStepper, StepOutput};
pub use error::EstimatorError;
pub use filters::{FilterStep, FilterTrajectory, UkfSettings, UnscentedKalmanEstimator};
pub use interpolation::{Cursor, TimeSeriesInterpolator};
pub use pool::{SimulationPool, SimulationTask};
pub use variables::{Bounds, DataSeries, Variable, VariableRole};
