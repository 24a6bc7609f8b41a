//! Filtering algorithms built on the simulation backend.

pub mod ukf;

pub use ukf::{FilterStep, FilterTrajectory, UkfSettings, UnscentedKalmanEstimator};
