//! Variable metadata and recorded data series.
//!
//! A [`Variable`] describes one quantity of the simulated model: its role,
//! the reference the simulation backend uses to read/write it, its scalar
//! noise covariance, an initial value, and optional hard bounds. Variables
//! are built once at setup time and are read-only during filtering.

use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Role of a variable inside the simulated model.
///
/// Roles are fixed at construction; the estimator resolves every variable it
/// needs at setup time instead of looking names up per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableRole {
    /// Exogenous input fed to the simulation backend.
    Input,
    /// Model output; may be measured (used in the correction step) or purely
    /// diagnostic.
    Output,
    /// Internal state estimated by the filter.
    State,
    /// Model parameter, estimated jointly when augmented mode is enabled.
    Parameter,
}

/// Optional hard bounds with per-side activation flags.
///
/// A bound only constrains the filter when its flag is set; an inactive
/// bound is informational.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub constrain_low: bool,
    pub constrain_high: bool,
}

impl Bounds {
    /// Project a value onto the active constraints.
    pub fn apply(&self, value: f64) -> f64 {
        let mut v = value;
        if self.constrain_low {
            if let Some(min) = self.min {
                v = v.max(min);
            }
        }
        if self.constrain_high {
            if let Some(max) = self.max {
                v = v.min(max);
            }
        }
        v
    }
}

/// One model variable plus its estimation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    role: VariableRole,
    /// Reference used by the simulation backend to address this variable.
    value_reference: usize,
    /// Scalar process or measurement noise covariance, strictly positive.
    covariance: f64,
    initial_value: f64,
    bounds: Bounds,
    /// For outputs: whether real measurement data exists for this variable
    /// and is used in the correction step.
    measured: bool,
}

impl Variable {
    /// Create a variable with unit covariance and zero initial value.
    pub fn new(name: impl Into<String>, role: VariableRole, value_reference: usize) -> Self {
        Variable {
            name: name.into(),
            role,
            value_reference,
            covariance: 1.0,
            initial_value: 0.0,
            bounds: Bounds::default(),
            measured: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> VariableRole {
        self.role
    }

    pub fn value_reference(&self) -> usize {
        self.value_reference
    }

    pub fn covariance(&self) -> f64 {
        self.covariance
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn is_measured(&self) -> bool {
        self.measured
    }

    /// Set the noise covariance; must be strictly positive.
    pub fn with_covariance(mut self, covariance: f64) -> Result<Self, EstimatorError> {
        if !(covariance > 0.0) {
            return Err(EstimatorError::Config(format!(
                "covariance of variable '{}' must be positive, got {covariance}",
                self.name
            )));
        }
        self.covariance = covariance;
        Ok(self)
    }

    pub fn with_initial_value(mut self, value: f64) -> Self {
        self.initial_value = value;
        self
    }

    /// Set a lower bound and activate it as a hard constraint.
    pub fn with_lower_bound(mut self, min: f64) -> Self {
        self.bounds.min = Some(min);
        self.bounds.constrain_low = true;
        self
    }

    /// Set an upper bound and activate it as a hard constraint.
    pub fn with_upper_bound(mut self, max: f64) -> Self {
        self.bounds.max = Some(max);
        self.bounds.constrain_high = true;
        self
    }

    /// Flag an output as measured (used in the correction step).
    pub fn as_measured(mut self) -> Self {
        self.measured = true;
        self
    }
}

/// An ordered sequence of (time, value) samples for one variable.
///
/// Invariants checked at load time, never during filtering: equal lengths,
/// time non-decreasing, at least two samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSeries {
    time: Vec<f64>,
    values: Vec<f64>,
}

impl DataSeries {
    pub fn new(time: Vec<f64>, values: Vec<f64>) -> Result<Self, EstimatorError> {
        if time.len() != values.len() {
            return Err(EstimatorError::Config(format!(
                "data series length mismatch: {} time stamps vs {} values",
                time.len(),
                values.len()
            )));
        }
        if time.len() < 2 {
            return Err(EstimatorError::Config(format!(
                "data series needs at least 2 samples, got {}",
                time.len()
            )));
        }
        if time.windows(2).any(|w| w[1] < w[0]) {
            return Err(EstimatorError::Config(
                "data series time stamps must be non-decreasing".into(),
            ));
        }
        Ok(DataSeries { time, values })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_time(&self) -> f64 {
        self.time[0]
    }

    pub fn last_time(&self) -> f64 {
        self.time[self.time.len() - 1]
    }
}
