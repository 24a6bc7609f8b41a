//! Unscented Kalman Filter over a black-box simulation backend.
//!
//! The filter estimates internal states (and optionally parameters, in
//! augmented mode) of a simulated model from recorded measurement series.
//! Instead of linearizing the model it propagates 2L+1 sigma points through
//! the backend's step function and recovers mean and covariance from the
//! weighted ensemble.
//!
//! # Sigma Point Selection
//!
//! Symmetric Merwe-scaled selection:
//! - χ₀ = μ (mean)
//! - χᵢ = μ + √(L+λ)·Sᵢ for i = 1...L
//! - χᵢ₊L = μ - √(L+λ)·Sᵢ for i = 1...L
//!
//! where λ = α²(L+κ) - L and S is the covariance square-root (`P = S·Sᵀ`),
//! which is carried across steps instead of the raw covariance to preserve
//! positive-semi-definiteness under round-off.
//!
//! Within one step the sigma-point propagations are independent and are
//! dispatched through [`SimulationPool`] when more than one worker is
//! configured; steps themselves are strictly sequential.

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::backend::SimulationStepper;
use crate::error::EstimatorError;
use crate::interpolation::{Cursor, TimeSeriesInterpolator};
use crate::pool::{SimulationPool, SimulationTask};
use crate::types::linalg;
use crate::variables::{DataSeries, Variable, VariableRole};

/// Unscented transform and run parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UkfSettings {
    /// Spread of sigma points, typically 1e-4 ≤ α ≤ 1.
    pub alpha: f64,
    /// Prior knowledge of the distribution (2.0 for Gaussian).
    pub beta: f64,
    /// Secondary scaling (0.0 or 3-L).
    pub kappa: f64,
    /// Estimate parameters jointly with states.
    pub augmented: bool,
    /// Filter step size in model time.
    pub step_size: f64,
    /// Sigma-point propagation workers; 1 runs sequentially in the caller.
    pub workers: usize,
}

impl Default for UkfSettings {
    fn default() -> Self {
        UkfSettings {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
            augmented: false,
            step_size: 0.1,
            workers: 1,
        }
    }
}

/// One filter step of the accumulated trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStep {
    pub time: f64,
    /// Posterior mean of the (augmented) state vector.
    pub state_mean: Array1<f64>,
    /// Lower-triangular square-root of the posterior covariance.
    pub sqrt_covariance: Array2<f64>,
    /// Predicted mean of the measured outputs.
    pub output_mean: Array1<f64>,
    /// Square-root of the measured-output covariance (noise included).
    pub output_sqrt_covariance: Array2<f64>,
    /// Full unreduced predicted output vector, diagnostic outputs included.
    pub full_output: Array1<f64>,
}

/// Accumulated outputs of one estimation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterTrajectory {
    pub steps: Vec<FilterStep>,
}

impl FilterTrajectory {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&FilterStep> {
        self.steps.last()
    }

    pub fn times(&self) -> Vec<f64> {
        self.steps.iter().map(|step| step.time).collect()
    }

    /// Time series of one component of the estimated mean.
    pub fn state_component(&self, index: usize) -> Vec<f64> {
        self.steps
            .iter()
            .map(|step| step.state_mean[index])
            .collect()
    }
}

/// An output variable plus its measurement data and scan cursor.
struct OutputChannel {
    variable: Variable,
    interpolator: Option<TimeSeriesInterpolator>,
    cursor: Cursor,
}

/// Joint state/parameter estimator coupling the unscented transform to the
/// simulation backend.
pub struct UnscentedKalmanEstimator<'a> {
    stepper: &'a dyn SimulationStepper,
    states: Vec<Variable>,
    parameters: Vec<Variable>,
    outputs: Vec<OutputChannel>,
    settings: UkfSettings,
    /// Indices into `outputs` of the measured channels.
    measured: Vec<usize>,
    /// Augmented dimension L.
    dim: usize,
    lambda: f64,
    weights_mean: Array1<f64>,
    weights_cov: Array1<f64>,
}

impl<'a> UnscentedKalmanEstimator<'a> {
    /// Build an estimator; all configuration errors surface here, before
    /// any simulation runs.
    ///
    /// `outputs` pairs each output variable with its measurement series;
    /// outputs flagged as measured must carry one, diagnostic outputs may
    /// leave it out.
    pub fn new(
        stepper: &'a dyn SimulationStepper,
        states: Vec<Variable>,
        parameters: Vec<Variable>,
        outputs: Vec<(Variable, Option<DataSeries>)>,
        settings: UkfSettings,
    ) -> Result<Self, EstimatorError> {
        if states.is_empty() {
            return Err(EstimatorError::Config(
                "at least one estimated state is required".into(),
            ));
        }
        for var in &states {
            if var.role() != VariableRole::State {
                return Err(EstimatorError::Config(format!(
                    "variable '{}' is not a state",
                    var.name()
                )));
            }
        }
        for var in &parameters {
            if var.role() != VariableRole::Parameter {
                return Err(EstimatorError::Config(format!(
                    "variable '{}' is not a parameter",
                    var.name()
                )));
            }
        }
        if settings.augmented && parameters.is_empty() {
            return Err(EstimatorError::Config(
                "augmented mode requires at least one estimated parameter".into(),
            ));
        }
        if !(settings.step_size > 0.0) || !settings.step_size.is_finite() {
            return Err(EstimatorError::Config(format!(
                "step size must be positive and finite, got {}",
                settings.step_size
            )));
        }
        if !(settings.alpha > 0.0) {
            return Err(EstimatorError::Config(format!(
                "alpha must be positive, got {}",
                settings.alpha
            )));
        }
        if settings.workers == 0 {
            return Err(EstimatorError::Config(
                "at least one propagation worker is required".into(),
            ));
        }

        let mut channels = Vec::with_capacity(outputs.len());
        let mut measured = Vec::new();
        for (index, (var, series)) in outputs.into_iter().enumerate() {
            if var.role() != VariableRole::Output {
                return Err(EstimatorError::Config(format!(
                    "variable '{}' is not an output",
                    var.name()
                )));
            }
            if var.is_measured() && series.is_none() {
                return Err(EstimatorError::Config(format!(
                    "measured output '{}' needs a measurement series",
                    var.name()
                )));
            }
            if var.is_measured() {
                measured.push(index);
            }
            channels.push(OutputChannel {
                variable: var,
                interpolator: series.map(TimeSeriesInterpolator::new),
                cursor: Cursor::default(),
            });
        }
        if measured.is_empty() {
            return Err(EstimatorError::Config(
                "at least one measured output is required for the correction step".into(),
            ));
        }

        let dim = states.len()
            + if settings.augmented {
                parameters.len()
            } else {
                0
            };
        let sigma_count = 2 * dim + 1;
        let l = dim as f64;
        let lambda = settings.alpha * settings.alpha * (l + settings.kappa) - l;

        let mut weights_mean = Array1::<f64>::zeros(sigma_count);
        let mut weights_cov = Array1::<f64>::zeros(sigma_count);
        weights_mean[0] = lambda / (l + lambda);
        weights_cov[0] =
            lambda / (l + lambda) + (1.0 - settings.alpha * settings.alpha + settings.beta);
        for i in 1..sigma_count {
            weights_mean[i] = 1.0 / (2.0 * (l + lambda));
            weights_cov[i] = 1.0 / (2.0 * (l + lambda));
        }

        Ok(UnscentedKalmanEstimator {
            stepper,
            states,
            parameters,
            outputs: channels,
            settings,
            measured,
            dim,
            lambda,
            weights_mean,
            weights_cov,
        })
    }

    /// Augmented state dimension L.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn sigma_count(&self) -> usize {
        2 * self.dim + 1
    }

    pub fn weights_mean(&self) -> &Array1<f64> {
        &self.weights_mean
    }

    pub fn weights_cov(&self) -> &Array1<f64> {
        &self.weights_cov
    }

    /// Generate 2L+1 sigma points from the mean and covariance square-root.
    fn generate_sigma_points(&self, x: &Array1<f64>, s_factor: &Array2<f64>) -> Vec<Array1<f64>> {
        let scale = (self.dim as f64 + self.lambda).sqrt();
        let scaled = s_factor * scale;

        let mut points = Vec::with_capacity(self.sigma_count());
        points.push(x.clone());
        for i in 0..self.dim {
            let col = scaled.column(i).to_owned();
            points.push(x + &col);
        }
        for i in 0..self.dim {
            let col = scaled.column(i).to_owned();
            points.push(x - &col);
        }
        points
    }

    /// Project actively constrained states (and parameters in augmented
    /// mode) onto their bounds.
    fn constrain(&self, x: &mut Array1<f64>) {
        for (i, var) in self.states.iter().enumerate() {
            x[i] = var.bounds().apply(x[i]);
        }
        if self.settings.augmented {
            let offset = self.states.len();
            for (i, var) in self.parameters.iter().enumerate() {
                x[offset + i] = var.bounds().apply(x[offset + i]);
            }
        }
    }

    /// Run the filter over `[start, stop]` and return the accumulated
    /// trajectory.
    ///
    /// Steps are strictly sequential; a propagation or factorization
    /// failure at any step aborts the whole run.
    pub fn filter(&mut self, start: f64, stop: f64) -> Result<FilterTrajectory, EstimatorError> {
        if !(stop > start) {
            return Err(EstimatorError::Config(format!(
                "invalid filter window [{start}, {stop}]"
            )));
        }

        let n_states = self.states.len();
        let dim = self.dim;
        let dt = self.settings.step_size;

        // Initial mean and square-root covariance from per-variable setup.
        let mut x = Array1::<f64>::zeros(dim);
        let mut s_factor = Array2::<f64>::zeros((dim, dim));
        let mut process_noise = Array2::<f64>::zeros((dim, dim));
        for (i, var) in self.states.iter().enumerate() {
            x[i] = var.initial_value();
            s_factor[[i, i]] = var.covariance().sqrt();
            process_noise[[i, i]] = var.covariance();
        }
        let nominal_parameters: Array1<f64> = self
            .parameters
            .iter()
            .map(|var| var.initial_value())
            .collect();
        if self.settings.augmented {
            for (i, var) in self.parameters.iter().enumerate() {
                let j = n_states + i;
                x[j] = var.initial_value();
                s_factor[[j, j]] = var.covariance().sqrt();
                process_noise[[j, j]] = var.covariance();
            }
        }

        // Diagonal measurement noise over the measured outputs.
        let m = self.measured.len();
        let mut measurement_noise = Array2::<f64>::zeros((m, m));
        for (row, &index) in self.measured.iter().enumerate() {
            measurement_noise[[row, row]] = self.outputs[index].variable.covariance();
        }

        // Fresh scan cursors for this run.
        for channel in &mut self.outputs {
            channel.cursor = Cursor::default();
        }

        let pool = SimulationPool::new(self.stepper, self.settings.workers)?;
        let mut trajectory = FilterTrajectory::default();

        info!(
            "starting UKF run over [{start}, {stop}]: L={dim}, {} sigma points, {} measured outputs, {} workers",
            self.sigma_count(),
            m,
            self.settings.workers
        );

        let mut t = start;
        let mut step = 0usize;
        while stop - t > 1e-9 * dt {
            let t_next = (t + dt).min(stop);

            // 1. Sigma points from the current mean and square-root factor.
            let sigmas = self.generate_sigma_points(&x, &s_factor);

            // 2. Propagate every sigma point through the backend.
            let tasks: Vec<SimulationTask> = sigmas
                .iter()
                .map(|sigma| SimulationTask {
                    state: sigma.slice(s![..n_states]).to_owned(),
                    parameters: if self.settings.augmented {
                        sigma.slice(s![n_states..]).to_owned()
                    } else {
                        nominal_parameters.clone()
                    },
                })
                .collect();
            let results = pool.run(tasks, t, t_next)?;

            let mut chi: Vec<Array1<f64>> = Vec::with_capacity(self.sigma_count());
            let mut sigma_outputs: Vec<Array1<f64>> = Vec::with_capacity(self.sigma_count());
            for (point, result) in results.into_iter().enumerate() {
                let output = result.map_err(|err| EstimatorError::Propagation {
                    step,
                    point,
                    message: err.to_string(),
                })?;
                if output.final_state.len() != n_states {
                    return Err(EstimatorError::Propagation {
                        step,
                        point,
                        message: format!(
                            "backend returned a state of length {}, expected {}",
                            output.final_state.len(),
                            n_states
                        ),
                    });
                }

                let mut propagated = Array1::<f64>::zeros(dim);
                propagated.slice_mut(s![..n_states]).assign(&output.final_state);
                if self.settings.augmented {
                    // Parameters have zero dynamics: carry them through.
                    propagated
                        .slice_mut(s![n_states..])
                        .assign(&sigmas[point].slice(s![n_states..]));
                }
                chi.push(propagated);

                let mut full = Array1::<f64>::zeros(self.outputs.len());
                for (k, channel) in self.outputs.iter().enumerate() {
                    full[k] = output.final_output(channel.variable.name()).ok_or_else(|| {
                        EstimatorError::Propagation {
                            step,
                            point,
                            message: format!(
                                "output '{}' missing from backend results",
                                channel.variable.name()
                            ),
                        }
                    })?;
                }
                sigma_outputs.push(full);
            }

            // 3. Predicted mean and covariance plus additive process noise.
            let mut x_pred = Array1::<f64>::zeros(dim);
            for (i, point) in chi.iter().enumerate() {
                x_pred = &x_pred + &(point * self.weights_mean[i]);
            }
            let mut p_pred = process_noise.clone();
            for (i, point) in chi.iter().enumerate() {
                let d = point - &x_pred;
                p_pred = &p_pred + &(linalg::outer(&d, &d) * self.weights_cov[i]);
            }

            // 4. Unscented measurement prediction over the measured outputs,
            //    and the full unreduced output mean for the trajectory.
            let mut full_output = Array1::<f64>::zeros(self.outputs.len());
            for (i, out) in sigma_outputs.iter().enumerate() {
                full_output = &full_output + &(out * self.weights_mean[i]);
            }

            let z_sigmas: Vec<Array1<f64>> = sigma_outputs
                .iter()
                .map(|out| Array1::from_shape_fn(m, |row| out[self.measured[row]]))
                .collect();
            let mut z_pred = Array1::<f64>::zeros(m);
            for (i, z) in z_sigmas.iter().enumerate() {
                z_pred = &z_pred + &(z * self.weights_mean[i]);
            }
            let mut p_zz = measurement_noise.clone();
            let mut p_xz = Array2::<f64>::zeros((dim, m));
            for (i, z) in z_sigmas.iter().enumerate() {
                let dz = z - &z_pred;
                let dx = &chi[i] - &x_pred;
                p_zz = &p_zz + &(linalg::outer(&dz, &dz) * self.weights_cov[i]);
                p_xz = &p_xz + &(linalg::outer(&dx, &dz) * self.weights_cov[i]);
            }

            // 5. Correction with the interpolated measurements available at
            //    this time; outputs without data drop out of the update.
            let mut rows = Vec::with_capacity(m);
            let mut measured_values = Vec::with_capacity(m);
            for (row, &index) in self.measured.iter().enumerate() {
                let channel = &mut self.outputs[index];
                let interpolator = match &channel.interpolator {
                    Some(interpolator) => interpolator,
                    None => continue, // unreachable per construction
                };
                match interpolator.interpolate(t_next, channel.cursor) {
                    Ok((value, cursor)) => {
                        channel.cursor = cursor;
                        rows.push(row);
                        measured_values.push(value);
                    }
                    Err(EstimatorError::OutOfRange { .. }) => {
                        warn!(
                            "no measurement for output '{}' at t={t_next}; skipping it this step",
                            channel.variable.name()
                        );
                    }
                    Err(err) => return Err(err),
                }
            }

            let (mut x_post, p_post) = if rows.is_empty() {
                warn!("no measurements available at t={t_next}; correction skipped");
                (x_pred.clone(), p_pred.clone())
            } else {
                let k = rows.len();
                let z_meas = Array1::from_vec(measured_values);
                let z_pred_active = Array1::from_shape_fn(k, |i| z_pred[rows[i]]);
                let p_zz_active =
                    Array2::from_shape_fn((k, k), |(i, j)| p_zz[[rows[i], rows[j]]]);
                let p_xz_active =
                    Array2::from_shape_fn((dim, k), |(i, j)| p_xz[[i, rows[j]]]);

                let p_zz_inv = linalg::try_inverse(&p_zz_active)
                    .ok_or(EstimatorError::SingularInnovation { step })?;
                let gain = p_xz_active.dot(&p_zz_inv);
                let innovation = &z_meas - &z_pred_active;

                let x_post = &x_pred + &gain.dot(&innovation);
                let p_post = &p_pred - &gain.dot(&p_zz_active).dot(&gain.t());
                (x_post, linalg::symmetrize(&p_post))
            };

            // 6. Hard constraints by projection on the posterior mean.
            self.constrain(&mut x_post);

            // 7. Re-factor; losing positive-definiteness is fatal.
            s_factor = linalg::cholesky_lower(&p_post)
                .ok_or(EstimatorError::NotPositiveDefinite { step })?;
            let output_sqrt_covariance = linalg::cholesky_lower(&p_zz)
                .ok_or(EstimatorError::NotPositiveDefinite { step })?;

            debug!(
                "step {step}: t={t_next}, corrected with {}/{} measured outputs",
                rows.len(),
                m
            );

            trajectory.steps.push(FilterStep {
                time: t_next,
                state_mean: x_post.clone(),
                sqrt_covariance: s_factor.clone(),
                output_mean: z_pred,
                output_sqrt_covariance,
                full_output,
            });

            x = x_post;
            t = t_next;
            step += 1;
        }

        info!("UKF run finished: {} steps", trajectory.len());
        Ok(trajectory)
    }
}
