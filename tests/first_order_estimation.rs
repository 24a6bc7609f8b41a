//! End-to-end estimation on a first-order linear model.
//!
//! The process is `x' = a·x + b·u`, `y = c·x + d·u` with `a=-1, b=4, c=6,
//! d=0` and constant input `u=1`, so the analytic steady state is
//! `x = -b/a·u = 4` and `y = c·x = 24`. The backend below integrates the
//! model exactly, which makes convergence targets sharp.

use std::collections::HashMap;

use approx::assert_relative_eq;
use ndarray::{arr1, Array1};

use state_estimator_rs::{
    DataSeries, EstimatorError, SimulationPool, SimulationStepper, SimulationTask, StepOutput,
    UkfSettings, UnscentedKalmanEstimator, Variable, VariableRole,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Exact discretization of the first-order model. A non-empty parameter
/// vector overrides `b`, which is how the augmented filter estimates it.
struct FirstOrderStepper {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    u: f64,
}

impl FirstOrderStepper {
    fn nominal() -> Self {
        FirstOrderStepper {
            a: -1.0,
            b: 4.0,
            c: 6.0,
            d: 0.0,
            u: 1.0,
        }
    }
}

impl SimulationStepper for FirstOrderStepper {
    fn step(
        &self,
        state: &Array1<f64>,
        parameters: &Array1<f64>,
        t0: f64,
        t1: f64,
    ) -> Result<StepOutput, EstimatorError> {
        let b = if parameters.is_empty() {
            self.b
        } else {
            parameters[0]
        };
        let substeps = 10;
        let h = (t1 - t0) / substeps as f64;

        let mut time_grid = Vec::with_capacity(substeps + 1);
        let mut xs = Vec::with_capacity(substeps + 1);
        let mut ys = Vec::with_capacity(substeps + 1);
        let mut x = state[0];
        for k in 0..=substeps {
            if k > 0 {
                let decay = (self.a * h).exp();
                x = decay * x + b * self.u / self.a * (decay - 1.0);
            }
            time_grid.push(t0 + h * k as f64);
            xs.push(x);
            ys.push(self.c * x + self.d * self.u);
        }

        let mut outputs = HashMap::new();
        outputs.insert("x".to_string(), xs);
        outputs.insert("y".to_string(), ys);
        Ok(StepOutput {
            final_state: arr1(&[x]),
            time_grid,
            outputs,
        })
    }
}

/// Noise-free measurements of `y` from the true trajectory starting at
/// `x0 = 1.0`: `x(t) = 4 - 3·e^{-t}`, `y(t) = 6·x(t)`.
fn true_output_series(t_end: f64, dt: f64) -> DataSeries {
    let n = (t_end / dt).round() as usize;
    let time: Vec<f64> = (0..=n).map(|k| dt * k as f64).collect();
    let values: Vec<f64> = time.iter().map(|t| 6.0 * (4.0 - 3.0 * (-t).exp())).collect();
    DataSeries::new(time, values).unwrap()
}

fn state_x(initial: f64) -> Variable {
    Variable::new("x", VariableRole::State, 0)
        .with_initial_value(initial)
        .with_covariance(0.5)
        .unwrap()
        .with_lower_bound(0.0)
}

fn measured_y() -> Variable {
    Variable::new("y", VariableRole::Output, 1)
        .with_covariance(2.0)
        .unwrap()
        .as_measured()
}

#[test]
fn state_estimate_converges_to_analytic_steady_state() -> anyhow::Result<()> {
    init_logging();
    let stepper = FirstOrderStepper::nominal();
    let mut estimator = UnscentedKalmanEstimator::new(
        &stepper,
        vec![state_x(1.5)],
        vec![],
        vec![(measured_y(), Some(true_output_series(12.0, 0.05)))],
        UkfSettings::default(),
    )?;

    let trajectory = estimator.filter(0.0, 12.0)?;
    assert_eq!(trajectory.len(), 120);

    let last = trajectory.last().expect("non-empty trajectory");
    assert_relative_eq!(last.state_mean[0], 4.0, epsilon = 1e-3);
    assert_relative_eq!(last.output_mean[0], 24.0, epsilon = 1e-2);

    // Uncertainty stays meaningful: the reconstructed covariance diagonal
    // never goes negative across the run.
    for step in &trajectory.steps {
        let p = step.sqrt_covariance.dot(&step.sqrt_covariance.t());
        assert!(p[[0, 0]] >= 0.0);
    }
    Ok(())
}

#[test]
fn parallel_and_sequential_runs_agree() -> anyhow::Result<()> {
    init_logging();
    let stepper = FirstOrderStepper::nominal();
    let series = true_output_series(4.0, 0.05);

    let run = |workers: usize| -> Result<Vec<f64>, EstimatorError> {
        let settings = UkfSettings {
            workers,
            ..UkfSettings::default()
        };
        let mut estimator = UnscentedKalmanEstimator::new(
            &stepper,
            vec![state_x(1.5)],
            vec![],
            vec![(measured_y(), Some(series.clone()))],
            settings,
        )?;
        Ok(estimator.filter(0.0, 4.0)?.state_component(0))
    };

    let sequential = run(1)?;
    let parallel = run(4)?;
    assert_eq!(sequential.len(), parallel.len());
    for (a, b) in sequential.iter().zip(parallel.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn pool_sweep_preserves_initial_conditions_and_order() -> anyhow::Result<()> {
    init_logging();
    let stepper = FirstOrderStepper::nominal();
    let pool = SimulationPool::new(&stepper, 3)?;

    // Five evenly spaced initial conditions in [3.5, 4.5].
    let sweep: Vec<f64> = (0..5).map(|i| 3.5 + 0.25 * i as f64).collect();
    let tasks: Vec<SimulationTask> = sweep
        .iter()
        .map(|&x0| SimulationTask {
            state: arr1(&[x0]),
            parameters: arr1(&[]),
        })
        .collect();

    let results = pool.run(tasks, 0.0, 30.0)?;
    assert_eq!(results.len(), 5);

    for (i, result) in results.iter().enumerate() {
        let output = result.as_ref().expect("sweep task failed");
        // Each run starts exactly from its own initial condition...
        assert_eq!(output.outputs["x"][0], sweep[i]);
        // ...and converges to the analytic steady state.
        let x_final = *output.outputs["x"].last().unwrap();
        let y_final = *output.outputs["y"].last().unwrap();
        assert_relative_eq!(x_final, 4.0, epsilon = 1e-3);
        assert_relative_eq!(y_final, 24.0, epsilon = 1e-2);
    }
    Ok(())
}

#[test]
fn augmented_mode_recovers_the_gain_parameter() -> anyhow::Result<()> {
    init_logging();
    let stepper = FirstOrderStepper::nominal();
    let param_b = Variable::new("b", VariableRole::Parameter, 2)
        .with_initial_value(3.5)
        .with_covariance(0.05)?
        .with_lower_bound(0.0);
    let settings = UkfSettings {
        augmented: true,
        ..UkfSettings::default()
    };

    let mut estimator = UnscentedKalmanEstimator::new(
        &stepper,
        vec![state_x(1.0)],
        vec![param_b],
        vec![(measured_y(), Some(true_output_series(20.0, 0.05)))],
        settings,
    )?;

    let trajectory = estimator.filter(0.0, 20.0)?;
    let last = trajectory.last().expect("non-empty trajectory");

    // state_mean = [x, b]; the true values are x -> 4, b = 4.
    assert_relative_eq!(last.state_mean[0], 4.0, epsilon = 1e-2);
    assert!(
        (last.state_mean[1] - 4.0).abs() < 0.1,
        "estimated b = {}, expected ~4.0",
        last.state_mean[1]
    );
    Ok(())
}
