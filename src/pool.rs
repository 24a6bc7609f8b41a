//! Concurrent batch evaluation of independent simulation runs.
//!
//! The pool takes an ordered batch of tasks (distinct initial states and
//! parameter vectors), fans them out to a bounded set of workers, and
//! returns the results in submission order regardless of completion order.
//! One task failing does not abort its siblings: the failure stays in its
//! result slot and the rest of the batch remains valid.

use log::warn;
use ndarray::Array1;

use crate::backend::{SimulationStepper, StepOutput};
use crate::error::EstimatorError;

/// One unit of pool work: a simulation over `[t0, t1]` starting from this
/// state with these parameters. Identified by its position in the batch.
#[derive(Debug, Clone)]
pub struct SimulationTask {
    pub state: Array1<f64>,
    pub parameters: Array1<f64>,
}

/// Bounded worker pool over a shared simulation backend.
pub struct SimulationPool<'a> {
    stepper: &'a dyn SimulationStepper,
    workers: usize,
}

impl<'a> SimulationPool<'a> {
    pub fn new(stepper: &'a dyn SimulationStepper, workers: usize) -> Result<Self, EstimatorError> {
        if workers == 0 {
            return Err(EstimatorError::Config(
                "simulation pool needs at least one worker".into(),
            ));
        }
        Ok(SimulationPool { stepper, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run the whole batch and block until every task has completed.
    ///
    /// The returned vector has exactly one entry per task, in submission
    /// order; a per-task simulation failure occupies its slot as an `Err`.
    /// The outer `Result` only fails when a worker panics.
    pub fn run(
        &self,
        tasks: Vec<SimulationTask>,
        t0: f64,
        t1: f64,
    ) -> Result<Vec<Result<StepOutput, EstimatorError>>, EstimatorError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // Single worker: run in the caller's thread, same ordering contract.
        if self.workers == 1 {
            return Ok(tasks
                .iter()
                .map(|task| self.stepper.step(&task.state, &task.parameters, t0, t1))
                .collect());
        }

        let task_count = tasks.len();
        let worker_count = self.workers.min(task_count);

        let (task_tx, task_rx) = crossbeam::channel::unbounded::<(usize, SimulationTask)>();
        for indexed in tasks.into_iter().enumerate() {
            // Receivers outlive this loop; the channel cannot be closed yet.
            let _ = task_tx.send(indexed);
        }
        drop(task_tx);

        let (result_tx, result_rx) =
            crossbeam::channel::unbounded::<(usize, Result<StepOutput, EstimatorError>)>();

        crossbeam::thread::scope(|scope| {
            for _ in 0..worker_count {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    while let Ok((index, task)) = task_rx.recv() {
                        let outcome = self.stepper.step(&task.state, &task.parameters, t0, t1);
                        if let Err(err) = &outcome {
                            warn!("simulation task {index} failed: {err}");
                        }
                        let _ = result_tx.send((index, outcome));
                    }
                });
            }
        })
        .map_err(|_| EstimatorError::PoolPanic)?;
        drop(result_tx);

        // Fill result slots by index, not by arrival.
        let mut slots: Vec<Option<Result<StepOutput, EstimatorError>>> =
            (0..task_count).map(|_| None).collect();
        while let Ok((index, outcome)) = result_rx.recv() {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or(EstimatorError::PoolPanic))
            .collect()
    }
}
