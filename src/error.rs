use thiserror::Error;

/// Errors produced by the estimation core.
///
/// Configuration problems are detected eagerly at setup and are fatal.
/// Out-of-range interpolation queries are recoverable: the estimator treats
/// them as "no measurement available at this step". Numerical failures and
/// failed sigma-point propagations abort the whole filtering run and carry
/// the filter step index for diagnosis.
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Invalid setup: non-positive covariance, malformed data series,
    /// unknown variable name, bad filter settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Interpolation query strictly outside the data series time domain.
    #[error("time {time} is outside the data series range [{min}, {max}]")]
    OutOfRange { time: f64, min: f64, max: f64 },

    /// Covariance lost positive-definiteness and could not be factored.
    #[error("covariance is not positive-definite at filter step {step}")]
    NotPositiveDefinite { step: usize },

    /// The innovation covariance could not be inverted for the Kalman gain.
    #[error("innovation covariance is singular at filter step {step}")]
    SingularInnovation { step: usize },

    /// The simulation backend failed for one invocation.
    #[error("simulation backend error: {0}")]
    Backend(String),

    /// A sigma-point propagation failed; the unscented transform needs all
    /// 2L+1 points, so this aborts the owning filter step.
    #[error("sigma point {point} failed to propagate at filter step {step}: {message}")]
    Propagation {
        step: usize,
        point: usize,
        message: String,
    },

    /// A pool worker panicked or a result slot was never filled.
    #[error("simulation pool worker panicked")]
    PoolPanic,
}
