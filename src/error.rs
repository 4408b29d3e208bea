use thiserror::Error;

/// Errors raised by the control-loop core.
///
/// Construction errors (kernels, observations) are raised while setting up a
/// simulation. `UndefinedTransition` signals a modelling gap and is never
/// recovered from once the period loop is running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("kernel density sums to zero")]
    DegenerateKernel,

    #[error("kernel density must be finite and non-negative, but element {index} is {value}")]
    InvalidDensity { index: usize, value: f64 },

    #[error("kernel target sum must be positive and finite, but is {0}")]
    InvalidTargetSum(f64),

    #[error("successes ({successes}) must not exceed trials ({trials})")]
    InvalidObservation { successes: u64, trials: u64 },

    #[error("no transition defined for {variant}: {reason}")]
    UndefinedTransition { variant: String, reason: &'static str },
}
