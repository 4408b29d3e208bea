//! Binomial observations and one-sided confidence comparisons.
//!
//! Bounds use the Wilson score interval, which stays inside [0, 1] and does
//! not collapse to a zero-width interval when all or none of the trials
//! succeed.

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::{iter::Sum, ops::Add};

/// Observed number of successes out of a number of trials.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binomial {
    successes: u64,
    trials: u64,
}

impl Binomial {
    /// # Errors
    /// Returns [`ControlError::InvalidObservation`] if `successes > trials`.
    pub fn new(successes: u64, trials: u64) -> Result<Self, ControlError> {
        if successes > trials {
            return Err(ControlError::InvalidObservation { successes, trials });
        }
        Ok(Self { successes, trials })
    }

    /// Observation carrying no information.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// Observed proportion, `None` without trials.
    pub fn proportion(&self) -> Option<f64> {
        (self.trials > 0).then(|| self.successes as f64 / self.trials as f64)
    }

    /// Lower one-sided Wilson bound at the given confidence level.
    pub fn lower_bound(&self, confidence: f64) -> Option<f64> {
        if self.successes == 0 {
            return (self.trials > 0).then_some(0.0);
        }
        self.wilson_bound(confidence, -1.0)
    }

    /// Upper one-sided Wilson bound at the given confidence level.
    pub fn upper_bound(&self, confidence: f64) -> Option<f64> {
        if self.successes == self.trials {
            return (self.trials > 0).then_some(1.0);
        }
        self.wilson_bound(confidence, 1.0)
    }

    /// Whether the true proportion is above `threshold` at the given confidence.
    ///
    /// Always false without trials.
    pub fn confidently_greater_than(&self, threshold: f64, confidence: f64) -> bool {
        self.lower_bound(confidence)
            .is_some_and(|lower| lower > threshold)
    }

    /// Whether the true proportion is below `threshold` at the given confidence.
    ///
    /// Always false without trials.
    pub fn confidently_less_than(&self, threshold: f64, confidence: f64) -> bool {
        self.upper_bound(confidence)
            .is_some_and(|upper| upper < threshold)
    }

    fn wilson_bound(&self, confidence: f64, sign: f64) -> Option<f64> {
        if self.trials == 0 {
            return None;
        }
        let z = normal_quantile(confidence);
        if !z.is_finite() {
            return None;
        }
        let n = self.trials as f64;
        let p = self.successes as f64 / n;
        let z2 = z * z;

        let centre = p + z2 / (2.0 * n);
        let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
        let bound = (centre + sign * margin) / (1.0 + z2 / n);

        Some(bound.clamp(0.0, 1.0))
    }
}

impl Add for Binomial {
    type Output = Binomial;

    fn add(self, rhs: Self) -> Self::Output {
        Binomial {
            successes: self.successes + rhs.successes,
            trials: self.trials + rhs.trials,
        }
    }
}

impl Sum for Binomial {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Binomial::empty(), Add::add)
    }
}

/// Quantile function of the standard normal distribution.
///
/// Rational approximation by Acklam (relative error below 1.2e-9).
/// Returns NaN outside (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    if !(p > 0.0 && p < 1.0) {
        return f64::NAN;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}
