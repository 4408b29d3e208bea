//! Discrete convolution kernels.
//!
//! A kernel spreads the evidence of a dated event (contact, symptom onset,
//! test sample) over the following periods. The density is rescaled on
//! construction so that it sums to a target value.

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    offset: i64,
    density: Vec<f64>,
    target_sum: f64,
}

impl Kernel {
    /// Create a kernel from an explicit density, indexed from `offset`.
    ///
    /// Every density value is multiplied by `target_sum / raw_sum`.
    ///
    /// # Errors
    /// Returns [`ControlError::DegenerateKernel`] if the density sums to zero,
    /// and an error for negative, non-finite or empty inputs.
    pub fn new(offset: i64, density: Vec<f64>, target_sum: f64) -> Result<Self, ControlError> {
        if !(target_sum.is_finite() && target_sum > 0.0) {
            return Err(ControlError::InvalidTargetSum(target_sum));
        }
        if let Some((index, &value)) = density
            .iter()
            .enumerate()
            .find(|(_, ele)| !(ele.is_finite() && **ele >= 0.0))
        {
            return Err(ControlError::InvalidDensity { index, value });
        }

        let raw_sum: f64 = density.iter().sum();
        if raw_sum == 0.0 {
            return Err(ControlError::DegenerateKernel);
        }

        let scale = target_sum / raw_sum;
        let density = density.into_iter().map(|ele| ele * scale).collect();

        Ok(Self {
            offset,
            density,
            target_sum,
        })
    }

    /// Create a kernel of `length` values generated by `f(k)` for `k` in `0..length`.
    pub fn from_fn<F>(offset: i64, length: usize, target_sum: f64, f: F) -> Result<Self, ControlError>
    where
        F: Fn(usize) -> f64,
    {
        Self::new(offset, (0..length).map(f).collect(), target_sum)
    }

    /// Create a kernel with geometrically decaying density `ratio^k`.
    pub fn decay(offset: i64, length: usize, ratio: f64, target_sum: f64) -> Result<Self, ControlError> {
        Self::from_fn(offset, length, target_sum, |k| ratio.powi(k as i32))
    }

    /// Weight contributed at `lag` periods after an event.
    ///
    /// Lags outside the support contribute nothing.
    pub fn evaluate(&self, lag: i64) -> f64 {
        let idx = lag - self.offset;
        if idx < 0 {
            return 0.0;
        }
        self.density.get(idx as usize).copied().unwrap_or(0.0)
    }

    /// Sum of the kernel evaluated at `now - day` for every event day.
    pub fn convolve(&self, days: &[usize], now: usize) -> f64 {
        days.iter()
            .map(|&day| self.evaluate(now as i64 - day as i64))
            .sum()
    }

    /// Range of lags with a (possibly) non-zero weight.
    pub fn support(&self) -> Range<i64> {
        self.offset..self.offset + self.density.len() as i64
    }

    /// Whether an event on `day` can still contribute at `now` or later.
    pub fn is_live(&self, day: usize, now: usize) -> bool {
        (now as i64 - day as i64) < self.support().end
    }

    pub fn target_sum(&self) -> f64 {
        self.target_sum
    }
}
