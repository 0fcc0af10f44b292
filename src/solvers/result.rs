// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Solver output.

use ndarray::Array2;
use num_complex::Complex64;

/// States at the requested output times.
#[derive(Debug, Clone)]
pub struct OdeResult {
    /// Output times, in integration order
    pub t: Vec<f64>,
    /// State at each output time
    pub y: Vec<Array2<Complex64>>,
    /// Number of rhs (or generator) evaluations
    pub nfev: usize,
    /// Accepted steps
    pub steps: usize,
    /// Rejected steps (adaptive methods only)
    pub rejected_steps: usize,
}

impl OdeResult {
    /// State at the last output time.
    pub fn final_state(&self) -> Option<&Array2<Complex64>> {
        self.y.last()
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}
