// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities for dynamics tests.

use ndarray::{array, Array2};
use num_complex::Complex64;

pub fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

pub fn pauli_x() -> Array2<Complex64> {
    array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]
}

pub fn pauli_y() -> Array2<Complex64> {
    array![[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]]
}

pub fn pauli_z() -> Array2<Complex64> {
    array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]]
}

/// Lowering operator |0⟩⟨1|.
pub fn sigma_minus() -> Array2<Complex64> {
    array![[c(0.0, 0.0), c(1.0, 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]]
}

/// Column vector from complex entries.
pub fn column(entries: &[Complex64]) -> Array2<Complex64> {
    Array2::from_shape_fn((entries.len(), 1), |(i, _)| entries[i])
}

/// Check matrix equality within tolerance.
pub fn assert_matrix_close(a: &Array2<Complex64>, b: &Array2<Complex64>, tol: f64) {
    assert_eq!(a.shape(), b.shape());
    for ((i, j), val) in a.indexed_iter() {
        let diff = (val - b[[i, j]]).norm();
        assert!(
            diff < tol,
            "Mismatch at ({}, {}): {:?} vs {:?} (diff={})",
            i,
            j,
            val,
            b[[i, j]],
            diff
        );
    }
}
