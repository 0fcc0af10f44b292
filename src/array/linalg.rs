// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dense linear algebra kernels.
//!
//! Matrix exponential via scaling-and-squaring with Padé(13) approximation:
//!   Higham (2005), "The Scaling and Squaring Method for the Matrix
//!   Exponential Revisited", SIAM J. Matrix Anal. Appl. 26(4), 1179.
//!
//! Hermitian eigendecomposition is delegated to `nalgebra::SymmetricEigen`,
//! with eigenvalues returned in ascending order.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array1, Array2};
use num_complex::Complex64;

use crate::error::{Error, Result, ValidationError};

/// Compute the matrix exponential exp(A) using scaling-and-squaring
/// with Padé(13) approximation.
///
/// # Arguments
/// * `a` - Square complex matrix
///
/// # Returns
/// exp(A) as a complex matrix of the same size
pub fn matrix_exp(a: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = require_square(a, "matrix_exp argument")?;

    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    if n == 1 {
        let mut result = Array2::zeros((1, 1));
        result[[0, 0]] = a[[0, 0]].exp();
        return Ok(result);
    }

    let norm = matrix_1_norm(a);
    if !norm.is_finite() {
        return Err(Error::NumericalFailure(
            "matrix_exp argument has non-finite entries".into(),
        ));
    }

    // ||A/2^s|| < theta_13 (Higham Table 10.2)
    let theta_13: f64 = 5.37;
    let s = if norm > theta_13 {
        (norm / theta_13).log2().ceil() as i32
    } else {
        0
    };

    let scale = Complex64::new(2f64.powi(-s), 0.0);
    let a_scaled = a * scale;

    let result = pade13(&a_scaled)?;

    // exp(A) = (exp(A/2^s))^(2^s)
    Ok(square_repeatedly(result, s.max(0) as u32))
}

/// Padé(13,13) approximation coefficients.
/// From Higham (2005), equation (10.33).
const PADE_COEFFS: [f64; 14] = [
    1.0,
    0.5,
    0.12,
    1.833_333_333_333_333_4e-2,
    1.992_753_623_188_405_8e-3,
    1.630_434_782_608_696e-4,
    1.035_196_687_401_6e-5,
    5.175_983_437_008_01e-7,
    2.043_151_356_652_5e-8,
    6.306_022_705_717_593e-10,
    1.483_770_048_404_14e-11,
    2.529_153_491_597_966e-13,
    2.810_170_546_219_962_4e-15,
    1.544_049_750_670_309e-17,
];

fn pade13(a: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = a.nrows();
    let eye = identity(n);

    let a2 = a.dot(a);
    let a4 = a2.dot(&a2);
    let a6 = a2.dot(&a4);

    let w1 = &a6 * c(PADE_COEFFS[13]) + &a4 * c(PADE_COEFFS[11]) + &a2 * c(PADE_COEFFS[9]);
    let w2 = w1.dot(&a6)
        + &a6 * c(PADE_COEFFS[7])
        + &a4 * c(PADE_COEFFS[5])
        + &a2 * c(PADE_COEFFS[3])
        + &eye * c(PADE_COEFFS[1]);
    let u = a.dot(&w2);

    let v1 = &a6 * c(PADE_COEFFS[12]) + &a4 * c(PADE_COEFFS[10]) + &a2 * c(PADE_COEFFS[8]);
    let v = v1.dot(&a6)
        + &a6 * c(PADE_COEFFS[6])
        + &a4 * c(PADE_COEFFS[4])
        + &a2 * c(PADE_COEFFS[2])
        + &eye * c(PADE_COEFFS[0]);

    // exp(A) ≈ (V - U)^{-1} (V + U)
    solve_linear(&(&v - &u), &(&v + &u))
}

#[inline]
fn c(x: f64) -> Complex64 {
    Complex64::new(x, 0.0)
}

/// Solve A X = B for X using Gaussian elimination with partial pivoting.
///
/// # Errors
/// `NumericalFailure` if A is singular to working precision.
pub fn solve_linear(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = require_square(a, "linear system matrix")?;
    if b.nrows() != n {
        return Err(ValidationError::DimensionMismatch {
            what: "linear system right-hand side".into(),
            expected: n,
            actual: b.nrows(),
        }
        .into());
    }
    let m = b.ncols();

    let mut aug = Array2::zeros((n, n + m));
    aug.slice_mut(s![.., ..n]).assign(a);
    aug.slice_mut(s![.., n..]).assign(b);

    let scale = matrix_1_norm(a).max(f64::MIN_POSITIVE);

    for col in 0..n {
        let mut max_val = 0.0;
        let mut max_row = col;
        for row in col..n {
            let val = aug[[row, col]].norm();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..(n + m) {
                aug.swap([col, j], [max_row, j]);
            }
        }

        let pivot = aug[[col, col]];
        if pivot.norm() <= 1e-15 * scale {
            return Err(Error::NumericalFailure(format!(
                "singular matrix in linear solve (pivot {} at column {})",
                pivot.norm(),
                col
            )));
        }

        for row in (col + 1)..n {
            let factor = aug[[row, col]] / pivot;
            if factor == Complex64::new(0.0, 0.0) {
                continue;
            }
            for j in col..(n + m) {
                let val = aug[[col, j]];
                aug[[row, j]] -= factor * val;
            }
        }
    }

    let mut x = Array2::<Complex64>::zeros((n, m));
    for col in (0..n).rev() {
        let pivot = aug[[col, col]];
        for j in 0..m {
            let mut sum = aug[[col, n + j]];
            for k in (col + 1)..n {
                sum -= aug[[col, k]] * x[[k, j]];
            }
            x[[col, j]] = sum / pivot;
        }
    }
    Ok(x)
}

fn square_repeatedly(mut m: Array2<Complex64>, s: u32) -> Array2<Complex64> {
    for _ in 0..s {
        m = m.dot(&m);
    }
    m
}

/// 1-norm of a complex matrix: max column sum of absolute values.
pub fn matrix_1_norm(a: &Array2<Complex64>) -> f64 {
    a.columns()
        .into_iter()
        .map(|col| col.iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Frobenius norm.
pub fn frobenius_norm(a: &Array2<Complex64>) -> f64 {
    a.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

/// Identity matrix of size n.
pub fn identity(n: usize) -> Array2<Complex64> {
    Array2::from_diag_elem(n, Complex64::new(1.0, 0.0))
}

/// Conjugate transpose A†.
pub fn dagger(a: &Array2<Complex64>) -> Array2<Complex64> {
    a.t().mapv(|z| z.conj())
}

/// Commutator [A, B] = AB − BA.
pub fn commutator(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    a.dot(b) - b.dot(a)
}

/// Kronecker product A ⊗ B.
pub fn kron(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out = Array2::zeros((ar * br, ac * bc));
    for ((i, j), &aij) in a.indexed_iter() {
        if aij == Complex64::new(0.0, 0.0) {
            continue;
        }
        out.slice_mut(s![i * br..(i + 1) * br, j * bc..(j + 1) * bc])
            .assign(&(b * aij));
    }
    out
}

/// `||A − A†||_F <= tol`
pub fn is_hermitian(a: &Array2<Complex64>, tol: f64) -> bool {
    a.is_square() && frobenius_norm(&(a - &dagger(a))) <= tol
}

/// Column-stacking vectorization: n×m matrix to an (n·m)×1 column.
pub fn vec_columns(a: &Array2<Complex64>) -> Array2<Complex64> {
    let (n, m) = a.dim();
    let mut out = Array2::zeros((n * m, 1));
    for ((i, j), &z) in a.indexed_iter() {
        out[[i + n * j, 0]] = z;
    }
    out
}

/// Inverse of [`vec_columns`] for an n×n matrix.
pub fn unvec_columns(v: &Array2<Complex64>, n: usize) -> Result<Array2<Complex64>> {
    if v.len() != n * n {
        return Err(ValidationError::DimensionMismatch {
            what: "vectorized state".into(),
            expected: n * n,
            actual: v.len(),
        }
        .into());
    }
    let flat: Vec<Complex64> = v.iter().copied().collect();
    Ok(Array2::from_shape_fn((n, n), |(i, j)| flat[i + n * j]))
}

fn require_square(a: &Array2<Complex64>, what: &str) -> Result<usize> {
    if a.nrows() != a.ncols() {
        return Err(ValidationError::DimensionMismatch {
            what: format!("{} (must be square)", what),
            expected: a.nrows(),
            actual: a.ncols(),
        }
        .into());
    }
    Ok(a.nrows())
}

fn eig_iteration_limit(n: usize) -> usize {
    1000 + 100 * n
}

/// Eigendecomposition of a Hermitian matrix.
///
/// # Returns
/// `(values, vectors)` with real eigenvalues sorted ascending and the
/// corresponding orthonormal eigenvectors as columns.
pub fn eigh(a: &Array2<Complex64>) -> Result<(Array1<f64>, Array2<Complex64>)> {
    let n = require_square(a, "eigh argument")?;
    if n == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }

    let mat = DMatrix::<Complex64>::from_fn(n, n, |i, j| a[[i, j]]);
    let eig = SymmetricEigen::try_new(mat, f64::EPSILON, eig_iteration_limit(n)).ok_or_else(
        || Error::NumericalFailure("Hermitian eigendecomposition did not converge".into()),
    )?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&p, &q| eig.eigenvalues[p].total_cmp(&eig.eigenvalues[q]));

    let values = order.iter().map(|&k| eig.eigenvalues[k]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(i, col)| eig.eigenvectors[(i, order[col])]);
    Ok((values, vectors))
}

/// Eigendecomposition of a real symmetric matrix (ascending eigenvalues).
pub fn eigh_real(a: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(ValidationError::DimensionMismatch {
            what: "eigh_real argument (must be square)".into(),
            expected: n,
            actual: a.ncols(),
        }
        .into());
    }
    if n == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }

    let mat = DMatrix::<f64>::from_fn(n, n, |i, j| a[[i, j]]);
    let eig = SymmetricEigen::try_new(mat, f64::EPSILON, eig_iteration_limit(n)).ok_or_else(
        || Error::NumericalFailure("symmetric eigendecomposition did not converge".into()),
    )?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&p, &q| eig.eigenvalues[p].total_cmp(&eig.eigenvalues[q]));

    let values = order.iter().map(|&k| eig.eigenvalues[k]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(i, col)| eig.eigenvectors[(i, order[col])]);
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_matrix_close, pauli_x, pauli_y, pauli_z};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    // =========================================================================
    // matrix_exp
    // =========================================================================

    #[test]
    fn test_expm_zero_is_identity() {
        let zero = Array2::<Complex64>::zeros((4, 4));
        let result = matrix_exp(&zero).unwrap();
        assert_matrix_close(&result, &identity(4), 1e-14);
    }

    #[test]
    fn test_expm_diagonal() {
        let mut a = Array2::zeros((2, 2));
        a[[0, 0]] = Complex64::new(1.0, 0.0);
        a[[1, 1]] = Complex64::new(2.0, 0.0);
        let result = matrix_exp(&a).unwrap();

        assert_relative_eq!(result[[0, 0]].re, 1.0_f64.exp(), epsilon = 1e-12);
        assert_relative_eq!(result[[1, 1]].re, 2.0_f64.exp(), epsilon = 1e-12);
        assert!(result[[0, 1]].norm() < 1e-14);
        assert!(result[[1, 0]].norm() < 1e-14);
    }

    #[test]
    fn test_expm_pauli_x_produces_rotation() {
        let theta = PI / 2.0;
        let a = pauli_x() * Complex64::new(0.0, -theta / 2.0);
        let result = matrix_exp(&a).unwrap();

        let (cth, sth) = ((theta / 2.0).cos(), (theta / 2.0).sin());
        assert!((result[[0, 0]] - Complex64::new(cth, 0.0)).norm() < 1e-12);
        assert!((result[[0, 1]] - Complex64::new(0.0, -sth)).norm() < 1e-12);
        assert!((result[[1, 0]] - Complex64::new(0.0, -sth)).norm() < 1e-12);
        assert!((result[[1, 1]] - Complex64::new(cth, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_expm_large_norm_needs_scaling() {
        let mut a = Array2::zeros((2, 2));
        a[[0, 0]] = Complex64::new(100.0, 0.0);
        a[[1, 1]] = Complex64::new(-100.0, 0.0);
        let result = matrix_exp(&a).unwrap();

        let e100 = 100.0_f64.exp();
        assert!((result[[0, 0]].re - e100).abs() / e100 < 1e-10);
        assert!(result[[1, 1]].re.abs() < 1e-30);
    }

    #[test]
    fn test_expm_rejects_non_square() {
        let a = Array2::<Complex64>::zeros((2, 3));
        assert!(matrix_exp(&a).is_err());
    }

    // =========================================================================
    // solve_linear
    // =========================================================================

    #[test]
    fn test_solve_linear_recovers_inverse() {
        let a = pauli_x() + pauli_z() * Complex64::new(2.0, 0.0);
        let inv = solve_linear(&a, &identity(2)).unwrap();
        assert_matrix_close(&a.dot(&inv), &identity(2), 1e-12);
    }

    #[test]
    fn test_solve_linear_singular_is_error() {
        let a = Array2::from_elem((2, 2), Complex64::new(1.0, 0.0));
        let err = solve_linear(&a, &identity(2)).unwrap_err();
        assert!(matches!(err, Error::NumericalFailure(_)));
    }

    // =========================================================================
    // eigh
    // =========================================================================

    #[test]
    fn test_eigh_sorted_and_reconstructs() {
        let h = pauli_x() + pauli_y() * Complex64::new(0.5, 0.0) + pauli_z();
        let (values, vectors) = eigh(&h).unwrap();
        assert!(values[0] <= values[1]);
        let expected = (1.0f64 + 0.25 + 1.0).sqrt();
        assert_relative_eq!(values[1], expected, epsilon = 1e-12);

        let diag = Array2::from_diag(&values.mapv(|v| Complex64::new(v, 0.0)));
        let rebuilt = vectors.dot(&diag).dot(&dagger(&vectors));
        assert_matrix_close(&rebuilt, &h, 1e-12);
    }

    #[test]
    fn test_eigh_real_tridiagonal() {
        let t = ndarray::arr2(&[[2.0, 1.0, 0.0], [1.0, 2.0, 1.0], [0.0, 1.0, 2.0]]);
        let (values, _) = eigh_real(&t).unwrap();
        let sqrt2 = 2f64.sqrt();
        assert_relative_eq!(values[0], 2.0 - sqrt2, epsilon = 1e-12);
        assert_relative_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], 2.0 + sqrt2, epsilon = 1e-12);
    }

    // =========================================================================
    // kron / vectorization
    // =========================================================================

    #[test]
    fn test_vec_identity_column_stacking() {
        // vec(A X B) = (Bᵀ ⊗ A) vec(X)
        let a = pauli_x() + pauli_z() * Complex64::new(0.0, 1.0);
        let b = pauli_y();
        let x = ndarray::arr2(&[
            [Complex64::new(1.0, 0.0), Complex64::new(2.0, -1.0)],
            [Complex64::new(0.0, 3.0), Complex64::new(-1.0, 0.0)],
        ]);
        let lhs = vec_columns(&a.dot(&x).dot(&b));
        let rhs = kron(&b.t().to_owned(), &a).dot(&vec_columns(&x));
        assert_matrix_close(&lhs, &rhs, 1e-12);

        assert_eq!(unvec_columns(&vec_columns(&x), 2).unwrap(), x);
    }

    #[test]
    fn test_commutator_of_paulis() {
        // [X, Y] = 2iZ
        let comm = commutator(&pauli_x(), &pauli_y());
        assert_matrix_close(&comm, &(pauli_z() * Complex64::new(0.0, 2.0)), 1e-14);
    }
}
