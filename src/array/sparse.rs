// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compressed sparse row matrices.
//!
//! Only the operations the models need: products with dense blocks from
//! either side, linear combinations, adjoints, and dense conversion.

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{Result, ValidationError};

/// Complex CSR matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<Complex64>,
}

impl CsrMatrix {
    /// All-zero matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            indptr: vec![0; nrows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn identity(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            data: vec![Complex64::new(1.0, 0.0); n],
        }
    }

    /// Build from a dense matrix, dropping entries with `|z| <= atol`.
    pub fn from_dense(m: &Array2<Complex64>, atol: f64) -> Self {
        let (nrows, ncols) = m.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in m.rows() {
            for (j, &z) in row.iter().enumerate() {
                if z.norm() > atol {
                    indices.push(j);
                    data.push(z);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    /// Build from `(row, col, value)` triplets. Duplicates are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, Complex64)],
    ) -> Result<Self> {
        let mut rows: Vec<Vec<(usize, Complex64)>> = vec![Vec::new(); nrows];
        for &(i, j, z) in triplets {
            if i >= nrows || j >= ncols {
                return Err(ValidationError::Field {
                    field: "triplets".into(),
                    message: format!("entry ({}, {}) outside {}x{} matrix", i, j, nrows, ncols),
                }
                .into());
            }
            rows[i].push((j, z));
        }
        Ok(Self::from_rows(nrows, ncols, rows))
    }

    fn from_rows(nrows: usize, ncols: usize, rows: Vec<Vec<(usize, Complex64)>>) -> Self {
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for mut row in rows {
            row.sort_by_key(|&(j, _)| j);
            let mut last: Option<usize> = None;
            for (j, z) in row {
                if last == Some(j) {
                    if let Some(v) = data.last_mut() {
                        *v += z;
                    }
                } else {
                    indices.push(j);
                    data.push(z);
                    last = Some(j);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Iterate stored entries as `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Complex64)> + '_ {
        (0..self.nrows).flat_map(move |i| {
            (self.indptr[i]..self.indptr[i + 1]).map(move |k| (i, self.indices[k], self.data[k]))
        })
    }

    pub fn get(&self, i: usize, j: usize) -> Complex64 {
        if i >= self.nrows {
            return Complex64::new(0.0, 0.0);
        }
        let row = &self.indices[self.indptr[i]..self.indptr[i + 1]];
        match row.binary_search(&j) {
            Ok(pos) => self.data[self.indptr[i] + pos],
            Err(_) => Complex64::new(0.0, 0.0),
        }
    }

    pub fn to_dense(&self) -> Array2<Complex64> {
        let mut out = Array2::zeros((self.nrows, self.ncols));
        for (i, j, z) in self.iter() {
            out[[i, j]] += z;
        }
        out
    }

    /// `self @ y` for a dense block `y`.
    pub fn dot_dense(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        let mut out = Array2::zeros((self.nrows, y.ncols()));
        self.accumulate_dot(Complex64::new(1.0, 0.0), y, &mut out);
        out
    }

    /// `out += alpha * (self @ y)`
    pub fn accumulate_dot(&self, alpha: Complex64, y: &Array2<Complex64>, out: &mut Array2<Complex64>) {
        for i in 0..self.nrows {
            let mut out_row = out.row_mut(i);
            for k in self.indptr[i]..self.indptr[i + 1] {
                let a = alpha * self.data[k];
                out_row.scaled_add(a, &y.row(self.indices[k]));
            }
        }
    }

    /// `y @ self` for a dense block `y`.
    pub fn rdot_dense(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        let mut out = Array2::zeros((y.nrows(), self.ncols));
        for (i, j, z) in self.iter() {
            out.column_mut(j).scaled_add(z, &y.column(i));
        }
        out
    }

    pub fn scale(&self, c: Complex64) -> Self {
        Self {
            data: self.data.iter().map(|&z| z * c).collect(),
            ..self.clone()
        }
    }

    /// Σ c_k M_k over matrices of a common shape.
    pub fn linear_combination(
        nrows: usize,
        ncols: usize,
        terms: &[(Complex64, &CsrMatrix)],
    ) -> Self {
        let mut rows: Vec<Vec<(usize, Complex64)>> = vec![Vec::new(); nrows];
        for &(c, m) in terms {
            if c == Complex64::new(0.0, 0.0) {
                continue;
            }
            for (i, j, z) in m.iter() {
                if i < nrows && j < ncols {
                    rows[i].push((j, c * z));
                }
            }
        }
        Self::from_rows(nrows, ncols, rows)
    }

    pub fn add(&self, other: &CsrMatrix) -> Self {
        let one = Complex64::new(1.0, 0.0);
        Self::linear_combination(self.nrows, self.ncols, &[(one, self), (one, other)])
    }

    pub fn transpose(&self) -> Self {
        let mut rows: Vec<Vec<(usize, Complex64)>> = vec![Vec::new(); self.ncols];
        for (i, j, z) in self.iter() {
            rows[j].push((i, z));
        }
        Self::from_rows(self.ncols, self.nrows, rows)
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> Self {
        let t = self.transpose();
        Self {
            data: t.data.iter().map(|z| z.conj()).collect(),
            ..t
        }
    }

    /// Frobenius norm over the stored entries.
    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
    }

    pub fn is_hermitian(&self, tol: f64) -> bool {
        if self.nrows != self.ncols {
            return false;
        }
        let diff = Self::linear_combination(
            self.nrows,
            self.ncols,
            &[
                (Complex64::new(1.0, 0.0), self),
                (Complex64::new(-1.0, 0.0), &self.adjoint()),
            ],
        );
        diff.data.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt() <= tol
    }

    /// Sparse Kronecker product.
    pub fn kron(&self, other: &CsrMatrix) -> Self {
        let nrows = self.nrows * other.nrows;
        let ncols = self.ncols * other.ncols;
        let mut rows: Vec<Vec<(usize, Complex64)>> = vec![Vec::new(); nrows];
        for (i, j, a) in self.iter() {
            for (k, l, b) in other.iter() {
                rows[i * other.nrows + k].push((j * other.ncols + l, a * b));
            }
        }
        Self::from_rows(nrows, ncols, rows)
    }

    pub fn conj(&self) -> Self {
        Self {
            data: self.data.iter().map(|z| z.conj()).collect(),
            ..self.clone()
        }
    }

    /// Apply `f(row, col, value)` to every stored entry, keeping the pattern.
    pub fn map_entries(&self, f: impl Fn(usize, usize, Complex64) -> Complex64) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for (i, j, z) in self.iter() {
            data.push(f(i, j, z));
        }
        Self {
            data,
            ..self.clone()
        }
    }

    /// Sparse diagonal matrix.
    pub fn from_diag(diag: &[Complex64]) -> Self {
        let n = diag.len();
        Self {
            nrows: n,
            ncols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            data: diag.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::linalg::{frobenius_norm, kron as dense_kron};
    use approx::assert_relative_eq;
    use crate::test_utils::{assert_matrix_close, c, pauli_x, pauli_y, sigma_minus};

    #[test]
    fn test_from_dense_round_trip() {
        let y = pauli_y();
        let s = CsrMatrix::from_dense(&y, 0.0);
        assert_eq!(s.nnz(), 2);
        assert_eq!(s.to_dense(), y);
        assert_eq!(s.get(0, 1), c(0.0, -1.0));
        assert_eq!(s.get(0, 0), c(0.0, 0.0));
    }

    #[test]
    fn test_triplets_sum_duplicates() {
        let s = CsrMatrix::from_triplets(2, 2, &[(0, 1, c(1.0, 0.0)), (0, 1, c(2.0, 0.0))])
            .unwrap();
        assert_eq!(s.nnz(), 1);
        assert_eq!(s.get(0, 1), c(3.0, 0.0));
        assert!(CsrMatrix::from_triplets(2, 2, &[(2, 0, c(1.0, 0.0))]).is_err());
    }

    #[test]
    fn test_products_match_dense() {
        let a = pauli_x() + pauli_y() * c(0.0, 2.0) + sigma_minus();
        let s = CsrMatrix::from_dense(&a, 0.0);
        let y = pauli_y() + sigma_minus() * c(3.0, 1.0);
        assert_matrix_close(&s.dot_dense(&y), &a.dot(&y), 1e-14);
        assert_matrix_close(&s.rdot_dense(&y), &y.dot(&a), 1e-14);
    }

    #[test]
    fn test_linear_combination_and_adjoint() {
        let x = CsrMatrix::from_dense(&pauli_x(), 0.0);
        let sm = CsrMatrix::from_dense(&sigma_minus(), 0.0);
        let comb = CsrMatrix::linear_combination(2, 2, &[(c(2.0, 0.0), &x), (c(0.0, 1.0), &sm)]);
        let expected = pauli_x() * c(2.0, 0.0) + sigma_minus() * c(0.0, 1.0);
        assert_matrix_close(&comb.to_dense(), &expected, 1e-14);

        let adj = comb.adjoint().to_dense();
        assert_matrix_close(&adj, &expected.t().mapv(|z| z.conj()), 1e-14);
        assert!(x.is_hermitian(1e-12));
        assert!(!sm.is_hermitian(1e-12));
    }

    #[test]
    fn test_frobenius_norm_matches_dense() {
        let a = pauli_x() * c(2.0, 0.0) + sigma_minus() * c(0.0, 3.0);
        let s = CsrMatrix::from_dense(&a, 0.0);
        assert_relative_eq!(s.frobenius_norm(), frobenius_norm(&a), epsilon = 1e-14);
        assert_eq!(CsrMatrix::zeros(3, 3).frobenius_norm(), 0.0);
    }

    #[test]
    fn test_kron_matches_dense() {
        let x = pauli_x();
        let sm = sigma_minus();
        let s = CsrMatrix::from_dense(&x, 0.0).kron(&CsrMatrix::from_dense(&sm, 0.0));
        assert_matrix_close(&s.to_dense(), &dense_kron(&x, &sm), 1e-14);
    }
}
