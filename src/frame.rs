// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rotating frames.
//!
//! A frame is specified by an anti-Hermitian operator `F` (a Hermitian input
//! `H` is interpreted as `F = -iH`). Entering the frame maps a state `y` to
//! `e^{-tF} y` and a generator `G` to `e^{-tF} G e^{tF} - F`.
//!
//! `F` is diagonalized once at construction, `F = U diag(λ) U†` with `λ`
//! purely imaginary. Every time-dependent transformation is then an
//! elementwise phase in the frame basis; no matrix exponential is computed
//! per call.

use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;

use crate::array::linalg::{dagger, eigh, is_hermitian, kron};
use crate::array::{CsrMatrix, Operator, HERMITIAN_ATOL, SPARSE_ATOL};
use crate::error::{Result, ValidationError};

/// Rotating frame with a precomputed eigendecomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatingFrame {
    /// Eigenvalues of the anti-Hermitian frame operator
    frame_diag: Array1<Complex64>,
    /// Eigenvectors as columns; `None` for the identity basis
    frame_basis: Option<Array2<Complex64>>,
    frame_basis_adjoint: Option<Array2<Complex64>>,
}

impl RotatingFrame {
    /// Frame from a square operator, Hermitian or anti-Hermitian.
    pub fn from_operator(operator: &Array2<Complex64>) -> Result<Self> {
        if !operator.is_square() {
            return Err(ValidationError::DimensionMismatch {
                what: "frame_operator (must be square)".into(),
                expected: operator.nrows(),
                actual: operator.ncols(),
            }
            .into());
        }
        let n = operator.nrows();
        if operator.iter().all(|z| z.norm() == 0.0) {
            return Ok(Self::zero(n));
        }

        // H such that F = -iH
        let hermitian = if is_hermitian(operator, HERMITIAN_ATOL) {
            operator.clone()
        } else {
            let h = operator * Complex64::i();
            if !is_hermitian(&h, HERMITIAN_ATOL) {
                return Err(ValidationError::NotHermitian(
                    "frame_operator (or i * frame_operator)".into(),
                )
                .into());
            }
            h
        };

        let (values, vectors) = eigh(&hermitian)?;
        let frame_diag = values.mapv(|d| Complex64::new(0.0, -d));
        let frame_basis_adjoint = dagger(&vectors);
        Ok(Self {
            frame_diag,
            frame_basis: Some(vectors),
            frame_basis_adjoint: Some(frame_basis_adjoint),
        })
    }

    /// Frame from the diagonal of a diagonal operator.
    ///
    /// Real entries are read as a Hermitian diagonal `H` (so `λ = -i h`);
    /// purely imaginary entries as the anti-Hermitian diagonal itself.
    pub fn from_diagonal(diag: &[Complex64]) -> Result<Self> {
        let real = diag.iter().all(|z| z.im.abs() <= HERMITIAN_ATOL);
        let imaginary = diag.iter().all(|z| z.re.abs() <= HERMITIAN_ATOL);
        let frame_diag: Array1<Complex64> = if real {
            diag.iter().map(|z| Complex64::new(0.0, -z.re)).collect()
        } else if imaginary {
            diag.iter().map(|z| Complex64::new(0.0, z.im)).collect()
        } else {
            return Err(ValidationError::NotHermitian("frame diagonal".into()).into());
        };
        Ok(Self {
            frame_diag,
            frame_basis: None,
            frame_basis_adjoint: None,
        })
    }

    /// Frame whose every transformation is the identity.
    pub fn zero(dim: usize) -> Self {
        Self {
            frame_diag: Array1::zeros(dim),
            frame_basis: None,
            frame_basis_adjoint: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.frame_diag.len()
    }

    /// Eigenvalues of the anti-Hermitian frame operator, `λ = -i d` with
    /// `d` ascending.
    pub fn frame_diag(&self) -> &Array1<Complex64> {
        &self.frame_diag
    }

    /// Eigenvector matrix `U` (identity if the frame is diagonal).
    pub fn frame_basis(&self) -> Array2<Complex64> {
        match &self.frame_basis {
            Some(u) => u.clone(),
            None => Array2::eye(self.dim()),
        }
    }

    /// `F = U diag(λ) U†`
    pub fn frame_operator(&self) -> Array2<Complex64> {
        let diag = Array2::from_diag(&self.frame_diag);
        match (&self.frame_basis, &self.frame_basis_adjoint) {
            (Some(u), Some(u_dag)) => u.dot(&diag).dot(u_dag),
            _ => diag,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.frame_diag.iter().all(|z| z.norm() == 0.0)
    }

    /// `U† y`
    pub fn state_into_frame_basis(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame_basis_adjoint {
            Some(u_dag) => u_dag.dot(y),
            None => y.clone(),
        }
    }

    /// `U y`
    pub fn state_out_of_frame_basis(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame_basis {
            Some(u) => u.dot(y),
            None => y.clone(),
        }
    }

    /// `U† A U`
    pub fn operator_into_frame_basis(&self, op: &Operator) -> Operator {
        match (&self.frame_basis, &self.frame_basis_adjoint) {
            (Some(u), Some(u_dag)) => change_basis(op, u_dag, u),
            _ => op.clone(),
        }
    }

    /// `U A U†`
    pub fn operator_out_of_frame_basis(&self, op: &Operator) -> Operator {
        match (&self.frame_basis, &self.frame_basis_adjoint) {
            (Some(u), Some(u_dag)) => change_basis(op, u, u_dag),
            _ => op.clone(),
        }
    }

    /// List version of [`RotatingFrame::operator_into_frame_basis`].
    pub fn operators_into_frame_basis(&self, ops: &[Operator]) -> Vec<Operator> {
        ops.iter().map(|op| self.operator_into_frame_basis(op)).collect()
    }

    /// List version of [`RotatingFrame::operator_out_of_frame_basis`].
    pub fn operators_out_of_frame_basis(&self, ops: &[Operator]) -> Vec<Operator> {
        ops.iter().map(|op| self.operator_out_of_frame_basis(op)).collect()
    }

    /// Dense-matrix version of [`RotatingFrame::operator_into_frame_basis`].
    pub fn matrix_into_frame_basis(&self, a: &Array2<Complex64>) -> Array2<Complex64> {
        match (&self.frame_basis, &self.frame_basis_adjoint) {
            (Some(u), Some(u_dag)) => u_dag.dot(a).dot(u),
            _ => a.clone(),
        }
    }

    /// Dense-matrix version of [`RotatingFrame::operator_out_of_frame_basis`].
    pub fn matrix_out_of_frame_basis(&self, a: &Array2<Complex64>) -> Array2<Complex64> {
        match (&self.frame_basis, &self.frame_basis_adjoint) {
            (Some(u), Some(u_dag)) => u.dot(a).dot(u_dag),
            _ => a.clone(),
        }
    }

    /// `e^{s t λ_i}` for each eigenvalue.
    fn phases(&self, t: f64, sign: f64) -> Array1<Complex64> {
        self.frame_diag.mapv(|l| (l * (sign * t)).exp())
    }

    fn state_phase(
        &self,
        t: f64,
        sign: f64,
        y: &Array2<Complex64>,
        y_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Array2<Complex64> {
        if self.is_zero() {
            return y.clone();
        }
        let mut out = if y_in_frame_basis {
            y.clone()
        } else {
            self.state_into_frame_basis(y)
        };
        let phases = self.phases(t, sign);
        for (mut row, p) in out.axis_iter_mut(Axis(0)).zip(phases.iter()) {
            row.mapv_inplace(|z| z * p);
        }
        if return_in_frame_basis {
            out
        } else {
            self.state_out_of_frame_basis(&out)
        }
    }

    /// `e^{-tF} y`
    ///
    /// # Arguments
    /// * `t` - Time
    /// * `y` - State with `dim` rows (vector as a single column)
    /// * `y_in_frame_basis` - Whether `y` is already in the frame basis
    /// * `return_in_frame_basis` - Whether to leave the result in the frame basis
    pub fn state_into_frame(
        &self,
        t: f64,
        y: &Array2<Complex64>,
        y_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Array2<Complex64> {
        self.state_phase(t, -1.0, y, y_in_frame_basis, return_in_frame_basis)
    }

    /// `e^{tF} y`
    pub fn state_out_of_frame(
        &self,
        t: f64,
        y: &Array2<Complex64>,
        y_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Array2<Complex64> {
        self.state_phase(t, 1.0, y, y_in_frame_basis, return_in_frame_basis)
    }

    /// Conjugate `A` in the frame basis by phases: `A_ij e^{s t (λ_i - λ_j)}`.
    fn conjugate_in_basis(&self, t: f64, sign: f64, op: &Operator) -> Operator {
        let left = self.phases(t, sign);
        let right = self.phases(t, -sign);
        match op {
            Operator::Dense(a) => {
                Operator::Dense(Array2::from_shape_fn(a.dim(), |(i, j)| {
                    a[[i, j]] * left[i] * right[j]
                }))
            }
            Operator::Sparse(a) => {
                Operator::Sparse(a.map_entries(|i, j, z| z * left[i] * right[j]))
            }
        }
    }

    fn operator_phase(
        &self,
        t: f64,
        sign: f64,
        op: &Operator,
        operator_in_frame_basis: bool,
        return_in_frame_basis: bool,
        generator_shift: f64,
    ) -> Operator {
        if self.is_zero() {
            return op.clone();
        }
        let in_basis = if operator_in_frame_basis {
            op.clone()
        } else {
            self.operator_into_frame_basis(op)
        };

        // generator_out_of_frame adds F before conjugating
        let shifted_in = if sign > 0.0 && generator_shift != 0.0 {
            add_diag(&in_basis, &self.frame_diag, generator_shift)
        } else {
            in_basis
        };
        let mut out = self.conjugate_in_basis(t, sign, &shifted_in);
        if sign < 0.0 && generator_shift != 0.0 {
            out = add_diag(&out, &self.frame_diag, generator_shift);
        }

        if return_in_frame_basis {
            out
        } else {
            self.operator_out_of_frame_basis(&out)
        }
    }

    /// `e^{-tF} A e^{tF}`
    pub fn operator_into_frame(
        &self,
        t: f64,
        op: &Operator,
        operator_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Operator {
        self.operator_phase(t, -1.0, op, operator_in_frame_basis, return_in_frame_basis, 0.0)
    }

    /// `e^{tF} A e^{-tF}`
    pub fn operator_out_of_frame(
        &self,
        t: f64,
        op: &Operator,
        operator_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Operator {
        self.operator_phase(t, 1.0, op, operator_in_frame_basis, return_in_frame_basis, 0.0)
    }

    /// `e^{-tF} G e^{tF} - F`
    pub fn generator_into_frame(
        &self,
        t: f64,
        op: &Operator,
        operator_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Operator {
        self.operator_phase(t, -1.0, op, operator_in_frame_basis, return_in_frame_basis, -1.0)
    }

    /// `e^{tF} (G + F) e^{-tF}`, the inverse of [`RotatingFrame::generator_into_frame`].
    pub fn generator_out_of_frame(
        &self,
        t: f64,
        op: &Operator,
        operator_in_frame_basis: bool,
        return_in_frame_basis: bool,
    ) -> Operator {
        self.operator_phase(t, 1.0, op, operator_in_frame_basis, return_in_frame_basis, 1.0)
    }

    /// Frame for column-stacked density matrices.
    ///
    /// `F_v = I ⊗ F − Fᵀ ⊗ I`, eigenvalue `λ_i − λ_j` at index `i + n j`,
    /// basis `conj(U) ⊗ U`.
    pub fn vectorized(&self) -> RotatingFrame {
        let n = self.dim();
        let frame_diag =
            Array1::from_shape_fn(n * n, |k| self.frame_diag[k % n] - self.frame_diag[k / n]);
        let frame_basis = self
            .frame_basis
            .as_ref()
            .map(|u| kron(&u.mapv(|z| z.conj()), u));
        let frame_basis_adjoint = frame_basis.as_ref().map(dagger);
        RotatingFrame {
            frame_diag,
            frame_basis,
            frame_basis_adjoint,
        }
    }
}

fn change_basis(op: &Operator, left: &Array2<Complex64>, right: &Array2<Complex64>) -> Operator {
    match op {
        Operator::Dense(a) => Operator::Dense(left.dot(a).dot(right)),
        Operator::Sparse(a) => {
            let dense = a.rdot_dense(left).dot(right);
            Operator::Sparse(CsrMatrix::from_dense(&dense, SPARSE_ATOL))
        }
    }
}

/// `op + scale * diag(d)`
fn add_diag(op: &Operator, d: &Array1<Complex64>, scale: f64) -> Operator {
    let s = Complex64::new(scale, 0.0);
    match op {
        Operator::Dense(a) => {
            let mut out = a.clone();
            for (k, &dk) in d.iter().enumerate() {
                out[[k, k]] += s * dk;
            }
            Operator::Dense(out)
        }
        Operator::Sparse(a) => {
            let diag: Vec<Complex64> = d.iter().map(|&dk| s * dk).collect();
            Operator::Sparse(a.add(&CsrMatrix::from_diag(&diag)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::linalg::matrix_exp;
    use crate::array::ArrayLibrary;
    use crate::test_utils::{assert_matrix_close, c, column, pauli_x, pauli_y, pauli_z};

    fn frame_h() -> Array2<Complex64> {
        pauli_z() * c(0.7, 0.0) + pauli_x() * c(0.3, 0.0)
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn test_hermitian_input_becomes_anti_hermitian() {
        let h = frame_h();
        let frame = RotatingFrame::from_operator(&h).unwrap();
        assert_matrix_close(&frame.frame_operator(), &(&h * c(0.0, -1.0)), 1e-12);
        // ascending eigenvalues of H, λ = -i d
        assert!(frame.frame_diag()[0].im > frame.frame_diag()[1].im);
    }

    #[test]
    fn test_anti_hermitian_input_kept() {
        let f = frame_h() * c(0.0, -1.0);
        let frame = RotatingFrame::from_operator(&f).unwrap();
        assert_matrix_close(&frame.frame_operator(), &f, 1e-12);
    }

    #[test]
    fn test_non_hermitian_rejected() {
        let bad = pauli_x() + pauli_y() * c(0.0, 1.0);
        assert!(RotatingFrame::from_operator(&bad).is_err());
        assert!(RotatingFrame::from_diagonal(&[c(1.0, 1.0), c(0.0, 0.0)]).is_err());
    }

    #[test]
    fn test_diagonal_frame() {
        let frame = RotatingFrame::from_diagonal(&[c(1.0, 0.0), c(-1.0, 0.0)]).unwrap();
        assert_eq!(frame.frame_diag()[0], c(0.0, -1.0));
        assert_matrix_close(&frame.frame_basis(), &Array2::eye(2), 1e-15);
    }

    // =========================================================================
    // Basis round trips
    // =========================================================================

    #[test]
    fn test_operator_basis_round_trip_dense() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let a = Operator::Dense(pauli_y() + pauli_x() * c(0.0, 2.0));
        let back = frame.operator_out_of_frame_basis(&frame.operator_into_frame_basis(&a));
        assert_matrix_close(&back.to_dense(), &a.to_dense(), 1e-12);
    }

    #[test]
    fn test_operator_basis_round_trip_sparse_list() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let ops: Vec<Operator> = [pauli_x(), pauli_y(), pauli_z()]
            .into_iter()
            .map(|m| Operator::Dense(m).into_library(ArrayLibrary::Sparse))
            .collect();
        let into = frame.operators_into_frame_basis(&ops);
        assert!(into.iter().all(|op| matches!(op, Operator::Sparse(_))));
        let back = frame.operators_out_of_frame_basis(&into);
        for (orig, rt) in ops.iter().zip(&back) {
            assert!(matches!(rt, Operator::Sparse(_)));
            assert_matrix_close(&rt.to_dense(), &orig.to_dense(), 1e-12);
        }
    }

    #[test]
    fn test_state_basis_round_trip() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let y = column(&[c(0.6, 0.0), c(0.0, 0.8)]);
        let back = frame.state_out_of_frame_basis(&frame.state_into_frame_basis(&y));
        assert_matrix_close(&back, &y, 1e-12);
    }

    // =========================================================================
    // Time-dependent transformations
    // =========================================================================

    #[test]
    fn test_state_into_frame_matches_expm() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let f = frame.frame_operator();
        let t = 1.3;
        let y = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let expected = matrix_exp(&(&f * c(-t, 0.0))).unwrap().dot(&y);
        assert_matrix_close(&frame.state_into_frame(t, &y, false, false), &expected, 1e-12);

        let back = frame.state_out_of_frame(t, &expected, false, false);
        assert_matrix_close(&back, &y, 1e-12);
    }

    #[test]
    fn test_generator_into_frame_matches_expm() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let f = frame.frame_operator();
        let t = 0.45;
        let g = pauli_y() * c(0.0, -1.0) + pauli_z() * c(0.0, -0.5);
        let e_minus = matrix_exp(&(&f * c(-t, 0.0))).unwrap();
        let e_plus = matrix_exp(&(&f * c(t, 0.0))).unwrap();
        let expected = e_minus.dot(&g).dot(&e_plus) - &f;

        let got = frame.generator_into_frame(t, &Operator::Dense(g.clone()), false, false);
        assert_matrix_close(&got.to_dense(), &expected, 1e-12);

        let back = frame.generator_out_of_frame(t, &got, false, false);
        assert_matrix_close(&back.to_dense(), &g, 1e-12);
    }

    #[test]
    fn test_sparse_generator_into_frame_matches_dense() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let g = Operator::Dense(pauli_y() * c(0.0, -1.0));
        let gs = g.clone().into_library(ArrayLibrary::Sparse);
        let dense = frame.generator_into_frame(0.8, &g, false, true);
        let sparse = frame.generator_into_frame(0.8, &gs, false, true);
        assert!(matches!(sparse, Operator::Sparse(_)));
        assert_matrix_close(&sparse.to_dense(), &dense.to_dense(), 1e-12);
    }

    #[test]
    fn test_zero_frame_is_identity() {
        let frame = RotatingFrame::from_operator(&Array2::zeros((2, 2))).unwrap();
        assert!(frame.is_zero());
        let y = column(&[c(0.6, 0.1), c(0.0, 0.8)]);
        let a = Operator::Dense(pauli_y());
        assert_eq!(frame.state_into_frame(2.0, &y, false, false), y);
        assert_eq!(frame.state_out_of_frame(2.0, &y, false, false), y);
        assert_eq!(frame.operator_into_frame(2.0, &a, false, false), a);
        assert_eq!(frame.generator_into_frame(2.0, &a, false, false), a);
        assert_eq!(frame.operator_into_frame_basis(&a), a);
    }

    #[test]
    fn test_vectorized_frame_matches_superoperator() {
        let frame = RotatingFrame::from_operator(&frame_h()).unwrap();
        let f = frame.frame_operator();
        let eye = Array2::<Complex64>::eye(2);
        let f_vec = kron(&eye, &f) - kron(&f.t().to_owned(), &eye);
        let vframe = frame.vectorized();
        assert_eq!(vframe.dim(), 4);
        assert_matrix_close(&vframe.frame_operator(), &f_vec, 1e-12);
    }
}
