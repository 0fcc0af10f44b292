// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Quantum states with dimension metadata.
//!
//! A [`State`] keeps its kind and subsystem dimensions through a solve, so a
//! two-qutrit density matrix goes in and a two-qutrit density matrix comes
//! out.

use std::fmt;

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::array::linalg::dagger;
use crate::error::{Error, Result, ValidationError};

/// What the matrix of a [`State`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Pure state, stored as an `n x 1` column
    Statevector,
    /// Density matrix, `n x n`
    DensityMatrix,
    /// Propagator or other operator evolved as `U(t) y0`, `n x n`
    Operator,
    /// Array without quantum-state semantics, any number of columns
    Raw,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateKind::Statevector => "statevector",
            StateKind::DensityMatrix => "density_matrix",
            StateKind::Operator => "operator",
            StateKind::Raw => "raw",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    data: Array2<Complex64>,
    kind: StateKind,
    subsystem_dims: Vec<usize>,
}

impl State {
    fn build(data: Array2<Complex64>, kind: StateKind) -> Result<Self> {
        let n = data.nrows();
        let shape_ok = match kind {
            StateKind::Statevector => data.ncols() == 1,
            StateKind::DensityMatrix | StateKind::Operator => data.is_square(),
            StateKind::Raw => true,
        };
        if !shape_ok || n == 0 {
            return Err(ValidationError::DimensionMismatch {
                what: format!("{} columns", kind),
                expected: if kind == StateKind::Statevector { 1 } else { n },
                actual: data.ncols(),
            }
            .into());
        }
        Ok(Self {
            data,
            kind,
            subsystem_dims: vec![n],
        })
    }

    pub fn statevector(amplitudes: &[Complex64]) -> Result<Self> {
        let data = Array1::from(amplitudes.to_vec()).insert_axis(ndarray::Axis(1));
        Self::build(data, StateKind::Statevector)
    }

    pub fn density_matrix(rho: Array2<Complex64>) -> Result<Self> {
        Self::build(rho, StateKind::DensityMatrix)
    }

    pub fn operator(op: Array2<Complex64>) -> Result<Self> {
        Self::build(op, StateKind::Operator)
    }

    pub fn raw(data: Array2<Complex64>) -> Result<Self> {
        Self::build(data, StateKind::Raw)
    }

    /// Computational basis state `|index⟩`.
    pub fn basis(dim: usize, index: usize) -> Result<Self> {
        if index >= dim {
            return Err(Error::field(
                "index",
                format!("basis index {} out of range for dimension {}", index, dim),
            ));
        }
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); dim];
        amplitudes[index] = Complex64::new(1.0, 0.0);
        Self::statevector(&amplitudes)
    }

    /// Attach subsystem dimensions; their product must equal the state dimension.
    pub fn with_subsystem_dims(mut self, dims: Vec<usize>) -> Result<Self> {
        let product: usize = dims.iter().product();
        if dims.is_empty() || product != self.dim() {
            return Err(ValidationError::DimensionMismatch {
                what: "product of subsystem_dims".into(),
                expected: self.dim(),
                actual: product,
            }
            .into());
        }
        self.subsystem_dims = dims;
        Ok(self)
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn subsystem_dims(&self) -> &[usize] {
        &self.subsystem_dims
    }

    /// Hilbert space dimension.
    pub fn dim(&self) -> usize {
        self.data.nrows()
    }

    pub fn data(&self) -> &Array2<Complex64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<Complex64> {
        self.data
    }

    /// Same kind and dimensions, new data.
    pub(crate) fn with_data(&self, data: Array2<Complex64>) -> Result<Self> {
        let mut out = Self::build(data, self.kind)?;
        if out.dim() != self.dim() {
            return Err(ValidationError::DimensionMismatch {
                what: "evolved state".into(),
                expected: self.dim(),
                actual: out.dim(),
            }
            .into());
        }
        out.subsystem_dims = self.subsystem_dims.clone();
        Ok(out)
    }

    /// `|ψ⟩⟨ψ|` for a statevector; a density matrix is returned unchanged.
    pub fn to_density_matrix(&self) -> Result<Self> {
        match self.kind {
            StateKind::Statevector => Ok(Self {
                data: self.data.dot(&dagger(&self.data)),
                kind: StateKind::DensityMatrix,
                subsystem_dims: self.subsystem_dims.clone(),
            }),
            StateKind::DensityMatrix => Ok(self.clone()),
            other => Err(Error::field(
                "state",
                format!("cannot interpret a {} as a density matrix", other),
            )),
        }
    }

    /// Computational-basis populations.
    pub fn probabilities(&self) -> Result<Vec<f64>> {
        match self.kind {
            StateKind::Statevector => Ok(self.data.iter().map(|z| z.norm_sqr()).collect()),
            StateKind::DensityMatrix => Ok(self.data.diag().iter().map(|z| z.re).collect()),
            other => Err(Error::field(
                "state",
                format!("a {} has no populations", other),
            )),
        }
    }

    /// `‖ψ‖²` or `tr ρ`.
    pub fn trace(&self) -> Complex64 {
        match self.kind {
            StateKind::Statevector => Complex64::new(self.data.iter().map(|z| z.norm_sqr()).sum(), 0.0),
            _ => self.data.diag().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::test_utils::c;

    #[test]
    fn test_constructors_validate_shape() {
        assert!(State::statevector(&[c(1.0, 0.0), c(0.0, 0.0)]).is_ok());
        assert!(State::statevector(&[]).is_err());
        assert!(State::density_matrix(Array2::zeros((2, 3))).is_err());
        assert!(State::operator(Array2::eye(3)).is_ok());
        assert!(State::raw(Array2::zeros((4, 2))).is_ok());
        assert!(State::basis(2, 2).is_err());
    }

    #[test]
    fn test_subsystem_dims() {
        let s = State::basis(6, 1).unwrap();
        assert_eq!(s.subsystem_dims(), &[6]);
        let s = s.with_subsystem_dims(vec![2, 3]).unwrap();
        assert_eq!(s.subsystem_dims(), &[2, 3]);
        assert!(State::basis(6, 1).unwrap().with_subsystem_dims(vec![4, 2]).is_err());
    }

    #[test]
    fn test_density_matrix_keeps_dims() {
        let s = 1.0 / 2f64.sqrt();
        let psi = State::statevector(&[c(s, 0.0), c(0.0, 0.0), c(0.0, s), c(0.0, 0.0)])
            .unwrap()
            .with_subsystem_dims(vec![2, 2])
            .unwrap();
        let rho = psi.to_density_matrix().unwrap();
        assert_eq!(rho.kind(), StateKind::DensityMatrix);
        assert_eq!(rho.subsystem_dims(), &[2, 2]);
        assert_relative_eq!(rho.trace().re, 1.0, epsilon = 1e-15);
        assert_relative_eq!(rho.data()[[0, 2]].im, -0.5, epsilon = 1e-15);
        let p = rho.probabilities().unwrap();
        assert_relative_eq!(p[0], 0.5, epsilon = 1e-15);
        assert_relative_eq!(p[2], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_with_data_preserves_metadata() {
        let psi = State::basis(4, 0).unwrap().with_subsystem_dims(vec![2, 2]).unwrap();
        let evolved = psi.with_data(State::basis(4, 3).unwrap().into_data()).unwrap();
        assert_eq!(evolved.kind(), StateKind::Statevector);
        assert_eq!(evolved.subsystem_dims(), &[2, 2]);
        assert!(psi.with_data(Array2::zeros((3, 1))).is_err());
    }
}
