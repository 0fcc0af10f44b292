// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Array representations for operators.
//!
//! Every model stores its operators through an [`OperatorCollection`], one
//! implementation per [`ArrayLibrary`]. The library is picked explicitly at
//! construction; there is no process-wide default.
//!
//! - [`ArrayLibrary::Dense`]: `ndarray::Array2<Complex64>`
//! - [`ArrayLibrary::Sparse`]: compressed sparse row ([`CsrMatrix`])

pub mod collection;
pub mod linalg;
pub mod sparse;

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use collection::{
    build_collection, DenseOperatorCollection, OperatorCollection, SparseOperatorCollection,
};
pub use sparse::CsrMatrix;

/// Entries with magnitude below this are dropped when converting to sparse.
pub const SPARSE_ATOL: f64 = 1e-14;

/// Tolerance for Hermiticity checks (Frobenius norm of `A - A†`).
pub const HERMITIAN_ATOL: f64 = 1e-10;

/// Array library used to store and evaluate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayLibrary {
    /// Dense complex matrices
    #[default]
    #[serde(alias = "numpy")]
    Dense,
    /// Compressed sparse row matrices
    #[serde(alias = "scipy_sparse", alias = "csr")]
    Sparse,
}

/// Whether the step function of a solver may be compiled for a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileSupport {
    /// Library is known to work with the compiled step kernel
    Supported,
    /// Library is declared incompatible; never compile
    Unsupported,
    /// Nothing is known (custom right-hand sides, external solvers)
    Unknown,
}

impl ArrayLibrary {
    /// Declared compatibility with compiled (cached) step kernels.
    pub fn compile_support(&self) -> CompileSupport {
        match self {
            ArrayLibrary::Dense => CompileSupport::Supported,
            ArrayLibrary::Sparse => CompileSupport::Unsupported,
        }
    }

    /// All known tags, for CLI listings.
    pub fn tags() -> &'static [&'static str] {
        &["dense", "numpy", "sparse", "scipy_sparse", "csr"]
    }
}

impl fmt::Display for ArrayLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayLibrary::Dense => write!(f, "dense"),
            ArrayLibrary::Sparse => write!(f, "sparse"),
        }
    }
}

impl FromStr for ArrayLibrary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dense" | "numpy" => Ok(ArrayLibrary::Dense),
            "sparse" | "scipy_sparse" | "csr" => Ok(ArrayLibrary::Sparse),
            other => Err(Error::field(
                "array_library",
                format!("unknown array library '{}'", other),
            )),
        }
    }
}

/// A square (or rectangular, for states) complex operator in one of the
/// supported representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Dense(Array2<Complex64>),
    Sparse(CsrMatrix),
}

impl Operator {
    pub fn nrows(&self) -> usize {
        match self {
            Operator::Dense(m) => m.nrows(),
            Operator::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Operator::Dense(m) => m.ncols(),
            Operator::Sparse(m) => m.ncols(),
        }
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Library this operator is stored in.
    pub fn array_library(&self) -> ArrayLibrary {
        match self {
            Operator::Dense(_) => ArrayLibrary::Dense,
            Operator::Sparse(_) => ArrayLibrary::Sparse,
        }
    }

    pub fn to_dense(&self) -> Array2<Complex64> {
        match self {
            Operator::Dense(m) => m.clone(),
            Operator::Sparse(m) => m.to_dense(),
        }
    }

    pub fn into_dense(self) -> Array2<Complex64> {
        match self {
            Operator::Dense(m) => m,
            Operator::Sparse(m) => m.to_dense(),
        }
    }

    /// Convert to the given library.
    pub fn into_library(self, library: ArrayLibrary) -> Operator {
        match (self, library) {
            (Operator::Dense(m), ArrayLibrary::Sparse) => {
                Operator::Sparse(CsrMatrix::from_dense(&m, SPARSE_ATOL))
            }
            (Operator::Sparse(m), ArrayLibrary::Dense) => Operator::Dense(m.to_dense()),
            (op, _) => op,
        }
    }

    /// `self @ y`
    pub fn dot(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        match self {
            Operator::Dense(m) => m.dot(y),
            Operator::Sparse(m) => m.dot_dense(y),
        }
    }

    /// `y @ self`
    pub fn rdot(&self, y: &Array2<Complex64>) -> Array2<Complex64> {
        match self {
            Operator::Dense(m) => y.dot(m),
            Operator::Sparse(m) => m.rdot_dense(y),
        }
    }

    pub fn scale(&self, c: Complex64) -> Operator {
        match self {
            Operator::Dense(m) => Operator::Dense(m * c),
            Operator::Sparse(m) => Operator::Sparse(m.scale(c)),
        }
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> Operator {
        match self {
            Operator::Dense(m) => Operator::Dense(linalg::dagger(m)),
            Operator::Sparse(m) => Operator::Sparse(m.adjoint()),
        }
    }

    /// Frobenius norm, without densifying sparse storage.
    pub fn frobenius_norm(&self) -> f64 {
        match self {
            Operator::Dense(m) => linalg::frobenius_norm(m),
            Operator::Sparse(m) => m.frobenius_norm(),
        }
    }

    pub fn is_hermitian(&self, tol: f64) -> bool {
        match self {
            Operator::Dense(m) => linalg::is_hermitian(m, tol),
            Operator::Sparse(m) => m.is_hermitian(tol),
        }
    }
}

impl From<Array2<Complex64>> for Operator {
    fn from(m: Array2<Complex64>) -> Self {
        Operator::Dense(m)
    }
}

impl From<CsrMatrix> for Operator {
    fn from(m: CsrMatrix) -> Self {
        Operator::Sparse(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pauli_x, pauli_y};

    #[test]
    fn test_array_library_from_str() {
        assert_eq!("numpy".parse::<ArrayLibrary>().unwrap(), ArrayLibrary::Dense);
        assert_eq!("dense".parse::<ArrayLibrary>().unwrap(), ArrayLibrary::Dense);
        assert_eq!(
            "scipy_sparse".parse::<ArrayLibrary>().unwrap(),
            ArrayLibrary::Sparse
        );
        assert!("jax_bcoo".parse::<ArrayLibrary>().is_err());
    }

    #[test]
    fn test_array_library_serde_aliases() {
        let lib: ArrayLibrary = serde_yaml::from_str("scipy_sparse").unwrap();
        assert_eq!(lib, ArrayLibrary::Sparse);
        let lib: ArrayLibrary = serde_yaml::from_str("dense").unwrap();
        assert_eq!(lib, ArrayLibrary::Dense);
    }

    #[test]
    fn test_compile_support() {
        assert_eq!(ArrayLibrary::Dense.compile_support(), CompileSupport::Supported);
        assert_eq!(
            ArrayLibrary::Sparse.compile_support(),
            CompileSupport::Unsupported
        );
    }

    #[test]
    fn test_operator_dense_sparse_dot_agree() {
        let x = Operator::Dense(pauli_x());
        let xs = x.clone().into_library(ArrayLibrary::Sparse);
        assert_eq!(xs.array_library(), ArrayLibrary::Sparse);

        let y = pauli_y();
        assert_eq!(x.dot(&y), xs.dot(&y));
        assert_eq!(x.rdot(&y), xs.rdot(&y));
    }

    #[test]
    fn test_operator_hermitian_check() {
        assert!(Operator::Dense(pauli_y()).is_hermitian(HERMITIAN_ATOL));
        let anti = Operator::Dense(pauli_y()).scale(Complex64::i());
        assert!(!anti.is_hermitian(HERMITIAN_ATOL));
        assert!(!anti
            .into_library(ArrayLibrary::Sparse)
            .is_hermitian(HERMITIAN_ATOL));
    }

    #[test]
    fn test_operator_frobenius_norm_dense_and_sparse() {
        let x = Operator::Dense(pauli_x());
        assert!((x.frobenius_norm() - 2f64.sqrt()).abs() < 1e-14);
        let xs = x.into_library(ArrayLibrary::Sparse);
        assert!((xs.frobenius_norm() - 2f64.sqrt()).abs() < 1e-14);
    }
}
