// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator collections: a static operator plus a list of operators that are
//! combined linearly with time-dependent coefficients.

use std::fmt;
use std::sync::Arc;

use ndarray::linalg::general_mat_mul;
use ndarray::Array2;
use num_complex::Complex64;

use super::{ArrayLibrary, CsrMatrix, Operator, SPARSE_ATOL};
use crate::error::{Error, Result, ValidationError};

/// Evaluation of `static + Σ c_j A_j` in one array library.
pub trait OperatorCollection: fmt::Debug + Send + Sync {
    /// Library the operators are stored in.
    fn array_library(&self) -> ArrayLibrary;

    /// Dimension of the (square) operators.
    fn dim(&self) -> usize;

    /// Number of coefficient-modulated operators.
    fn num_operators(&self) -> usize;

    fn static_operator(&self) -> Option<Operator>;

    fn operators(&self) -> Vec<Operator>;

    /// `static + Σ c_j A_j`
    fn evaluate(&self, coefficients: &[Complex64]) -> Result<Operator>;

    /// `(static + Σ c_j A_j) @ y`, accumulated operator by operator.
    fn evaluate_rhs(
        &self,
        coefficients: &[Complex64],
        y: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>>;
}

fn check_coefficients(expected: usize, coefficients: &[Complex64]) -> Result<()> {
    if coefficients.len() != expected {
        return Err(ValidationError::CountMismatch {
            what: "operator coefficients".into(),
            expected,
            actual: coefficients.len(),
        }
        .into());
    }
    Ok(())
}

fn check_rhs(dim: usize, y: &Array2<Complex64>) -> Result<()> {
    if y.nrows() != dim {
        return Err(ValidationError::DimensionMismatch {
            what: "state rows".into(),
            expected: dim,
            actual: y.nrows(),
        }
        .into());
    }
    Ok(())
}

/// Dense storage.
#[derive(Debug, Clone)]
pub struct DenseOperatorCollection {
    dim: usize,
    static_operator: Option<Array2<Complex64>>,
    operators: Vec<Array2<Complex64>>,
}

impl DenseOperatorCollection {
    pub fn new(
        static_operator: Option<Array2<Complex64>>,
        operators: Vec<Array2<Complex64>>,
    ) -> Result<Self> {
        let dim = validate_dims(
            static_operator.as_ref().map(|m| m.dim()),
            operators.iter().map(|m| m.dim()),
        )?;
        Ok(Self {
            dim,
            static_operator,
            operators,
        })
    }
}

impl OperatorCollection for DenseOperatorCollection {
    fn array_library(&self) -> ArrayLibrary {
        ArrayLibrary::Dense
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn num_operators(&self) -> usize {
        self.operators.len()
    }

    fn static_operator(&self) -> Option<Operator> {
        self.static_operator.clone().map(Operator::Dense)
    }

    fn operators(&self) -> Vec<Operator> {
        self.operators.iter().cloned().map(Operator::Dense).collect()
    }

    fn evaluate(&self, coefficients: &[Complex64]) -> Result<Operator> {
        check_coefficients(self.operators.len(), coefficients)?;
        let mut out = self
            .static_operator
            .clone()
            .unwrap_or_else(|| Array2::zeros((self.dim, self.dim)));
        for (op, &coeff) in self.operators.iter().zip(coefficients) {
            out.scaled_add(coeff, op);
        }
        Ok(Operator::Dense(out))
    }

    fn evaluate_rhs(
        &self,
        coefficients: &[Complex64],
        y: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>> {
        check_coefficients(self.operators.len(), coefficients)?;
        check_rhs(self.dim, y)?;
        let one = Complex64::new(1.0, 0.0);
        let mut out = Array2::zeros((self.dim, y.ncols()));
        if let Some(s) = &self.static_operator {
            general_mat_mul(one, s, y, one, &mut out);
        }
        for (op, &coeff) in self.operators.iter().zip(coefficients) {
            if coeff != Complex64::new(0.0, 0.0) {
                general_mat_mul(coeff, op, y, one, &mut out);
            }
        }
        Ok(out)
    }
}

/// CSR storage.
#[derive(Debug, Clone)]
pub struct SparseOperatorCollection {
    dim: usize,
    static_operator: Option<CsrMatrix>,
    operators: Vec<CsrMatrix>,
}

impl SparseOperatorCollection {
    pub fn new(static_operator: Option<CsrMatrix>, operators: Vec<CsrMatrix>) -> Result<Self> {
        let dim = validate_dims(
            static_operator.as_ref().map(|m| (m.nrows(), m.ncols())),
            operators.iter().map(|m| (m.nrows(), m.ncols())),
        )?;
        Ok(Self {
            dim,
            static_operator,
            operators,
        })
    }
}

impl OperatorCollection for SparseOperatorCollection {
    fn array_library(&self) -> ArrayLibrary {
        ArrayLibrary::Sparse
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn num_operators(&self) -> usize {
        self.operators.len()
    }

    fn static_operator(&self) -> Option<Operator> {
        self.static_operator.clone().map(Operator::Sparse)
    }

    fn operators(&self) -> Vec<Operator> {
        self.operators.iter().cloned().map(Operator::Sparse).collect()
    }

    fn evaluate(&self, coefficients: &[Complex64]) -> Result<Operator> {
        check_coefficients(self.operators.len(), coefficients)?;
        let one = Complex64::new(1.0, 0.0);
        let mut terms: Vec<(Complex64, &CsrMatrix)> = Vec::with_capacity(self.operators.len() + 1);
        if let Some(s) = &self.static_operator {
            terms.push((one, s));
        }
        terms.extend(coefficients.iter().copied().zip(self.operators.iter()));
        Ok(Operator::Sparse(CsrMatrix::linear_combination(
            self.dim, self.dim, &terms,
        )))
    }

    fn evaluate_rhs(
        &self,
        coefficients: &[Complex64],
        y: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>> {
        check_coefficients(self.operators.len(), coefficients)?;
        check_rhs(self.dim, y)?;
        let one = Complex64::new(1.0, 0.0);
        let mut out = Array2::zeros((self.dim, y.ncols()));
        if let Some(s) = &self.static_operator {
            s.accumulate_dot(one, y, &mut out);
        }
        for (op, &coeff) in self.operators.iter().zip(coefficients) {
            if coeff != Complex64::new(0.0, 0.0) {
                op.accumulate_dot(coeff, y, &mut out);
            }
        }
        Ok(out)
    }
}

/// Check that every operator is square with a common dimension.
fn validate_dims(
    static_dim: Option<(usize, usize)>,
    operator_dims: impl Iterator<Item = (usize, usize)>,
) -> Result<usize> {
    let mut dim: Option<usize> = None;
    let labelled = static_dim
        .map(|d| ("static_operator".to_string(), d))
        .into_iter()
        .chain(operator_dims.enumerate().map(|(k, d)| (format!("operators[{}]", k), d)));

    for (what, (rows, cols)) in labelled {
        if rows != cols {
            return Err(ValidationError::DimensionMismatch {
                what: format!("{} (must be square)", what),
                expected: rows,
                actual: cols,
            }
            .into());
        }
        match dim {
            None => dim = Some(rows),
            Some(d) if d != rows => {
                return Err(ValidationError::DimensionMismatch {
                    what,
                    expected: d,
                    actual: rows,
                }
                .into())
            }
            Some(_) => {}
        }
    }

    dim.ok_or_else(|| {
        Error::field(
            "operators",
            "at least one of static_operator or operators must be specified",
        )
    })
}

/// Store operators in the requested library.
pub fn build_collection(
    library: ArrayLibrary,
    static_operator: Option<Operator>,
    operators: Vec<Operator>,
) -> Result<Arc<dyn OperatorCollection>> {
    Ok(match library {
        ArrayLibrary::Dense => Arc::new(DenseOperatorCollection::new(
            static_operator.map(Operator::into_dense),
            operators.into_iter().map(Operator::into_dense).collect(),
        )?),
        ArrayLibrary::Sparse => {
            let to_sparse = |op: Operator| match op {
                Operator::Sparse(m) => m,
                Operator::Dense(m) => CsrMatrix::from_dense(&m, SPARSE_ATOL),
            };
            Arc::new(SparseOperatorCollection::new(
                static_operator.map(to_sparse),
                operators.into_iter().map(to_sparse).collect(),
            )?)
        }
    })
}
