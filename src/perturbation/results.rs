// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::array_polynomial::ArrayPolynomial;
use super::multiset::Multiset;
use crate::array::linalg::identity;
use crate::error::{Error, Result};

/// Which expansion the perturbation terms belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionMethod {
    /// Ordered Dyson integrals, labels are index lists
    Dyson,
    /// Dyson integrals summed over orderings, labels are multisets
    SymmetricDyson,
    /// Logarithm of the symmetric Dyson series
    SymmetricMagnus,
}

impl ExpansionMethod {
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, ExpansionMethod::Dyson)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionMethod::Dyson => "dyson",
            ExpansionMethod::SymmetricDyson => "symmetric_dyson",
            ExpansionMethod::SymmetricMagnus => "symmetric_magnus",
        }
    }
}

impl fmt::Display for ExpansionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpansionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dyson" => Ok(ExpansionMethod::Dyson),
            "symmetric_dyson" => Ok(ExpansionMethod::SymmetricDyson),
            "symmetric_magnus" => Ok(ExpansionMethod::SymmetricMagnus),
            other => Err(Error::UnsupportedMethod(format!(
                "expansion method '{}' not supported",
                other
            ))),
        }
    }
}

/// Computed perturbation terms.
///
/// `expansion_terms[k][i]` is the term labelled `term_labels[k]` at `t[i]`.
#[derive(Debug, Clone)]
pub struct PerturbationResults {
    pub expansion_method: ExpansionMethod,
    /// Highest term order computed
    pub expansion_order: usize,
    pub term_labels: Vec<Vec<usize>>,
    pub t: Vec<f64>,
    pub expansion_terms: Vec<Vec<Array2<Complex64>>>,
}

impl PerturbationResults {
    pub fn len(&self) -> usize {
        self.term_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_labels.is_empty()
    }

    /// Term values at every output time. Symmetric labels are matched as multisets.
    pub fn get(&self, label: &[usize]) -> Option<&[Array2<Complex64>]> {
        let key = if self.expansion_method.is_symmetric() {
            Multiset::new(label.to_vec()).into()
        } else {
            label.to_vec()
        };
        self.term_labels
            .iter()
            .position(|l| *l == key)
            .map(|k| self.expansion_terms[k].as_slice())
    }

    /// Terms at output time `time_index` as a polynomial in the expansion variables.
    ///
    /// The symmetric Dyson series gets the identity as constant term; the
    /// Magnus expansion has none.
    ///
    /// # Errors
    /// `ValidationError` for ordered Dyson labels (not monomials) or an
    /// out-of-range time index.
    pub fn to_array_polynomial(&self, time_index: usize) -> Result<ArrayPolynomial> {
        if !self.expansion_method.is_symmetric() {
            return Err(Error::field(
                "expansion_method",
                "ordered dyson terms do not define a polynomial; use symmetric_dyson",
            ));
        }
        if time_index >= self.t.len() {
            return Err(Error::field(
                "time_index",
                format!("{} out of range for {} output times", time_index, self.t.len()),
            ));
        }
        let coefficients: Vec<Array2<Complex64>> = self
            .expansion_terms
            .iter()
            .map(|term| term[time_index].clone())
            .collect();
        let constant = match self.expansion_method {
            ExpansionMethod::SymmetricDyson => {
                coefficients.first().map(|c| identity(c.nrows()))
            }
            _ => None,
        };
        let monomials = self
            .term_labels
            .iter()
            .map(|l| Multiset::new(l.clone()))
            .collect();
        ArrayPolynomial::new(constant, monomials, coefficients)
    }
}
