// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Multivariable polynomials with matrix coefficients.
//!
//! ```text
//! P(c) = A_∅ + Σ_I c^I A_I,    c^I = Π_{i ∈ I} c_i
//! ```
//!
//! Monomials are keyed by index multisets: `[0, 0, 2]` is `c_0² c_2`.

use ndarray::Array2;
use num_complex::Complex64;

use super::multiset::Multiset;
use crate::array::linalg::identity;
use crate::error::{Error, Result, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPolynomial {
    constant: Option<Array2<Complex64>>,
    monomials: Vec<Multiset>,
    coefficients: Vec<Array2<Complex64>>,
}

impl ArrayPolynomial {
    /// Build a polynomial from a constant term and monomial coefficients.
    ///
    /// # Errors
    /// `ValidationError` on duplicate monomials, an empty monomial, or
    /// coefficients of differing shape.
    pub fn new(
        constant: Option<Array2<Complex64>>,
        monomials: Vec<Multiset>,
        coefficients: Vec<Array2<Complex64>>,
    ) -> Result<Self> {
        if monomials.len() != coefficients.len() {
            return Err(ValidationError::CountMismatch {
                what: "polynomial coefficients".into(),
                expected: monomials.len(),
                actual: coefficients.len(),
            }
            .into());
        }
        let mut sorted = monomials.clone();
        sorted.sort();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::field("monomials", "contains duplicate multisets"));
        }
        if monomials.iter().any(Multiset::is_empty) {
            return Err(Error::field(
                "monomials",
                "the empty monomial must be given as the constant term",
            ));
        }
        let shape = constant
            .as_ref()
            .map(|c| c.dim())
            .or_else(|| coefficients.first().map(|c| c.dim()));
        if let Some(shape) = shape {
            for c in constant.iter().chain(&coefficients) {
                if c.dim() != shape {
                    return Err(ValidationError::DimensionMismatch {
                        what: "polynomial coefficient".into(),
                        expected: shape.0,
                        actual: c.nrows(),
                    }
                    .into());
                }
            }
        }
        Ok(Self {
            constant,
            monomials,
            coefficients,
        })
    }

    pub fn constant(&self) -> Option<&Array2<Complex64>> {
        self.constant.as_ref()
    }

    pub fn monomials(&self) -> &[Multiset] {
        &self.monomials
    }

    pub fn coefficients(&self) -> &[Array2<Complex64>] {
        &self.coefficients
    }

    pub fn coefficient(&self, monomial: &Multiset) -> Option<&Array2<Complex64>> {
        self.monomials
            .iter()
            .position(|m| m == monomial)
            .map(|k| &self.coefficients[k])
    }

    /// Highest monomial order.
    pub fn order(&self) -> usize {
        self.monomials.iter().map(Multiset::order).max().unwrap_or(0)
    }

    /// Number of variables referenced, `1 + max index`.
    pub fn num_variables(&self) -> usize {
        self.monomials
            .iter()
            .flat_map(|m| m.as_slice().iter().copied())
            .max()
            .map_or(0, |i| i + 1)
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.constant
            .as_ref()
            .or_else(|| self.coefficients.first())
            .map(|c| c.dim())
    }

    /// Value of every monomial at `variables`.
    pub fn monomial_values(&self, variables: &[Complex64]) -> Result<Vec<Complex64>> {
        let needed = self.num_variables();
        if variables.len() < needed {
            return Err(ValidationError::CountMismatch {
                what: "polynomial variables".into(),
                expected: needed,
                actual: variables.len(),
            }
            .into());
        }
        Ok(self
            .monomials
            .iter()
            .map(|m| m.as_slice().iter().map(|&i| variables[i]).product())
            .collect())
    }

    /// `P(c)`.
    pub fn evaluate(&self, variables: &[Complex64]) -> Result<Array2<Complex64>> {
        let values = self.monomial_values(variables)?;
        let shape = self.shape().unwrap_or((0, 0));
        let mut out = self
            .constant
            .clone()
            .unwrap_or_else(|| Array2::zeros(shape));
        for (value, coeff) in values.iter().zip(&self.coefficients) {
            if *value != Complex64::new(0.0, 0.0) {
                out.scaled_add(*value, coeff);
            }
        }
        Ok(out)
    }

    /// `P(c)` for real variables.
    pub fn evaluate_real(&self, variables: &[f64]) -> Result<Array2<Complex64>> {
        let complex: Vec<Complex64> = variables.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        self.evaluate(&complex)
    }

    pub fn scale(&self, factor: Complex64) -> ArrayPolynomial {
        ArrayPolynomial {
            constant: self.constant.as_ref().map(|c| c * factor),
            monomials: self.monomials.clone(),
            coefficients: self.coefficients.iter().map(|c| c * factor).collect(),
        }
    }

    /// Sum of two polynomials.
    pub fn add(&self, other: &ArrayPolynomial) -> Result<ArrayPolynomial> {
        let constant = match (&self.constant, &other.constant) {
            (Some(a), Some(b)) => Some(a + b),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let mut monomials = self.monomials.clone();
        let mut coefficients = self.coefficients.clone();
        for (m, c) in other.monomials.iter().zip(&other.coefficients) {
            match monomials.iter().position(|x| x == m) {
                Some(k) => coefficients[k] = &coefficients[k] + c,
                None => {
                    monomials.push(m.clone());
                    coefficients.push(c.clone());
                }
            }
        }
        ArrayPolynomial::new(constant, monomials, coefficients)
    }

    /// Matrix product `self · other`, keeping only monomials accepted by `keep`.
    pub fn matmul_truncated(
        &self,
        other: &ArrayPolynomial,
        keep: impl Fn(&Multiset) -> bool,
    ) -> Result<ArrayPolynomial> {
        let mut monomials: Vec<Multiset> = Vec::new();
        let mut coefficients: Vec<Array2<Complex64>> = Vec::new();
        let mut accumulate = |m: Multiset, c: Array2<Complex64>| {
            if !keep(&m) {
                return;
            }
            match monomials.iter().position(|x| *x == m) {
                Some(k) => coefficients[k] = &coefficients[k] + &c,
                None => {
                    monomials.push(m);
                    coefficients.push(c);
                }
            }
        };

        if let Some(a) = &self.constant {
            for (m, b) in other.monomials.iter().zip(&other.coefficients) {
                accumulate(m.clone(), a.dot(b));
            }
        }
        if let Some(b) = &other.constant {
            for (m, a) in self.monomials.iter().zip(&self.coefficients) {
                accumulate(m.clone(), a.dot(b));
            }
        }
        for (ma, a) in self.monomials.iter().zip(&self.coefficients) {
            for (mb, b) in other.monomials.iter().zip(&other.coefficients) {
                let m = ma.union(mb);
                if keep(&m) {
                    accumulate(m, a.dot(b));
                }
            }
        }
        let constant = match (&self.constant, &other.constant) {
            (Some(a), Some(b)) => Some(a.dot(b)),
            _ => None,
        };
        ArrayPolynomial::new(constant, monomials, coefficients)
    }

    /// Power-series logarithm `log(P)` for `P = I + X` with `X` constant-free,
    /// truncated to the monomials already present in `self`.
    ///
    /// ```text
    /// log(I + X) = Σ_{n ≥ 1} (−1)^{n+1} Xⁿ / n
    /// ```
    pub fn log_series(&self) -> Result<ArrayPolynomial> {
        let shape = self.shape().unwrap_or((0, 0));
        if let Some(c) = &self.constant {
            let dev = (c - &identity(shape.0)).iter().map(|z| z.norm()).fold(0.0, f64::max);
            if dev > 1e-12 {
                return Err(Error::field(
                    "constant",
                    "series logarithm needs an identity constant term",
                ));
            }
        }
        let keys = self.monomials.clone();
        let keep = |m: &Multiset| keys.contains(m);
        let x = ArrayPolynomial::new(None, self.monomials.clone(), self.coefficients.clone())?;

        let mut power = x.clone();
        let mut total = x.clone();
        for n in 2..=self.order() {
            power = power.matmul_truncated(&x, keep)?;
            if power.monomials.is_empty() {
                break;
            }
            let sign = if n % 2 == 0 { -1.0 } else { 1.0 };
            total = total.add(&power.scale(Complex64::new(sign / n as f64, 0.0)))?;
        }
        // restore the input monomial order
        let coefficients = self
            .monomials
            .iter()
            .map(|m| {
                total
                    .coefficient(m)
                    .cloned()
                    .unwrap_or_else(|| Array2::zeros(shape))
            })
            .collect();
        ArrayPolynomial::new(None, self.monomials.clone(), coefficients)
    }
}
