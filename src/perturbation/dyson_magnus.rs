// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dyson and Magnus terms via one enlarged LMDE.
//!
//! For perturbations `A_i(t)`, an optional generator `G(t)` with
//! propagator `U(t)` (`U(t_0) = y_0`), every requested term is carried as a
//! block of a single matrix state:
//!
//! ```text
//! dU/dt   = G U
//! dY_I/dt = G Y_I + A_{i_1} Y_{I[1:]}           (dyson)
//! dY_I/dt = G Y_I + Σ_{m : P_m ⊆ I} A_m Y_{I∖P_m} (symmetric)
//! ```
//!
//! with `Y_∅ = U` and `Y_I(t_0) = 0`. Then `Y_I = U D_I`, where `D_I` is the
//! Dyson term of the frame perturbations `U⁻¹ A_i U`. Symmetric Magnus terms
//! are the series logarithm of the symmetric Dyson series.
//!
//! Ref: Haas, Puzzuoli, Zhang & Cory, "Engineering effective Hamiltonians",
//! New J. Phys. 21, 103011 (2019).

use std::collections::HashMap;

use ndarray::{s, Array2};
use num_complex::Complex64;
use tracing::{debug, info, instrument};

use super::array_polynomial::ArrayPolynomial;
use super::multiset::{
    clean_index_multisets, combinations_with_replacement, complete_dyson_terms,
    complete_symmetric_terms, ordered_terms, Multiset,
};
use super::results::{ExpansionMethod, PerturbationResults};
use crate::array::linalg::{identity, solve_linear};
use crate::array::CompileSupport;
use crate::error::{Error, Result, ValidationError};
use crate::solvers::{solve_ode, Method, OdeResult, OdeRhs, SolverOptions};

/// Matrix-valued function of time.
pub type MatrixFn<'a> = dyn Fn(f64) -> Result<Array2<Complex64>> + Send + Sync + 'a;

/// Which terms to compute and how.
#[derive(Debug, Clone, PartialEq)]
pub struct PerturbationConfig {
    pub expansion_method: ExpansionMethod,
    /// Compute every term up to this order
    pub expansion_order: Option<usize>,
    /// Individual terms, in addition to `expansion_order`
    pub expansion_terms: Vec<Vec<usize>>,
    /// Multiset labels of the perturbations (symmetric methods only)
    pub perturbation_indices: Option<Vec<Vec<usize>>>,
    /// Remove the `U(t)` prefactor from Dyson terms
    pub dyson_in_frame: bool,
}

impl PerturbationConfig {
    pub fn new(expansion_method: ExpansionMethod) -> Self {
        Self {
            expansion_method,
            expansion_order: None,
            expansion_terms: Vec::new(),
            perturbation_indices: None,
            dyson_in_frame: true,
        }
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.expansion_order = Some(order);
        self
    }

    pub fn with_terms(mut self, terms: Vec<Vec<usize>>) -> Self {
        self.expansion_terms = terms;
        self
    }

    pub fn with_perturbation_indices(mut self, indices: Vec<Vec<usize>>) -> Self {
        self.perturbation_indices = Some(indices);
        self
    }

    pub fn with_dyson_in_frame(mut self, dyson_in_frame: bool) -> Self {
        self.dyson_in_frame = dyson_in_frame;
        self
    }
}

/// Solution of the frame LMDE plus the perturbation terms.
#[derive(Debug, Clone)]
pub struct PerturbationSolution {
    /// `U(t)` at the output times
    pub ode: OdeResult,
    pub perturbation_results: PerturbationResults,
}

/// Labels to compute before completion.
fn requested_terms(
    config: &PerturbationConfig,
    perturbation_indices: &[Multiset],
) -> Vec<Vec<usize>> {
    let mut unique = Vec::new();
    for m in perturbation_indices {
        for &i in m.as_slice() {
            if !unique.contains(&i) {
                unique.push(i);
            }
        }
    }
    let mut terms = config.expansion_terms.clone();
    if let Some(order) = config.expansion_order {
        if config.expansion_method.is_symmetric() {
            terms.extend(
                combinations_with_replacement(&unique, order)
                    .into_iter()
                    .map(Vec::from),
            );
        } else {
            terms.extend(ordered_terms(&unique, order));
        }
    }
    terms
}

/// Completed labels and, for each, the `(perturbation, child block)` pairs
/// feeding its equation. Block 0 is `U`; label `k` is block `k + 1`.
fn term_structure(
    method: ExpansionMethod,
    terms: &[Vec<usize>],
    perturbation_indices: &[Multiset],
) -> Result<(Vec<Vec<usize>>, Vec<Vec<(usize, usize)>>)> {
    let labels: Vec<Vec<usize>> = if method.is_symmetric() {
        for term in terms {
            if let Some(&bad) = term
                .iter()
                .find(|&&i| !perturbation_indices.iter().any(|p| p.as_slice().contains(&i)))
            {
                return Err(Error::field(
                    "expansion_terms",
                    format!("index {} appears in no perturbation index multiset", bad),
                ));
            }
        }
        let multisets: Vec<Multiset> = terms.iter().map(|t| Multiset::new(t.clone())).collect();
        complete_symmetric_terms(&multisets)
            .into_iter()
            .map(Vec::from)
            .collect()
    } else {
        for term in terms {
            if let Some(&bad) = term.iter().find(|&&i| i >= perturbation_indices.len()) {
                return Err(Error::field(
                    "expansion_terms",
                    format!(
                        "index {} out of range for {} perturbations",
                        bad,
                        perturbation_indices.len()
                    ),
                ));
            }
        }
        complete_dyson_terms(terms)
    };
    if labels.iter().any(Vec::is_empty) {
        return Err(Error::field("expansion_terms", "terms must be non-empty"));
    }

    let block_of: HashMap<&[usize], usize> = labels
        .iter()
        .enumerate()
        .map(|(k, l)| (l.as_slice(), k + 1))
        .collect();
    let block = |label: &[usize]| -> Result<usize> {
        if label.is_empty() {
            return Ok(0);
        }
        block_of.get(label).copied().ok_or_else(|| {
            Error::field(
                "expansion_terms",
                format!("term {:?} is missing from the completed term set", label),
            )
        })
    };

    let children = labels
        .iter()
        .map(|label| {
            if method.is_symmetric() {
                let multiset = Multiset::new(label.clone());
                perturbation_indices
                    .iter()
                    .enumerate()
                    .filter_map(|(m, p)| {
                        multiset
                            .difference(p)
                            .map(|rest| block(rest.as_slice()).map(|b| (m, b)))
                    })
                    .collect::<Result<Vec<_>>>()
            } else {
                Ok(vec![(label[0], block(&label[1..])?)])
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((labels, children))
}

/// Right-hand side of the enlarged system; state blocks are stacked horizontally.
struct EnlargedRhs<'a> {
    perturbations: Vec<&'a MatrixFn<'a>>,
    generator: Option<&'a MatrixFn<'a>>,
    children: Vec<Vec<(usize, usize)>>,
    dim: usize,
}

impl EnlargedRhs<'_> {
    fn block<'b>(&self, y: &'b Array2<Complex64>, b: usize) -> ndarray::ArrayView2<'b, Complex64> {
        y.slice(s![.., b * self.dim..(b + 1) * self.dim])
    }
}

impl OdeRhs for EnlargedRhs<'_> {
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        let n = self.dim;
        let a: Vec<Array2<Complex64>> = self
            .perturbations
            .iter()
            .map(|f| f(t))
            .collect::<Result<_>>()?;
        let g = self.generator.map(|f| f(t)).transpose()?;

        let mut out = Array2::zeros(y.raw_dim());
        if let Some(g) = &g {
            out.assign(&g.dot(y));
        }
        for (k, children) in self.children.iter().enumerate() {
            let mut block = out.slice_mut(s![.., (k + 1) * n..(k + 2) * n]);
            for &(m, child) in children {
                block += &a[m].dot(&self.block(y, child));
            }
        }
        Ok(out)
    }

    fn compile_support(&self) -> CompileSupport {
        CompileSupport::Unsupported
    }
}

/// Compute Dyson or Magnus terms for `perturbations` over `t_span`.
///
/// # Arguments
///
/// * `perturbations` - Matrix functions `A_i(t)`
/// * `t_span` - Integration interval
/// * `config` - Expansion method and requested terms
/// * `generator` - Frame generator `G(t)`; zero if absent
/// * `y0` - Initial value of the frame LMDE; identity if absent
/// * `method`, `t_eval`, `options` - Passed to [`solve_ode`]
///
/// Requested terms are completed with the lower-order terms they depend on,
/// so the results may contain more labels than requested.
///
/// # Errors
/// `ValidationError` if neither an order nor terms are given, `y0` is not
/// square, or `perturbation_indices` is used with `dyson` or contains
/// duplicates.
#[instrument(skip_all, fields(expansion_method = %config.expansion_method))]
#[allow(clippy::too_many_arguments)]
pub fn solve_lmde_perturbation<'a>(
    perturbations: &[&'a MatrixFn<'a>],
    t_span: [f64; 2],
    config: &PerturbationConfig,
    generator: Option<&'a MatrixFn<'a>>,
    y0: Option<&Array2<Complex64>>,
    method: &Method,
    t_eval: Option<&[f64]>,
    options: &SolverOptions,
) -> Result<PerturbationSolution> {
    if config.expansion_order.is_none() && config.expansion_terms.is_empty() {
        return Err(Error::field(
            "expansion_order",
            "one of expansion_order or expansion_terms is required",
        ));
    }
    if perturbations.is_empty() {
        return Err(Error::field("perturbations", "at least one perturbation is required"));
    }

    let dim = match y0 {
        Some(y0) => {
            if !y0.is_square() {
                return Err(Error::field("y0", "must be a square matrix"));
            }
            y0.nrows()
        }
        None => perturbations[0](t_span[0])?.nrows(),
    };

    let perturbation_indices: Vec<Multiset> = match &config.perturbation_indices {
        Some(_) if !config.expansion_method.is_symmetric() => {
            return Err(Error::field(
                "perturbation_indices",
                "not usable with expansion_method 'dyson'",
            ))
        }
        Some(indices) => {
            if indices.len() != perturbations.len() {
                return Err(ValidationError::CountMismatch {
                    what: "perturbation_indices".into(),
                    expected: perturbations.len(),
                    actual: indices.len(),
                }
                .into());
            }
            let cleaned = clean_index_multisets(indices);
            if cleaned.len() != indices.len() {
                return Err(Error::field(
                    "perturbation_indices",
                    "contains duplicates as multisets",
                ));
            }
            if cleaned.iter().any(Multiset::is_empty) {
                return Err(Error::field("perturbation_indices", "entries must be non-empty"));
            }
            cleaned
        }
        None => (0..perturbations.len())
            .map(|i| Multiset::new(vec![i]))
            .collect(),
    };

    let terms = requested_terms(config, &perturbation_indices);
    let (labels, children) = term_structure(config.expansion_method, &terms, &perturbation_indices)?;
    let expansion_order = labels.iter().map(Vec::len).max().unwrap_or(0);
    info!(
        num_terms = labels.len(),
        expansion_order,
        dim,
        "computing perturbation terms"
    );

    let rhs = EnlargedRhs {
        perturbations: perturbations.to_vec(),
        generator,
        children,
        dim,
    };
    let blocks = labels.len() + 1;
    let mut state0 = Array2::zeros((dim, dim * blocks));
    state0
        .slice_mut(s![.., 0..dim])
        .assign(&y0.cloned().unwrap_or_else(|| identity(dim)));

    let result = solve_ode(&rhs, t_span, &state0, method, t_eval, options)?;
    debug!(nfev = result.nfev, steps = result.steps, "solved enlarged system");

    let remove_frame = config.dyson_in_frame
        || config.expansion_method == ExpansionMethod::SymmetricMagnus;
    let mut expansion_terms: Vec<Vec<Array2<Complex64>>> = vec![Vec::with_capacity(result.t.len()); labels.len()];
    let mut frame_states = Vec::with_capacity(result.t.len());

    for state in &result.y {
        let u = rhs.block(state, 0).to_owned();
        let mut terms_at_t = Vec::with_capacity(labels.len());
        for k in 0..labels.len() {
            let y_k = rhs.block(state, k + 1).to_owned();
            terms_at_t.push(if remove_frame { solve_linear(&u, &y_k)? } else { y_k });
        }
        if config.expansion_method == ExpansionMethod::SymmetricMagnus {
            let monomials = labels.iter().map(|l| Multiset::new(l.clone())).collect();
            let dyson = ArrayPolynomial::new(Some(identity(dim)), monomials, terms_at_t)?;
            terms_at_t = dyson.log_series()?.coefficients().to_vec();
        }
        for (k, term) in terms_at_t.into_iter().enumerate() {
            expansion_terms[k].push(term);
        }
        frame_states.push(u);
    }

    Ok(PerturbationSolution {
        perturbation_results: PerturbationResults {
            expansion_method: config.expansion_method,
            expansion_order,
            term_labels: labels,
            t: result.t.clone(),
            expansion_terms,
        },
        ode: OdeResult {
            y: frame_states,
            ..result
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::linalg::matrix_exp;
    use crate::test_utils::{assert_matrix_close, c, pauli_x, pauli_y, pauli_z};

    fn options() -> SolverOptions {
        SolverOptions {
            atol: 1e-12,
            rtol: 1e-12,
            ..Default::default()
        }
    }

    fn solve(
        perturbations: &[&MatrixFn<'_>],
        config: &PerturbationConfig,
        generator: Option<&MatrixFn<'_>>,
        t: f64,
    ) -> PerturbationSolution {
        solve_lmde_perturbation(
            perturbations,
            [0.0, t],
            config,
            generator,
            None,
            &Method::Rk45,
            None,
            &options(),
        )
        .unwrap()
    }

    fn last<'r>(results: &'r PerturbationResults, label: &[usize]) -> &'r Array2<Complex64> {
        results.get(label).unwrap().last().unwrap()
    }

    #[test]
    fn test_requires_order_or_terms() {
        let a = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x()) };
        let err = solve_lmde_perturbation(
            &[&a],
            [0.0, 1.0],
            &PerturbationConfig::new(ExpansionMethod::Dyson),
            None,
            None,
            &Method::Rk45,
            None,
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_perturbation_indices_validation() {
        let a = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x()) };
        let b = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_y()) };
        let run = |config: PerturbationConfig| {
            solve_lmde_perturbation(
                &[&a, &b],
                [0.0, 1.0],
                &config,
                None,
                None,
                &Method::Rk45,
                None,
                &options(),
            )
        };
        let dyson = PerturbationConfig::new(ExpansionMethod::Dyson)
            .with_order(1)
            .with_perturbation_indices(vec![vec![0], vec![1]]);
        assert!(run(dyson).is_err());
        let duplicate = PerturbationConfig::new(ExpansionMethod::SymmetricDyson)
            .with_order(1)
            .with_perturbation_indices(vec![vec![0, 1], vec![1, 0]]);
        assert!(run(duplicate).is_err());
        let count = PerturbationConfig::new(ExpansionMethod::SymmetricDyson)
            .with_order(1)
            .with_perturbation_indices(vec![vec![0]]);
        assert!(run(count).is_err());

        // indices in terms must be covered by the perturbation labels
        for method in [ExpansionMethod::Dyson, ExpansionMethod::SymmetricDyson] {
            let out_of_range = PerturbationConfig::new(method).with_terms(vec![vec![5]]);
            let err = run(out_of_range).unwrap_err();
            assert!(format!("{}", err).contains("expansion_terms"), "{}", err);
        }
        let unlabeled = PerturbationConfig::new(ExpansionMethod::SymmetricMagnus)
            .with_terms(vec![vec![0, 2]])
            .with_perturbation_indices(vec![vec![0], vec![1]]);
        assert!(run(unlabeled).is_err());

        let terms = vec![vec![1, 0]];
        let (labels, _) = term_structure(
            ExpansionMethod::Dyson,
            &terms,
            &[Multiset::new(vec![0]), Multiset::new(vec![1])],
        )
        .unwrap();
        assert!(labels.contains(&vec![0]));
    }

    #[test]
    fn test_dyson_constant_perturbations() {
        let a0 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x()) };
        let a1 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_z()) };
        let config = PerturbationConfig::new(ExpansionMethod::Dyson).with_order(2);
        let t = 1.5;
        let results = solve(&[&a0, &a1], &config, None, t).perturbation_results;

        assert_eq!(results.len(), 2 + 4);
        assert_eq!(results.expansion_order, 2);
        assert_eq!(
            results.term_labels,
            vec![vec![0], vec![1], vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
        assert_matrix_close(last(&results, &[0]), &(pauli_x() * c(t, 0.0)), 1e-9);
        // ∫∫_{t2 < t1} A0 A1 = t²/2 A0 A1
        assert_matrix_close(
            last(&results, &[0, 1]),
            &(pauli_x().dot(&pauli_z()) * c(t * t / 2.0, 0.0)),
            1e-9,
        );
        assert_matrix_close(
            last(&results, &[1, 0]),
            &(pauli_z().dot(&pauli_x()) * c(t * t / 2.0, 0.0)),
            1e-9,
        );
    }

    #[test]
    fn test_dyson_time_dependent() {
        let a = |t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x() * c(t, 0.0)) };
        let config = PerturbationConfig::new(ExpansionMethod::Dyson).with_terms(vec![vec![0, 0]]);
        let t = 1.2;
        let results = solve(&[&a], &config, None, t).perturbation_results;
        assert_eq!(results.term_labels, vec![vec![0], vec![0, 0]]);
        assert_matrix_close(last(&results, &[0]), &(pauli_x() * c(t * t / 2.0, 0.0)), 1e-9);
        // ∫ t1 (t1²/2) dt1 X² = t⁴/8 I
        assert_matrix_close(
            last(&results, &[0, 0]),
            &(identity(2) * c(t.powi(4) / 8.0, 0.0)),
            1e-9,
        );
    }

    #[test]
    fn test_symmetric_dyson_and_magnus_constant() {
        let a0 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x()) };
        let a1 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x() + pauli_z()) };
        let t = 0.8;

        let dyson = solve(
            &[&a0, &a1],
            &PerturbationConfig::new(ExpansionMethod::SymmetricDyson).with_order(2),
            None,
            t,
        )
        .perturbation_results;
        assert_eq!(dyson.len(), 2 + 3);
        let a1_value = pauli_x() + pauli_z();
        let anti = pauli_x().dot(&a1_value) + a1_value.dot(&pauli_x());
        assert_matrix_close(last(&dyson, &[1, 0]), &(&anti * c(t * t / 2.0, 0.0)), 1e-9);
        assert_matrix_close(last(&dyson, &[0, 0]), &(identity(2) * c(t * t / 2.0, 0.0)), 1e-9);

        // constant generator: Ω = t (c0 A0 + c1 A1) exactly
        let magnus = solve(
            &[&a0, &a1],
            &PerturbationConfig::new(ExpansionMethod::SymmetricMagnus).with_order(2),
            None,
            t,
        )
        .perturbation_results;
        assert_matrix_close(last(&magnus, &[0]), &(pauli_x() * c(t, 0.0)), 1e-9);
        for label in [[0, 0], [0, 1], [1, 1]] {
            assert!(last(&magnus, &label).iter().all(|z| z.norm() < 1e-9), "{:?}", label);
        }
    }

    #[test]
    fn test_perturbation_indices_power_series() {
        // generator c A0 + c² A1 with constant operators
        let a0 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x()) };
        let a1 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_z()) };
        let config = PerturbationConfig::new(ExpansionMethod::SymmetricDyson)
            .with_terms(vec![vec![0, 0]])
            .with_perturbation_indices(vec![vec![0], vec![0, 0]]);
        let t = 0.9;
        let results = solve(&[&a0, &a1], &config, None, t).perturbation_results;
        let expected = identity(2) * c(t * t / 2.0, 0.0) + pauli_z() * c(t, 0.0);
        assert_matrix_close(last(&results, &[0, 0]), &expected, 1e-9);
    }

    #[test]
    fn test_dyson_in_frame_of_generator() {
        let g = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_z() * c(0.0, -1.0)) };
        let a = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x() * c(0.0, -1.0)) };
        let t = 1.0;
        let config = PerturbationConfig::new(ExpansionMethod::Dyson).with_order(2);
        let solution = solve(&[&a], &config, Some(&g), t);
        let results = &solution.perturbation_results;
        let u = solution.ode.y.last().unwrap();
        assert_matrix_close(u, &matrix_exp(&(pauli_z() * c(0.0, -t))).unwrap(), 1e-9);

        // U (I + εD1 + ε²D2) matches the propagator of G + εA to O(ε³)
        let eps = 1e-2;
        let series = identity(2)
            + last(results, &[0]) * c(eps, 0.0)
            + last(results, &[0, 0]) * c(eps * eps, 0.0);
        let exact = matrix_exp(&((pauli_z() + pauli_x() * c(eps, 0.0)) * c(0.0, -t))).unwrap();
        assert_matrix_close(&u.dot(&series), &exact, 1e-5);

        let raw = solve(&[&a], &config.clone().with_dyson_in_frame(false), Some(&g), t);
        assert_matrix_close(
            raw.perturbation_results.get(&[0]).unwrap().last().unwrap(),
            &u.dot(last(results, &[0])),
            1e-9,
        );
    }

    #[test]
    fn test_results_polynomial() {
        let a0 = |_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x() * c(0.0, -1.0)) };
        let t = 0.5;
        let results = solve(
            &[&a0],
            &PerturbationConfig::new(ExpansionMethod::SymmetricDyson).with_order(6),
            None,
            t,
        )
        .perturbation_results;
        let poly = results.to_array_polynomial(results.t.len() - 1).unwrap();
        let x = 0.4;
        let exact = matrix_exp(&(pauli_x() * c(0.0, -x * t))).unwrap();
        assert_matrix_close(&poly.evaluate_real(&[x]).unwrap(), &exact, 1e-7);
    }
}
