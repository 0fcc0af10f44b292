// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-step Dyson and Magnus solvers.
//!
//! The LMDE is `dy/dt = (F + Σ_j s_j(t) G_j) y` with `F` the rotating frame
//! operator and `s_j(t) = Re[f_j(t) e^{i2πν_j t}]`. Over a step
//! `[t_0, t_0 + dt]` each envelope is replaced by a Chebyshev expansion
//!
//! ```text
//! f_j(t_0 + τ) ≈ Σ_k c_jk T_k(2τ/dt − 1)
//! ```
//!
//! so with `a_jk = c_jk e^{i2πν_j t_0}` the signal term is linear in the
//! real variables `Re(a_jk)`, `Im(a_jk)` with fixed perturbations
//! `T_k cos(2πν_j τ) G_j` and `−T_k sin(2πν_j τ) G_j`. The symmetric Dyson
//! (or Magnus) terms of these perturbations in the frame of `F` are computed
//! once at construction. A step is then one polynomial evaluation:
//!
//! ```text
//! y ← e^{dt F} (I + Σ_I a^I D_I) y        (Dyson)
//! y ← e^{dt F} expm(Σ_I a^I Ω_I) y        (Magnus)
//! ```
//!
//! Ref: Puzzuoli, Lin, Malekakhlagh, Pritchett, Rosand & Wood, "Algorithms
//! for perturbative analysis and simulation of quantum dynamics",
//! J. Comput. Phys. 489 (2023).

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;
use tracing::{debug, info, instrument};

use super::array_polynomial::ArrayPolynomial;
use super::dyson_magnus::{solve_lmde_perturbation, MatrixFn, PerturbationConfig};
use super::results::ExpansionMethod;
use crate::array::linalg::matrix_exp;
use crate::array::Operator;
use crate::error::{Error, Result, ValidationError};
use crate::frame::RotatingFrame;
use crate::signals::Signal;
use crate::solvers::{Method, OdeResult, SolverOptions};

/// Construction parameters shared by [`DysonSolver`] and [`MagnusSolver`].
#[derive(Debug, Clone)]
pub struct ExpansionSolverConfig {
    /// Signal-modulated generator operators `G_j` (lab frame)
    pub operators: Vec<Operator>,
    /// Frame of the static generator `F`
    pub rotating_frame: RotatingFrame,
    /// Fixed step size
    pub dt: f64,
    /// Carrier frequency of each operator's signal
    pub carrier_freqs: Vec<f64>,
    /// Chebyshev degree of each envelope approximation
    pub chebyshev_orders: Vec<usize>,
    /// Compute all terms up to this order
    pub expansion_order: Option<usize>,
    /// Additional terms, as multisets of expansion variables
    pub expansion_labels: Vec<Vec<usize>>,
    /// Whether each envelope has an imaginary part; all `true` if absent
    pub include_imag: Option<Vec<bool>>,
    /// Integrator for the precomputation
    pub integration_method: Method,
    pub integration_options: SolverOptions,
}

impl ExpansionSolverConfig {
    pub fn new(
        operators: Vec<Operator>,
        rotating_frame: RotatingFrame,
        dt: f64,
        carrier_freqs: Vec<f64>,
        chebyshev_orders: Vec<usize>,
        expansion_order: usize,
    ) -> Self {
        Self {
            operators,
            rotating_frame,
            dt,
            carrier_freqs,
            chebyshev_orders,
            expansion_order: Some(expansion_order),
            expansion_labels: Vec::new(),
            include_imag: None,
            integration_method: Method::Rk45,
            integration_options: SolverOptions {
                atol: 1e-12,
                rtol: 1e-12,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Part {
    Re,
    Im,
}

/// One expansion variable: real or imaginary part of `a_jk`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Variable {
    operator: usize,
    degree: usize,
    part: Part,
}

/// Chebyshev polynomial `T_k(x)`.
fn chebyshev_t(k: usize, x: f64) -> f64 {
    let (mut prev, mut curr) = (1.0, x);
    match k {
        0 => prev,
        _ => {
            for _ in 1..k {
                let next = 2.0 * x * curr - prev;
                prev = curr;
                curr = next;
            }
            curr
        }
    }
}

/// Chebyshev coefficients of degree `order` for `f` on `[0, dt]`, from
/// interpolation at the `order + 1` Chebyshev nodes.
pub fn chebyshev_coefficients(
    f: impl Fn(f64) -> Complex64,
    order: usize,
    dt: f64,
) -> Vec<Complex64> {
    let m = order + 1;
    let theta: Vec<f64> = (0..m).map(|i| PI * (i as f64 + 0.5) / m as f64).collect();
    let samples: Vec<Complex64> = theta
        .iter()
        .map(|th| f(0.5 * dt * (th.cos() + 1.0)))
        .collect();
    (0..m)
        .map(|k| {
            let sum: Complex64 = samples
                .iter()
                .zip(&theta)
                .map(|(fv, th)| fv * (k as f64 * th).cos())
                .sum();
            let scale = if k == 0 { 1.0 } else { 2.0 };
            sum * (scale / m as f64)
        })
        .collect()
}

/// Precomputed expansion shared by both solvers.
#[derive(Debug, Clone)]
struct ExpansionCore {
    method: ExpansionMethod,
    dt: f64,
    carrier_freqs: Vec<f64>,
    chebyshev_orders: Vec<usize>,
    variables: Vec<Variable>,
    polynomial: ArrayPolynomial,
    /// `e^{dt F}`
    frame_step: Array2<Complex64>,
    dim: usize,
}

impl ExpansionCore {
    #[instrument(skip_all, fields(method = %method))]
    fn new(config: ExpansionSolverConfig, method: ExpansionMethod) -> Result<Self> {
        let num_ops = config.operators.len();
        if num_ops == 0 {
            return Err(Error::field("operators", "at least one operator is required"));
        }
        for (what, len) in [
            ("carrier_freqs", config.carrier_freqs.len()),
            ("chebyshev_orders", config.chebyshev_orders.len()),
        ] {
            if len != num_ops {
                return Err(ValidationError::CountMismatch {
                    what: what.into(),
                    expected: num_ops,
                    actual: len,
                }
                .into());
            }
        }
        let include_imag = config.include_imag.clone().unwrap_or_else(|| vec![true; num_ops]);
        if include_imag.len() != num_ops {
            return Err(ValidationError::CountMismatch {
                what: "include_imag".into(),
                expected: num_ops,
                actual: include_imag.len(),
            }
            .into());
        }
        if !(config.dt > 0.0) || !config.dt.is_finite() {
            return Err(Error::field("dt", format!("must be positive, got {}", config.dt)));
        }
        let dim = config.rotating_frame.dim();
        if let Some(op) = config.operators.iter().find(|op| op.nrows() != dim || !op.is_square()) {
            return Err(ValidationError::DimensionMismatch {
                what: "expansion operator".into(),
                expected: dim,
                actual: op.nrows(),
            }
            .into());
        }

        let mut variables = Vec::new();
        for (j, (&order, &imag)) in config.chebyshev_orders.iter().zip(&include_imag).enumerate() {
            for degree in 0..=order {
                variables.push(Variable { operator: j, degree, part: Part::Re });
                if imag {
                    variables.push(Variable { operator: j, degree, part: Part::Im });
                }
            }
        }

        let dt = config.dt;
        let dense: Vec<Array2<Complex64>> =
            config.operators.iter().map(Operator::to_dense).collect();
        let perturbations: Vec<Box<MatrixFn<'static>>> = variables
            .iter()
            .map(|v| {
                let op = dense[v.operator].clone();
                let nu = config.carrier_freqs[v.operator];
                let v = *v;
                Box::new(move |tau: f64| -> Result<Array2<Complex64>> {
                    let cheb = chebyshev_t(v.degree, 2.0 * tau / dt - 1.0);
                    let carrier = match v.part {
                        Part::Re => (2.0 * PI * nu * tau).cos(),
                        Part::Im => -(2.0 * PI * nu * tau).sin(),
                    };
                    Ok(&op * Complex64::new(cheb * carrier, 0.0))
                }) as Box<MatrixFn<'static>>
            })
            .collect();
        let perturbation_refs: Vec<&MatrixFn<'_>> = perturbations.iter().map(|b| b.as_ref()).collect();

        let frame_operator = config.rotating_frame.frame_operator();
        let frame_fn = move |_t: f64| -> Result<Array2<Complex64>> { Ok(frame_operator.clone()) };
        let frame_generator: &MatrixFn<'_> = &frame_fn;

        let mut perturbation_config = PerturbationConfig::new(method).with_terms(config.expansion_labels.clone());
        perturbation_config.expansion_order = config.expansion_order;

        info!(
            num_variables = variables.len(),
            dim,
            dt,
            "precomputing perturbative expansion"
        );
        let solution = solve_lmde_perturbation(
            &perturbation_refs,
            [0.0, dt],
            &perturbation_config,
            Some(frame_generator),
            None,
            &config.integration_method,
            None,
            &config.integration_options,
        )?;
        let results = solution.perturbation_results;
        let polynomial = results.to_array_polynomial(results.t.len() - 1)?;
        debug!(num_terms = results.len(), "expansion terms ready");

        let phases = config.rotating_frame.frame_diag().mapv(|l| (l * dt).exp());
        let frame_step = config
            .rotating_frame
            .matrix_out_of_frame_basis(&Array2::from_diag(&phases));

        Ok(Self {
            method,
            dt,
            carrier_freqs: config.carrier_freqs,
            chebyshev_orders: config.chebyshev_orders,
            variables,
            polynomial,
            frame_step,
            dim,
        })
    }

    /// Expansion variables for the step starting at `t0`.
    fn step_variables(&self, envelopes: &[Complex64Envelope<'_>], t0: f64) -> Vec<f64> {
        let coefficients: Vec<Vec<Complex64>> = envelopes
            .iter()
            .zip(&self.chebyshev_orders)
            .zip(&self.carrier_freqs)
            .map(|((env, &order), &nu)| {
                let rotation = Complex64::from_polar(1.0, 2.0 * PI * nu * t0);
                chebyshev_coefficients(|tau| env.eval(t0 + tau), order, self.dt)
                    .into_iter()
                    .map(|c| c * rotation)
                    .collect()
            })
            .collect();
        self.variables
            .iter()
            .map(|v| {
                let a = coefficients[v.operator][v.degree];
                match v.part {
                    Part::Re => a.re,
                    Part::Im => a.im,
                }
            })
            .collect()
    }

    fn envelopes<'s>(&self, signals: &'s [Signal]) -> Result<Vec<Complex64Envelope<'s>>> {
        if signals.len() != self.carrier_freqs.len() {
            return Err(ValidationError::CountMismatch {
                what: "signals".into(),
                expected: self.carrier_freqs.len(),
                actual: signals.len(),
            }
            .into());
        }
        signals
            .iter()
            .zip(&self.carrier_freqs)
            .enumerate()
            .map(|(j, (signal, &nu))| {
                if matches!(signal, Signal::Sum(_)) {
                    return Err(Error::field(
                        format!("signals[{}]", j),
                        "sums of signals have no single carrier; pass one signal per operator",
                    ));
                }
                if (signal.carrier_freq() - nu).abs() > 1e-12 * nu.abs().max(1.0) {
                    return Err(Error::field(
                        format!("signals[{}]", j),
                        format!(
                            "carrier frequency {} differs from the precomputed {}",
                            signal.carrier_freq(),
                            nu
                        ),
                    ));
                }
                Ok(Complex64Envelope {
                    signal,
                    phase: Complex64::from_polar(1.0, signal.phase()),
                })
            })
            .collect()
    }

    fn solve(&self, signals: &[Signal], y0: &Array2<Complex64>, t_span: [f64; 2]) -> Result<OdeResult> {
        if y0.nrows() != self.dim {
            return Err(ValidationError::DimensionMismatch {
                what: "y0".into(),
                expected: self.dim,
                actual: y0.nrows(),
            }
            .into());
        }
        let envelopes = self.envelopes(signals)?;
        let span = t_span[1] - t_span[0];
        let steps = (span / self.dt).round();
        if span < 0.0 || (steps * self.dt - span).abs() > 1e-8 * self.dt.max(span.abs()) {
            return Err(Error::field(
                "t_span",
                format!(
                    "length {} must be a non-negative integer multiple of dt = {}",
                    span, self.dt
                ),
            ));
        }
        let steps = steps as usize;

        let mut y = y0.clone();
        for k in 0..steps {
            let t0 = t_span[0] + k as f64 * self.dt;
            let variables = self.step_variables(&envelopes, t0);
            let expansion = self.polynomial.evaluate_real(&variables)?;
            let propagator = match self.method {
                ExpansionMethod::SymmetricMagnus => matrix_exp(&expansion)?,
                _ => expansion,
            };
            y = self.frame_step.dot(&propagator.dot(&y));
        }
        if y.iter().any(|z| !z.is_finite()) {
            return Err(Error::NumericalFailure("non-finite state in expansion solver".into()));
        }
        debug!(steps, "expansion solver finished");

        Ok(OdeResult {
            t: t_span.to_vec(),
            y: vec![y0.clone(), y],
            nfev: 0,
            steps,
            rejected_steps: 0,
        })
    }
}

/// Envelope including the signal phase, `f(t) e^{iφ}`.
struct Complex64Envelope<'s> {
    signal: &'s Signal,
    phase: Complex64,
}

impl Complex64Envelope<'_> {
    fn eval(&self, t: f64) -> Complex64 {
        self.signal.envelope(t) * self.phase
    }
}

/// Fixed-step solver using a truncated symmetric Dyson series.
#[derive(Debug, Clone)]
pub struct DysonSolver {
    core: ExpansionCore,
}

impl DysonSolver {
    /// Precompute the Dyson terms.
    ///
    /// # Errors
    /// `ValidationError` on inconsistent counts or dimensions, or errors
    /// from the precomputation integrator.
    pub fn new(config: ExpansionSolverConfig) -> Result<Self> {
        Ok(Self {
            core: ExpansionCore::new(config, ExpansionMethod::SymmetricDyson)?,
        })
    }

    pub fn dt(&self) -> f64 {
        self.core.dt
    }

    /// Number of expansion variables (Chebyshev coefficient parts).
    pub fn num_variables(&self) -> usize {
        self.core.variables.len()
    }

    pub fn polynomial(&self) -> &ArrayPolynomial {
        &self.core.polynomial
    }

    /// Propagate `y0` over `t_span`, whose length must be a multiple of `dt`.
    ///
    /// Returns the states at both ends of `t_span`, in the lab frame.
    pub fn solve(&self, signals: &[Signal], y0: &Array2<Complex64>, t_span: [f64; 2]) -> Result<OdeResult> {
        self.core.solve(signals, y0, t_span)
    }
}

/// Fixed-step solver using a truncated symmetric Magnus expansion.
#[derive(Debug, Clone)]
pub struct MagnusSolver {
    core: ExpansionCore,
}

impl MagnusSolver {
    pub fn new(config: ExpansionSolverConfig) -> Result<Self> {
        Ok(Self {
            core: ExpansionCore::new(config, ExpansionMethod::SymmetricMagnus)?,
        })
    }

    pub fn dt(&self) -> f64 {
        self.core.dt
    }

    pub fn num_variables(&self) -> usize {
        self.core.variables.len()
    }

    pub fn polynomial(&self) -> &ArrayPolynomial {
        &self.core.polynomial
    }

    /// Propagate `y0` over `t_span`; see [`DysonSolver::solve`].
    pub fn solve(&self, signals: &[Signal], y0: &Array2<Complex64>, t_span: [f64; 2]) -> Result<OdeResult> {
        self.core.solve(signals, y0, t_span)
    }
}
