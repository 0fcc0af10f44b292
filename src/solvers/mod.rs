// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! ODE and LMDE solver dispatch.
//!
//! Methods are selected by tag:
//!
//! | Tag            | Kind                    | Problems    |
//! |----------------|-------------------------|-------------|
//! | `RK45`         | Dormand–Prince 5(4)     | ODE, LMDE   |
//! | `RK23`         | Bogacki–Shampine 3(2)   | ODE, LMDE   |
//! | `RK4`          | classical RK4, fixed dt | ODE, LMDE   |
//! | `expm`         | Magnus order 1–3, fixed | LMDE only   |
//! | `lanczos_diag` | Krylov exponential      | LMDE only   |
//!
//! plus [`Method::External`] for a caller-supplied real-valued integrator.
//!
//! Before integrating, the dispatcher decides whether to use a compiled step
//! kernel from the problem's declared [`CompileSupport`]: dense generators
//! get a kernel that caches `G(t)` across Runge–Kutta stages, sparse
//! generators are declared incompatible and always run directly, and
//! problems of unknown support run directly with a warning.

pub mod external;
pub mod fixed_step;
pub mod lanczos;
pub mod result;
pub mod rk;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::array::{CompileSupport, Operator};
use crate::error::{Error, Result, ValidationError};

pub use external::{ExternalSolver, RealRhs};
pub use result::OdeResult;

/// Right-hand side of `dy/dt = f(t, y)`.
///
/// States are complex matrices; a vector is a single column.
pub trait OdeRhs: Send + Sync {
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>>;

    /// Whether the rhs can run through the compiled step kernel.
    fn compile_support(&self) -> CompileSupport {
        CompileSupport::Unknown
    }

    /// The linear generator behind this rhs, if there is one.
    fn as_generator(&self) -> Option<&dyn LmdeGenerator> {
        None
    }
}

/// Linear matrix differential equation `dy/dt = G(t) y`.
pub trait LmdeGenerator: OdeRhs {
    fn generator(&self, t: f64) -> Result<Operator>;
}

/// Closure adapter for arbitrary right-hand sides.
pub struct FnRhs<F>(pub F);

impl<F> OdeRhs for FnRhs<F>
where
    F: Fn(f64, &Array2<Complex64>) -> Result<Array2<Complex64>> + Send + Sync,
{
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        (self.0)(t, y)
    }
}

/// Closure adapter for generators given as dense matrices.
pub struct FnGenerator<F>(pub F);

impl<F> OdeRhs for FnGenerator<F>
where
    F: Fn(f64) -> Result<Array2<Complex64>> + Send + Sync,
{
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        Ok((self.0)(t)?.dot(y))
    }

    fn as_generator(&self) -> Option<&dyn LmdeGenerator> {
        Some(self)
    }
}

impl<F> LmdeGenerator for FnGenerator<F>
where
    F: Fn(f64) -> Result<Array2<Complex64>> + Send + Sync,
{
    fn generator(&self, t: f64) -> Result<Operator> {
        Ok(Operator::Dense((self.0)(t)?))
    }
}

/// Integration method.
#[derive(Clone)]
pub enum Method {
    Rk45,
    Rk23,
    Rk4,
    Expm,
    LanczosDiag,
    External(Arc<dyn ExternalSolver>),
}

impl Method {
    /// Tags accepted by [`Method::from_str`].
    pub fn tags() -> &'static [&'static str] {
        &["RK45", "RK23", "RK4", "expm", "lanczos_diag"]
    }

    pub fn tag(&self) -> &str {
        match self {
            Method::Rk45 => "RK45",
            Method::Rk23 => "RK23",
            Method::Rk4 => "RK4",
            Method::Expm => "expm",
            Method::LanczosDiag => "lanczos_diag",
            Method::External(solver) => solver.name(),
        }
    }

    /// Methods that need the generator itself, not just `G(t) y`.
    pub fn is_lmde_only(&self) -> bool {
        matches!(self, Method::Expm | Method::LanczosDiag)
    }

    pub fn is_fixed_step(&self) -> bool {
        matches!(self, Method::Rk4 | Method::Expm | Method::LanczosDiag)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::External(solver) => write!(f, "External({})", solver.name()),
            other => f.write_str(other.tag()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rk45" => Ok(Method::Rk45),
            "rk23" => Ok(Method::Rk23),
            "rk4" => Ok(Method::Rk4),
            "expm" => Ok(Method::Expm),
            "lanczos_diag" => Ok(Method::LanczosDiag),
            _ => Err(Error::UnsupportedMethod(format!(
                "unknown method '{}', expected one of: {}",
                s,
                Method::tags().join(", ")
            ))),
        }
    }
}

/// Numerical settings shared by all methods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverOptions {
    /// Absolute tolerance (adaptive methods)
    pub atol: f64,
    /// Relative tolerance (adaptive methods)
    pub rtol: f64,
    /// Maximum step size; required by fixed-step methods
    pub max_dt: Option<f64>,
    /// Maximum number of attempted steps (adaptive methods)
    pub max_steps: usize,
    /// Initial step size; chosen automatically if absent
    pub first_step: Option<f64>,
    /// Magnus order for `expm` (1, 2 or 3)
    pub magnus_order: usize,
    /// Krylov dimension for `lanczos_diag`
    pub k_dim: Option<usize>,
    /// Use the compiled step kernel where supported
    pub compile: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            atol: 1e-8,
            rtol: 1e-8,
            max_dt: None,
            max_steps: 100_000,
            first_step: None,
            magnus_order: 1,
            k_dim: None,
            compile: true,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.atol > 0.0) {
            return Err(Error::field("atol", "must be positive"));
        }
        if !(self.rtol > 0.0) {
            return Err(Error::field("rtol", "must be positive"));
        }
        if let Some(max_dt) = self.max_dt {
            if !(max_dt > 0.0) || !max_dt.is_finite() {
                return Err(Error::field("max_dt", format!("must be positive, got {}", max_dt)));
            }
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0) || !h.is_finite() {
                return Err(Error::field("first_step", format!("must be positive, got {}", h)));
            }
        }
        if self.max_steps == 0 {
            return Err(Error::field("max_steps", "must be at least 1"));
        }
        if !(1..=3).contains(&self.magnus_order) {
            return Err(Error::field(
                "magnus_order",
                format!("must be 1, 2 or 3, got {}", self.magnus_order),
            ));
        }
        if self.k_dim == Some(0) {
            return Err(Error::field("k_dim", "must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn require_max_dt(&self, method: &Method) -> Result<f64> {
        self.max_dt.ok_or_else(|| {
            Error::field(
                "max_dt",
                format!("fixed-step method '{}' requires max_dt", method.tag()),
            )
        })
    }
}

// ============================================================================
// Step kernels
// ============================================================================

/// Evaluation of the rhs as seen by the integrators.
pub(crate) trait StepFunction {
    fn eval(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>>;

    /// Number of underlying rhs / generator evaluations so far.
    fn evaluations(&self) -> usize;
}

/// Calls the rhs on every evaluation.
struct DirectStep<'a, R: ?Sized> {
    rhs: &'a R,
    count: Cell<usize>,
}

impl<R: OdeRhs + ?Sized> StepFunction for DirectStep<'_, R> {
    fn eval(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        self.count.set(self.count.get() + 1);
        self.rhs.rhs(t, y)
    }

    fn evaluations(&self) -> usize {
        self.count.get()
    }
}

/// Dense generator kernel. `G(t)` is cached at the last evaluated time, so
/// Runge–Kutta stages sharing a time point reuse it.
struct CompiledStep<'a> {
    generator: &'a dyn LmdeGenerator,
    cache: RefCell<Option<(f64, Array2<Complex64>)>>,
    count: Cell<usize>,
    hits: Cell<usize>,
}

impl StepFunction for CompiledStep<'_> {
    fn eval(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        if let Some((cached_t, g)) = self.cache.borrow().as_ref() {
            if *cached_t == t {
                self.hits.set(self.hits.get() + 1);
                return Ok(g.dot(y));
            }
        }
        self.count.set(self.count.get() + 1);
        let g = self.generator.generator(t)?.into_dense();
        let out = g.dot(y);
        *self.cache.borrow_mut() = Some((t, g));
        Ok(out)
    }

    fn evaluations(&self) -> usize {
        self.count.get()
    }
}

impl Drop for CompiledStep<'_> {
    fn drop(&mut self) {
        debug!(
            generator_evaluations = self.count.get(),
            cache_hits = self.hits.get(),
            "compiled kernel finished"
        );
    }
}

/// Pick the step kernel for `rhs` from its declared compile support.
pub(crate) fn step_kernel<'a, R: OdeRhs + ?Sized>(
    rhs: &'a R,
    method: &Method,
    options: &SolverOptions,
) -> Box<dyn StepFunction + 'a> {
    let direct = || -> Box<dyn StepFunction + 'a> {
        Box::new(DirectStep {
            rhs,
            count: Cell::new(0),
        })
    };
    if !options.compile {
        return direct();
    }
    match rhs.compile_support() {
        CompileSupport::Supported => match rhs.as_generator() {
            Some(generator) => {
                debug!(method = %method, "using compiled generator kernel");
                Box::new(CompiledStep {
                    generator,
                    cache: RefCell::new(None),
                    count: Cell::new(0),
                    hits: Cell::new(0),
                })
            }
            None => {
                debug!(method = %method, "no linear generator to compile; running directly");
                direct()
            }
        },
        CompileSupport::Unsupported => {
            debug!(method = %method, "array library declared incompatible with compilation");
            direct()
        }
        CompileSupport::Unknown => {
            warn!(
                method = %method,
                "compile support of the right-hand side is unknown; running uncompiled"
            );
            direct()
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Times at which states are returned.
///
/// Without `t_eval` only the endpoints of `t_span` are returned.
pub(crate) fn output_times(t_span: [f64; 2], t_eval: Option<&[f64]>) -> Result<Vec<f64>> {
    let [t0, tf] = t_span;
    if !t0.is_finite() || !tf.is_finite() {
        return Err(Error::field("t_span", format!("must be finite, got [{}, {}]", t0, tf)));
    }
    let Some(t_eval) = t_eval else {
        return Ok(vec![t0, tf]);
    };
    if t_eval.is_empty() {
        return Err(Error::field("t_eval", "must not be empty"));
    }
    let (lo, hi) = if t0 <= tf { (t0, tf) } else { (tf, t0) };
    let direction = if tf >= t0 { 1.0 } else { -1.0 };
    for (k, &t) in t_eval.iter().enumerate() {
        if !(lo..=hi).contains(&t) {
            return Err(Error::field(
                "t_eval",
                format!("t_eval[{}] = {} lies outside t_span [{}, {}]", k, t, t0, tf),
            ));
        }
        if k > 0 && (t - t_eval[k - 1]) * direction < 0.0 {
            return Err(Error::field(
                "t_eval",
                "must be sorted in the direction of integration",
            ));
        }
    }
    Ok(t_eval.to_vec())
}

fn check_state(y0: &Array2<Complex64>) -> Result<()> {
    if y0.is_empty() {
        return Err(ValidationError::Field {
            field: "y0".into(),
            message: "initial state must not be empty".into(),
        }
        .into());
    }
    if y0.iter().any(|z| !z.is_finite()) {
        return Err(Error::field("y0", "initial state must be finite"));
    }
    Ok(())
}

/// Solve `dy/dt = f(t, y)` over `t_span`.
///
/// # Errors
/// - `UnsupportedMethod` for LMDE-only methods
/// - `Validation` for bad `t_span`, `t_eval`, options or initial state
/// - `NumericalFailure` if the integrator cannot make progress
#[instrument(skip_all, fields(method = %method, t0 = t_span[0], tf = t_span[1]))]
pub fn solve_ode<R: OdeRhs + ?Sized>(
    rhs: &R,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    method: &Method,
    t_eval: Option<&[f64]>,
    options: &SolverOptions,
) -> Result<OdeResult> {
    options.validate()?;
    check_state(y0)?;
    let times = output_times(t_span, t_eval)?;

    if method.is_lmde_only() {
        return Err(Error::UnsupportedMethod(format!(
            "method '{}' requires a linear generator; use solve_lmde",
            method.tag()
        )));
    }

    if let Method::External(solver) = method {
        if options.compile {
            warn!(
                solver = solver.name(),
                "compile support of external solver is unknown; running uncompiled"
            );
        }
        return external::solve(solver.as_ref(), rhs, t_span, y0, &times);
    }

    let kernel = step_kernel(rhs, method, options);
    let result = match method {
        Method::Rk45 => rk::solve_adaptive(
            kernel.as_ref(),
            &rk::DORMAND_PRINCE,
            t_span,
            y0,
            &times,
            options,
        ),
        Method::Rk23 => rk::solve_adaptive(
            kernel.as_ref(),
            &rk::BOGACKI_SHAMPINE,
            t_span,
            y0,
            &times,
            options,
        ),
        Method::Rk4 => {
            let max_dt = options.require_max_dt(method)?;
            fixed_step::solve_rk4(kernel.as_ref(), t_span, y0, &times, max_dt)
        }
        Method::Expm | Method::LanczosDiag | Method::External(_) => Err(Error::UnsupportedMethod(
            format!("method '{}' is not an ODE method", method.tag()),
        )),
    }?;
    debug!(nfev = result.nfev, "ODE solve finished");
    Ok(result)
}

/// Solve the linear matrix differential equation `dy/dt = G(t) y`.
///
/// Accepts every method; Runge–Kutta and external methods integrate
/// `G(t) y` as a general ODE.
#[instrument(skip_all, fields(method = %method, t0 = t_span[0], tf = t_span[1]))]
pub fn solve_lmde<G: LmdeGenerator + ?Sized>(
    generator: &G,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    method: &Method,
    t_eval: Option<&[f64]>,
    options: &SolverOptions,
) -> Result<OdeResult> {
    match method {
        Method::Expm => {
            options.validate()?;
            check_state(y0)?;
            let times = output_times(t_span, t_eval)?;
            let max_dt = options.require_max_dt(method)?;
            fixed_step::solve_magnus(generator, t_span, y0, &times, max_dt, options.magnus_order)
        }
        Method::LanczosDiag => {
            options.validate()?;
            check_state(y0)?;
            let times = output_times(t_span, t_eval)?;
            let max_dt = options.require_max_dt(method)?;
            let k_dim = options
                .k_dim
                .ok_or_else(|| Error::field("k_dim", "lanczos_diag requires k_dim"))?;
            lanczos::solve_lanczos(generator, t_span, y0, &times, max_dt, k_dim)
        }
        _ => solve_ode(generator, t_span, y0, method, t_eval, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::linalg::matrix_exp;
    use crate::array::ArrayLibrary;
    use crate::models::{GeneratorModel, HamiltonianModel};
    use crate::signals::Signal;
    use crate::test_utils::{assert_matrix_close, c, column, pauli_x, pauli_z};

    fn rabi_model(library: ArrayLibrary) -> HamiltonianModel {
        HamiltonianModel::new(
            Some(Operator::Dense(pauli_z() * c(0.5, 0.0))),
            vec![Operator::Dense(pauli_x() * c(0.5, 0.0))],
            library,
        )
        .unwrap()
        .with_signals(vec![Signal::constant(0.8)])
        .unwrap()
    }

    fn exact(t: f64, y0: &Array2<Complex64>) -> Array2<Complex64> {
        let h = pauli_z() * c(0.5, 0.0) + pauli_x() * c(0.4, 0.0);
        matrix_exp(&(h * c(0.0, -t))).unwrap().dot(y0)
    }

    // =========================================================================
    // Method tags and options
    // =========================================================================

    #[test]
    fn test_method_tags_parse() {
        for tag in Method::tags() {
            let method: Method = tag.parse().unwrap();
            assert_eq!(method.tag(), *tag);
        }
        assert!(matches!("rk45".parse::<Method>(), Ok(Method::Rk45)));
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        let err = "DOP853".parse::<Method>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod(_)));
    }

    #[test]
    fn test_options_validation() {
        assert!(SolverOptions::default().validate().is_ok());
        let bad = SolverOptions {
            magnus_order: 4,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = SolverOptions {
            max_dt: Some(-1.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_output_times() {
        assert_eq!(output_times([0.0, 1.0], None).unwrap(), vec![0.0, 1.0]);
        assert!(output_times([0.0, 1.0], Some(&[0.5, 1.5])).is_err());
        assert!(output_times([0.0, 1.0], Some(&[0.6, 0.5])).is_err());
        assert!(output_times([1.0, 0.0], Some(&[0.6, 0.5])).is_ok());
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    #[test]
    fn test_lmde_only_method_rejected_for_ode() {
        let rhs = FnRhs(|_t: f64, y: &Array2<Complex64>| -> Result<Array2<Complex64>> {
            Ok(y.clone())
        });
        let y0 = column(&[c(1.0, 0.0)]);
        for method in [Method::Expm, Method::LanczosDiag] {
            let err = solve_ode(&rhs, [0.0, 1.0], &y0, &method, None, &SolverOptions::default())
                .unwrap_err();
            assert!(matches!(err, Error::UnsupportedMethod(_)));
        }
    }

    #[test]
    fn test_fixed_step_requires_max_dt() {
        let model = rabi_model(ArrayLibrary::Dense);
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        for method in [Method::Rk4, Method::Expm, Method::LanczosDiag] {
            let result =
                solve_lmde(&model, [0.0, 1.0], &y0, &method, None, &SolverOptions::default());
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_every_method_agrees_with_exact_solution() {
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let t_eval = [0.0, 0.5, 1.5, 2.0];
        let options = SolverOptions {
            atol: 1e-10,
            rtol: 1e-10,
            max_dt: Some(0.01),
            magnus_order: 3,
            k_dim: Some(2),
            ..Default::default()
        };
        for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
            let model = rabi_model(library);
            for tag in Method::tags() {
                let method: Method = tag.parse().unwrap();
                let result =
                    solve_lmde(&model, [0.0, 2.0], &y0, &method, Some(&t_eval), &options).unwrap();
                assert_eq!(result.t, t_eval.to_vec());
                for (t, y) in result.t.iter().zip(&result.y) {
                    assert_matrix_close(y, &exact(*t, &y0), 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_backward_integration() {
        let model = rabi_model(ArrayLibrary::Dense);
        let y0 = column(&[c(0.0, 0.0), c(1.0, 0.0)]);
        let result = solve_lmde(
            &model,
            [1.0, 0.0],
            &exact(1.0, &y0),
            &Method::Rk45,
            None,
            &SolverOptions {
                atol: 1e-10,
                rtol: 1e-10,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.t, vec![1.0, 0.0]);
        assert_matrix_close(&result.y[1], &y0, 1e-7);
    }

    #[test]
    fn test_compiled_and_direct_kernels_agree() {
        let model = rabi_model(ArrayLibrary::Dense);
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let compiled = SolverOptions {
            max_dt: Some(0.05),
            ..Default::default()
        };
        let direct = SolverOptions {
            compile: false,
            ..compiled.clone()
        };
        let a = solve_lmde(&model, [0.0, 1.0], &y0, &Method::Rk4, None, &compiled).unwrap();
        let b = solve_lmde(&model, [0.0, 1.0], &y0, &Method::Rk4, None, &direct).unwrap();
        assert_matrix_close(&a.y[1], &b.y[1], 1e-13);
        // RK4 stages 2 and 3 share a time point, and stage 4 starts the next step
        assert!(a.nfev < b.nfev);
    }

    #[test]
    fn test_fn_rhs_runs_uncompiled() {
        // dy/dt = -y
        let rhs = FnRhs(|_t: f64, y: &Array2<Complex64>| -> Result<Array2<Complex64>> {
            Ok(y * c(-1.0, 0.0))
        });
        assert_eq!(rhs.compile_support(), CompileSupport::Unknown);
        let y0 = column(&[c(1.0, 0.0)]);
        let result = solve_ode(&rhs, [0.0, 1.0], &y0, &Method::Rk45, None, &SolverOptions::default())
            .unwrap();
        assert!((result.y[1][[0, 0]].re - (-1.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_fn_generator_propagator() {
        let generator =
            FnGenerator(|_t: f64| -> Result<Array2<Complex64>> { Ok(pauli_x() * c(0.0, -1.0)) });
        let y0 = Array2::eye(2);
        let result = solve_lmde(
            &generator,
            [0.0, 1.0],
            &y0,
            &Method::Expm,
            None,
            &SolverOptions {
                max_dt: Some(0.1),
                ..Default::default()
            },
        )
        .unwrap();
        let expected = matrix_exp(&(pauli_x() * c(0.0, -1.0))).unwrap();
        assert_matrix_close(&result.y[1], &expected, 1e-12);
    }

    #[test]
    fn test_generator_model_in_frame() {
        let model = GeneratorModel::new(
            Some(Operator::Dense(pauli_z() * c(0.0, -1.0))),
            vec![],
            ArrayLibrary::Dense,
        )
        .unwrap()
        .with_rotating_frame(Some(
            crate::frame::RotatingFrame::from_operator(&pauli_z()).unwrap(),
        ))
        .unwrap();
        // The frame absorbs the whole generator.
        let y0 = column(&[c(0.6, 0.0), c(0.0, 0.8)]);
        let result =
            solve_lmde(&model, [0.0, 3.0], &y0, &Method::Rk45, None, &SolverOptions::default())
                .unwrap();
        assert_matrix_close(&result.y[1], &y0, 1e-12);
    }
}
