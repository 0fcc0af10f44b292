// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! High-level solver: model + frame + method, batched over inputs.
//!
//! ```text
//! ┌──────────────┐   signals    ┌──────────────┐  frame state  ┌───────────┐
//! │    State     │─────────────▶│    Model     │──────────────▶│ solve_ode │
//! │ (kind, dims) │              │  (in frame)  │               │ solve_lmde│
//! └──────────────┘              └──────────────┘               └───────────┘
//!        ▲                                                           │
//!        └───────────────── out of frame, lab basis ─────────────────┘
//! ```
//!
//! Each of `t_span`, `y0` and `signals` is a single value or a sequence;
//! sequences must share one length and single values are broadcast.

use ndarray::Array2;
use num_complex::Complex64;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::array::linalg::{dagger, identity, unvec_columns, vec_columns};
use crate::array::Operator;
use crate::error::{Error, Result};
use crate::frame::RotatingFrame;
use crate::models::{GeneratorModel, HamiltonianModel, LindbladModel};
use crate::signals::Signal;
use crate::solvers::{solve_lmde, solve_ode, LmdeGenerator, Method, OdeResult, SolverOptions};
use crate::state::{State, StateKind};

/// Model owned by a [`Solver`].
#[derive(Debug, Clone)]
pub enum Model {
    Generator(GeneratorModel),
    Hamiltonian(HamiltonianModel),
    Lindblad(LindbladModel),
}

impl Model {
    pub fn dim(&self) -> usize {
        match self {
            Model::Generator(m) => m.dim(),
            Model::Hamiltonian(m) => m.dim(),
            Model::Lindblad(m) => m.dim(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Model::Generator(_) => "generator",
            Model::Hamiltonian(_) => "hamiltonian",
            Model::Lindblad(_) => "lindblad",
        }
    }
}

impl From<GeneratorModel> for Model {
    fn from(m: GeneratorModel) -> Self {
        Model::Generator(m)
    }
}

impl From<HamiltonianModel> for Model {
    fn from(m: HamiltonianModel) -> Self {
        Model::Hamiltonian(m)
    }
}

impl From<LindbladModel> for Model {
    fn from(m: LindbladModel) -> Self {
        Model::Lindblad(m)
    }
}

/// Signals for one solve.
///
/// `dissipators` applies to Lindblad models only; `None` keeps the model's
/// dissipator signals.
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    pub hamiltonian: Vec<Signal>,
    pub dissipators: Option<Vec<Signal>>,
}

impl From<Vec<Signal>> for SignalSet {
    fn from(hamiltonian: Vec<Signal>) -> Self {
        Self {
            hamiltonian,
            dissipators: None,
        }
    }
}

/// A single argument or one argument per batch entry.
#[derive(Debug, Clone)]
pub enum Batch<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> Batch<T> {
    fn len(&self) -> Option<usize> {
        match self {
            Batch::Single(_) => None,
            Batch::Many(v) => Some(v.len()),
        }
    }

    fn get(&self, index: usize) -> &T {
        match self {
            Batch::Single(x) => x,
            Batch::Many(v) => &v[index],
        }
    }
}

impl From<[f64; 2]> for Batch<[f64; 2]> {
    fn from(t_span: [f64; 2]) -> Self {
        Batch::Single(t_span)
    }
}

impl From<Vec<[f64; 2]>> for Batch<[f64; 2]> {
    fn from(t_spans: Vec<[f64; 2]>) -> Self {
        Batch::Many(t_spans)
    }
}

impl From<State> for Batch<State> {
    fn from(state: State) -> Self {
        Batch::Single(state)
    }
}

impl From<Vec<State>> for Batch<State> {
    fn from(states: Vec<State>) -> Self {
        Batch::Many(states)
    }
}

impl From<SignalSet> for Batch<SignalSet> {
    fn from(signals: SignalSet) -> Self {
        Batch::Single(signals)
    }
}

impl From<Vec<Signal>> for Batch<SignalSet> {
    fn from(signals: Vec<Signal>) -> Self {
        Batch::Single(signals.into())
    }
}

impl From<Vec<SignalSet>> for Batch<SignalSet> {
    fn from(signals: Vec<SignalSet>) -> Self {
        Batch::Many(signals)
    }
}

/// Common batch length, or `ShapeMismatch` naming the first disagreeing argument.
fn batch_len(lengths: &[(&str, Option<usize>)]) -> Result<usize> {
    let mut common: Option<(&str, usize)> = None;
    for &(argument, len) in lengths {
        let Some(len) = len else { continue };
        match common {
            None => common = Some((argument, len)),
            Some((_, expected)) if expected != len => {
                return Err(Error::ShapeMismatch {
                    argument: argument.to_string(),
                    expected,
                    actual: len,
                })
            }
            Some(_) => {}
        }
    }
    Ok(common.map_or(1, |(_, len)| len))
}

/// States of one solve, in the lab frame and basis.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub t: Vec<f64>,
    pub y: Vec<State>,
    pub nfev: usize,
    pub steps: usize,
    pub rejected_steps: usize,
}

impl SolveResult {
    pub fn final_state(&self) -> Option<&State> {
        self.y.last()
    }
}

/// Serializable summary of a solve, used by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    pub t: Vec<f64>,
    pub kind: StateKind,
    pub subsystem_dims: Vec<usize>,
    /// `[re, im]` pairs, row-major
    pub states: Vec<Vec<Vec<[f64; 2]>>>,
    pub nfev: usize,
    pub steps: usize,
}

impl From<&SolveResult> for SolveSummary {
    fn from(result: &SolveResult) -> Self {
        let first = result.y.first();
        Self {
            t: result.t.clone(),
            kind: first.map_or(StateKind::Raw, State::kind),
            subsystem_dims: first.map(|s| s.subsystem_dims().to_vec()).unwrap_or_default(),
            states: result
                .y
                .iter()
                .map(|s| {
                    s.data()
                        .rows()
                        .into_iter()
                        .map(|row| row.iter().map(|z| [z.re, z.im]).collect())
                        .collect()
                })
                .collect(),
            nfev: result.nfev,
            steps: result.steps,
        }
    }
}

/// Simulates a model for given signals and initial states.
///
/// The solver never mutates its model: signals are attached to a fresh
/// model instance per solve.
#[derive(Debug, Clone)]
pub struct Solver {
    model: Model,
    method: Method,
    options: SolverOptions,
}

impl Solver {
    pub fn new(model: impl Into<Model>) -> Self {
        Self {
            model: model.into(),
            method: Method::Rk45,
            options: SolverOptions::default(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Solve for every batch entry.
    ///
    /// # Arguments
    ///
    /// * `t_span` - Interval(s) of integration
    /// * `y0` - Initial state(s)
    /// * `signals` - Signals to attach; the model's own signals if `None`
    /// * `t_eval` - Output times shared by all entries; endpoints if `None`
    ///
    /// # Errors
    /// `ShapeMismatch` if two sequence arguments differ in length; any error
    /// of an individual solve.
    #[instrument(skip_all, fields(model = self.model.kind_name(), method = %self.method))]
    pub fn solve(
        &self,
        t_span: impl Into<Batch<[f64; 2]>>,
        y0: impl Into<Batch<State>>,
        signals: Option<Batch<SignalSet>>,
        t_eval: Option<&[f64]>,
    ) -> Result<Vec<SolveResult>> {
        let t_span = t_span.into();
        let y0 = y0.into();
        let len = batch_len(&[
            ("t_span", t_span.len()),
            ("y0", y0.len()),
            ("signals", signals.as_ref().and_then(Batch::len)),
        ])?;
        info!(batch = len, "solving");

        let run = |i: usize| {
            self.solve_one(
                *t_span.get(i),
                y0.get(i),
                signals.as_ref().map(|s| s.get(i)),
                t_eval,
            )
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (0..len).into_par_iter().map(run).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..len).map(run).collect()
        }
    }

    /// Solve a single problem.
    pub fn solve_one(
        &self,
        t_span: [f64; 2],
        y0: &State,
        signals: Option<&SignalSet>,
        t_eval: Option<&[f64]>,
    ) -> Result<SolveResult> {
        if y0.dim() != self.model.dim() {
            return Err(Error::ShapeMismatch {
                argument: "y0".into(),
                expected: self.model.dim(),
                actual: y0.dim(),
            });
        }
        match &self.model {
            Model::Generator(model) => {
                let model = match signals {
                    Some(s) => {
                        reject_dissipator_signals(s)?;
                        model.with_signals(s.hamiltonian.clone())?
                    }
                    None => model.clone(),
                };
                let frame = FrameView::new(model.rotating_frame().cloned(), model.in_frame_basis());
                self.solve_closed(&model, &frame, t_span, y0, t_eval)
            }
            Model::Hamiltonian(model) => {
                let model = match signals {
                    Some(s) => {
                        reject_dissipator_signals(s)?;
                        model.with_signals(s.hamiltonian.clone())?
                    }
                    None => model.clone(),
                };
                let frame = FrameView::new(model.rotating_frame().cloned(), model.in_frame_basis());
                self.solve_closed(&model, &frame, t_span, y0, t_eval)
            }
            Model::Lindblad(model) => {
                let model = match signals {
                    Some(s) => model.with_signals(s.hamiltonian.clone(), s.dissipators.clone())?,
                    None => model.clone(),
                };
                self.solve_open(&model, t_span, y0, t_eval)
            }
        }
    }

    /// Generator and Hamiltonian models. Density matrices are evolved by
    /// solving for the propagator and conjugating.
    fn solve_closed<G>(
        &self,
        model: &G,
        frame: &FrameView,
        t_span: [f64; 2],
        y0: &State,
        t_eval: Option<&[f64]>,
    ) -> Result<SolveResult>
    where
        G: LmdeGenerator,
    {
        let conjugate = y0.kind() == StateKind::DensityMatrix;
        let initial = if conjugate {
            identity(y0.dim())
        } else {
            y0.data().clone()
        };
        let y_frame = frame.state_into(t_span[0], &initial);
        let result = solve_lmde(model, t_span, &y_frame, &self.method, t_eval, &self.options)?;
        debug!(nfev = result.nfev, steps = result.steps, "closed-system solve finished");

        let states = result
            .t
            .iter()
            .zip(&result.y)
            .map(|(&t, y)| {
                let lab = frame.state_out_of(t, y);
                let data = if conjugate {
                    lab.dot(y0.data()).dot(&dagger(&lab))
                } else {
                    lab
                };
                y0.with_data(data)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(into_solve_result(result, states))
    }

    /// Lindblad models. Statevectors are converted to density matrices.
    fn solve_open(
        &self,
        model: &LindbladModel,
        t_span: [f64; 2],
        y0: &State,
        t_eval: Option<&[f64]>,
    ) -> Result<SolveResult> {
        if matches!(self.method, Method::LanczosDiag) {
            return Err(Error::UnsupportedMethod(
                "lanczos_diag needs an anti-Hermitian generator; Lindblad generators are not".into(),
            ));
        }
        let rho0 = match y0.kind() {
            StateKind::Raw if y0.data().is_square() => State::density_matrix(y0.data().clone())?
                .with_subsystem_dims(y0.subsystem_dims().to_vec())?,
            _ => y0.to_density_matrix()?,
        };
        let n = rho0.dim();
        let view = FrameView::new(model.state_frame(), model.in_frame_basis());

        let result = if model.vectorized() {
            let y = view.state_into(t_span[0], &vec_columns(rho0.data()));
            solve_lmde(model, t_span, &y, &self.method, t_eval, &self.options)?
        } else {
            let rho = view.operator_into(t_span[0], rho0.data());
            solve_ode(model, t_span, &rho, &self.method, t_eval, &self.options)?
        };
        debug!(nfev = result.nfev, steps = result.steps, "open-system solve finished");

        let states = result
            .t
            .iter()
            .zip(&result.y)
            .map(|(&t, y)| {
                let rho = if model.vectorized() {
                    unvec_columns(&view.state_out_of(t, y), n)?
                } else {
                    view.operator_out_of(t, y)
                };
                rho0.with_data(rho)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(into_solve_result(result, states))
    }
}

fn reject_dissipator_signals(signals: &SignalSet) -> Result<()> {
    if signals.dissipators.is_some() {
        return Err(Error::field(
            "signals.dissipators",
            "dissipator signals require a Lindblad model",
        ));
    }
    Ok(())
}

fn into_solve_result(result: OdeResult, states: Vec<State>) -> SolveResult {
    SolveResult {
        t: result.t,
        y: states,
        nfev: result.nfev,
        steps: result.steps,
        rejected_steps: result.rejected_steps,
    }
}

/// Optional frame applied to states, with the model's basis convention.
struct FrameView {
    frame: Option<RotatingFrame>,
    in_frame_basis: bool,
}

impl FrameView {
    fn new(frame: Option<RotatingFrame>, in_frame_basis: bool) -> Self {
        Self { frame, in_frame_basis }
    }

    fn state_into(&self, t: f64, y: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame {
            Some(f) => f.state_into_frame(t, y, false, self.in_frame_basis),
            None => y.clone(),
        }
    }

    fn state_out_of(&self, t: f64, y: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame {
            Some(f) => f.state_out_of_frame(t, y, self.in_frame_basis, false),
            None => y.clone(),
        }
    }

    fn operator_into(&self, t: f64, a: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame {
            Some(f) => f
                .operator_into_frame(t, &Operator::Dense(a.clone()), false, self.in_frame_basis)
                .into_dense(),
            None => a.clone(),
        }
    }

    fn operator_out_of(&self, t: f64, a: &Array2<Complex64>) -> Array2<Complex64> {
        match &self.frame {
            Some(f) => f
                .operator_out_of_frame(t, &Operator::Dense(a.clone()), self.in_frame_basis, false)
                .into_dense(),
            None => a.clone(),
        }
    }
}
