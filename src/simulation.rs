// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! YAML simulation descriptions.
//!
//! ```yaml
//! model:
//!   type: hamiltonian
//!   static: {re: [[0.5, 0.0], [0.0, -0.5]]}
//!   operators:
//!     - {re: [[0.0, 1.0], [1.0, 0.0]]}
//!   rotating_frame:
//!     operator: {re: [[0.5, 0.0], [0.0, -0.5]]}
//! signals:
//!   - analog: {envelope: [0.1, 0.0], carrier_freq: 0.159, phase: 0.0}
//! state:
//!   basis: 0
//! t_span: [0.0, 10.0]
//! ```
//!
//! Complex matrices are `{re, im}` pairs of row lists; `im` may be omitted.
//! Vectors are lists of `[re, im]`. Signals come either from `signals` or
//! from a `pulse` schedule, not both.

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::array::linalg::identity;
use crate::array::{ArrayLibrary, Operator};
use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::frame::RotatingFrame;
use crate::models::{
    rotating_wave_approximation, rotating_wave_approximation_hamiltonian,
    rotating_wave_approximation_lindblad, GeneratorModel, HamiltonianModel, LindbladModel,
    LindbladModelConfig,
};
use crate::pulse::{InstructionToSignals, Schedule};
use crate::signals::{DiscreteSignal, Signal};
use crate::solver::{Model, SignalSet, SolveResult, Solver};
use crate::solvers::{Method, SolverOptions};
use crate::state::State;

/// Complex matrix as separate real and imaginary row lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexMatrix {
    pub re: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub im: Option<Vec<Vec<f64>>>,
}

impl ComplexMatrix {
    pub fn to_array(&self) -> Result<Array2<Complex64>> {
        let rows = self.re.len();
        let cols = self.re.first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 {
            return Err(Error::field("matrix", "must have at least one entry"));
        }
        let ragged = |m: &Vec<Vec<f64>>| m.len() != rows || m.iter().any(|r| r.len() != cols);
        if ragged(&self.re) || self.im.as_ref().is_some_and(ragged) {
            return Err(Error::field(
                "matrix",
                format!("re and im must both be {}x{} row lists", rows, cols),
            ));
        }
        Ok(Array2::from_shape_fn((rows, cols), |(i, j)| {
            let im = self.im.as_ref().map_or(0.0, |m| m[i][j]);
            Complex64::new(self.re[i][j], im)
        }))
    }
}

impl From<&Array2<Complex64>> for ComplexMatrix {
    fn from(a: &Array2<Complex64>) -> Self {
        let rows = |f: fn(&Complex64) -> f64| {
            a.rows()
                .into_iter()
                .map(|r| r.iter().map(f).collect())
                .collect::<Vec<Vec<f64>>>()
        };
        let im = rows(|z| z.im);
        Self {
            re: rows(|z| z.re),
            im: im.iter().flatten().any(|&x| x != 0.0).then_some(im),
        }
    }
}

fn complex_vector(entries: &[[f64; 2]]) -> Vec<Complex64> {
    entries.iter().map(|&[re, im]| Complex64::new(re, im)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Generator,
    Hamiltonian,
    Lindblad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSpec {
    /// Frame operator, Hermitian or anti-Hermitian
    Operator(ComplexMatrix),
    /// Diagonal of a diagonal frame operator
    Diagonal(Vec<[f64; 2]>),
    /// Use the model's static operator
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(rename = "type")]
    pub kind: ModelKind,
    /// Static generator or Hamiltonian
    #[serde(default, rename = "static")]
    pub static_operator: Option<ComplexMatrix>,
    #[serde(default)]
    pub operators: Vec<ComplexMatrix>,
    /// Constant-rate dissipators (Lindblad only)
    #[serde(default)]
    pub dissipators: Vec<ComplexMatrix>,
    #[serde(default)]
    pub rotating_frame: Option<FrameSpec>,
    #[serde(default)]
    pub in_frame_basis: bool,
    /// Defaults to the configured array library
    #[serde(default)]
    pub array_library: Option<ArrayLibrary>,
    #[serde(default)]
    pub vectorized: bool,
    /// Apply the rotating wave approximation with this cutoff frequency
    #[serde(default)]
    pub rwa_cutoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSpec {
    Constant(f64),
    Analog {
        #[serde(default = "unit_envelope")]
        envelope: [f64; 2],
        #[serde(default)]
        carrier_freq: f64,
        #[serde(default)]
        phase: f64,
    },
    Discrete(DiscreteSignal),
}

fn unit_envelope() -> [f64; 2] {
    [1.0, 0.0]
}

impl SignalSpec {
    pub fn to_signal(&self) -> Result<Signal> {
        match self {
            SignalSpec::Constant(value) => Ok(Signal::constant(*value)),
            SignalSpec::Analog {
                envelope: [re, im],
                carrier_freq,
                phase,
            } => Ok(Signal::with_constant_envelope(
                Complex64::new(*re, *im),
                *carrier_freq,
                *phase,
            )),
            SignalSpec::Discrete(s) => {
                // deserialization bypasses the constructor checks
                let checked = DiscreteSignal::new(
                    s.dt(),
                    s.samples().to_vec(),
                    s.start_time(),
                    s.carrier_freq(),
                    s.phase(),
                )?;
                Ok(match s.name() {
                    Some(name) => checked.with_name(name),
                    None => checked,
                }
                .into())
            }
        }
    }
}

/// Signals generated from an instruction schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseSpec {
    pub dt: f64,
    #[serde(default)]
    pub carriers: HashMap<String, f64>,
    /// Output channels in operator order
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSpec {
    Statevector(Vec<[f64; 2]>),
    /// Computational basis state index
    Basis(usize),
    DensityMatrix(ComplexMatrix),
    /// Identity propagator
    Identity,
}

/// A complete simulation: model, signals, initial state and time span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    pub model: ModelSpec,
    #[serde(default)]
    pub signals: Vec<SignalSpec>,
    #[serde(default)]
    pub pulse: Option<PulseSpec>,
    pub state: StateSpec,
    #[serde(default)]
    pub subsystem_dims: Option<Vec<usize>>,
    pub t_span: [f64; 2],
    #[serde(default)]
    pub t_eval: Option<Vec<f64>>,
    /// Overrides the configured method
    #[serde(default)]
    pub method: Option<String>,
    /// Overrides the configured solver options
    #[serde(default)]
    pub options: Option<SolverOptions>,
}

impl SimulationSpec {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn signals(&self) -> Result<Vec<Signal>> {
        match &self.pulse {
            Some(_) if !self.signals.is_empty() => Err(Error::field(
                "signals",
                "give either signals or a pulse schedule, not both",
            )),
            Some(pulse) => {
                let converter =
                    InstructionToSignals::new(pulse.dt, pulse.carriers.clone(), pulse.channels.clone())?;
                Ok(converter
                    .get_signals(&pulse.schedule)?
                    .into_iter()
                    .map(Signal::from)
                    .collect())
            }
            None => self.signals.iter().map(SignalSpec::to_signal).collect(),
        }
    }

    fn rotating_frame(&self, static_operator: Option<&Array2<Complex64>>) -> Result<Option<RotatingFrame>> {
        match &self.model.rotating_frame {
            None => Ok(None),
            Some(FrameSpec::Operator(m)) => Ok(Some(RotatingFrame::from_operator(&m.to_array()?)?)),
            Some(FrameSpec::Diagonal(d)) => Ok(Some(RotatingFrame::from_diagonal(&complex_vector(d))?)),
            Some(FrameSpec::Static) => match static_operator {
                Some(op) => Ok(Some(RotatingFrame::from_operator(op)?)),
                None => Err(Error::field(
                    "model.rotating_frame",
                    "'static' frame requires a static operator",
                )),
            },
        }
    }

    /// Build the model with signals and frame attached.
    pub fn build_model(&self, default_library: ArrayLibrary) -> Result<Model> {
        let spec = &self.model;
        let library = spec.array_library.unwrap_or(default_library);
        let static_array = spec.static_operator.as_ref().map(ComplexMatrix::to_array).transpose()?;
        let static_operator = static_array.clone().map(Operator::Dense);
        let operators = spec
            .operators
            .iter()
            .map(|m| m.to_array().map(Operator::Dense))
            .collect::<Result<Vec<_>>>()?;
        let signals = self.signals()?;
        let frame = self.rotating_frame(static_array.as_ref())?;

        if spec.kind != ModelKind::Lindblad && (!spec.dissipators.is_empty() || spec.vectorized) {
            return Err(Error::field(
                "model",
                "dissipators and vectorized apply to lindblad models only",
            ));
        }

        let model = match spec.kind {
            ModelKind::Generator => {
                let mut model = GeneratorModel::new(static_operator, operators, library)?
                    .with_signals(signals)?
                    .with_rotating_frame(frame)?
                    .with_in_frame_basis(spec.in_frame_basis);
                if let Some(cutoff) = spec.rwa_cutoff {
                    model = rotating_wave_approximation(&model, cutoff)?;
                }
                Model::Generator(model)
            }
            ModelKind::Hamiltonian => {
                let mut model = HamiltonianModel::new(static_operator, operators, library)?
                    .with_signals(signals)?
                    .with_rotating_frame(frame)?
                    .with_in_frame_basis(spec.in_frame_basis);
                if let Some(cutoff) = spec.rwa_cutoff {
                    model = rotating_wave_approximation_hamiltonian(&model, cutoff)?;
                }
                Model::Hamiltonian(model)
            }
            ModelKind::Lindblad => {
                let static_dissipators = spec
                    .dissipators
                    .iter()
                    .map(|m| m.to_array().map(Operator::Dense))
                    .collect::<Result<Vec<_>>>()?;
                let mut model = LindbladModel::new(LindbladModelConfig {
                    static_hamiltonian: static_operator,
                    hamiltonian_operators: operators,
                    hamiltonian_signals: Some(signals),
                    static_dissipators,
                    rotating_frame: frame,
                    in_frame_basis: spec.in_frame_basis,
                    array_library: library,
                    vectorized: spec.vectorized,
                    ..Default::default()
                })?;
                if let Some(cutoff) = spec.rwa_cutoff {
                    model = rotating_wave_approximation_lindblad(&model, cutoff)?;
                }
                Model::Lindblad(model)
            }
        };
        Ok(model)
    }

    pub fn initial_state(&self, dim: usize) -> Result<State> {
        let state = match &self.state {
            StateSpec::Statevector(v) => State::statevector(&complex_vector(v))?,
            StateSpec::Basis(index) => State::basis(dim, *index)?,
            StateSpec::DensityMatrix(m) => State::density_matrix(m.to_array()?)?,
            StateSpec::Identity => State::operator(identity(dim))?,
        };
        if state.dim() != dim {
            return Err(ValidationError::DimensionMismatch {
                what: "initial state".into(),
                expected: dim,
                actual: state.dim(),
            }
            .into());
        }
        match &self.subsystem_dims {
            Some(dims) => state.with_subsystem_dims(dims.clone()),
            None => Ok(state),
        }
    }

    /// Solver for this simulation. A `method_override` wins over the file,
    /// which wins over `config`.
    pub fn solver(&self, config: &Config, method_override: Option<Method>) -> Result<Solver> {
        let method = match (method_override, &self.method) {
            (Some(m), _) => m,
            (None, Some(tag)) => tag.parse()?,
            (None, None) => config.solver.method()?,
        };
        let options = self
            .options
            .clone()
            .unwrap_or_else(|| config.solver.options.clone());
        let model = self.build_model(config.array.library)?;
        Ok(Solver::new(model).with_method(method).with_options(options))
    }

    pub fn run(&self, config: &Config, method_override: Option<Method>) -> Result<SolveResult> {
        let solver = self.solver(config, method_override)?;
        let y0 = self.initial_state(solver.model().dim())?;
        info!(
            method = %solver.method(),
            dim = y0.dim(),
            kind = %y0.kind(),
            "running simulation"
        );
        let t_eval = self.t_eval.as_deref();
        solver.solve_one(self.t_span, &y0, None::<&SignalSet>, t_eval)
    }
}
