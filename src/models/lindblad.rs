// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lindblad models.
//!
//! ```text
//! dρ/dt = -i[H(t), ρ] + Σ_j γ_j(t) (L_j ρ L_j† − ½{L_j†L_j, ρ})
//!                     + Σ_k (S_k ρ S_k† − ½{S_k†S_k, ρ})
//! ```
//!
//! with `H(t) = H_0 + Σ_i s_i(t) H_i`, signal-modulated dissipators `L_j` and
//! static dissipators `S_k`.
//!
//! In vectorized mode states are column-stacked density matrices and the
//! model is a superoperator generator, using `vec(AρB) = (Bᵀ ⊗ A) vec(ρ)`:
//!
//! ```text
//! -i[H, ·]  ->  -i (I ⊗ H − Hᵀ ⊗ I)
//! D[L]      ->  conj(L) ⊗ L − ½ I ⊗ L†L − ½ (L†L)ᵀ ⊗ I
//! ```
//!
//! Ref: Lindblad (1976), Commun. Math. Phys. 48, 119.
//! Ref: Breuer & Petruccione, "The Theory of Open Quantum Systems" (2002), Ch. 3.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use tracing::debug;

use super::generator::add_operators;
use super::hamiltonian::HamiltonianModel;
use crate::array::linalg::{dagger, kron};
use crate::array::{
    build_collection, ArrayLibrary, CompileSupport, CsrMatrix, Operator, OperatorCollection,
    HERMITIAN_ATOL, SPARSE_ATOL,
};
use crate::error::{Error, Result, ValidationError};
use crate::frame::RotatingFrame;
use crate::signals::{Signal, SignalList};
use crate::solvers::{LmdeGenerator, OdeRhs};

/// A single dissipation channel with a constant rate.
///
/// Common channels for superconducting qubits:
///   - Amplitude damping (T1): `L = σ⁻`, `γ = 1/T1`
///   - Pure dephasing (T_φ):   `L = σz`, `γ = 1/(2T_φ)` with `1/T_φ = 1/T2 − 1/(2T1)`
///
/// Times and rates are in the model's time unit.
#[derive(Debug, Clone)]
pub struct DissipatorChannel {
    pub operator: Array2<Complex64>,
    pub rate: f64,
    /// Label for provenance (e.g. "T1_q0")
    pub label: String,
}

impl DissipatorChannel {
    /// Amplitude damping `L = σ⁻ = |0⟩⟨1|`, `γ = 1/T1`.
    pub fn amplitude_damping(t1: f64, qubit_label: &str) -> Result<Self> {
        if !(t1 > 0.0) {
            return Err(Error::field("t1", format!("must be positive, got {}", t1)));
        }
        let mut sigma_minus = Array2::zeros((2, 2));
        sigma_minus[[0, 1]] = Complex64::new(1.0, 0.0);
        Ok(Self {
            operator: sigma_minus,
            rate: 1.0 / t1,
            label: format!("T1_{qubit_label}"),
        })
    }

    /// Pure dephasing `L = σz` with coherences decaying at `1/T_φ`.
    pub fn pure_dephasing(t1: f64, t2: f64, qubit_label: &str) -> Result<Self> {
        if !(t1 > 0.0) {
            return Err(Error::field("t1", format!("must be positive, got {}", t1)));
        }
        if !(t2 > 0.0) {
            return Err(Error::field("t2", format!("must be positive, got {}", t2)));
        }
        if t2 > 2.0 * t1 {
            return Err(Error::field(
                "t2",
                format!("T2 ({}) must be <= 2*T1 ({})", t2, 2.0 * t1),
            ));
        }
        let gamma_phi = 1.0 / t2 - 1.0 / (2.0 * t1);

        let mut sigma_z = Array2::zeros((2, 2));
        sigma_z[[0, 0]] = Complex64::new(1.0, 0.0);
        sigma_z[[1, 1]] = Complex64::new(-1.0, 0.0);

        // D[σz] damps coherences at twice its rate
        Ok(Self {
            operator: sigma_z,
            rate: gamma_phi / 2.0,
            label: format!("Tphi_{qubit_label}"),
        })
    }

    /// Both T1 and T_φ channels for a single qubit.
    pub fn from_t1_t2(t1: f64, t2: f64, qubit_label: &str) -> Result<Vec<Self>> {
        Ok(vec![
            Self::amplitude_damping(t1, qubit_label)?,
            Self::pure_dephasing(t1, t2, qubit_label)?,
        ])
    }
}

/// Everything that defines a Lindblad model.
#[derive(Debug, Clone, Default)]
pub struct LindbladModelConfig {
    pub static_hamiltonian: Option<Operator>,
    pub hamiltonian_operators: Vec<Operator>,
    pub hamiltonian_signals: Option<Vec<Signal>>,
    pub static_dissipators: Vec<Operator>,
    pub dissipator_operators: Vec<Operator>,
    /// `None` means every dissipator has constant rate 1.
    pub dissipator_signals: Option<Vec<Signal>>,
    pub rotating_frame: Option<RotatingFrame>,
    pub in_frame_basis: bool,
    pub array_library: ArrayLibrary,
    pub vectorized: bool,
}

impl LindbladModelConfig {
    /// Append channels as signal-modulated dissipators with constant rates.
    pub fn with_channels(mut self, channels: &[DissipatorChannel]) -> Self {
        let mut signals = self
            .dissipator_signals
            .take()
            .unwrap_or_else(|| vec![Signal::constant(1.0); self.dissipator_operators.len()]);
        for ch in channels {
            self.dissipator_operators.push(Operator::Dense(ch.operator.clone()));
            signals.push(Signal::constant(ch.rate));
        }
        self.dissipator_signals = Some(signals);
        self
    }
}

/// Dissipator with precomputed products, in the frame basis.
#[derive(Debug)]
struct Dissipator {
    l: Operator,
    l_dag: Operator,
    l_dag_l: Operator,
}

impl Dissipator {
    fn new(l: Operator, library: ArrayLibrary) -> Self {
        let dense = l.to_dense();
        let l_dag_dense = dagger(&dense);
        let l_dag_l = Operator::Dense(l_dag_dense.dot(&dense)).into_library(library);
        Self {
            l_dag: Operator::Dense(l_dag_dense).into_library(library),
            l: l.into_library(library),
            l_dag_l,
        }
    }

    /// `rate * (L ρ L† − ½ L†L ρ − ½ ρ L†L)` accumulated into `out`.
    fn accumulate(&self, rate: Complex64, rho: &Array2<Complex64>, out: &mut Array2<Complex64>) {
        if rate == Complex64::new(0.0, 0.0) {
            return;
        }
        let l_rho_ldag = self.l.dot(&self.l_dag.rdot(rho));
        let anti = self.l_dag_l.dot(rho) + self.l_dag_l.rdot(rho);
        out.scaled_add(rate, &l_rho_ldag);
        out.scaled_add(-0.5 * rate, &anti);
    }
}

/// Precomputed evaluation data for one frame / mode setting.
#[derive(Debug)]
struct LindbladKernel {
    hamiltonian: Option<Arc<dyn OperatorCollection>>,
    dissipators: Vec<Dissipator>,
    static_dissipators: Vec<Dissipator>,
    superoperators: Option<Arc<dyn OperatorCollection>>,
    vectorized_frame: Option<RotatingFrame>,
}

/// Lindblad master equation model.
#[derive(Debug, Clone)]
pub struct LindbladModel {
    config: Arc<LindbladModelConfig>,
    hamiltonian_signals: Option<SignalList>,
    dissipator_signals: SignalList,
    dim: usize,
    kernel: Arc<LindbladKernel>,
}

impl LindbladModel {
    /// Build and validate a model.
    ///
    /// # Errors
    /// - `NotHermitian` for non-Hermitian Hamiltonian operators
    /// - `DimensionMismatch` for operators of different sizes
    /// - `CountMismatch` if signal counts differ from operator counts
    pub fn new(config: LindbladModelConfig) -> Result<Self> {
        validate_hamiltonian(&config)?;
        let dim = validate_dimensions(&config)?;

        let hamiltonian_signals = match &config.hamiltonian_signals {
            Some(signals) => {
                check_count("hamiltonian_signals", config.hamiltonian_operators.len(), signals.len())?;
                Some(SignalList::new(signals.clone()))
            }
            None => None,
        };
        let dissipator_signals = match &config.dissipator_signals {
            Some(signals) => {
                check_count("dissipator_signals", config.dissipator_operators.len(), signals.len())?;
                SignalList::new(signals.clone())
            }
            None => SignalList::new(vec![Signal::constant(1.0); config.dissipator_operators.len()]),
        };

        if let Some(frame) = &config.rotating_frame {
            if frame.dim() != dim {
                return Err(ValidationError::DimensionMismatch {
                    what: "rotating_frame".into(),
                    expected: dim,
                    actual: frame.dim(),
                }
                .into());
            }
        }

        let kernel = build_kernel(&config, dim)?;
        debug!(
            dim,
            num_hamiltonian_operators = config.hamiltonian_operators.len(),
            num_dissipators = config.dissipator_operators.len(),
            vectorized = config.vectorized,
            array_library = %config.array_library,
            "built Lindblad model"
        );
        Ok(Self {
            config: Arc::new(config),
            hamiltonian_signals,
            dissipator_signals,
            dim,
            kernel: Arc::new(kernel),
        })
    }

    /// Lindblad model from a Hamiltonian model plus dissipators.
    pub fn from_hamiltonian(
        hamiltonian: &HamiltonianModel,
        static_dissipators: Vec<Operator>,
        dissipator_operators: Vec<Operator>,
        dissipator_signals: Option<Vec<Signal>>,
        vectorized: bool,
    ) -> Result<Self> {
        Self::new(LindbladModelConfig {
            static_hamiltonian: hamiltonian.static_hamiltonian(),
            hamiltonian_operators: hamiltonian.hamiltonian_operators(),
            hamiltonian_signals: hamiltonian.signals().map(|s| s.signals().to_vec()),
            static_dissipators,
            dissipator_operators,
            dissipator_signals,
            rotating_frame: hamiltonian.rotating_frame().cloned(),
            in_frame_basis: hamiltonian.in_frame_basis(),
            array_library: hamiltonian.array_library(),
            vectorized,
        })
    }

    /// New model with the given signals; kernels are shared.
    ///
    /// # Errors
    /// `CountMismatch` if a signal list does not match its operators.
    pub fn with_signals(
        &self,
        hamiltonian_signals: Vec<Signal>,
        dissipator_signals: Option<Vec<Signal>>,
    ) -> Result<Self> {
        check_count(
            "hamiltonian_signals",
            self.config.hamiltonian_operators.len(),
            hamiltonian_signals.len(),
        )?;
        let dissipator_signals = match dissipator_signals {
            Some(signals) => {
                check_count(
                    "dissipator_signals",
                    self.config.dissipator_operators.len(),
                    signals.len(),
                )?;
                SignalList::new(signals)
            }
            None => self.dissipator_signals.clone(),
        };
        Ok(Self {
            hamiltonian_signals: Some(SignalList::new(hamiltonian_signals)),
            dissipator_signals,
            ..self.clone()
        })
    }

    fn rebuilt(&self, update: impl FnOnce(&mut LindbladModelConfig)) -> Result<Self> {
        let mut config = (*self.config).clone();
        update(&mut config);
        let kernel = build_kernel(&config, self.dim)?;
        Ok(Self {
            config: Arc::new(config),
            kernel: Arc::new(kernel),
            ..self.clone()
        })
    }

    pub fn with_rotating_frame(&self, rotating_frame: Option<RotatingFrame>) -> Result<Self> {
        if let Some(frame) = &rotating_frame {
            if frame.dim() != self.dim {
                return Err(ValidationError::DimensionMismatch {
                    what: "rotating_frame".into(),
                    expected: self.dim,
                    actual: frame.dim(),
                }
                .into());
            }
        }
        self.rebuilt(|c| c.rotating_frame = rotating_frame)
    }

    pub fn with_in_frame_basis(&self, in_frame_basis: bool) -> Result<Self> {
        self.rebuilt(|c| c.in_frame_basis = in_frame_basis)
    }

    pub fn with_vectorized(&self, vectorized: bool) -> Result<Self> {
        self.rebuilt(|c| c.vectorized = vectorized)
    }

    pub fn with_array_library(&self, array_library: ArrayLibrary) -> Result<Self> {
        self.rebuilt(|c| c.array_library = array_library)
    }

    /// Hilbert space dimension `n`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Rows of the state the model acts on: `n`, or `n²` when vectorized.
    pub fn state_dim(&self) -> usize {
        if self.config.vectorized {
            self.dim * self.dim
        } else {
            self.dim
        }
    }

    pub fn vectorized(&self) -> bool {
        self.config.vectorized
    }

    pub fn array_library(&self) -> ArrayLibrary {
        self.config.array_library
    }

    pub fn rotating_frame(&self) -> Option<&RotatingFrame> {
        self.config.rotating_frame.as_ref()
    }

    /// Frame acting on the model's states (vectorized in vectorized mode).
    pub fn state_frame(&self) -> Option<RotatingFrame> {
        if self.config.vectorized {
            self.kernel.vectorized_frame.clone()
        } else {
            self.config.rotating_frame.clone()
        }
    }

    pub fn in_frame_basis(&self) -> bool {
        self.config.in_frame_basis
    }

    pub fn config(&self) -> &LindbladModelConfig {
        &self.config
    }

    pub fn hamiltonian_signals(&self) -> Option<&SignalList> {
        self.hamiltonian_signals.as_ref()
    }

    pub fn dissipator_signals(&self) -> &SignalList {
        &self.dissipator_signals
    }

    fn hamiltonian_coefficients(&self, t: f64) -> Result<Vec<Complex64>> {
        if self.config.hamiltonian_operators.is_empty() {
            return Ok(Vec::new());
        }
        match &self.hamiltonian_signals {
            Some(signals) => Ok(signals.coefficients(t)),
            None => Err(Error::field(
                "hamiltonian_signals",
                "signals must be attached before the model is evaluated",
            )),
        }
    }

    fn all_coefficients(&self, t: f64) -> Result<Vec<Complex64>> {
        let mut coefficients = self.hamiltonian_coefficients(t)?;
        coefficients.extend(self.dissipator_signals.coefficients(t));
        Ok(coefficients)
    }

    /// Superoperator generator at time `t`.
    ///
    /// # Errors
    /// `ValidationError` unless the model is vectorized.
    pub fn evaluate(&self, t: f64) -> Result<Operator> {
        let superoperators = match (&self.kernel.superoperators, self.config.vectorized) {
            (Some(s), true) => s,
            _ => {
                return Err(Error::field(
                    "vectorized",
                    "a Lindblad model can only be evaluated without a state in vectorized mode",
                ))
            }
        };
        let op = superoperators.evaluate(&self.all_coefficients(t)?)?;
        Ok(match &self.kernel.vectorized_frame {
            Some(frame) => frame.operator_into_frame(t, &op, true, self.config.in_frame_basis),
            None => op,
        })
    }

    /// Right-hand side at time `t`.
    ///
    /// `y` is a density matrix (`n x n`) or, in vectorized mode, a block of
    /// column-stacked density matrices (`n² x m`).
    pub fn evaluate_rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        if self.config.vectorized {
            return self.evaluate_rhs_vectorized(t, y);
        }
        if y.dim() != (self.dim, self.dim) {
            return Err(ValidationError::DimensionMismatch {
                what: "density matrix".into(),
                expected: self.dim,
                actual: y.nrows().max(y.ncols()),
            }
            .into());
        }

        let in_basis = self.config.in_frame_basis;
        let rho = match &self.config.rotating_frame {
            Some(frame) => {
                let op = Operator::Dense(y.clone());
                frame.operator_out_of_frame(t, &op, in_basis, true).into_dense()
            }
            None => y.clone(),
        };

        let mut out = Array2::zeros((self.dim, self.dim));
        if let Some(hamiltonian) = &self.kernel.hamiltonian {
            let coefficients = self.hamiltonian_coefficients(t)?;
            // ρH = (Hρ†)† for Hermitian H
            let h_rho = hamiltonian.evaluate_rhs(&coefficients, &rho)?;
            let rho_h = dagger(&hamiltonian.evaluate_rhs(&coefficients, &dagger(&rho))?);
            out.scaled_add(Complex64::new(0.0, -1.0), &(h_rho - rho_h));
        }
        for (d, rate) in self
            .kernel
            .dissipators
            .iter()
            .zip(self.dissipator_signals.coefficients(t))
        {
            d.accumulate(rate, &rho, &mut out);
        }
        for d in &self.kernel.static_dissipators {
            d.accumulate(Complex64::new(1.0, 0.0), &rho, &mut out);
        }

        Ok(match &self.config.rotating_frame {
            Some(frame) => frame
                .operator_into_frame(t, &Operator::Dense(out), true, in_basis)
                .into_dense(),
            None => out,
        })
    }

    fn evaluate_rhs_vectorized(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        let superoperators = self.kernel.superoperators.as_ref().ok_or_else(|| {
            Error::NumericalFailure("vectorized kernel missing superoperators".into())
        })?;
        let coefficients = self.all_coefficients(t)?;
        let in_basis = self.config.in_frame_basis;
        match &self.kernel.vectorized_frame {
            Some(frame) => {
                let y_phase = frame.state_out_of_frame(t, y, in_basis, true);
                let out = superoperators.evaluate_rhs(&coefficients, &y_phase)?;
                Ok(frame.state_into_frame(t, &out, true, in_basis))
            }
            None => superoperators.evaluate_rhs(&coefficients, y),
        }
    }
}

fn check_count(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ValidationError::CountMismatch {
            what: what.into(),
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

fn validate_hamiltonian(config: &LindbladModelConfig) -> Result<()> {
    if let Some(h0) = &config.static_hamiltonian {
        if !h0.is_hermitian(HERMITIAN_ATOL) {
            return Err(ValidationError::NotHermitian("static_hamiltonian".into()).into());
        }
    }
    for (k, op) in config.hamiltonian_operators.iter().enumerate() {
        if !op.is_hermitian(HERMITIAN_ATOL) {
            return Err(
                ValidationError::NotHermitian(format!("hamiltonian_operators[{}]", k)).into(),
            );
        }
    }
    Ok(())
}

fn validate_dimensions(config: &LindbladModelConfig) -> Result<usize> {
    let all = config
        .static_hamiltonian
        .iter()
        .map(|op| ("static_hamiltonian".to_string(), op))
        .chain(
            config
                .hamiltonian_operators
                .iter()
                .enumerate()
                .map(|(k, op)| (format!("hamiltonian_operators[{}]", k), op)),
        )
        .chain(
            config
                .static_dissipators
                .iter()
                .enumerate()
                .map(|(k, op)| (format!("static_dissipators[{}]", k), op)),
        )
        .chain(
            config
                .dissipator_operators
                .iter()
                .enumerate()
                .map(|(k, op)| (format!("dissipator_operators[{}]", k), op)),
        );

    let mut dim: Option<usize> = None;
    for (what, op) in all {
        if !op.is_square() {
            return Err(ValidationError::DimensionMismatch {
                what: format!("{} (must be square)", what),
                expected: op.nrows(),
                actual: op.ncols(),
            }
            .into());
        }
        match dim {
            None => dim = Some(op.nrows()),
            Some(d) if d != op.nrows() => {
                return Err(ValidationError::DimensionMismatch {
                    what,
                    expected: d,
                    actual: op.nrows(),
                }
                .into())
            }
            Some(_) => {}
        }
    }
    dim.ok_or_else(|| {
        Error::field(
            "operators",
            "a Lindblad model needs at least one Hamiltonian or dissipator operator",
        )
    })
}

/// Static Hamiltonian in the frame basis with `H_F` subtracted, where `F = -iH_F`.
fn shifted_static_hamiltonian(
    config: &LindbladModelConfig,
    dim: usize,
) -> Option<Operator> {
    let library = config.array_library;
    let static_in_basis = match &config.rotating_frame {
        Some(frame) => config
            .static_hamiltonian
            .as_ref()
            .map(|h| frame.operator_into_frame_basis(h)),
        None => config.static_hamiltonian.clone(),
    }
    .map(|h| h.into_library(library));

    let frame = match &config.rotating_frame {
        Some(frame) if !frame.is_zero() => frame,
        _ => return static_in_basis,
    };

    // H_F = iF, diagonal entries i·λ
    let minus_hf: Vec<Complex64> = frame
        .frame_diag()
        .iter()
        .map(|&l| -(Complex64::i() * l))
        .collect();
    let shift = match library {
        ArrayLibrary::Dense => Operator::Dense(Array2::from_diag(&Array1::from(minus_hf))),
        ArrayLibrary::Sparse => Operator::Sparse(CsrMatrix::from_diag(&minus_hf)),
    };
    Some(match static_in_basis {
        Some(h) => add_operators(&h, &shift, dim),
        None => shift,
    })
}

fn build_kernel(config: &LindbladModelConfig, dim: usize) -> Result<LindbladKernel> {
    let library = config.array_library;
    let into_basis = |ops: &[Operator]| -> Vec<Operator> {
        match &config.rotating_frame {
            Some(frame) => frame.operators_into_frame_basis(ops),
            None => ops.to_vec(),
        }
    };

    let static_hamiltonian = shifted_static_hamiltonian(config, dim);
    let hamiltonian_operators: Vec<Operator> = into_basis(&config.hamiltonian_operators)
        .into_iter()
        .map(|op| op.into_library(library))
        .collect();
    let dissipator_operators = into_basis(&config.dissipator_operators);
    let static_dissipator_operators = into_basis(&config.static_dissipators);

    let hamiltonian = if static_hamiltonian.is_some() || !hamiltonian_operators.is_empty() {
        Some(build_collection(
            library,
            static_hamiltonian.clone(),
            hamiltonian_operators.clone(),
        )?)
    } else {
        None
    };

    let (superoperators, vectorized_frame) = if config.vectorized {
        let mut static_super: Option<Operator> = static_hamiltonian
            .as_ref()
            .map(|h| hamiltonian_superoperator(h, dim, library));
        for s in &static_dissipator_operators {
            let d = dissipator_superoperator(s, dim, library);
            static_super = Some(match static_super {
                Some(acc) => add_operators(&acc, &d, dim * dim),
                None => d,
            });
        }
        let mut ops: Vec<Operator> = hamiltonian_operators
            .iter()
            .map(|h| hamiltonian_superoperator(h, dim, library))
            .collect();
        ops.extend(
            dissipator_operators
                .iter()
                .map(|l| dissipator_superoperator(l, dim, library)),
        );
        let collection = build_collection(library, static_super, ops)?;
        let frame = config.rotating_frame.as_ref().map(RotatingFrame::vectorized);
        (Some(collection), frame)
    } else {
        (None, None)
    };

    Ok(LindbladKernel {
        hamiltonian,
        dissipators: dissipator_operators
            .into_iter()
            .map(|l| Dissipator::new(l, library))
            .collect(),
        static_dissipators: static_dissipator_operators
            .into_iter()
            .map(|l| Dissipator::new(l, library))
            .collect(),
        superoperators,
        vectorized_frame,
    })
}

fn to_csr(op: &Operator) -> CsrMatrix {
    match op {
        Operator::Sparse(m) => m.clone(),
        Operator::Dense(m) => CsrMatrix::from_dense(m, SPARSE_ATOL),
    }
}

fn kron_op(a: &Operator, b: &Operator, library: ArrayLibrary) -> Operator {
    match library {
        ArrayLibrary::Dense => Operator::Dense(kron(&a.to_dense(), &b.to_dense())),
        ArrayLibrary::Sparse => Operator::Sparse(to_csr(a).kron(&to_csr(b))),
    }
}

fn identity_op(n: usize, library: ArrayLibrary) -> Operator {
    match library {
        ArrayLibrary::Dense => Operator::Dense(Array2::eye(n)),
        ArrayLibrary::Sparse => Operator::Sparse(CsrMatrix::identity(n)),
    }
}

fn transpose_op(a: &Operator) -> Operator {
    match a {
        Operator::Dense(m) => Operator::Dense(m.t().to_owned()),
        Operator::Sparse(m) => Operator::Sparse(m.transpose()),
    }
}

fn conj_op(a: &Operator) -> Operator {
    match a {
        Operator::Dense(m) => Operator::Dense(m.mapv(|z| z.conj())),
        Operator::Sparse(m) => Operator::Sparse(m.conj()),
    }
}

/// `-i (I ⊗ H − Hᵀ ⊗ I)`
fn hamiltonian_superoperator(h: &Operator, dim: usize, library: ArrayLibrary) -> Operator {
    let eye = identity_op(dim, library);
    let left = kron_op(&eye, h, library).scale(Complex64::new(0.0, -1.0));
    let right = kron_op(&transpose_op(h), &eye, library).scale(Complex64::new(0.0, 1.0));
    add_operators(&left, &right, dim * dim)
}

/// `conj(L) ⊗ L − ½ I ⊗ L†L − ½ (L†L)ᵀ ⊗ I`
fn dissipator_superoperator(l: &Operator, dim: usize, library: ArrayLibrary) -> Operator {
    let eye = identity_op(dim, library);
    let l_dense = l.to_dense();
    let l_dag_l = Operator::Dense(dagger(&l_dense).dot(&l_dense)).into_library(library);
    let half = Complex64::new(-0.5, 0.0);
    let jump = kron_op(&conj_op(l), l, library);
    let left = kron_op(&eye, &l_dag_l, library).scale(half);
    let right = kron_op(&transpose_op(&l_dag_l), &eye, library).scale(half);
    add_operators(&add_operators(&jump, &left, dim * dim), &right, dim * dim)
}

impl OdeRhs for LindbladModel {
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        self.evaluate_rhs(t, y)
    }

    fn compile_support(&self) -> CompileSupport {
        self.config.array_library.compile_support()
    }

    fn as_generator(&self) -> Option<&dyn LmdeGenerator> {
        if self.config.vectorized {
            Some(self)
        } else {
            None
        }
    }
}

impl LmdeGenerator for LindbladModel {
    fn generator(&self, t: f64) -> Result<Operator> {
        self.evaluate(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::linalg::{unvec_columns, vec_columns};
    use crate::test_utils::{assert_matrix_close, c, pauli_x, pauli_z, sigma_minus};
    use approx::assert_relative_eq;

    fn rho_plus() -> Array2<Complex64> {
        Array2::from_elem((2, 2), c(0.5, 0.0))
    }

    fn base_config() -> LindbladModelConfig {
        LindbladModelConfig {
            static_hamiltonian: Some(Operator::Dense(pauli_z() * c(0.5, 0.0))),
            hamiltonian_operators: vec![Operator::Dense(pauli_x())],
            hamiltonian_signals: Some(vec![Signal::with_constant_envelope(c(0.3, 0.0), 1.0, 0.0)]),
            dissipator_operators: vec![Operator::Dense(sigma_minus())],
            dissipator_signals: Some(vec![Signal::constant(0.2)]),
            ..Default::default()
        }
    }

    fn manual_rhs(t: f64, rho: &Array2<Complex64>) -> Array2<Complex64> {
        let s = 0.3 * (2.0 * std::f64::consts::PI * t).cos();
        let h = pauli_z() * c(0.5, 0.0) + pauli_x() * c(s, 0.0);
        let l = sigma_minus();
        let l_dag = dagger(&l);
        let ldl = l_dag.dot(&l);
        let comm = (h.dot(rho) - rho.dot(&h)) * c(0.0, -1.0);
        let diss = (l.dot(rho).dot(&l_dag) - (ldl.dot(rho) + rho.dot(&ldl)) * c(0.5, 0.0)) * c(0.2, 0.0);
        comm + diss
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_dissipator_signal_count_mismatch() {
        let config = LindbladModelConfig {
            dissipator_signals: Some(vec![Signal::constant(0.1), Signal::constant(0.2)]),
            ..base_config()
        };
        let err = LindbladModel::new(config).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::CountMismatch { ref what, expected: 1, actual: 2 })
                if what == "dissipator_signals"
        ));
    }

    #[test]
    fn test_non_hermitian_hamiltonian_rejected() {
        let config = LindbladModelConfig {
            hamiltonian_operators: vec![Operator::Dense(sigma_minus())],
            ..base_config()
        };
        assert!(LindbladModel::new(config).is_err());
    }

    #[test]
    fn test_missing_dissipator_signals_default_to_one() {
        let config = LindbladModelConfig {
            static_hamiltonian: None,
            hamiltonian_operators: vec![],
            hamiltonian_signals: None,
            dissipator_signals: None,
            ..base_config()
        };
        let model = LindbladModel::new(config).unwrap();
        assert_eq!(model.dissipator_signals().values(3.0), vec![1.0]);

        // D[σ⁻] on |1⟩⟨1| moves population to |0⟩
        let mut rho = Array2::zeros((2, 2));
        rho[[1, 1]] = c(1.0, 0.0);
        let rhs = model.evaluate_rhs(0.0, &rho).unwrap();
        assert_relative_eq!(rhs[[0, 0]].re, 1.0, epsilon = 1e-14);
        assert_relative_eq!(rhs[[1, 1]].re, -1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_evaluate_requires_vectorized() {
        let model = LindbladModel::new(base_config()).unwrap();
        assert!(model.evaluate(0.0).is_err());
        assert!(model.with_vectorized(true).unwrap().evaluate(0.0).is_ok());
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    #[test]
    fn test_rhs_matches_master_equation() {
        for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
            let model = LindbladModel::new(LindbladModelConfig {
                array_library: library,
                ..base_config()
            })
            .unwrap();
            let t = 0.4;
            let rhs = model.evaluate_rhs(t, &rho_plus()).unwrap();
            assert_matrix_close(&rhs, &manual_rhs(t, &rho_plus()), 1e-12);
        }
    }

    #[test]
    fn test_frame_rhs_matches_transformed_lab_rhs() {
        let frame = RotatingFrame::from_operator(&(pauli_z() * c(0.5, 0.0))).unwrap();
        let model = LindbladModel::new(LindbladModelConfig {
            rotating_frame: Some(frame.clone()),
            ..base_config()
        })
        .unwrap();
        let t = 0.9;
        // rhs in frame: e^{-tF} L_lab(e^{tF} ρ e^{-tF}) e^{tF} - [F, ρ]
        let rho = rho_plus();
        let rho_lab = frame
            .operator_out_of_frame(t, &Operator::Dense(rho.clone()), false, false)
            .into_dense();
        let lab_rhs = manual_rhs(t, &rho_lab);
        let f = frame.frame_operator();
        let expected = frame
            .operator_into_frame(t, &Operator::Dense(lab_rhs), false, false)
            .into_dense()
            - (f.dot(&rho) - rho.dot(&f));
        let got = model.evaluate_rhs(t, &rho).unwrap();
        assert_matrix_close(&got, &expected, 1e-12);
    }

    #[test]
    fn test_vectorized_matches_matrix_form() {
        let frame =
            RotatingFrame::from_operator(&(pauli_z() * c(0.5, 0.0) + pauli_x() * c(0.1, 0.0)))
                .unwrap();
        for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
            for in_basis in [false, true] {
                let config = LindbladModelConfig {
                    rotating_frame: Some(frame.clone()),
                    in_frame_basis: in_basis,
                    static_dissipators: vec![Operator::Dense(pauli_z() * c(0.1, 0.0))],
                    array_library: library,
                    ..base_config()
                };
                let matrix_model = LindbladModel::new(config.clone()).unwrap();
                let vec_model = LindbladModel::new(LindbladModelConfig {
                    vectorized: true,
                    ..config
                })
                .unwrap();
                assert_eq!(vec_model.state_dim(), 4);

                let t = 0.65;
                let rho = rho_plus();
                let expected = matrix_model.evaluate_rhs(t, &rho).unwrap();
                let got = vec_model.evaluate_rhs(t, &vec_columns(&rho)).unwrap();
                assert_matrix_close(&unvec_columns(&got, 2).unwrap(), &expected, 1e-12);

                let generator = vec_model.evaluate(t).unwrap().to_dense();
                assert_matrix_close(&generator.dot(&vec_columns(&rho)), &got, 1e-12);
            }
        }
    }

    #[test]
    fn test_with_signals_validates_counts() {
        let model = LindbladModel::new(base_config()).unwrap();
        assert!(model.with_signals(vec![], None).is_err());
        assert!(model
            .with_signals(vec![Signal::constant(1.0)], Some(vec![]))
            .is_err());
        let other = model
            .with_signals(vec![Signal::constant(0.0)], Some(vec![Signal::constant(0.0)]))
            .unwrap();
        assert_eq!(other.hamiltonian_signals().unwrap().values(0.0), vec![0.0]);
    }

    // =========================================================================
    // Channels
    // =========================================================================

    #[test]
    fn test_channel_validation() {
        assert!(DissipatorChannel::amplitude_damping(0.0, "q0").is_err());
        assert!(DissipatorChannel::pure_dephasing(10.0, 25.0, "q0").is_err());
        let channels = DissipatorChannel::from_t1_t2(50.0, 30.0, "q0").unwrap();
        assert_eq!(channels.len(), 2);
        assert_relative_eq!(channels[0].rate, 1.0 / 50.0);
        assert_eq!(channels[1].label, "Tphi_q0");
    }

    #[test]
    fn test_channels_give_t2_coherence_decay_rate() {
        let (t1, t2) = (40.0, 30.0);
        let channels = DissipatorChannel::from_t1_t2(t1, t2, "q0").unwrap();
        let config = LindbladModelConfig {
            static_hamiltonian: Some(Operator::Dense(Array2::zeros((2, 2)))),
            ..Default::default()
        }
        .with_channels(&channels);
        let model = LindbladModel::new(config).unwrap();
        let rhs = model.evaluate_rhs(0.0, &rho_plus()).unwrap();
        // dρ01/dt = -ρ01 / T2
        assert_relative_eq!(rhs[[0, 1]].re, -0.5 / t2, epsilon = 1e-12);
    }
}
