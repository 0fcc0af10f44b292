// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hamiltonian models: `H(t) = H_0 + Σ_j s_j(t) H_j` with generator `G = -iH`.

use ndarray::Array2;
use num_complex::Complex64;

use super::generator::GeneratorModel;
use crate::array::{ArrayLibrary, CompileSupport, Operator, HERMITIAN_ATOL};
use crate::error::{Result, ValidationError};
use crate::frame::RotatingFrame;
use crate::signals::SignalList;
use crate::solvers::{LmdeGenerator, OdeRhs};

/// Hamiltonian model.
///
/// Operators are validated to be Hermitian. A frame given by a Hermitian
/// `H_F` acts as `F = -iH_F`, so in the frame the model evaluates
/// `-i(e^{-tF} H(t) e^{tF} - H_F)`.
#[derive(Debug, Clone)]
pub struct HamiltonianModel {
    generator: GeneratorModel,
}

impl HamiltonianModel {
    /// # Arguments
    /// * `static_hamiltonian` - Constant part `H_0`
    /// * `operators` - Signal-modulated Hermitian operators `H_j`
    /// * `array_library` - Storage for the operators
    ///
    /// # Errors
    /// `NotHermitian` for a non-Hermitian operator, plus the
    /// [`GeneratorModel::new`] validation errors.
    pub fn new(
        static_hamiltonian: Option<Operator>,
        operators: Vec<Operator>,
        array_library: ArrayLibrary,
    ) -> Result<Self> {
        if let Some(h0) = &static_hamiltonian {
            if !h0.is_hermitian(HERMITIAN_ATOL) {
                return Err(ValidationError::NotHermitian("static_hamiltonian".into()).into());
            }
        }
        for (k, op) in operators.iter().enumerate() {
            if !op.is_hermitian(HERMITIAN_ATOL) {
                return Err(ValidationError::NotHermitian(format!("operators[{}]", k)).into());
            }
        }
        let minus_i = Complex64::new(0.0, -1.0);
        let generator = GeneratorModel::new(
            static_hamiltonian.map(|h| h.scale(minus_i)),
            operators.iter().map(|h| h.scale(minus_i)).collect(),
            array_library,
        )?;
        Ok(Self { generator })
    }

    pub fn with_signals(&self, signals: impl Into<SignalList>) -> Result<Self> {
        Ok(Self {
            generator: self.generator.with_signals(signals)?,
        })
    }

    pub fn with_rotating_frame(&self, rotating_frame: Option<RotatingFrame>) -> Result<Self> {
        Ok(Self {
            generator: self.generator.with_rotating_frame(rotating_frame)?,
        })
    }

    pub fn with_in_frame_basis(&self, in_frame_basis: bool) -> Self {
        Self {
            generator: self.generator.with_in_frame_basis(in_frame_basis),
        }
    }

    pub fn with_array_library(&self, array_library: ArrayLibrary) -> Result<Self> {
        Ok(Self {
            generator: self.generator.with_array_library(array_library)?,
        })
    }

    /// Underlying generator model (`G = -iH`).
    pub fn generator_model(&self) -> &GeneratorModel {
        &self.generator
    }

    pub fn dim(&self) -> usize {
        self.generator.dim()
    }

    pub fn num_operators(&self) -> usize {
        self.generator.num_operators()
    }

    pub fn array_library(&self) -> ArrayLibrary {
        self.generator.array_library()
    }

    pub fn signals(&self) -> Option<&SignalList> {
        self.generator.signals()
    }

    pub fn rotating_frame(&self) -> Option<&RotatingFrame> {
        self.generator.rotating_frame()
    }

    pub fn in_frame_basis(&self) -> bool {
        self.generator.in_frame_basis()
    }

    /// Static Hamiltonian `H_0` (lab frame).
    pub fn static_hamiltonian(&self) -> Option<Operator> {
        let i = Complex64::new(0.0, 1.0);
        self.generator.static_operator().map(|g| g.scale(i))
    }

    /// Hermitian operators `H_j` (lab frame).
    pub fn hamiltonian_operators(&self) -> Vec<Operator> {
        let i = Complex64::new(0.0, 1.0);
        self.generator.operators().iter().map(|g| g.scale(i)).collect()
    }

    /// Generator `-iH(t)` in the frame.
    pub fn evaluate(&self, t: f64) -> Result<Operator> {
        self.generator.evaluate(t)
    }

    /// Hamiltonian `H(t)` in the frame, `i * evaluate(t)`.
    pub fn evaluate_hamiltonian(&self, t: f64) -> Result<Operator> {
        Ok(self.generator.evaluate(t)?.scale(Complex64::new(0.0, 1.0)))
    }

    /// `-iH(t) @ y`
    pub fn evaluate_rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        self.generator.evaluate_rhs(t, y)
    }
}

impl OdeRhs for HamiltonianModel {
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        self.evaluate_rhs(t, y)
    }

    fn compile_support(&self) -> CompileSupport {
        self.array_library().compile_support()
    }

    fn as_generator(&self) -> Option<&dyn LmdeGenerator> {
        Some(self)
    }
}

impl LmdeGenerator for HamiltonianModel {
    fn generator(&self, t: f64) -> Result<Operator> {
        self.evaluate(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::signals::Signal;
    use crate::test_utils::{assert_matrix_close, c, pauli_x, pauli_y, pauli_z};

    #[test]
    fn test_non_hermitian_rejected() {
        let bad = Operator::Dense(pauli_x() * c(0.0, 1.0));
        let err = HamiltonianModel::new(None, vec![bad.clone()], ArrayLibrary::Dense).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NotHermitian(ref what)) if what == "operators[0]"
        ));
        assert!(HamiltonianModel::new(Some(bad), vec![], ArrayLibrary::Sparse).is_err());
    }

    #[test]
    fn test_evaluate_is_minus_i_h() {
        let model = HamiltonianModel::new(
            Some(Operator::Dense(pauli_z())),
            vec![Operator::Dense(pauli_x())],
            ArrayLibrary::Dense,
        )
        .unwrap()
        .with_signals(vec![Signal::constant(0.25)])
        .unwrap();
        let h = pauli_z() + pauli_x() * c(0.25, 0.0);
        assert_matrix_close(&model.evaluate(0.0).unwrap().to_dense(), &(&h * c(0.0, -1.0)), 1e-14);
        assert_matrix_close(&model.evaluate_hamiltonian(0.0).unwrap().to_dense(), &h, 1e-14);
        assert_matrix_close(&model.static_hamiltonian().unwrap().to_dense(), &pauli_z(), 1e-14);
    }

    #[test]
    fn test_hermitian_frame_removes_static_part() {
        // In the frame of H_0 the static part vanishes.
        let model = HamiltonianModel::new(
            Some(Operator::Dense(pauli_z() * c(2.0, 0.0))),
            vec![Operator::Dense(pauli_y())],
            ArrayLibrary::Dense,
        )
        .unwrap()
        .with_signals(vec![Signal::constant(0.0)])
        .unwrap()
        .with_rotating_frame(Some(
            RotatingFrame::from_operator(&(pauli_z() * c(2.0, 0.0))).unwrap(),
        ))
        .unwrap();
        let g = model.evaluate(0.7).unwrap().to_dense();
        assert!(g.iter().all(|z| z.norm() < 1e-12));
    }
}
