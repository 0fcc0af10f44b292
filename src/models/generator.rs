// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Generator models: `G(t) = G_0 + Σ_j s_j(t) G_j`.

use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use tracing::debug;

use crate::array::{build_collection, ArrayLibrary, CompileSupport, CsrMatrix, Operator, OperatorCollection};
use crate::error::{Error, Result, ValidationError};
use crate::frame::RotatingFrame;
use crate::signals::SignalList;
use crate::solvers::{LmdeGenerator, OdeRhs};

/// Lab-frame operators shared between model instances.
#[derive(Debug)]
struct ModelOperators {
    static_operator: Option<Operator>,
    operators: Vec<Operator>,
}

/// Linear generator `G(t) = G_0 + Σ_j s_j(t) G_j`, optionally in a rotating frame.
///
/// In a frame `F` the model evaluates `e^{-tF} G(t) e^{tF} - F`. Operators are
/// stored in the frame basis with `F` already subtracted from the static
/// part, so evaluation only applies elementwise phases.
///
/// Instances are immutable; `with_*` methods return new models sharing the
/// operator storage.
#[derive(Debug, Clone)]
pub struct GeneratorModel {
    lab: Arc<ModelOperators>,
    signals: Option<SignalList>,
    rotating_frame: Option<RotatingFrame>,
    in_frame_basis: bool,
    array_library: ArrayLibrary,
    collection: Arc<dyn OperatorCollection>,
}

impl GeneratorModel {
    /// Create a model without signals or frame.
    ///
    /// # Arguments
    /// * `static_operator` - Constant part `G_0`
    /// * `operators` - Signal-modulated operators `G_j`
    /// * `array_library` - Storage for the operators
    ///
    /// # Errors
    /// `ValidationError` if neither part is given or the operators are not
    /// square with a common dimension.
    pub fn new(
        static_operator: Option<Operator>,
        operators: Vec<Operator>,
        array_library: ArrayLibrary,
    ) -> Result<Self> {
        let static_operator = static_operator.map(|op| op.into_library(array_library));
        let operators: Vec<Operator> = operators
            .into_iter()
            .map(|op| op.into_library(array_library))
            .collect();
        let collection = build_collection(array_library, static_operator.clone(), operators.clone())?;
        debug!(
            dim = collection.dim(),
            num_operators = operators.len(),
            array_library = %array_library,
            "built generator model"
        );
        Ok(Self {
            lab: Arc::new(ModelOperators {
                static_operator,
                operators,
            }),
            signals: None,
            rotating_frame: None,
            in_frame_basis: false,
            array_library,
            collection,
        })
    }

    /// New model with the given signals attached.
    ///
    /// # Errors
    /// `CountMismatch` if the number of signals differs from the number of operators.
    pub fn with_signals(&self, signals: impl Into<SignalList>) -> Result<Self> {
        let signals = signals.into();
        if signals.len() != self.num_operators() {
            return Err(ValidationError::CountMismatch {
                what: "signals".into(),
                expected: self.num_operators(),
                actual: signals.len(),
            }
            .into());
        }
        Ok(Self {
            signals: Some(signals),
            ..self.clone()
        })
    }

    /// New model evaluated in the given rotating frame (`None` removes it).
    pub fn with_rotating_frame(&self, rotating_frame: Option<RotatingFrame>) -> Result<Self> {
        let collection = match &rotating_frame {
            Some(frame) => {
                if frame.dim() != self.dim() {
                    return Err(ValidationError::DimensionMismatch {
                        what: "rotating_frame".into(),
                        expected: self.dim(),
                        actual: frame.dim(),
                    }
                    .into());
                }
                frame_collection(
                    frame,
                    self.lab.static_operator.as_ref(),
                    &self.lab.operators,
                    self.array_library,
                    self.dim(),
                )?
            }
            None => build_collection(
                self.array_library,
                self.lab.static_operator.clone(),
                self.lab.operators.clone(),
            )?,
        };
        Ok(Self {
            rotating_frame,
            collection,
            ..self.clone()
        })
    }

    /// New model that takes and returns states in the frame basis.
    pub fn with_in_frame_basis(&self, in_frame_basis: bool) -> Self {
        Self {
            in_frame_basis,
            ..self.clone()
        }
    }

    /// Copy of this model with operators stored in another library.
    pub fn with_array_library(&self, array_library: ArrayLibrary) -> Result<Self> {
        let mut model = Self::new(
            self.lab.static_operator.clone(),
            self.lab.operators.clone(),
            array_library,
        )?
        .with_rotating_frame(self.rotating_frame.clone())?
        .with_in_frame_basis(self.in_frame_basis);
        model.signals = self.signals.clone();
        Ok(model)
    }

    pub fn dim(&self) -> usize {
        self.collection.dim()
    }

    pub fn num_operators(&self) -> usize {
        self.lab.operators.len()
    }

    pub fn array_library(&self) -> ArrayLibrary {
        self.array_library
    }

    pub fn signals(&self) -> Option<&SignalList> {
        self.signals.as_ref()
    }

    pub fn rotating_frame(&self) -> Option<&RotatingFrame> {
        self.rotating_frame.as_ref()
    }

    pub fn in_frame_basis(&self) -> bool {
        self.in_frame_basis
    }

    /// Static operator as given at construction (lab frame).
    pub fn static_operator(&self) -> Option<&Operator> {
        self.lab.static_operator.as_ref()
    }

    /// Signal-modulated operators as given at construction (lab frame).
    pub fn operators(&self) -> &[Operator] {
        &self.lab.operators
    }

    /// Signal coefficients at time `t`.
    pub fn coefficients(&self, t: f64) -> Result<Vec<Complex64>> {
        if self.num_operators() == 0 {
            return Ok(Vec::new());
        }
        match &self.signals {
            Some(signals) => Ok(signals.coefficients(t)),
            None => Err(Error::field(
                "signals",
                "signals must be attached before the model is evaluated",
            )),
        }
    }

    /// Generator at time `t`, in the frame and (if `in_frame_basis`) the frame basis.
    pub fn evaluate(&self, t: f64) -> Result<Operator> {
        let coefficients = self.coefficients(t)?;
        self.evaluate_with_coefficients(t, &coefficients)
    }

    /// Generator at time `t` with explicit operator coefficients.
    pub fn evaluate_with_coefficients(&self, t: f64, coefficients: &[Complex64]) -> Result<Operator> {
        let op = self.collection.evaluate(coefficients)?;
        Ok(match &self.rotating_frame {
            Some(frame) => frame.operator_into_frame(t, &op, true, self.in_frame_basis),
            None => op,
        })
    }

    /// `G(t) @ y` without forming `G(t)`.
    pub fn evaluate_rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        let coefficients = self.coefficients(t)?;
        self.evaluate_rhs_with_coefficients(t, &coefficients, y)
    }

    /// `G(t) @ y` with explicit operator coefficients.
    pub fn evaluate_rhs_with_coefficients(
        &self,
        t: f64,
        coefficients: &[Complex64],
        y: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>> {
        match &self.rotating_frame {
            Some(frame) => {
                let y_lab_phase = frame.state_out_of_frame(t, y, self.in_frame_basis, true);
                let out = self.collection.evaluate_rhs(coefficients, &y_lab_phase)?;
                Ok(frame.state_into_frame(t, &out, true, self.in_frame_basis))
            }
            None => self.collection.evaluate_rhs(coefficients, y),
        }
    }
}

/// Operators in the frame basis with `F` subtracted from the static part.
pub(crate) fn frame_collection(
    frame: &RotatingFrame,
    static_operator: Option<&Operator>,
    operators: &[Operator],
    array_library: ArrayLibrary,
    dim: usize,
) -> Result<Arc<dyn OperatorCollection>> {
    let operators = frame.operators_into_frame_basis(operators);
    let static_operator = if frame.is_zero() {
        static_operator.map(|s| frame.operator_into_frame_basis(s))
    } else {
        let minus_diag: Vec<Complex64> = frame.frame_diag().iter().map(|&l| -l).collect();
        let shift = match array_library {
            ArrayLibrary::Dense => Operator::Dense(Array2::from_diag(&ndarray::Array1::from(minus_diag))),
            ArrayLibrary::Sparse => Operator::Sparse(CsrMatrix::from_diag(&minus_diag)),
        };
        Some(match static_operator {
            Some(s) => add_operators(&frame.operator_into_frame_basis(s), &shift, dim),
            None => shift,
        })
    };
    build_collection(array_library, static_operator, operators)
}

/// `a + b` for operators of the same library.
pub(crate) fn add_operators(a: &Operator, b: &Operator, dim: usize) -> Operator {
    match (a, b) {
        (Operator::Sparse(x), Operator::Sparse(y)) => {
            let one = Complex64::new(1.0, 0.0);
            Operator::Sparse(CsrMatrix::linear_combination(dim, dim, &[(one, x), (one, y)]))
        }
        (Operator::Sparse(x), dense) | (dense, Operator::Sparse(x)) => {
            Operator::Sparse(CsrMatrix::from_dense(
                &(x.to_dense() + dense.to_dense()),
                crate::array::SPARSE_ATOL,
            ))
        }
        (Operator::Dense(x), Operator::Dense(y)) => Operator::Dense(x + y),
    }
}

impl OdeRhs for GeneratorModel {
    fn rhs(&self, t: f64, y: &Array2<Complex64>) -> Result<Array2<Complex64>> {
        self.evaluate_rhs(t, y)
    }

    fn compile_support(&self) -> CompileSupport {
        self.array_library.compile_support()
    }

    fn as_generator(&self) -> Option<&dyn LmdeGenerator> {
        Some(self)
    }
}

impl LmdeGenerator for GeneratorModel {
    fn generator(&self, t: f64) -> Result<Operator> {
        self.evaluate(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal;
    use crate::test_utils::{assert_matrix_close, c, column, pauli_x, pauli_y, pauli_z};

    fn model(library: ArrayLibrary) -> GeneratorModel {
        GeneratorModel::new(
            Some(Operator::Dense(pauli_z() * c(0.0, -1.0))),
            vec![
                Operator::Dense(pauli_x() * c(0.0, -1.0)),
                Operator::Dense(pauli_y() * c(0.0, -1.0)),
            ],
            library,
        )
        .unwrap()
        .with_signals(vec![
            Signal::constant(0.5),
            Signal::with_constant_envelope(c(1.0, 0.0), 1.0, 0.0),
        ])
        .unwrap()
    }

    fn lab_generator(t: f64) -> Array2<Complex64> {
        let s1 = (2.0 * std::f64::consts::PI * t).cos();
        (pauli_z() + pauli_x() * c(0.5, 0.0) + pauli_y() * c(s1, 0.0)) * c(0.0, -1.0)
    }

    #[test]
    fn test_evaluate_without_frame() {
        for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
            let m = model(library);
            assert_matrix_close(&m.evaluate(0.3).unwrap().to_dense(), &lab_generator(0.3), 1e-12);
        }
    }

    #[test]
    fn test_signal_count_mismatch() {
        let m = model(ArrayLibrary::Dense);
        let err = m.with_signals(vec![Signal::constant(1.0)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::CountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_missing_signals_is_error() {
        let m = GeneratorModel::new(None, vec![Operator::Dense(pauli_x())], ArrayLibrary::Dense)
            .unwrap();
        assert!(m.evaluate(0.0).is_err());
    }

    #[test]
    fn test_with_signals_does_not_mutate() {
        let m = model(ArrayLibrary::Dense);
        let other = m.with_signals(vec![Signal::constant(0.0), Signal::constant(0.0)]).unwrap();
        assert_matrix_close(&m.evaluate(0.3).unwrap().to_dense(), &lab_generator(0.3), 1e-12);
        assert_matrix_close(
            &other.evaluate(0.3).unwrap().to_dense(),
            &(pauli_z() * c(0.0, -1.0)),
            1e-12,
        );
    }

    #[test]
    fn test_frame_evaluate_matches_definition() {
        let frame = RotatingFrame::from_operator(&pauli_z()).unwrap();
        for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
            let m = model(library).with_rotating_frame(Some(frame.clone())).unwrap();
            let t = 0.37;
            let expected = frame
                .generator_into_frame(t, &Operator::Dense(lab_generator(t)), false, false)
                .to_dense();
            assert_matrix_close(&m.evaluate(t).unwrap().to_dense(), &expected, 1e-12);
        }
    }

    #[test]
    fn test_frame_evaluate_rhs_matches_evaluate() {
        let frame =
            RotatingFrame::from_operator(&(pauli_z() + pauli_x() * c(0.4, 0.0))).unwrap();
        let y = column(&[c(0.6, 0.0), c(0.0, 0.8)]);
        for in_basis in [false, true] {
            for library in [ArrayLibrary::Dense, ArrayLibrary::Sparse] {
                let m = model(library)
                    .with_rotating_frame(Some(frame.clone()))
                    .unwrap()
                    .with_in_frame_basis(in_basis);
                let g = m.evaluate(1.1).unwrap().to_dense();
                let rhs = m.evaluate_rhs(1.1, &y).unwrap();
                assert_matrix_close(&rhs, &g.dot(&y), 1e-12);
            }
        }
    }

    #[test]
    fn test_frame_dimension_mismatch() {
        let frame = RotatingFrame::zero(3);
        assert!(model(ArrayLibrary::Dense).with_rotating_frame(Some(frame)).is_err());
    }

    #[test]
    fn test_switch_array_library() {
        let m = model(ArrayLibrary::Dense);
        let s = m.with_array_library(ArrayLibrary::Sparse).unwrap();
        assert_eq!(s.array_library(), ArrayLibrary::Sparse);
        assert_eq!(s.compile_support(), CompileSupport::Unsupported);
        assert_matrix_close(
            &s.evaluate(0.2).unwrap().to_dense(),
            &m.evaluate(0.2).unwrap().to_dense(),
            1e-12,
        );
    }
}
