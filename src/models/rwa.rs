// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rotating-wave approximation.
//!
//! In a frame with anti-Hermitian diagonal `d` (frame basis), element
//! `(a, b)` of `e^{-tF} G e^{tF}` rotates at angular frequency
//! `Im(d_b − d_a)`. A signal `s(t) = Re[f(t) e^{i2πνt}]` splits the operator
//! into two rotating parts with frequencies `ν + Im(d_b − d_a)/2π` and
//! `−ν + Im(d_b − d_a)/2π`. Parts
//! rotating faster than the cutoff are dropped:
//!
//! ```text
//! s(t) G ≈ s(t) (G₊ + G₋)/2 + s'(t) i(G₊ − G₋)/2
//! ```
//!
//! where `G₊`, `G₋` keep the slow elements of each part and `s'` is `s`
//! with its phase shifted by `−π/2`. Each operator therefore becomes two,
//! both Hermitian when `G` is. Sum signals are split into their components
//! first. The returned model keeps the original frame.

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;
use tracing::debug;

use super::generator::GeneratorModel;
use super::hamiltonian::HamiltonianModel;
use super::lindblad::{LindbladModel, LindbladModelConfig};
use crate::array::Operator;
use crate::error::{Error, Result};
use crate::frame::RotatingFrame;
use crate::signals::{Signal, SignalList};

/// Operators and signals after the approximation, operators in the lab basis.
struct RwaTerms {
    static_operator: Option<Operator>,
    operators: Vec<Operator>,
    signals: Vec<Signal>,
}

/// Rotation frequencies `Im(d_b − d_a) / 2π` in the frame basis.
fn frame_frequencies(frame: &RotatingFrame) -> Array2<f64> {
    let diag = frame.frame_diag();
    let n = diag.len();
    Array2::from_shape_fn((n, n), |(a, b)| (diag[b] - diag[a]).im / (2.0 * PI))
}

fn mask(op: &Array2<Complex64>, keep: impl Fn(usize, usize) -> bool) -> Array2<Complex64> {
    Array2::from_shape_fn(op.dim(), |(a, b)| {
        if keep(a, b) {
            op[[a, b]]
        } else {
            Complex64::new(0.0, 0.0)
        }
    })
}

fn rwa_terms(
    frame: Option<&RotatingFrame>,
    static_operator: Option<&Operator>,
    operators: &[Operator],
    signals: Option<&SignalList>,
    cutoff_freq: f64,
) -> Result<RwaTerms> {
    if !(cutoff_freq > 0.0) || !cutoff_freq.is_finite() {
        return Err(Error::field(
            "cutoff_freq",
            format!("must be positive and finite, got {}", cutoff_freq),
        ));
    }
    let signals: &[Signal] = match signals {
        Some(s) => s.signals(),
        None if operators.is_empty() => &[],
        None => {
            return Err(Error::field(
                "signals",
                "the rotating-wave approximation needs signals to read carrier frequencies",
            ))
        }
    };
    let dim = static_operator
        .map(Operator::nrows)
        .or_else(|| operators.first().map(Operator::nrows))
        .unwrap_or(0);
    let zero = RotatingFrame::zero(dim);
    let frame = frame.unwrap_or(&zero);
    let freqs = frame_frequencies(frame);

    let into_basis = |op: &Operator| frame.operator_into_frame_basis(op).into_dense();
    let out_of_basis = |m: Array2<Complex64>| -> Operator {
        frame.operator_out_of_frame_basis(&Operator::Dense(m))
    };

    let static_operator = static_operator.map(|op| {
        let in_basis = into_basis(op);
        out_of_basis(mask(&in_basis, |a, b| freqs[[a, b]].abs() < cutoff_freq))
    });

    let mut real_parts = Vec::new();
    let mut imag_parts = Vec::new();
    let mut real_signals = Vec::new();
    let mut imag_signals = Vec::new();
    let half = Complex64::new(0.5, 0.0);
    let half_i = Complex64::new(0.0, 0.5);

    for (op, signal) in operators.iter().zip(signals) {
        let in_basis = into_basis(op);
        for component in signal.components() {
            let nu = component.carrier_freq();
            let plus = mask(&in_basis, |a, b| (nu + freqs[[a, b]]).abs() < cutoff_freq);
            let minus = mask(&in_basis, |a, b| (-nu + freqs[[a, b]]).abs() < cutoff_freq);
            real_parts.push(out_of_basis((&plus + &minus) * half));
            imag_parts.push(out_of_basis((&plus - &minus) * half_i));
            real_signals.push(component.clone());
            imag_signals.push(component.shift_phase(-PI / 2.0));
        }
    }

    real_parts.extend(imag_parts);
    real_signals.extend(imag_signals);
    debug!(
        cutoff_freq,
        num_operators_in = operators.len(),
        num_operators_out = real_parts.len(),
        "applied rotating-wave approximation"
    );
    Ok(RwaTerms {
        static_operator,
        operators: real_parts,
        signals: real_signals,
    })
}

/// Rotating-wave approximation of a generator model.
///
/// # Errors
/// `ValidationError` if the cutoff is not positive or the model has
/// operators but no signals.
pub fn rotating_wave_approximation(model: &GeneratorModel, cutoff_freq: f64) -> Result<GeneratorModel> {
    let terms = rwa_terms(
        model.rotating_frame(),
        model.static_operator(),
        model.operators(),
        model.signals(),
        cutoff_freq,
    )?;
    let rwa = GeneratorModel::new(terms.static_operator, terms.operators, model.array_library())?;
    let rwa = if rwa.num_operators() > 0 {
        rwa.with_signals(terms.signals)?
    } else {
        rwa
    };
    Ok(rwa
        .with_rotating_frame(model.rotating_frame().cloned())?
        .with_in_frame_basis(model.in_frame_basis()))
}

/// Rotating-wave approximation of a Hamiltonian model; the result is Hermitian.
pub fn rotating_wave_approximation_hamiltonian(
    model: &HamiltonianModel,
    cutoff_freq: f64,
) -> Result<HamiltonianModel> {
    let static_hamiltonian = model.static_hamiltonian();
    let terms = rwa_terms(
        model.rotating_frame(),
        static_hamiltonian.as_ref(),
        &model.hamiltonian_operators(),
        model.signals(),
        cutoff_freq,
    )?;
    let rwa = HamiltonianModel::new(terms.static_operator, terms.operators, model.array_library())?;
    let rwa = if rwa.num_operators() > 0 {
        rwa.with_signals(terms.signals)?
    } else {
        rwa
    };
    Ok(rwa
        .with_rotating_frame(model.rotating_frame().cloned())?
        .with_in_frame_basis(model.in_frame_basis()))
}

/// Rotating-wave approximation of the Hamiltonian part of a Lindblad model.
///
/// Dissipators and their rates are kept unchanged.
pub fn rotating_wave_approximation_lindblad(
    model: &LindbladModel,
    cutoff_freq: f64,
) -> Result<LindbladModel> {
    let config = model.config();
    let terms = rwa_terms(
        model.rotating_frame(),
        config.static_hamiltonian.as_ref(),
        &config.hamiltonian_operators,
        model.hamiltonian_signals(),
        cutoff_freq,
    )?;
    LindbladModel::new(LindbladModelConfig {
        static_hamiltonian: terms.static_operator,
        hamiltonian_operators: terms.operators,
        hamiltonian_signals: Some(terms.signals),
        dissipator_signals: Some(model.dissipator_signals().signals().to_vec()),
        ..config.clone()
    })
}
