// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dressed states of a static Hamiltonian and measurement sampling.
//!
//! Labels are strings of per-subsystem level digits, highest subsystem
//! first, so for `subsystem_dims = [2, 3]` the label `"21"` is level 1 of
//! subsystem 0 and level 2 of subsystem 1. Subsystem 0 is the least
//! significant factor of the basis index.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::array::linalg::{eigh, is_hermitian};
use crate::error::{Error, Result, ValidationError};
use crate::state::{State, StateKind};

/// Largest level count a single digit can label.
const MAX_LEVELS: usize = 36;

/// Labels of all basis states, in basis index order.
pub fn labels_generator(subsystem_dims: &[usize]) -> Result<Vec<String>> {
    if subsystem_dims.is_empty() {
        return Err(Error::field("subsystem_dims", "must not be empty"));
    }
    if let Some(&d) = subsystem_dims.iter().find(|&&d| d == 0 || d > MAX_LEVELS) {
        return Err(Error::field(
            "subsystem_dims",
            format!("each dimension must be in 1..={}, got {}", MAX_LEVELS, d),
        ));
    }
    let total: usize = subsystem_dims.iter().product();
    Ok((0..total).map(|index| label_of(index, subsystem_dims)).collect())
}

fn label_of(mut index: usize, subsystem_dims: &[usize]) -> String {
    let mut digits = Vec::with_capacity(subsystem_dims.len());
    for &d in subsystem_dims {
        digits.push(index % d);
        index /= d;
    }
    digits
        .iter()
        .rev()
        .map(|&l| char::from_digit(l as u32, MAX_LEVELS as u32).unwrap_or('?'))
        .collect()
}

/// Label with a single excitation in `subsystem`.
fn excited_label(subsystem: usize, subsystem_dims: &[usize]) -> String {
    let stride: usize = subsystem_dims[..subsystem].iter().product();
    label_of(stride, subsystem_dims)
}

/// Eigenstates of a static Hamiltonian matched to bare-state labels.
#[derive(Debug, Clone)]
pub struct DressedStates {
    /// Labels in ascending energy order
    pub labels: Vec<String>,
    pub states: BTreeMap<String, Array1<Complex64>>,
    pub energies: BTreeMap<String, f64>,
    /// Single-excitation frequency of each subsystem, `(E_excited - E_ground) / 2π`
    pub frequencies: Vec<f64>,
}

/// Diagonalize `static_hamiltonian` and label each eigenvector by the basis
/// state it overlaps most.
///
/// # Errors
/// - non-Hermitian or wrongly sized Hamiltonian
/// - two eigenvectors assigned the same label
/// - a subsystem with a single level (no excitation frequency)
pub fn convert_to_dressed(
    static_hamiltonian: &Array2<Complex64>,
    subsystem_dims: &[usize],
) -> Result<DressedStates> {
    let labels = labels_generator(subsystem_dims)?;
    if static_hamiltonian.nrows() != labels.len() || !static_hamiltonian.is_square() {
        return Err(ValidationError::DimensionMismatch {
            what: "static_hamiltonian rows".into(),
            expected: labels.len(),
            actual: static_hamiltonian.nrows(),
        }
        .into());
    }
    if !is_hermitian(static_hamiltonian, 1e-10) {
        return Err(ValidationError::NotHermitian("static_hamiltonian".into()).into());
    }

    let (values, vectors) = eigh(static_hamiltonian)?;
    let mut dressed = DressedStates {
        labels: Vec::with_capacity(labels.len()),
        states: BTreeMap::new(),
        energies: BTreeMap::new(),
        frequencies: Vec::with_capacity(subsystem_dims.len()),
    };
    for (k, column) in vectors.columns().into_iter().enumerate() {
        let position = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map_or(0, |(i, _)| i);
        let label = labels[position].clone();
        if dressed.states.contains_key(&label) {
            return Err(Error::NumericalFailure(format!(
                "eigenvectors {} and another both overlap most with basis state {}",
                k, label
            )));
        }
        dressed.states.insert(label.clone(), column.to_owned());
        dressed.energies.insert(label.clone(), values[k]);
        dressed.labels.push(label);
    }

    let ground = dressed.energies.get(&labels[0]).copied();
    for subsystem in 0..subsystem_dims.len() {
        let label = excited_label(subsystem, subsystem_dims);
        match (ground, dressed.energies.get(&label)) {
            (Some(e0), Some(e1)) if subsystem_dims[subsystem] > 1 => {
                dressed.frequencies.push((e1 - e0) / (2.0 * PI));
            }
            _ => {
                return Err(Error::field(
                    "subsystem_dims",
                    format!("no single-excitation state for subsystem {}", subsystem),
                ))
            }
        }
    }
    Ok(dressed)
}

/// Populations of each dressed state.
///
/// `|⟨d|ψ⟩|²` for statevectors, `⟨d|ρ|d⟩` for density matrices.
pub fn compute_probabilities(state: &State, dressed: &DressedStates) -> Result<BTreeMap<String, f64>> {
    let dim = dressed.labels.len();
    if state.dim() != dim {
        return Err(ValidationError::DimensionMismatch {
            what: "state dimension".into(),
            expected: dim,
            actual: state.dim(),
        }
        .into());
    }
    let data = state.data();
    dressed
        .states
        .iter()
        .map(|(label, d)| {
            let p = match state.kind() {
                StateKind::Statevector => d
                    .iter()
                    .zip(data.column(0))
                    .map(|(a, b)| a.conj() * b)
                    .sum::<Complex64>()
                    .norm_sqr(),
                StateKind::DensityMatrix => {
                    let rho_d = data.dot(d);
                    d.iter().zip(&rho_d).map(|(a, b)| a.conj() * b).sum::<Complex64>().re
                }
                other => {
                    return Err(Error::field(
                        "state",
                        format!("cannot compute populations of a {}", other),
                    ))
                }
            };
            Ok((label.clone(), p))
        })
        .collect()
}

/// Draw `shots` labels according to `probabilities` and count them.
///
/// Probabilities need not be normalized; small negative values from
/// round-off are clamped to zero.
pub fn sample_counts<R: Rng + ?Sized>(
    probabilities: &BTreeMap<String, f64>,
    shots: usize,
    rng: &mut R,
) -> Result<BTreeMap<String, usize>> {
    let labels: Vec<&String> = probabilities.keys().collect();
    let weights: Vec<f64> = probabilities.values().map(|&p| p.max(0.0)).collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| Error::field("probabilities", e.to_string()))?;

    let mut counts = BTreeMap::new();
    for _ in 0..shots {
        *counts.entry(labels[dist.sample(rng)].clone()).or_insert(0) += 1;
    }
    Ok(counts)
}
