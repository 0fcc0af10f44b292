// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Linear dynamics models.
//!
//! - [`GeneratorModel`]: `G(t) = G_0 + Σ_j s_j(t) G_j`
//! - [`HamiltonianModel`]: `G(t) = -i H(t)` with Hermitian `H`
//! - [`LindbladModel`]: the Lindblad master equation, matrix or vectorized
//!
//! All models can be evaluated in a [`RotatingFrame`](crate::frame::RotatingFrame)
//! and reduced with the rotating-wave approximation.

pub mod generator;
pub mod hamiltonian;
pub mod lindblad;
pub mod rwa;

pub use generator::GeneratorModel;
pub use hamiltonian::HamiltonianModel;
pub use lindblad::{DissipatorChannel, LindbladModel, LindbladModelConfig};
pub use rwa::{
    rotating_wave_approximation, rotating_wave_approximation_hamiltonian,
    rotating_wave_approximation_lindblad,
};
