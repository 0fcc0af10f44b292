// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Dynamics
//!
//! Simulation of time-dependent quantum systems: signal-driven generator,
//! Hamiltonian and Lindblad models, rotating frames, ODE/LMDE solvers and
//! Dyson/Magnus perturbation theory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Solver (batched facade)         │
//! ├──────────────────┬──────────────────────┤
//! │      Models      │   Perturbation       │
//! │ (generator, H,   │ (Dyson, Magnus,      │
//! │  Lindblad, RWA)  │  expansion solvers)  │
//! ├──────────────────┴──────────────────────┤
//! │   Signals   │ RotatingFrame │  solvers   │
//! ├─────────────┴───────────────┴───────────┤
//! │     array (dense / sparse operators)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`array`]: Operator storage and linear algebra
//! - [`signals`]: Analog, discrete and composite signals
//! - [`frame`]: Rotating frames
//! - [`models`]: Generator, Hamiltonian and Lindblad models, RWA
//! - [`solvers`]: ODE and LMDE integration methods
//! - [`perturbation`]: Dyson series and Magnus expansion
//! - [`solver`]: Batched solver facade
//! - [`pulse`]: Instruction schedules and dressed states
//! - [`simulation`]: YAML simulation descriptions
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod array;
pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod perturbation;
pub mod pulse;
pub mod signals;
pub mod simulation;
pub mod solver;
pub mod solvers;
pub mod state;

pub use array::{ArrayLibrary, Operator};
pub use config::Config;
pub use error::{Error, Result};
pub use frame::RotatingFrame;
pub use models::{GeneratorModel, HamiltonianModel, LindbladModel};
pub use signals::{DiscreteSignal, Signal, SignalList};
pub use solver::{Batch, Model, SignalSet, SolveResult, Solver};
pub use solvers::{solve_lmde, solve_ode, Method, OdeResult, SolverOptions};
pub use state::{State, StateKind};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
