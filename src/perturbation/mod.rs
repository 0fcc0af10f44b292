// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Perturbation theory for LMDEs.
//!
//! # Overview
//!
//! - [`multiset`]: index multisets and canonical term enumeration
//! - [`array_polynomial`]: polynomials with matrix coefficients
//! - [`dyson_magnus`]: Dyson and symmetric Magnus terms via one enlarged LMDE
//! - [`expansion_solver`]: fixed-step [`DysonSolver`] and [`MagnusSolver`]
//!
//! Term labels follow one convention throughout: `dyson` labels are ordered
//! index lists, symmetric labels are multisets written in non-decreasing
//! order. Labels sort by order first, then lexicographically.

pub mod array_polynomial;
pub mod dyson_magnus;
pub mod expansion_solver;
pub mod multiset;
pub mod results;

pub use array_polynomial::ArrayPolynomial;
pub use dyson_magnus::{solve_lmde_perturbation, MatrixFn, PerturbationConfig, PerturbationSolution};
pub use expansion_solver::{DysonSolver, ExpansionSolverConfig, MagnusSolver};
pub use multiset::Multiset;
pub use results::{ExpansionMethod, PerturbationResults};
