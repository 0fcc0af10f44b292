// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse-level front end.
//!
//! - [`Schedule`] and [`Instruction`]: channel instructions at sample times
//! - [`InstructionToSignals`]: digitizes a schedule into [`DiscreteSignal`]s
//!   with phase-continuous frequency changes
//! - [`dressed`]: dressed-state labelling, populations and shot sampling
//!
//! [`DiscreteSignal`]: crate::signals::DiscreteSignal

pub mod converter;
pub mod dressed;
pub mod schedule;

pub use converter::InstructionToSignals;
pub use dressed::{compute_probabilities, convert_to_dressed, labels_generator, sample_counts, DressedStates};
pub use schedule::{Instruction, Schedule, ScheduledInstruction};
