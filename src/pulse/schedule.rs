// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Instruction schedules on named channels.
//!
//! Times are integer sample indices; the sample width is supplied when the
//! schedule is converted to signals.

use std::collections::BTreeSet;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single channel instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    /// Play envelope samples starting at the scheduled time.
    Play {
        channel: String,
        samples: Vec<Complex64>,
    },
    /// Idle for `duration` samples.
    Delay { channel: String, duration: usize },
    /// Add to the channel phase.
    ShiftPhase { channel: String, phase: f64 },
    /// Replace the channel phase.
    SetPhase { channel: String, phase: f64 },
    /// Add to the channel frequency.
    ShiftFrequency { channel: String, frequency: f64 },
    /// Replace the channel frequency (absolute, carrier included).
    SetFrequency { channel: String, frequency: f64 },
}

impl Instruction {
    pub fn channel(&self) -> &str {
        match self {
            Instruction::Play { channel, .. }
            | Instruction::Delay { channel, .. }
            | Instruction::ShiftPhase { channel, .. }
            | Instruction::SetPhase { channel, .. }
            | Instruction::ShiftFrequency { channel, .. }
            | Instruction::SetFrequency { channel, .. } => channel,
        }
    }

    /// Duration in samples; frame updates take no time.
    pub fn duration(&self) -> usize {
        match self {
            Instruction::Play { samples, .. } => samples.len(),
            Instruction::Delay { duration, .. } => *duration,
            _ => 0,
        }
    }
}

/// An instruction placed at a sample index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstruction {
    pub start: usize,
    #[serde(flatten)]
    pub instruction: Instruction,
}

impl ScheduledInstruction {
    pub fn end(&self) -> usize {
        self.start + self.instruction.duration()
    }
}

/// Instructions in insertion order.
///
/// Instructions sharing a start time apply in the order they were appended,
/// so a phase shift appended before a play at the same time affects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    instructions: Vec<ScheduledInstruction>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instruction. Returns `&mut self` for chaining.
    ///
    /// # Errors
    /// - empty channel name
    /// - non-finite phase or frequency
    /// - non-finite play samples
    pub fn append(&mut self, start: usize, instruction: Instruction) -> Result<&mut Self> {
        if instruction.channel().is_empty() {
            return Err(Error::field("channel", "channel name must not be empty"));
        }
        match &instruction {
            Instruction::ShiftPhase { phase, .. } | Instruction::SetPhase { phase, .. }
                if !phase.is_finite() =>
            {
                return Err(Error::field("phase", "must be finite"));
            }
            Instruction::ShiftFrequency { frequency, .. }
            | Instruction::SetFrequency { frequency, .. }
                if !frequency.is_finite() =>
            {
                return Err(Error::field("frequency", "must be finite"));
            }
            Instruction::Play { samples, .. }
                if samples.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) =>
            {
                return Err(Error::field("samples", "must be finite"));
            }
            _ => {}
        }
        self.instructions.push(ScheduledInstruction { start, instruction });
        Ok(self)
    }

    pub fn instructions(&self) -> &[ScheduledInstruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Length in samples: the latest instruction end.
    pub fn duration(&self) -> usize {
        self.instructions
            .iter()
            .map(ScheduledInstruction::end)
            .max()
            .unwrap_or(0)
    }

    /// Channel names in sorted order.
    pub fn channels(&self) -> Vec<String> {
        self.instructions
            .iter()
            .map(|i| i.instruction.channel().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Instructions sorted by start time, stable for equal starts.
    pub fn time_ordered(&self) -> Vec<&ScheduledInstruction> {
        let mut ordered: Vec<_> = self.instructions.iter().collect();
        ordered.sort_by_key(|i| i.start);
        ordered
    }
}
