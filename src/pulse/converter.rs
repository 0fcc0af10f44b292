// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Schedule to signal conversion.
//!
//! Each output channel becomes a [`DiscreteSignal`] whose carrier is the
//! channel's base carrier frequency. Frequency changes and phase updates are
//! folded into the samples: a sample at time `t = k dt` is multiplied by
//!
//! ```text
//! exp(i (2π Δf t + φ + 2π θ))
//! ```
//!
//! where `Δf` is the current shift from the carrier, `φ` the channel phase
//! and `θ` an offset chosen at every frequency change so that
//! `Δf t + θ` is continuous at the instruction time.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use num_complex::Complex64;
use tracing::debug;

use super::schedule::{Instruction, Schedule};
use crate::error::{Error, Result};
use crate::signals::DiscreteSignal;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelFrame {
    frequency_shift: f64,
    phase: f64,
    phase_offset: f64,
}

impl ChannelFrame {
    /// Change the frequency shift at time `t` without a phase jump.
    fn retune(&mut self, new_shift: f64, t: f64) {
        self.phase_offset -= (new_shift - self.frequency_shift) * t;
        self.frequency_shift = new_shift;
    }

    fn factor(&self, t: f64) -> Complex64 {
        let angle = 2.0 * PI * (self.frequency_shift * t + self.phase_offset) + self.phase;
        Complex64::from_polar(1.0, angle)
    }
}

/// Converts instruction schedules into one discrete signal per channel.
#[derive(Debug, Clone)]
pub struct InstructionToSignals {
    dt: f64,
    carriers: HashMap<String, f64>,
    channels: Option<Vec<String>>,
}

impl InstructionToSignals {
    /// # Arguments
    /// * `dt` - Sample width
    /// * `carriers` - Base carrier frequency per channel; absent channels use 0
    /// * `channels` - Output filter and order; every scheduled channel in
    ///   sorted order if `None`
    pub fn new(
        dt: f64,
        carriers: HashMap<String, f64>,
        channels: Option<Vec<String>>,
    ) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::field("dt", format!("must be positive, got {}", dt)));
        }
        if let Some((name, f)) = carriers.iter().find(|(_, f)| !f.is_finite()) {
            return Err(Error::field(
                "carriers",
                format!("carrier for '{}' is not finite: {}", name, f),
            ));
        }
        Ok(Self {
            dt,
            carriers,
            channels,
        })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    fn carrier(&self, channel: &str) -> f64 {
        self.carriers.get(channel).copied().unwrap_or(0.0)
    }

    /// Digitize `schedule`.
    ///
    /// Every signal spans `[0, dt * schedule.duration())` and is named after
    /// its channel. Overlapping plays on one channel add.
    ///
    /// # Errors
    /// A requested channel that does not occur in the schedule.
    pub fn get_signals(&self, schedule: &Schedule) -> Result<Vec<DiscreteSignal>> {
        let scheduled = schedule.channels();
        let selected = match &self.channels {
            Some(requested) => {
                if let Some(missing) = requested.iter().find(|c| !scheduled.contains(c)) {
                    return Err(Error::field(
                        "channels",
                        format!("channel '{}' does not occur in the schedule", missing),
                    ));
                }
                requested.clone()
            }
            None => scheduled,
        };

        let duration = schedule.duration();
        let mut samples: BTreeMap<&str, Vec<Complex64>> = selected
            .iter()
            .map(|c| (c.as_str(), vec![Complex64::new(0.0, 0.0); duration]))
            .collect();
        let mut frames: HashMap<&str, ChannelFrame> = HashMap::new();

        for item in schedule.time_ordered() {
            let channel = item.instruction.channel();
            let Some(buffer) = samples.get_mut(channel) else {
                continue;
            };
            let frame = frames.entry(channel).or_default();
            let t = item.start as f64 * self.dt;
            match &item.instruction {
                Instruction::Play { samples: pulse, .. } => {
                    for (k, &value) in pulse.iter().enumerate() {
                        let index = item.start + k;
                        buffer[index] += value * frame.factor(index as f64 * self.dt);
                    }
                }
                Instruction::Delay { .. } => {}
                Instruction::ShiftPhase { phase, .. } => frame.phase += phase,
                Instruction::SetPhase { phase, .. } => frame.phase = *phase,
                Instruction::ShiftFrequency { frequency, .. } => {
                    let shift = frame.frequency_shift + frequency;
                    frame.retune(shift, t);
                }
                Instruction::SetFrequency { frequency, .. } => {
                    let shift = frequency - self.carrier(channel);
                    frame.retune(shift, t);
                }
            }
        }

        debug!(channels = selected.len(), duration, "digitized schedule");
        selected
            .iter()
            .map(|channel| {
                let data = samples.remove(channel.as_str()).unwrap_or_default();
                Ok(DiscreteSignal::new(self.dt, data, 0.0, self.carrier(channel), 0.0)?
                    .with_name(channel.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn one(n: usize) -> Vec<Complex64> {
        vec![Complex64::new(1.0, 0.0); n]
    }

    fn converter(channels: Option<Vec<String>>) -> InstructionToSignals {
        let carriers = HashMap::from([("d0".to_string(), 5.0), ("d1".to_string(), 6.0)]);
        InstructionToSignals::new(0.1, carriers, channels).unwrap()
    }

    #[test]
    fn test_plain_play() {
        let mut schedule = Schedule::new();
        schedule
            .append(
                2,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(3),
                },
            )
            .unwrap();
        let signals = converter(None).get_signals(&schedule).unwrap();
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.name(), Some("d0"));
        assert_relative_eq!(s.carrier_freq(), 5.0);
        assert_eq!(s.len(), 5);
        assert_eq!(s.samples()[0], Complex64::new(0.0, 0.0));
        assert_relative_eq!(s.samples()[3].re, 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_phase_instructions() {
        let mut schedule = Schedule::new();
        schedule
            .append(
                0,
                Instruction::ShiftPhase {
                    channel: "d0".into(),
                    phase: PI / 2.0,
                },
            )
            .unwrap()
            .append(
                0,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(1),
                },
            )
            .unwrap()
            .append(
                1,
                Instruction::SetPhase {
                    channel: "d0".into(),
                    phase: PI,
                },
            )
            .unwrap()
            .append(
                1,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(1),
                },
            )
            .unwrap();
        let s = &converter(None).get_signals(&schedule).unwrap()[0];
        assert_relative_eq!(s.samples()[0].im, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.samples()[1].re, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_frequency_change_is_phase_continuous() {
        let dt = 0.1;
        let mut schedule = Schedule::new();
        schedule
            .append(
                0,
                Instruction::ShiftFrequency {
                    channel: "d0".into(),
                    frequency: 0.3,
                },
            )
            .unwrap()
            .append(
                0,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(10),
                },
            )
            .unwrap()
            .append(
                10,
                Instruction::SetFrequency {
                    channel: "d0".into(),
                    frequency: 5.7,
                },
            )
            .unwrap()
            .append(
                10,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(10),
                },
            )
            .unwrap();
        let s = &converter(None).get_signals(&schedule).unwrap()[0];

        // extrapolating the first segment to t = 1.0 gives the second segment's first sample
        let before = Complex64::from_polar(1.0, 2.0 * PI * 0.3 * 10.0 * dt);
        assert_relative_eq!(s.samples()[10].re, before.re, epsilon = 1e-12);
        assert_relative_eq!(s.samples()[10].im, before.im, epsilon = 1e-12);

        // then it advances at the new shift 0.7
        let ratio = s.samples()[11] / s.samples()[10];
        assert_relative_eq!(ratio.arg(), 2.0 * PI * 0.7 * dt, epsilon = 1e-12);
    }

    #[test]
    fn test_channel_filter_order_and_missing() {
        let mut schedule = Schedule::new();
        for ch in ["d0", "d1"] {
            schedule
                .append(
                    0,
                    Instruction::Play {
                        channel: ch.into(),
                        samples: one(2),
                    },
                )
                .unwrap();
        }
        let signals = converter(Some(vec!["d1".into(), "d0".into()]))
            .get_signals(&schedule)
            .unwrap();
        assert_eq!(signals[0].name(), Some("d1"));
        assert_relative_eq!(signals[0].carrier_freq(), 6.0);
        assert_eq!(signals[1].name(), Some("d0"));

        let only = converter(Some(vec!["d1".into()])).get_signals(&schedule).unwrap();
        assert_eq!(only.len(), 1);

        assert!(converter(Some(vec!["u0".into()])).get_signals(&schedule).is_err());
    }

    #[test]
    fn test_signals_share_schedule_duration() {
        let mut schedule = Schedule::new();
        schedule
            .append(
                0,
                Instruction::Play {
                    channel: "d0".into(),
                    samples: one(2),
                },
            )
            .unwrap()
            .append(
                0,
                Instruction::Delay {
                    channel: "d1".into(),
                    duration: 6,
                },
            )
            .unwrap();
        let signals = converter(None).get_signals(&schedule).unwrap();
        assert!(signals.iter().all(|s| s.len() == 6));
        assert_eq!(signals[0].envelope(0.55), Complex64::new(0.0, 0.0));
        assert_eq!(signals[0].envelope(0.65), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_invalid_dt() {
        assert!(InstructionToSignals::new(0.0, HashMap::new(), None).is_err());
    }
}
