// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Piecewise-constant signals.

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::Signal;
use crate::error::{Error, Result};

/// Signal with a piecewise-constant envelope.
///
/// The envelope at time `t` is `samples[floor((t - start_time) / dt)]` inside
/// `[start_time, start_time + dt * samples.len())` and exactly zero outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteSignal {
    dt: f64,
    samples: Vec<Complex64>,
    #[serde(default)]
    start_time: f64,
    #[serde(default)]
    carrier_freq: f64,
    #[serde(default)]
    phase: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl DiscreteSignal {
    /// Create a discrete signal.
    ///
    /// # Arguments
    /// * `dt` - Sample width, must be positive and finite
    /// * `samples` - Envelope samples
    /// * `start_time` - Start of the first sample
    /// * `carrier_freq` - Carrier frequency
    /// * `phase` - Carrier phase
    pub fn new(
        dt: f64,
        samples: Vec<Complex64>,
        start_time: f64,
        carrier_freq: f64,
        phase: f64,
    ) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::field("dt", format!("must be positive, got {}", dt)));
        }
        if !start_time.is_finite() {
            return Err(Error::field("start_time", "must be finite"));
        }
        Ok(Self {
            dt,
            samples,
            start_time,
            carrier_freq,
            phase,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sample an analog signal at bin midpoints.
    ///
    /// With `sample_carrier` the full complex value is sampled and the
    /// result has zero carrier and phase; otherwise only the envelope is
    /// sampled and the carrier stays analog.
    pub fn from_signal(
        signal: &Signal,
        dt: f64,
        n_samples: usize,
        start_time: f64,
        sample_carrier: bool,
    ) -> Result<Self> {
        let times = (0..n_samples).map(|k| start_time + (k as f64 + 0.5) * dt);
        let (samples, carrier_freq, phase) = if sample_carrier {
            (times.map(|t| signal.complex_value(t)).collect(), 0.0, 0.0)
        } else {
            (
                times.map(|t| signal.envelope(t)).collect(),
                signal.carrier_freq(),
                signal.phase(),
            )
        };
        let mut out = Self::new(dt, samples, start_time, carrier_freq, phase)?;
        out.name = signal.name().map(str::to_string);
        Ok(out)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn samples(&self) -> &[Complex64] {
        &self.samples
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn carrier_freq(&self) -> f64 {
        self.carrier_freq
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// End of the support, `start_time + dt * len`.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.dt * self.samples.len() as f64
    }

    /// Bin index containing `t`, or `None` outside the support.
    fn bin(&self, t: f64) -> Option<usize> {
        if !(t >= self.start_time) {
            return None;
        }
        let idx = ((t - self.start_time) / self.dt).floor();
        if idx < 0.0 || idx >= self.samples.len() as f64 {
            return None;
        }
        Some(idx as usize)
    }

    pub fn envelope(&self, t: f64) -> Complex64 {
        match self.bin(t) {
            Some(k) => self.samples[k],
            None => Complex64::new(0.0, 0.0),
        }
    }

    pub fn complex_value(&self, t: f64) -> Complex64 {
        self.envelope(t) * Complex64::from_polar(1.0, 2.0 * PI * self.carrier_freq * t + self.phase)
    }

    /// Same `dt`, `start_time` and number of samples.
    pub fn is_compatible(&self, other: &DiscreteSignal) -> bool {
        self.samples.len() == other.samples.len()
            && (self.dt - other.dt).abs() <= 1e-12 * self.dt
            && (self.start_time - other.start_time).abs() <= 1e-12 * self.dt.max(1.0)
    }

    /// Build a discrete signal on this signal's grid with new samples.
    pub(crate) fn with_samples(&self, samples: Vec<Complex64>, carrier_freq: f64, phase: f64) -> Self {
        Self {
            dt: self.dt,
            samples,
            start_time: self.start_time,
            carrier_freq,
            phase,
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::c;
    use approx::assert_relative_eq;

    fn three_samples() -> DiscreteSignal {
        DiscreteSignal::new(0.5, vec![c(1.0, 0.0), c(2.0, 0.0), c(3.0, 0.0)], 1.0, 0.0, 0.0)
            .unwrap()
    }

    #[test]
    fn test_envelope_inside_support() {
        let s = three_samples();
        assert_eq!(s.envelope(1.0), c(1.0, 0.0));
        assert_eq!(s.envelope(1.49), c(1.0, 0.0));
        assert_eq!(s.envelope(1.5), c(2.0, 0.0));
        assert_eq!(s.envelope(2.4), c(3.0, 0.0));
    }

    #[test]
    fn test_zero_outside_support() {
        let s = three_samples();
        assert_eq!(s.envelope(0.999), c(0.0, 0.0));
        assert_eq!(s.envelope(2.5), c(0.0, 0.0));
        assert_eq!(s.envelope(100.0), c(0.0, 0.0));
        assert_eq!(s.envelope(-3.0), c(0.0, 0.0));
        assert_eq!(s.envelope(f64::NAN), c(0.0, 0.0));
    }

    #[test]
    fn test_invalid_dt_rejected() {
        assert!(DiscreteSignal::new(0.0, vec![], 0.0, 0.0, 0.0).is_err());
        assert!(DiscreteSignal::new(-1.0, vec![], 0.0, 0.0, 0.0).is_err());
        assert!(DiscreteSignal::new(f64::INFINITY, vec![], 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_from_signal_samples_midpoints() {
        let analog = Signal::analog(|t| c(t, 0.0), 2.0, 0.0);
        let d = DiscreteSignal::from_signal(&analog, 0.1, 10, 0.0, false).unwrap();
        assert_eq!(d.len(), 10);
        assert_relative_eq!(d.samples()[0].re, 0.05, epsilon = 1e-14);
        assert_relative_eq!(d.samples()[9].re, 0.95, epsilon = 1e-14);
        assert_relative_eq!(d.carrier_freq(), 2.0);
    }

    #[test]
    fn test_from_signal_sample_carrier() {
        let analog = Signal::analog(|_| c(1.0, 0.0), 2.0, 0.3);
        let d = DiscreteSignal::from_signal(&analog, 0.1, 4, 0.0, true).unwrap();
        assert_eq!(d.carrier_freq(), 0.0);
        assert_eq!(d.phase(), 0.0);
        let expected = analog.complex_value(0.15);
        assert!((d.envelope(0.12) - expected).norm() < 1e-14);
    }
}
