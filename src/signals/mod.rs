// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time-dependent scalar signals.
//!
//! Every signal is real-valued and of the form, or built from terms of the
//! form,
//!
//! ```text
//! s(t) = Re[f(t) exp(i(2π ν t + φ))]
//! ```
//!
//! with complex envelope `f`, carrier frequency `ν` and phase `φ`.
//!
//! Signals are immutable. `+` and `*` build composite signals; products use
//!
//! ```text
//! Re[f e^{i(2πνt+φ)}]·Re[g e^{i(2πωt+ψ)}]
//!     = Re[½ f g e^{i(2π(ν+ω)t+(φ+ψ))}] + Re[½ f ḡ e^{i(2π(ν−ω)t+(φ−ψ))}]
//! ```

pub mod discrete;

use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Mul};
use std::sync::Arc;

use num_complex::Complex64;

pub use discrete::DiscreteSignal;

/// Shared envelope function.
pub type EnvelopeFn = Arc<dyn Fn(f64) -> Complex64 + Send + Sync>;

/// Envelope of an analog signal.
#[derive(Clone)]
pub enum Envelope {
    Constant(Complex64),
    Function(EnvelopeFn),
}

impl Envelope {
    pub fn eval(&self, t: f64) -> Complex64 {
        match self {
            Envelope::Constant(c) => *c,
            Envelope::Function(f) => f(t),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Constant(c) => write!(f, "Constant({})", c),
            Envelope::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// Signal with an arbitrary envelope function.
#[derive(Debug, Clone)]
pub struct AnalogSignal {
    pub envelope: Envelope,
    pub carrier_freq: f64,
    pub phase: f64,
    pub name: Option<String>,
}

impl AnalogSignal {
    fn is_constant(&self) -> bool {
        matches!(self.envelope, Envelope::Constant(_)) && self.carrier_freq == 0.0
    }
}

/// A real-valued time-dependent signal.
#[derive(Debug, Clone)]
pub enum Signal {
    Analog(AnalogSignal),
    Discrete(DiscreteSignal),
    /// Sum of components, each keeping its own carrier and support
    Sum(Vec<Signal>),
}

impl Signal {
    /// Constant real signal.
    pub fn constant(value: f64) -> Self {
        Signal::Analog(AnalogSignal {
            envelope: Envelope::Constant(Complex64::new(value, 0.0)),
            carrier_freq: 0.0,
            phase: 0.0,
            name: None,
        })
    }

    /// Analog signal with an envelope function.
    pub fn analog<F>(envelope: F, carrier_freq: f64, phase: f64) -> Self
    where
        F: Fn(f64) -> Complex64 + Send + Sync + 'static,
    {
        Signal::Analog(AnalogSignal {
            envelope: Envelope::Function(Arc::new(envelope)),
            carrier_freq,
            phase,
            name: None,
        })
    }

    /// Analog signal with a constant complex envelope.
    pub fn with_constant_envelope(envelope: Complex64, carrier_freq: f64, phase: f64) -> Self {
        Signal::Analog(AnalogSignal {
            envelope: Envelope::Constant(envelope),
            carrier_freq,
            phase,
            name: None,
        })
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        match self {
            Signal::Analog(mut a) => {
                a.name = Some(name.into());
                Signal::Analog(a)
            }
            Signal::Discrete(d) => Signal::Discrete(d.with_name(name)),
            sum => sum,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Signal::Analog(a) => a.name.as_deref(),
            Signal::Discrete(d) => d.name(),
            Signal::Sum(_) => None,
        }
    }

    /// Carrier frequency. Sums report zero; their carriers live in the components.
    pub fn carrier_freq(&self) -> f64 {
        match self {
            Signal::Analog(a) => a.carrier_freq,
            Signal::Discrete(d) => d.carrier_freq(),
            Signal::Sum(_) => 0.0,
        }
    }

    pub fn phase(&self) -> f64 {
        match self {
            Signal::Analog(a) => a.phase,
            Signal::Discrete(d) => d.phase(),
            Signal::Sum(_) => 0.0,
        }
    }

    /// Constant envelope and zero carrier.
    pub fn is_constant(&self) -> bool {
        match self {
            Signal::Analog(a) => a.is_constant(),
            Signal::Discrete(_) => false,
            Signal::Sum(components) => components.iter().all(Signal::is_constant),
        }
    }

    /// Components of a sum, or the signal itself.
    pub fn components(&self) -> Vec<&Signal> {
        match self {
            Signal::Sum(components) => components.iter().collect(),
            other => vec![other],
        }
    }

    /// Envelope `f(t)`. For sums this is the complex value.
    pub fn envelope(&self, t: f64) -> Complex64 {
        match self {
            Signal::Analog(a) => a.envelope.eval(t),
            Signal::Discrete(d) => d.envelope(t),
            Signal::Sum(_) => self.complex_value(t),
        }
    }

    /// `f(t) exp(i(2πνt + φ))`
    pub fn complex_value(&self, t: f64) -> Complex64 {
        match self {
            Signal::Analog(a) => {
                a.envelope.eval(t) * Complex64::from_polar(1.0, 2.0 * PI * a.carrier_freq * t + a.phase)
            }
            Signal::Discrete(d) => d.complex_value(t),
            Signal::Sum(components) => components.iter().map(|s| s.complex_value(t)).sum(),
        }
    }

    /// Real value `Re[f(t) exp(i(2πνt + φ))]`.
    pub fn value(&self, t: f64) -> f64 {
        self.complex_value(t).re
    }

    /// Multiply by a real scalar.
    pub fn scale(&self, factor: f64) -> Signal {
        let c = Complex64::new(factor, 0.0);
        match self {
            Signal::Analog(a) => {
                let envelope = match &a.envelope {
                    Envelope::Constant(v) => Envelope::Constant(v * c),
                    Envelope::Function(f) => {
                        let f = Arc::clone(f);
                        Envelope::Function(Arc::new(move |t| f(t) * c))
                    }
                };
                Signal::Analog(AnalogSignal {
                    envelope,
                    carrier_freq: a.carrier_freq,
                    phase: a.phase,
                    name: a.name.clone(),
                })
            }
            Signal::Discrete(d) => Signal::Discrete(d.with_samples(
                d.samples().iter().map(|z| z * c).collect(),
                d.carrier_freq(),
                d.phase(),
            )),
            Signal::Sum(components) => Signal::Sum(components.iter().map(|s| s.scale(factor)).collect()),
        }
    }

    /// Shift the phase of every component by `delta`.
    pub fn shift_phase(&self, delta: f64) -> Signal {
        match self {
            Signal::Analog(a) => Signal::Analog(AnalogSignal {
                phase: a.phase + delta,
                ..a.clone()
            }),
            Signal::Discrete(d) => Signal::Discrete(d.with_samples(
                d.samples().to_vec(),
                d.carrier_freq(),
                d.phase() + delta,
            )),
            Signal::Sum(components) => {
                Signal::Sum(components.iter().map(|s| s.shift_phase(delta)).collect())
            }
        }
    }

    fn into_components(self) -> Vec<Signal> {
        match self {
            Signal::Sum(components) => components,
            other => vec![other],
        }
    }

    fn constant_real_value(&self) -> Option<f64> {
        match self {
            Signal::Analog(AnalogSignal {
                envelope: Envelope::Constant(v),
                carrier_freq,
                phase,
                ..
            }) if *carrier_freq == 0.0 && *phase == 0.0 && v.im == 0.0 => Some(v.re),
            _ => None,
        }
    }
}

/// Product of two non-sum signals, as the two-term sum of the product identity.
fn simple_product(a: &Signal, b: &Signal) -> Vec<Signal> {
    if let Some(v) = a.constant_real_value() {
        return vec![b.scale(v)];
    }
    if let Some(v) = b.constant_real_value() {
        return vec![a.scale(v)];
    }

    let (nu, phi) = (a.carrier_freq(), a.phase());
    let (omega, psi) = (b.carrier_freq(), b.phase());
    let half = Complex64::new(0.5, 0.0);

    if let (Signal::Discrete(da), Signal::Discrete(db)) = (a, b) {
        if da.is_compatible(db) {
            let pairs = da.samples().iter().zip(db.samples());
            let plus = pairs.clone().map(|(f, g)| half * f * g).collect();
            let minus = pairs.map(|(f, g)| half * f * g.conj()).collect();
            return vec![
                Signal::Discrete(da.with_samples(plus, nu + omega, phi + psi)),
                Signal::Discrete(da.with_samples(minus, nu - omega, phi - psi)),
            ];
        }
    }

    if let (
        Signal::Analog(AnalogSignal {
            envelope: Envelope::Constant(f),
            ..
        }),
        Signal::Analog(AnalogSignal {
            envelope: Envelope::Constant(g),
            ..
        }),
    ) = (a, b)
    {
        return vec![
            Signal::with_constant_envelope(half * f * g, nu + omega, phi + psi),
            Signal::with_constant_envelope(half * f * g.conj(), nu - omega, phi - psi),
        ];
    }

    let (a1, b1) = (a.clone(), b.clone());
    let (a2, b2) = (a.clone(), b.clone());
    vec![
        Signal::analog(
            move |t| half * a1.envelope(t) * b1.envelope(t),
            nu + omega,
            phi + psi,
        ),
        Signal::analog(
            move |t| half * a2.envelope(t) * b2.envelope(t).conj(),
            nu - omega,
            phi - psi,
        ),
    ]
}

/// Merge compatible discrete components that share a carrier frequency.
fn merge_components(components: Vec<Signal>) -> Signal {
    let mut merged: Vec<Signal> = Vec::with_capacity(components.len());
    for component in components {
        if let Signal::Discrete(d) = &component {
            let target = merged.iter_mut().find_map(|m| match m {
                Signal::Discrete(existing)
                    if existing.is_compatible(d) && existing.carrier_freq() == d.carrier_freq() =>
                {
                    Some(existing)
                }
                _ => None,
            });
            if let Some(existing) = target {
                let pa = Complex64::from_polar(1.0, existing.phase());
                let pb = Complex64::from_polar(1.0, d.phase());
                let samples = existing
                    .samples()
                    .iter()
                    .zip(d.samples())
                    .map(|(x, y)| x * pa + y * pb)
                    .collect();
                *existing = existing.with_samples(samples, d.carrier_freq(), 0.0);
                continue;
            }
        }
        merged.push(component);
    }
    if merged.len() == 1 {
        merged.remove(0)
    } else {
        Signal::Sum(merged)
    }
}

impl Add for Signal {
    type Output = Signal;

    fn add(self, rhs: Signal) -> Signal {
        let mut components = self.into_components();
        components.extend(rhs.into_components());
        merge_components(components)
    }
}

impl Add for &Signal {
    type Output = Signal;

    fn add(self, rhs: &Signal) -> Signal {
        self.clone() + rhs.clone()
    }
}

impl Mul for &Signal {
    type Output = Signal;

    fn mul(self, rhs: &Signal) -> Signal {
        let mut terms = Vec::new();
        for a in self.components() {
            for b in rhs.components() {
                terms.extend(simple_product(a, b));
            }
        }
        merge_components(terms)
    }
}

impl Mul for Signal {
    type Output = Signal;

    fn mul(self, rhs: Signal) -> Signal {
        &self * &rhs
    }
}

impl From<f64> for Signal {
    fn from(value: f64) -> Self {
        Signal::constant(value)
    }
}

impl From<DiscreteSignal> for Signal {
    fn from(d: DiscreteSignal) -> Self {
        Signal::Discrete(d)
    }
}

/// Ordered list of signals evaluated together.
#[derive(Debug, Clone, Default)]
pub struct SignalList {
    signals: Vec<Signal>,
}

impl SignalList {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn get(&self, idx: usize) -> Option<&Signal> {
        self.signals.get(idx)
    }

    /// Real values at `t`.
    pub fn values(&self, t: f64) -> Vec<f64> {
        self.signals.iter().map(|s| s.value(t)).collect()
    }

    /// Real values at `t` as complex coefficients.
    pub fn coefficients(&self, t: f64) -> Vec<Complex64> {
        self.signals
            .iter()
            .map(|s| Complex64::new(s.value(t), 0.0))
            .collect()
    }

    pub fn complex_values(&self, t: f64) -> Vec<Complex64> {
        self.signals.iter().map(|s| s.complex_value(t)).collect()
    }

    pub fn envelopes(&self, t: f64) -> Vec<Complex64> {
        self.signals.iter().map(|s| s.envelope(t)).collect()
    }

    pub fn carrier_freqs(&self) -> Vec<f64> {
        self.signals.iter().map(Signal::carrier_freq).collect()
    }
}

impl From<Vec<Signal>> for SignalList {
    fn from(signals: Vec<Signal>) -> Self {
        Self::new(signals)
    }
}

impl FromIterator<Signal> for SignalList {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
