// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-step integrators: classical RK4 and Magnus matrix-exponential steps.
//!
//! Each interval between consecutive output times is split into equal steps
//! no longer than `max_dt`.
//!
//! Magnus steps use Gauss–Legendre nodes:
//!   - order 1: `Ω = h G(t + h/2)`
//!   - order 2: `Ω = h (G₁ + G₂)/2 + (√3/12) h² [G₂, G₁]`
//!   - order 3: three-node scheme of Blanes, Casas & Ros (2000)
//!
//! Ref: Blanes, Casas, Oteo & Ros, "The Magnus expansion and some of its
//! applications", Phys. Rep. 470 (2009), §5.

use ndarray::Array2;
use num_complex::Complex64;

use super::{LmdeGenerator, OdeResult, StepFunction};
use crate::array::linalg::{commutator, matrix_exp};
use crate::error::{Error, Result};

/// Number of steps and signed step size covering `delta` with steps of at most `max_dt`.
pub(crate) fn step_count(delta: f64, max_dt: f64) -> (usize, f64) {
    let mut n = (delta.abs() / max_dt).floor() as usize;
    if n == 0 {
        n = 1;
    }
    if (delta / n as f64).abs() / max_dt > 1.0 + 1e-15 {
        n += 1;
    }
    (n, delta / n as f64)
}

/// Drive `step(t, h, y)` over `t_span`, recording `y` at `times`.
///
/// Returns the recorded states and the number of steps taken.
pub(crate) fn integrate_fixed<S>(
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
    max_dt: f64,
    mut step: S,
) -> Result<(Vec<Array2<Complex64>>, usize)>
where
    S: FnMut(f64, f64, &Array2<Complex64>) -> Result<Array2<Complex64>>,
{
    let mut t = t_span[0];
    let mut y = y0.clone();
    let mut out = Vec::with_capacity(times.len());
    let mut steps = 0;
    for &target in times {
        let delta = target - t;
        if delta != 0.0 {
            let (n, h) = step_count(delta, max_dt);
            for k in 0..n {
                y = step(t + k as f64 * h, h, &y)?;
            }
            steps += n;
            t = target;
            if y.iter().any(|z| !z.is_finite()) {
                return Err(Error::NumericalFailure(format!(
                    "non-finite state at t = {}",
                    t
                )));
            }
        }
        out.push(y.clone());
    }
    Ok((out, steps))
}

fn rk4_step(
    f: &dyn StepFunction,
    t: f64,
    h: f64,
    y: &Array2<Complex64>,
) -> Result<Array2<Complex64>> {
    let half = Complex64::new(0.5 * h, 0.0);
    let full = Complex64::new(h, 0.0);
    let sixth = Complex64::new(h / 6.0, 0.0);
    let two = Complex64::new(2.0, 0.0);

    let k1 = f.eval(t, y)?;
    let k2 = f.eval(t + 0.5 * h, &(y + &(&k1 * half)))?;
    let k3 = f.eval(t + 0.5 * h, &(y + &(&k2 * half)))?;
    let k4 = f.eval(t + h, &(y + &(&k3 * full)))?;

    Ok(y + &((k1 + &k2 * two + &k3 * two + k4) * sixth))
}

/// Classical RK4 with steps of at most `max_dt`.
pub(crate) fn solve_rk4(
    f: &dyn StepFunction,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
    max_dt: f64,
) -> Result<OdeResult> {
    let (y, steps) = integrate_fixed(t_span, y0, times, max_dt, |t, h, y| rk4_step(f, t, h, y))?;
    Ok(OdeResult {
        t: times.to_vec(),
        y,
        nfev: f.evaluations(),
        steps,
        rejected_steps: 0,
    })
}

/// Magnus exponent `Ω` for the step `[t, t + h]`.
pub(crate) fn magnus_exponent<G: LmdeGenerator + ?Sized>(
    generator: &G,
    t: f64,
    h: f64,
    order: usize,
) -> Result<Array2<Complex64>> {
    let g = |s: f64| -> Result<Array2<Complex64>> { Ok(generator.generator(t + s * h)?.into_dense()) };
    let hc = Complex64::new(h, 0.0);
    match order {
        1 => Ok(g(0.5)? * hc),
        2 => {
            let c1 = 0.5 - 3f64.sqrt() / 6.0;
            let c2 = 0.5 + 3f64.sqrt() / 6.0;
            let p2 = Complex64::new(3f64.sqrt() / 12.0 * h * h, 0.0);
            let g1 = g(c1)?;
            let g2 = g(c2)?;
            Ok((&g1 + &g2) * Complex64::new(0.5 * h, 0.0) + commutator(&g2, &g1) * p2)
        }
        3 => {
            let d1 = 0.5 - 15f64.sqrt() / 10.0;
            let d3 = 0.5 + 15f64.sqrt() / 10.0;
            let g1 = g(d1)?;
            let g2 = g(0.5)?;
            let g3 = g(d3)?;

            let c0 = Complex64::new(15f64.sqrt() / 3.0 * h, 0.0);
            let c1 = Complex64::new(10.0 / 3.0 * h, 0.0);
            let a1 = &g2 * hc;
            let a2 = (&g3 - &g1) * c0;
            let a3 = (&g3 - &g2 * Complex64::new(2.0, 0.0) + &g1) * c1;

            let comm1 = commutator(&a1, &a2);
            let comm2 = commutator(&(&a3 * Complex64::new(2.0, 0.0) + &comm1), &a1)
                * Complex64::new(1.0 / 60.0, 0.0);
            let left = &comm1 - &a1 * Complex64::new(20.0, 0.0) - &a3;
            let right = &a2 + &comm2;
            Ok(&a1
                + &(&a3 * Complex64::new(1.0 / 12.0, 0.0))
                + commutator(&left, &right) * Complex64::new(1.0 / 240.0, 0.0))
        }
        other => Err(Error::field(
            "magnus_order",
            format!("must be 1, 2 or 3, got {}", other),
        )),
    }
}

/// Fixed-step Magnus integration: `y ← expm(Ω) y` per step.
pub(crate) fn solve_magnus<G: LmdeGenerator + ?Sized>(
    generator: &G,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
    max_dt: f64,
    order: usize,
) -> Result<OdeResult> {
    let (y, steps) = integrate_fixed(t_span, y0, times, max_dt, |t, h, y| {
        Ok(matrix_exp(&magnus_exponent(generator, t, h, order)?)?.dot(y))
    })?;
    Ok(OdeResult {
        t: times.to_vec(),
        y,
        nfev: steps * order,
        steps,
        rejected_steps: 0,
    })
}
