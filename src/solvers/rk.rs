// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adaptive embedded Runge–Kutta integrators.
//!
//! Error control follows Hairer, Nørsett & Wanner, "Solving Ordinary
//! Differential Equations I" (1993), §II.4: the local error estimate
//! `h Σ e_i k_i` is measured in the RMS norm scaled by
//! `atol + rtol * max(|y|, |y_new|)` and a step is accepted when that norm
//! is at most 1.
//!
//! Output times are hit exactly by shortening the step that would cross them.

use ndarray::Array2;
use num_complex::Complex64;
use tracing::trace;

use super::{OdeResult, SolverOptions, StepFunction};
use crate::error::{Error, Result};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Butcher tableau of an embedded pair whose last stage is evaluated at the
/// new state (first same as last).
#[derive(Debug)]
pub struct Tableau {
    pub name: &'static str,
    pub c: &'static [f64],
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    /// `b - b_hat`
    pub e: &'static [f64],
    /// Order of the embedded error estimator
    pub error_order: u32,
}

/// Dormand–Prince 5(4).
pub const DORMAND_PRINCE: Tableau = Tableau {
    name: "RK45",
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0],
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
        &[
            9017.0 / 3168.0,
            -355.0 / 33.0,
            46732.0 / 5247.0,
            49.0 / 176.0,
            -5103.0 / 18656.0,
        ],
        &[
            35.0 / 384.0,
            0.0,
            500.0 / 1113.0,
            125.0 / 192.0,
            -2187.0 / 6784.0,
            11.0 / 84.0,
        ],
    ],
    b: &[
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
        0.0,
    ],
    e: &[
        71.0 / 57600.0,
        0.0,
        -71.0 / 16695.0,
        71.0 / 1920.0,
        -17253.0 / 339200.0,
        22.0 / 525.0,
        -1.0 / 40.0,
    ],
    error_order: 4,
};

/// Bogacki–Shampine 3(2).
pub const BOGACKI_SHAMPINE: Tableau = Tableau {
    name: "RK23",
    c: &[0.0, 1.0 / 2.0, 3.0 / 4.0, 1.0],
    a: &[
        &[],
        &[1.0 / 2.0],
        &[0.0, 3.0 / 4.0],
        &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    ],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
    e: &[-5.0 / 72.0, 1.0 / 12.0, 1.0 / 9.0, -1.0 / 8.0],
    error_order: 2,
};

/// `y + h Σ_j w_j k_j`
fn combine(y: &Array2<Complex64>, h: f64, weights: &[f64], k: &[Array2<Complex64>]) -> Array2<Complex64> {
    let mut out = y.clone();
    for (w, kj) in weights.iter().zip(k) {
        if *w != 0.0 {
            out.scaled_add(Complex64::new(h * w, 0.0), kj);
        }
    }
    out
}

/// Scaled RMS norm of `x` with per-element scale `atol + rtol * max(|y|, |y_new|)`.
fn scaled_rms(
    x: &Array2<Complex64>,
    y: &Array2<Complex64>,
    y_new: &Array2<Complex64>,
    options: &SolverOptions,
) -> f64 {
    let n = x.len().max(1) as f64;
    let sum: f64 = x
        .iter()
        .zip(y.iter())
        .zip(y_new.iter())
        .map(|((xi, yi), zi)| {
            let scale = options.atol + options.rtol * yi.norm().max(zi.norm());
            (xi.norm() / scale).powi(2)
        })
        .sum();
    (sum / n).sqrt()
}

struct Step {
    y: Array2<Complex64>,
    f: Array2<Complex64>,
    error: Array2<Complex64>,
}

fn rk_step(
    f: &dyn StepFunction,
    tableau: &Tableau,
    t: f64,
    y: &Array2<Complex64>,
    f0: &Array2<Complex64>,
    h: f64,
) -> Result<Step> {
    let stages = tableau.c.len();
    let mut k = Vec::with_capacity(stages);
    k.push(f0.clone());
    let mut y_stage = y.clone();
    for i in 1..stages {
        y_stage = combine(y, h, tableau.a[i], &k);
        k.push(f.eval(t + tableau.c[i] * h, &y_stage)?);
    }
    let mut error = Array2::zeros(y.raw_dim());
    for (w, kj) in tableau.e.iter().zip(&k) {
        error.scaled_add(Complex64::new(h * w, 0.0), kj);
    }
    let f_new = k.pop().unwrap_or_else(|| f0.clone());
    Ok(Step {
        y: y_stage,
        f: f_new,
        error,
    })
}

/// Starting step size, Hairer, Nørsett & Wanner §II.4.
fn initial_step(
    f: &dyn StepFunction,
    tableau: &Tableau,
    t0: f64,
    y0: &Array2<Complex64>,
    f0: &Array2<Complex64>,
    direction: f64,
    span: f64,
    options: &SolverOptions,
) -> Result<f64> {
    let d0 = scaled_rms(y0, y0, y0, options);
    let d1 = scaled_rms(f0, y0, y0, options);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
    .min(span);

    let y1 = combine(y0, h0 * direction, &[1.0], std::slice::from_ref(f0));
    let f1 = f.eval(t0 + h0 * direction, &y1)?;
    let d2 = scaled_rms(&(&f1 - f0), y0, y0, options) / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / (tableau.error_order as f64 + 1.0))
    };
    Ok((100.0 * h0).min(h1).min(span))
}

/// Integrate over `t_span`, returning states at `times`.
pub(crate) fn solve_adaptive(
    f: &dyn StepFunction,
    tableau: &Tableau,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
    options: &SolverOptions,
) -> Result<OdeResult> {
    let [t0, tf] = t_span;
    let span = (tf - t0).abs();
    if span == 0.0 {
        return Ok(OdeResult {
            t: times.to_vec(),
            y: vec![y0.clone(); times.len()],
            nfev: 0,
            steps: 0,
            rejected_steps: 0,
        });
    }
    let direction = if tf > t0 { 1.0 } else { -1.0 };
    let exponent = 1.0 / (tableau.error_order as f64 + 1.0);

    let mut t = t0;
    let mut y = y0.clone();
    let mut f0 = f.eval(t, &y)?;
    let mut h_abs = match options.first_step {
        Some(h) => h,
        None => initial_step(f, tableau, t0, &y, &f0, direction, span, options)?,
    };
    if let Some(max_dt) = options.max_dt {
        h_abs = h_abs.min(max_dt);
    }

    let mut out = Vec::with_capacity(times.len());
    let mut steps = 0usize;
    let mut rejected = 0usize;
    let mut attempts = 0usize;

    for &target in times {
        while (target - t) * direction > 0.0 {
            let remaining = (target - t).abs();
            let mut h_try = h_abs.min(remaining);
            let mut step_rejected = false;
            loop {
                attempts += 1;
                if attempts > options.max_steps {
                    return Err(Error::NumericalFailure(format!(
                        "{}: exceeded max_steps ({}) at t = {}",
                        tableau.name, options.max_steps, t
                    )));
                }

                let step = rk_step(f, tableau, t, &y, &f0, h_try * direction)?;
                let err = scaled_rms(&step.error, &y, &step.y, options);

                if err.is_finite() && err <= 1.0 {
                    let lands = h_try >= remaining;
                    t = if lands { target } else { t + h_try * direction };
                    y = step.y;
                    f0 = step.f;
                    steps += 1;

                    let mut factor = if err == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * err.powf(-exponent)).min(MAX_FACTOR)
                    };
                    if step_rejected {
                        factor = factor.min(1.0);
                    }
                    // a step shortened to hit an output time says little about the next one
                    if !(lands && h_try < h_abs) {
                        h_abs = h_try * factor;
                    }
                    if let Some(max_dt) = options.max_dt {
                        h_abs = h_abs.min(max_dt);
                    }
                    trace!(t, h = h_try, err, "accepted step");
                    break;
                }

                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-exponent)).max(MIN_FACTOR)
                } else {
                    MIN_FACTOR
                };
                h_try *= factor;
                h_abs = h_try;
                rejected += 1;
                step_rejected = true;
                if h_try <= 10.0 * f64::EPSILON * t.abs().max(f64::MIN_POSITIVE) {
                    return Err(Error::NumericalFailure(format!(
                        "{}: step size underflow at t = {}",
                        tableau.name, t
                    )));
                }
            }
        }
        out.push(y.clone());
    }

    if y.iter().any(|z| !z.is_finite()) {
        return Err(Error::NumericalFailure(format!(
            "{}: non-finite state at t = {}",
            tableau.name, t
        )));
    }

    Ok(OdeResult {
        t: times.to_vec(),
        y: out,
        nfev: f.evaluations(),
        steps,
        rejected_steps: rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::{solve_ode, FnRhs, Method};
    use crate::test_utils::{c, column};
    use approx::assert_relative_eq;

    fn decay() -> FnRhs<impl Fn(f64, &Array2<Complex64>) -> Result<Array2<Complex64>> + Send + Sync> {
        FnRhs(|_t: f64, y: &Array2<Complex64>| -> Result<Array2<Complex64>> { Ok(y * c(-2.0, 0.0)) })
    }

    /// y'' = -y as a first-order system.
    fn oscillator() -> FnRhs<impl Fn(f64, &Array2<Complex64>) -> Result<Array2<Complex64>> + Send + Sync> {
        FnRhs(|_t: f64, y: &Array2<Complex64>| -> Result<Array2<Complex64>> {
            Ok(column(&[y[[1, 0]], -y[[0, 0]]]))
        })
    }

    fn options(tol: f64) -> SolverOptions {
        SolverOptions {
            atol: tol,
            rtol: tol,
            ..Default::default()
        }
    }

    #[test]
    fn test_tableaux_consistent() {
        for tableau in [&DORMAND_PRINCE, &BOGACKI_SHAMPINE] {
            assert_eq!(tableau.a.len(), tableau.c.len());
            for (i, row) in tableau.a.iter().enumerate() {
                assert_eq!(row.len(), i);
                assert_relative_eq!(row.iter().sum::<f64>(), tableau.c[i], epsilon = 1e-14);
            }
            assert_relative_eq!(tableau.b.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
            assert_relative_eq!(tableau.e.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
            // last stage is the new state
            let last = tableau.a[tableau.a.len() - 1];
            for (a, b) in last.iter().zip(tableau.b) {
                assert_relative_eq!(*a, *b, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_exponential_decay() {
        let y0 = column(&[c(1.0, 0.0)]);
        for method in [Method::Rk45, Method::Rk23] {
            let result = solve_ode(&decay(), [0.0, 1.0], &y0, &method, None, &options(1e-9)).unwrap();
            assert_relative_eq!(result.y[1][[0, 0]].re, (-2.0f64).exp(), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_output_times_hit_exactly() {
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let t_eval: Vec<f64> = (0..=10).map(|k| k as f64 * 0.7).collect();
        let result = solve_ode(
            &oscillator(),
            [0.0, 7.5],
            &y0,
            &Method::Rk45,
            Some(&t_eval),
            &options(1e-10),
        )
        .unwrap();
        assert_eq!(result.t, t_eval);
        for (t, y) in result.t.iter().zip(&result.y) {
            assert_relative_eq!(y[[0, 0]].re, t.cos(), epsilon = 1e-7);
            assert_relative_eq!(y[[1, 0]].re, -t.sin(), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_tighter_tolerance_takes_more_steps() {
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let loose = solve_ode(&oscillator(), [0.0, 5.0], &y0, &Method::Rk23, None, &options(1e-4)).unwrap();
        let tight = solve_ode(&oscillator(), [0.0, 5.0], &y0, &Method::Rk23, None, &options(1e-8)).unwrap();
        assert!(tight.steps > loose.steps);
        let err = |y: &Array2<Complex64>| (y[[0, 0]].re - 5.0f64.cos()).abs();
        assert!(err(&tight.y[1]) < err(&loose.y[1]));
    }

    #[test]
    fn test_max_dt_bounds_steps() {
        let y0 = column(&[c(1.0, 0.0)]);
        let opts = SolverOptions {
            max_dt: Some(0.01),
            ..options(1e-3)
        };
        let result = solve_ode(&decay(), [0.0, 1.0], &y0, &Method::Rk45, None, &opts).unwrap();
        assert!(result.steps >= 100);
    }

    #[test]
    fn test_max_steps_is_numerical_failure() {
        let y0 = column(&[c(1.0, 0.0), c(0.0, 0.0)]);
        let opts = SolverOptions {
            max_steps: 5,
            ..options(1e-12)
        };
        let err = solve_ode(&oscillator(), [0.0, 100.0], &y0, &Method::Rk45, None, &opts).unwrap_err();
        assert!(matches!(err, Error::NumericalFailure(_)));
    }

    #[test]
    fn test_rhs_errors_propagate() {
        let rhs = FnRhs(|t: f64, y: &Array2<Complex64>| -> Result<Array2<Complex64>> {
            if t > 0.5 {
                Err(Error::NumericalFailure("boom".into()))
            } else {
                Ok(y.clone())
            }
        });
        let y0 = column(&[c(1.0, 0.0)]);
        let err = solve_ode(&rhs, [0.0, 1.0], &y0, &Method::Rk23, None, &options(1e-6)).unwrap_err();
        assert!(matches!(err, Error::NumericalFailure(ref m) if m == "boom"));
    }
}
