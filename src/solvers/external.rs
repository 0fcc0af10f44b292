// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adapter for externally supplied real-valued ODE integrators.
//!
//! Complex states of shape `(r, c)` are flattened row-major and split into
//! `[Re(y); Im(y)]`, a real vector of length `2rc`.

use std::cell::Cell;

use ndarray::Array2;
use num_complex::Complex64;

use super::{OdeResult, OdeRhs};
use crate::error::{Error, Result};

/// Real right-hand side handed to an external solver.
pub type RealRhs<'a> = dyn Fn(f64, &[f64]) -> Result<Vec<f64>> + 'a;

/// An integrator for real systems `dx/dt = f(t, x)`.
pub trait ExternalSolver: Send + Sync {
    /// Name reported as the method tag.
    fn name(&self) -> &str;

    /// Integrate over `t_span` and return the state at each of `t_eval`.
    fn solve(
        &self,
        rhs: &RealRhs<'_>,
        t_span: [f64; 2],
        x0: &[f64],
        t_eval: &[f64],
    ) -> Result<Vec<Vec<f64>>>;
}

pub(crate) fn to_real(y: &Array2<Complex64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * y.len());
    out.extend(y.iter().map(|z| z.re));
    out.extend(y.iter().map(|z| z.im));
    out
}

pub(crate) fn from_real(x: &[f64], shape: (usize, usize)) -> Result<Array2<Complex64>> {
    let n = shape.0 * shape.1;
    if x.len() != 2 * n {
        return Err(Error::NumericalFailure(format!(
            "external solver state has length {}, expected {}",
            x.len(),
            2 * n
        )));
    }
    Ok(Array2::from_shape_fn(shape, |(i, j)| {
        let k = i * shape.1 + j;
        Complex64::new(x[k], x[n + k])
    }))
}

pub(crate) fn solve<R: OdeRhs + ?Sized>(
    solver: &dyn ExternalSolver,
    rhs: &R,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
) -> Result<OdeResult> {
    let shape = y0.dim();
    let count = Cell::new(0usize);
    let real_rhs = |t: f64, x: &[f64]| -> Result<Vec<f64>> {
        count.set(count.get() + 1);
        let y = from_real(x, shape)?;
        Ok(to_real(&rhs.rhs(t, &y)?))
    };

    let states = solver.solve(&real_rhs, t_span, &to_real(y0), times)?;
    if states.len() != times.len() {
        return Err(Error::NumericalFailure(format!(
            "external solver '{}' returned {} states for {} output times",
            solver.name(),
            states.len(),
            times.len()
        )));
    }
    let y = states
        .iter()
        .map(|x| from_real(x, shape))
        .collect::<Result<Vec<_>>>()?;

    Ok(OdeResult {
        t: times.to_vec(),
        y,
        nfev: count.get(),
        steps: 0,
        rejected_steps: 0,
    })
}
