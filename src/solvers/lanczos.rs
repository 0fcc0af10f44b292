// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Krylov-subspace matrix exponential action (`lanczos_diag`).
//!
//! For an anti-Hermitian step exponent `A = h G(t + h/2)`, write `A = -iH`
//! with `H` Hermitian. Lanczos iteration builds an orthonormal basis `Q` of
//! the Krylov space `span{b, Hb, …, H^{k-1}b}` and the tridiagonal
//! projection `T = Q†HQ`. With `T = V diag(e) Vᵀ`,
//!
//! ```text
//! e^{A} b ≈ ‖b‖ Q V e^{-i diag(e)} Vᵀ e₁
//! ```
//!
//! Accuracy depends only on `k_dim`; with `k_dim = n` the result is exact up
//! to rounding. Intended for large sparse generators where a dense matrix
//! exponential is prohibitive.
//!
//! Ref: Saad, "Analysis of some Krylov subspace approximations to the matrix
//! exponential operator", SIAM J. Numer. Anal. 29 (1992).

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;

use super::fixed_step::integrate_fixed;
use super::{LmdeGenerator, OdeResult};
use crate::array::linalg::eigh_real;
use crate::array::{Operator, HERMITIAN_ATOL};
use crate::error::{Error, Result};

/// Relative size of the next Lanczos vector below which the Krylov space is invariant.
const BREAKDOWN_TOL: f64 = 1e-12;

fn inner(a: ArrayView1<Complex64>, b: ArrayView1<Complex64>) -> Complex64 {
    a.iter().zip(b.iter()).map(|(x, y)| x.conj() * y).sum()
}

fn norm(a: ArrayView1<Complex64>) -> f64 {
    a.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

/// `e^{-iH} b` for Hermitian `H`, projected onto a Krylov space of dimension `k_dim`.
pub fn lanczos_expm_vector(
    h: &Operator,
    b: ArrayView1<Complex64>,
    k_dim: usize,
) -> Result<Array1<Complex64>> {
    let n = b.len();
    let beta0 = norm(b);
    if beta0 == 0.0 {
        return Ok(Array1::zeros(n));
    }
    let k_max = k_dim.min(n).max(1);

    let mut basis: Vec<Array1<Complex64>> = Vec::with_capacity(k_max);
    let mut alpha: Vec<f64> = Vec::with_capacity(k_max);
    let mut beta: Vec<f64> = Vec::with_capacity(k_max);
    basis.push(b.mapv(|z| z / beta0));

    for j in 0..k_max {
        let q = basis[j].view().insert_axis(ndarray::Axis(1)).to_owned();
        let mut w = h.dot(&q).column(0).to_owned();
        let a_j = inner(basis[j].view(), w.view()).re;
        w.scaled_add(Complex64::new(-a_j, 0.0), &basis[j]);
        if j > 0 {
            w.scaled_add(Complex64::new(-beta[j - 1], 0.0), &basis[j - 1]);
        }
        // full reorthogonalization
        for q_i in &basis {
            let overlap = inner(q_i.view(), w.view());
            w.scaled_add(-overlap, q_i);
        }
        alpha.push(a_j);
        if j + 1 == k_max {
            break;
        }
        let b_j = norm(w.view());
        if b_j <= BREAKDOWN_TOL * a_j.abs().max(beta.last().copied().unwrap_or(0.0)).max(1.0) {
            break;
        }
        beta.push(b_j);
        basis.push(w.mapv(|z| z / b_j));
    }

    let m = alpha.len();
    let mut t = Array2::<f64>::zeros((m, m));
    for i in 0..m {
        t[[i, i]] = alpha[i];
        if i + 1 < m {
            t[[i, i + 1]] = beta[i];
            t[[i + 1, i]] = beta[i];
        }
    }
    let (evals, evecs) = eigh_real(&t)?;

    // c = V e^{-i e} Vᵀ e₁ · ‖b‖
    let mut coeffs = Array1::<Complex64>::zeros(m);
    for (l, &e) in evals.iter().enumerate() {
        let weight = Complex64::new(0.0, -e).exp() * evecs[[0, l]] * beta0;
        for i in 0..m {
            coeffs[i] += weight * evecs[[i, l]];
        }
    }

    let mut out = Array1::<Complex64>::zeros(n);
    for (c_i, q_i) in coeffs.iter().zip(&basis) {
        out.scaled_add(*c_i, q_i);
    }
    Ok(out)
}

/// `e^{A} y` column by column for anti-Hermitian `A`.
///
/// Sparse `A` stays sparse: the Hermiticity check and the Krylov products
/// touch only stored entries.
pub fn lanczos_expm(a: &Operator, y: &Array2<Complex64>, k_dim: usize) -> Result<Array2<Complex64>> {
    let h = a.scale(Complex64::new(0.0, 1.0));
    if !h.is_hermitian(HERMITIAN_ATOL * (1.0 + h.frobenius_norm())) {
        return Err(Error::UnsupportedMethod(
            "lanczos_diag requires an anti-Hermitian generator".into(),
        ));
    }
    let mut out = Array2::zeros(y.raw_dim());
    for (j, col) in y.columns().into_iter().enumerate() {
        out.column_mut(j).assign(&lanczos_expm_vector(&h, col, k_dim)?);
    }
    Ok(out)
}

/// Fixed-step integration with `y ← e^{h G(t + h/2)} y` via Lanczos.
pub(crate) fn solve_lanczos<G: LmdeGenerator + ?Sized>(
    generator: &G,
    t_span: [f64; 2],
    y0: &Array2<Complex64>,
    times: &[f64],
    max_dt: f64,
    k_dim: usize,
) -> Result<OdeResult> {
    let (y, steps) = integrate_fixed(t_span, y0, times, max_dt, |t, h, y| {
        let a = generator.generator(t + 0.5 * h)?.scale(Complex64::new(h, 0.0));
        lanczos_expm(&a, y, k_dim)
    })?;
    Ok(OdeResult {
        t: times.to_vec(),
        y,
        nfev: steps,
        steps,
        rejected_steps: 0,
    })
}
