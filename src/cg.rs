// src/cg.rs
//
// Matrix-free conjugate gradient for symmetric positive-definite systems A x = b.
//
// Stop: ||r|| <= rel_tol * ||b||, or max_iter exhausted. Exhausting the budget is a
// soft failure: the last iterate is kept and the report says `converged = false`.
//
// Reductions use fixed-size chunks summed in a fixed order, so results do not depend
// on the rayon thread count.

use crate::error::{ensure_nonzero, ensure_positive, Result};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Linear map applied without materialising a matrix.
pub trait LinearOperator: Sync {
    fn dim(&self) -> usize;

    /// y = A x (overwrites y).
    fn apply(&self, x: &[f64], y: &mut [f64]);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgSettings {
    /// Relative residual target ||b - A x|| / ||b||.
    pub rel_tol: f64,
    /// Hard cap on iterations.
    pub max_iter: usize,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            rel_tol: 1e-10,
            max_iter: 10_000,
        }
    }
}

impl CgSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("cg.rel_tol", self.rel_tol)?;
        ensure_nonzero("cg.max_iter", self.max_iter)?;
        Ok(())
    }
}

/// Outcome of an iterative solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// Final ||r|| / ||b|| (0 when b = 0).
    pub rel_residual: f64,
    pub converged: bool,
}

const CHUNK: usize = 4096;

/// Deterministic parallel dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let partial: Vec<f64> = a
        .par_chunks(CHUNK)
        .zip(b.par_chunks(CHUNK))
        .map(|(ca, cb)| ca.iter().zip(cb).map(|(x, y)| x * y).sum::<f64>())
        .collect();
    partial.iter().sum()
}

/// y += alpha * x
fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, xi)| {
        *yi += alpha * xi;
    });
}

/// Solve A x = b starting from the contents of `x`.
pub fn conjugate_gradient<A: LinearOperator>(
    a: &A,
    b: &[f64],
    x: &mut [f64],
    settings: &CgSettings,
) -> SolveReport {
    let n = a.dim();
    debug_assert_eq!(b.len(), n, "conjugate_gradient: rhs length");
    debug_assert_eq!(x.len(), n, "conjugate_gradient: x length");

    let b_norm = dot(b, b).sqrt();
    if !b_norm.is_finite() {
        // NaN/Inf in the data: hand it on instead of returning the start vector.
        x.fill(f64::NAN);
        log::warn!("[cg] right-hand side is not finite; solution set to NaN");
        return SolveReport {
            iterations: 0,
            rel_residual: f64::NAN,
            converged: false,
        };
    }
    if n == 0 || b_norm == 0.0 {
        x.fill(0.0);
        return SolveReport {
            iterations: 0,
            rel_residual: 0.0,
            converged: true,
        };
    }
    let target = settings.rel_tol * b_norm;

    // r = b - A x
    let mut r = vec![0.0; n];
    a.apply(x, &mut r);
    r.par_iter_mut().zip(b.par_iter()).for_each(|(ri, bi)| {
        *ri = bi - *ri;
    });

    let mut p = r.clone();
    let mut ap = vec![0.0; n];
    let mut rr = dot(&r, &r);
    let mut iterations = 0;

    while rr.sqrt() > target && iterations < settings.max_iter {
        a.apply(&p, &mut ap);
        let pap = dot(&p, &ap);
        if pap <= 0.0 || pap.is_nan() {
            // Loss of positive curvature (or NaN): keep the best iterate.
            break;
        }
        let alpha = rr / pap;
        axpy(alpha, &p, x);
        axpy(-alpha, &ap, &mut r);

        let rr_new = dot(&r, &r);
        let beta = rr_new / rr;
        rr = rr_new;
        p.par_iter_mut().zip(r.par_iter()).for_each(|(pi, ri)| {
            *pi = ri + beta * *pi;
        });
        iterations += 1;
    }

    let rel_residual = rr.sqrt() / b_norm;
    let converged = rr.sqrt() <= target;
    if !converged {
        log::warn!(
            "[cg] stopped after {} iterations without reaching tolerance (rel residual {:.3e} > {:.1e})",
            iterations,
            rel_residual,
            settings.rel_tol
        );
    } else {
        log::debug!(
            "[cg] converged in {} iterations (rel residual {:.3e})",
            iterations,
            rel_residual
        );
    }

    SolveReport {
        iterations,
        rel_residual,
        converged,
    }
}
