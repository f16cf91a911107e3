// src/relaxation.rs
//
// Fixed-point relaxation of the discretised Poisson equation ∇²z = ∂p/∂u + ∂q/∂v.
//
//   Horn–Brooks (4-neighbour, central divergence):
//     z[u,v] <- ¼(z[u+1,v] + z[u,v+1] + z[u-1,v] + z[u,v-1])
//               - ⅛(p[u+1,v] - p[u-1,v]) - ⅛(q[u,v+1] - q[u,v-1])
//
//   Durou–Courteille (forward, 2-neighbour, trapezoidal slopes):
//     z[u,v] <- ½(z[u+1,v] + z[u,v+1]) - ¼(p[u+1,v] + p[u,v]) - ¼(q[u,v+1] + q[u,v])
//
// Both are Jacobi sweeps: every value of z^{k+1} is computed from z^k only, so a sweep
// is data-parallel over rows and its result does not depend on evaluation order.
// Start is z^0 = 0; the final iterate is scaled by the pixel spacing ε.
//
// Boundaries:
// - Horn: Neumann. An out-of-range z neighbour is its in-range mirror shifted by the
//   boundary slope (z[-1] = z[1] - 2p[0]); the out-of-range p is reflected about the
//   boundary value (p[-1] = 2p[0] - p[1]). Planes are fixed points.
// - Durou: natural condition ∂u z - p + ∂v z - q = 0 on the last row/column, realised
//   as z[rows] = z[rows-1] + p[rows-1] (same for v). The bottom-right corner anchors
//   the additive constant.

use crate::error::{ensure_nonzero, ensure_positive, Result};
use crate::field::{GradientField, ScalarField2D};
use crate::Integrator;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxSettings {
    /// Iteration budget. Without `tol` exactly this many sweeps run.
    pub max_iter: usize,

    /// Pixel spacing; scales the returned heights.
    pub epsilon: f64,

    /// Optional early exit: stop once max |z^{k+1} - z^k| <= tol.
    /// None keeps the fixed-iteration behaviour.
    pub tol: Option<f64>,
}

impl Default for RelaxSettings {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            epsilon: 1.0,
            tol: None,
        }
    }
}

impl RelaxSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_nonzero("max_iter", self.max_iter)?;
        ensure_positive("epsilon", self.epsilon)?;
        if let Some(tol) = self.tol {
            ensure_positive("tol", tol)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelaxReport {
    /// Sweeps actually performed.
    pub iterations: usize,
    /// max |z^{k+1} - z^k| of the last sweep (before ε scaling).
    pub last_update: f64,
    /// True when the optional tolerance ended the run before `max_iter`.
    pub stopped_early: bool,
}

/// Horn–Brooks integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horn {
    settings: RelaxSettings,
}

impl Horn {
    pub fn new(max_iter: usize, epsilon: f64) -> Result<Self> {
        Self::from_settings(RelaxSettings {
            max_iter,
            epsilon,
            tol: None,
        })
    }

    pub fn from_settings(settings: RelaxSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Enable the tolerance-based early exit.
    pub fn with_tolerance(self, tol: f64) -> Result<Self> {
        Self::from_settings(RelaxSettings {
            tol: Some(tol),
            ..self.settings
        })
    }

    pub fn settings(&self) -> &RelaxSettings {
        &self.settings
    }

    pub fn integrate_with_report(
        &self,
        p: &ScalarField2D,
        q: &ScalarField2D,
    ) -> Result<(ScalarField2D, RelaxReport)> {
        let g = GradientField::new(p, q)?;
        let out = jacobi_relax(&g, &self.settings, |z, u, v| horn_update(&g, z, u, v));
        log_report("horn", &out.1);
        Ok(out)
    }
}

impl Default for Horn {
    fn default() -> Self {
        Self {
            settings: RelaxSettings::default(),
        }
    }
}

impl Integrator for Horn {
    fn name(&self) -> &'static str {
        "horn"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        self.integrate_with_report(p, q).map(|(z, _)| z)
    }
}

/// Durou–Courteille integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Durou {
    settings: RelaxSettings,
}

impl Durou {
    pub fn new(max_iter: usize, epsilon: f64) -> Result<Self> {
        Self::from_settings(RelaxSettings {
            max_iter,
            epsilon,
            tol: None,
        })
    }

    pub fn from_settings(settings: RelaxSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn with_tolerance(self, tol: f64) -> Result<Self> {
        Self::from_settings(RelaxSettings {
            tol: Some(tol),
            ..self.settings
        })
    }

    pub fn settings(&self) -> &RelaxSettings {
        &self.settings
    }

    pub fn integrate_with_report(
        &self,
        p: &ScalarField2D,
        q: &ScalarField2D,
    ) -> Result<(ScalarField2D, RelaxReport)> {
        let g = GradientField::new(p, q)?;
        let out = jacobi_relax(&g, &self.settings, |z, u, v| durou_update(&g, z, u, v));
        log_report("durou", &out.1);
        Ok(out)
    }
}

impl Default for Durou {
    fn default() -> Self {
        Self {
            settings: RelaxSettings::default(),
        }
    }
}

impl Integrator for Durou {
    fn name(&self) -> &'static str {
        "durou"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        self.integrate_with_report(p, q).map(|(z, _)| z)
    }
}

fn log_report(tag: &str, r: &RelaxReport) {
    log::debug!(
        "[{}] {} sweeps, last max update {:.3e}{}",
        tag,
        r.iterations,
        r.last_update,
        if r.stopped_early { " (tolerance reached)" } else { "" }
    );
}

/// Run Jacobi sweeps of `update` (reads z^k, returns z^{k+1} at one pixel).
fn jacobi_relax<F>(
    g: &GradientField<'_>,
    settings: &RelaxSettings,
    update: F,
) -> (ScalarField2D, RelaxReport)
where
    F: Fn(&ScalarField2D, usize, usize) -> f64 + Sync,
{
    let grid = g.grid();
    let cols = grid.cols;
    let mut z = ScalarField2D::zeros(grid);
    let mut next = ScalarField2D::zeros(grid);

    let mut report = RelaxReport {
        iterations: 0,
        last_update: 0.0,
        stopped_early: false,
    };

    for _ in 0..settings.max_iter {
        let z_ro: &ScalarField2D = &z;
        let max_change = next
            .data
            .par_chunks_mut(cols)
            .enumerate()
            .map(|(u, row)| {
                let mut m: f64 = 0.0;
                for (v, out) in row.iter_mut().enumerate() {
                    let val = update(z_ro, u, v);
                    m = m.max((val - z_ro.get(u, v)).abs());
                    *out = val;
                }
                m
            })
            .reduce(|| 0.0f64, f64::max);

        std::mem::swap(&mut z, &mut next);
        report.iterations += 1;
        report.last_update = max_change;

        if let Some(tol) = settings.tol {
            if max_change <= tol {
                report.stopped_early = report.iterations < settings.max_iter;
                break;
            }
        }
    }

    z.scale(settings.epsilon);
    (z, report)
}

#[inline]
fn horn_update(g: &GradientField<'_>, z: &ScalarField2D, u: usize, v: usize) -> f64 {
    let (p, q) = (g.p, g.q);
    let rows = z.rows();
    let cols = z.cols();

    // (z, p) one step back / forward along u, with Neumann ghosts at the edges.
    let (z_um, p_um) = if u > 0 {
        (z.get(u - 1, v), p.get(u - 1, v))
    } else {
        (z.get(1, v) - 2.0 * p.get(0, v), 2.0 * p.get(0, v) - p.get(1, v))
    };
    let (z_up, p_up) = if u + 1 < rows {
        (z.get(u + 1, v), p.get(u + 1, v))
    } else {
        (
            z.get(u - 1, v) + 2.0 * p.get(u, v),
            2.0 * p.get(u, v) - p.get(u - 1, v),
        )
    };

    let (z_vm, q_vm) = if v > 0 {
        (z.get(u, v - 1), q.get(u, v - 1))
    } else {
        (z.get(u, 1) - 2.0 * q.get(u, 0), 2.0 * q.get(u, 0) - q.get(u, 1))
    };
    let (z_vp, q_vp) = if v + 1 < cols {
        (z.get(u, v + 1), q.get(u, v + 1))
    } else {
        (
            z.get(u, v - 1) + 2.0 * q.get(u, v),
            2.0 * q.get(u, v) - q.get(u, v - 1),
        )
    };

    0.25 * (z_up + z_vp + z_um + z_vm) - 0.125 * (p_up - p_um) - 0.125 * (q_vp - q_vm)
}

#[inline]
fn durou_update(g: &GradientField<'_>, z: &ScalarField2D, u: usize, v: usize) -> f64 {
    let (p, q) = (g.p, g.q);
    let p_c = p.get(u, v);
    let q_c = q.get(u, v);

    let (z_up, p_up) = if u + 1 < z.rows() {
        (z.get(u + 1, v), p.get(u + 1, v))
    } else {
        (z.get(u, v) + p_c, p_c)
    };
    let (z_vp, q_vp) = if v + 1 < z.cols() {
        (z.get(u, v + 1), q.get(u, v + 1))
    } else {
        (z.get(u, v) + q_c, q_c)
    };

    0.5 * (z_up + z_vp) - 0.25 * (p_up + p_c) - 0.25 * (q_vp + q_c)
}
