// src/variational/total_variation.rs
//
// Total-variation (L1) integration by ADMM.
//
// Four discrete gradients, one per sign combination UV ∈ {++, +-, -+, --}:
//   ∇^{UV} z = (D_u^U z, D_v^V z),   g^{UV} = (p, q) on the rows where D_u^U / D_v^V exist
//
// Per outer iteration:
//   z-update  A_TV z = Λ² z0 + (α/8) Σ_UV ∇^{UVᵀ}(g^{UV} + r^{UV} - b^{UV})
//             A_TV = (α/8) Σ_UV ∇^{UVᵀ}∇^{UV} + Λ² = (α/2) L + Λ²
//   r-update  r^{UV} = shrink(∇^{UV} z - g^{UV} + b^{UV}, 4/α)
//   b-update  b^{UV} += ∇^{UV} z - g^{UV} - r^{UV}
//
// A_TV does not change between iterations; CG is warm-started from the previous z.

use super::{RegularizationWeight, Restricted, VariationalSetup};
use crate::cg::{conjugate_gradient, CgSettings, SolveReport};
use crate::difference::{DifferenceOperator, ScaledLaplacian};
use crate::error::{ensure_nonzero, ensure_positive, Result};
use crate::field::ScalarField2D;
use crate::mask::{DomainIndex, DomainMask};
use crate::Integrator;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Below this step size ADMM is known to stall or oscillate in practice.
const SMALL_ALPHA: f64 = 0.25;

/// Outer-loop budget. `tol = None` runs exactly `max_iter` iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmmSettings {
    pub max_iter: usize,
    /// Stop once max |z^{k+1} - z^k| over Ω drops below this.
    pub tol: Option<f64>,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: None,
        }
    }
}

impl AdmmSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_nonzero("admm.max_iter", self.max_iter)?;
        if let Some(tol) = self.tol {
            ensure_positive("admm.tol", tol)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TvReport {
    pub admm_iterations: usize,
    /// max |z^{k+1} - z^k| of the last outer iteration.
    pub last_change: f64,
    pub cg_iterations_total: usize,
    /// CG outcome of the last z-update.
    pub last_cg: SolveReport,
    /// True when `tol` was set and reached.
    pub converged: bool,
}

/// Group soft-threshold of a 2-vector: zero when ‖s‖ ≤ threshold, else s scaled by
/// (‖s‖ - threshold)/‖s‖. NaN input gives NaN output.
pub fn shrink(s: [f64; 2], threshold: f64) -> [f64; 2] {
    let norm = s[0].hypot(s[1]);
    if norm <= threshold || norm == 0.0 {
        return [0.0, 0.0];
    }
    let k = (norm - threshold) / norm;
    [k * s[0], k * s[1]]
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalVariation {
    setup: VariationalSetup,
    alpha: f64,
    admm: AdmmSettings,
    cg: CgSettings,
}

impl TotalVariation {
    /// Prior `z0`, default λ, full domain, α = 1.
    pub fn new(z0: ScalarField2D) -> Self {
        Self {
            setup: VariationalSetup::new(z0),
            alpha: 1.0,
            admm: AdmmSettings::default(),
            cg: CgSettings::default(),
        }
    }

    pub fn with_lambda(mut self, lambda: RegularizationWeight) -> Result<Self> {
        self.setup = self.setup.with_lambda(lambda)?;
        Ok(self)
    }

    pub fn with_uniform_lambda(self, lambda: f64) -> Result<Self> {
        self.with_lambda(RegularizationWeight::Uniform(lambda))
    }

    pub fn with_mask(mut self, mask: DomainMask) -> Result<Self> {
        self.setup = self.setup.with_mask(mask)?;
        Ok(self)
    }

    /// ADMM step size α > 0.
    pub fn with_alpha(mut self, alpha: f64) -> Result<Self> {
        ensure_positive("alpha", alpha)?;
        if alpha < SMALL_ALPHA {
            log::warn!(
                "[tv] alpha = {} is below {}; ADMM may not converge",
                alpha,
                SMALL_ALPHA
            );
        }
        self.alpha = alpha;
        Ok(self)
    }

    pub fn with_admm(mut self, admm: AdmmSettings) -> Result<Self> {
        admm.validate()?;
        self.admm = admm;
        Ok(self)
    }

    pub fn with_cg(mut self, cg: CgSettings) -> Result<Self> {
        cg.validate()?;
        self.cg = cg;
        Ok(self)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn admm(&self) -> &AdmmSettings {
        &self.admm
    }

    pub fn setup(&self) -> &VariationalSetup {
        &self.setup
    }

    pub fn integrate_with_report(
        &self,
        p: &ScalarField2D,
        q: &ScalarField2D,
    ) -> Result<(ScalarField2D, TvReport)> {
        let prob = self.setup.restrict(p, q)?;
        let dom = &prob.dom;
        let n = dom.len();
        let alpha = self.alpha;
        let threshold = 4.0 / alpha;

        let a = ScaledLaplacian::new(dom, 0.5 * alpha, &prob.lambda);
        let prior = prob.weighted_prior();
        let mut splits = Splitting::all(&prob);

        let mut x = prob.z0.clone();
        let mut prev = vec![0.0; n];
        let mut rhs = vec![0.0; n];
        let mut wu = vec![0.0; n];
        let mut wv = vec![0.0; n];

        let mut report = TvReport {
            admm_iterations: 0,
            last_change: 0.0,
            cg_iterations_total: 0,
            last_cg: SolveReport {
                iterations: 0,
                rel_residual: 0.0,
                converged: true,
            },
            converged: false,
        };

        for _ in 0..self.admm.max_iter {
            // z-update
            rhs.copy_from_slice(&prior);
            for s in &splits {
                s.targets(&mut wu, &mut wv);
                s.du.add_transpose(dom, &wu, alpha / 8.0, &mut rhs);
                s.dv.add_transpose(dom, &wv, alpha / 8.0, &mut rhs);
            }
            prev.copy_from_slice(&x);
            let cg = conjugate_gradient(&a, &rhs, &mut x, &self.cg);
            report.cg_iterations_total += cg.iterations;
            report.last_cg = cg;

            // r- and b-updates
            for s in &mut splits {
                s.du.apply(dom, &x, &mut wu);
                s.dv.apply(dom, &x, &mut wv);
                s.update(&wu, &wv, threshold);
            }

            report.admm_iterations += 1;
            report.last_change = x
                .par_iter()
                .zip(prev.par_iter())
                .map(|(a, b)| (a - b).abs())
                .reduce(|| 0.0, max_or_nan);

            if let Some(tol) = self.admm.tol {
                if report.last_change < tol {
                    report.converged = true;
                    break;
                }
            }
        }

        log::debug!(
            "[tv] {} admm iterations ({} cg total), last change {:.3e}, alpha={}",
            report.admm_iterations,
            report.cg_iterations_total,
            report.last_change,
            alpha
        );

        Ok((self.setup.assemble(dom, &x), report))
    }
}

impl Integrator for TotalVariation {
    fn name(&self) -> &'static str {
        "total_variation"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        self.integrate_with_report(p, q).map(|(z, _)| z)
    }
}

/// Like `f64::max`, but a NaN change is never mistaken for convergence.
#[inline]
fn max_or_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// ADMM state of one sign combination.
struct Splitting {
    du: DifferenceOperator,
    dv: DifferenceOperator,
    /// (p, q) where the corresponding difference exists, 0 elsewhere.
    g: Vec<[f64; 2]>,
    r: Vec<[f64; 2]>,
    b: Vec<[f64; 2]>,
}

impl Splitting {
    fn all(prob: &Restricted) -> Vec<Self> {
        let mut out = Vec::with_capacity(4);
        for du in [DifferenceOperator::U_FORWARD, DifferenceOperator::U_BACKWARD] {
            for dv in [DifferenceOperator::V_FORWARD, DifferenceOperator::V_BACKWARD] {
                out.push(Self::new(&prob.dom, du, dv, &prob.p, &prob.q));
            }
        }
        out
    }

    fn new(
        dom: &DomainIndex,
        du: DifferenceOperator,
        dv: DifferenceOperator,
        p: &[f64],
        q: &[f64],
    ) -> Self {
        let g = (0..dom.len())
            .map(|i| {
                let gu = if du.defined_at(dom, i) { p[i] } else { 0.0 };
                let gv = if dv.defined_at(dom, i) { q[i] } else { 0.0 };
                [gu, gv]
            })
            .collect();
        Self {
            du,
            dv,
            g,
            r: vec![[0.0; 2]; dom.len()],
            b: vec![[0.0; 2]; dom.len()],
        }
    }

    /// w = g + r - b, split into its u and v components.
    fn targets(&self, wu: &mut [f64], wv: &mut [f64]) {
        wu.par_iter_mut()
            .zip(wv.par_iter_mut())
            .enumerate()
            .for_each(|(i, (a, c))| {
                *a = self.g[i][0] + self.r[i][0] - self.b[i][0];
                *c = self.g[i][1] + self.r[i][1] - self.b[i][1];
            });
    }

    /// Shrinkage and dual step given the current gradient (zu, zv).
    fn update(&mut self, zu: &[f64], zv: &[f64], threshold: f64) {
        let g = &self.g;
        self.r
            .par_iter_mut()
            .zip(self.b.par_iter_mut())
            .enumerate()
            .for_each(|(i, (r, b))| {
                let res = [zu[i] - g[i][0], zv[i] - g[i][1]];
                *r = shrink([res[0] + b[0], res[1] + b[1]], threshold);
                b[0] += res[0] - r[0];
                b[1] += res[1] - r[1];
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;

    #[test]
    fn shrink_zeroes_inside_the_threshold() {
        // ‖(3, 4)‖ = 5
        assert_eq!(shrink([3.0, 4.0], 5.0), [0.0, 0.0]);
        assert_eq!(shrink([3.0, 4.0], 6.0), [0.0, 0.0]);
        assert_eq!(shrink([0.0, 0.0], 0.0), [0.0, 0.0]);
    }

    #[test]
    fn shrink_scales_outside_the_threshold() {
        let r = shrink([3.0, 4.0], 2.0);
        assert!((r[0] - 1.8).abs() < 1e-15);
        assert!((r[1] - 2.4).abs() < 1e-15);
        let r = shrink([-6.0, 0.0], 4.0);
        assert!((r[0] + 2.0).abs() < 1e-15);
        assert_eq!(r[1], 0.0);
    }

    #[test]
    fn shrink_propagates_nan() {
        let r = shrink([f64::NAN, 1.0], 4.0);
        assert!(r[0].is_nan() && r[1].is_nan());
    }

    #[test]
    fn rejects_non_positive_alpha_and_empty_budget() {
        let g = Grid2D::new(3, 3);
        let tv = TotalVariation::new(ScalarField2D::zeros(g));
        assert!(tv.clone().with_alpha(0.0).is_err());
        assert!(tv.clone().with_alpha(-1.0).is_err());
        assert!(tv.clone().with_alpha(0.1).is_ok());
        assert!(tv
            .clone()
            .with_admm(AdmmSettings {
                max_iter: 0,
                tol: None
            })
            .is_err());
        assert!(tv
            .with_admm(AdmmSettings {
                max_iter: 5,
                tol: Some(0.0)
            })
            .is_err());
    }

    #[test]
    fn recovers_plane_up_to_constant() {
        let g = Grid2D::new(8, 9);
        let p = ScalarField2D::filled(g, -0.3);
        let q = ScalarField2D::filled(g, 0.7);
        let truth = ScalarField2D::from_fn(g, |u, v| -0.3 * u as f64 + 0.7 * v as f64);

        let (z, report) = TotalVariation::new(ScalarField2D::zeros(g))
            .with_admm(AdmmSettings {
                max_iter: 10,
                tol: None,
            })
            .unwrap()
            .integrate_with_report(&p, &q)
            .unwrap();
        assert_eq!(report.admm_iterations, 10);
        assert!(!report.converged);

        let shift = z.mean() - truth.mean();
        for (a, b) in z.data.iter().zip(&truth.data) {
            assert!((a - b - shift).abs() < 1e-3);
        }
    }

    #[test]
    fn tolerance_stops_early_on_consistent_data() {
        let g = Grid2D::new(6, 6);
        let p = ScalarField2D::filled(g, 1.0);
        let q = ScalarField2D::filled(g, 1.0);
        let (_, report) = TotalVariation::new(ScalarField2D::zeros(g))
            .with_admm(AdmmSettings {
                max_iter: 50,
                tol: Some(1e-6),
            })
            .unwrap()
            .integrate_with_report(&p, &q)
            .unwrap();
        assert!(report.converged);
        assert!(report.admm_iterations < 50);
    }

    #[test]
    fn nan_slope_propagates_and_never_converges() {
        let g = Grid2D::new(7, 7);
        let mut p = ScalarField2D::filled(g, 0.3);
        p.set(3, 3, f64::NAN);
        let q = ScalarField2D::zeros(g);
        let (z, report) = TotalVariation::new(ScalarField2D::filled(g, 5.0))
            .with_admm(AdmmSettings {
                max_iter: 3,
                tol: Some(1e-6),
            })
            .unwrap()
            .integrate_with_report(&p, &q)
            .unwrap();
        assert!(z.data.iter().any(|x| x.is_nan()));
        assert!(!report.converged);
        assert_eq!(report.admm_iterations, 3);
        assert!(!report.last_cg.converged);
    }

    #[test]
    fn exhausted_cg_budget_is_reported() {
        let g = Grid2D::new(9, 9);
        let p = ScalarField2D::from_fn(g, |u, v| ((u * 3 + v) % 4) as f64 - 1.5);
        let q = ScalarField2D::from_fn(g, |u, v| ((u + 2 * v) % 3) as f64 - 1.0);
        let (z, report) = TotalVariation::new(ScalarField2D::zeros(g))
            .with_admm(AdmmSettings {
                max_iter: 2,
                tol: None,
            })
            .unwrap()
            .with_cg(CgSettings {
                rel_tol: 1e-12,
                max_iter: 2,
            })
            .unwrap()
            .integrate_with_report(&p, &q)
            .unwrap();
        assert!(!report.last_cg.converged);
        assert_eq!(report.cg_iterations_total, 4);
        assert!(z.data.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn masked_pixels_keep_the_prior() {
        let g = Grid2D::new(7, 5);
        let z0 = ScalarField2D::from_fn(g, |u, v| -2.0 + 0.5 * (u + v) as f64);
        let mask = DomainMask::from_fn(g, |u, v| (u + v) % 4 != 0);
        let p = ScalarField2D::from_fn(g, |u, v| ((u * 3 + v) % 5) as f64);
        let q = ScalarField2D::from_fn(g, |u, v| ((u + 2 * v) % 3) as f64 - 1.0);

        let z = TotalVariation::new(z0.clone())
            .with_mask(mask.clone())
            .unwrap()
            .with_admm(AdmmSettings {
                max_iter: 5,
                tol: None,
            })
            .unwrap()
            .integrate(&p, &q)
            .unwrap();
        for u in 0..7 {
            for v in 0..5 {
                if !mask.is_active(u, v) {
                    assert_eq!(z.get(u, v), z0.get(u, v));
                }
            }
        }
    }
}
