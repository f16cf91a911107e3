// src/variational/mod.rs
//
// Variational least-squares integration over a masked domain Ω:
//
//   min_z  F(∇z - g) + Σ_Ω λ (z - z0)²
//
// with Φ(s) = |s|² (Quadratic) or Φ(s) = |s| (TotalVariation). Pixels outside Ω are
// returned at their prior value z0. λ keeps the system well-posed when the data leave
// a constant (or whole components of Ω) undetermined.

pub mod quadratic;
pub mod total_variation;

pub use quadratic::Quadratic;
pub use total_variation::{shrink, AdmmSettings, TotalVariation, TvReport};

use crate::error::{ensure_same_grid, IntegrationError, Result};
use crate::field::{GradientField, ScalarField2D};
use crate::mask::{DomainIndex, DomainMask};

/// Default per-pixel pull towards the prior.
pub const DEFAULT_LAMBDA: f64 = 1e-6;

/// Regularisation weight λ ≥ 0: one value broadcast to the grid, or one per pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum RegularizationWeight {
    Uniform(f64),
    PerPixel(ScalarField2D),
}

impl Default for RegularizationWeight {
    fn default() -> Self {
        Self::Uniform(DEFAULT_LAMBDA)
    }
}

impl RegularizationWeight {
    fn validate(&self) -> Result<()> {
        let bad = |x: f64| !(x.is_finite() && x >= 0.0);
        match self {
            Self::Uniform(l) if bad(*l) => Err(IntegrationError::invalid(
                "lambda",
                format!("must be finite and non-negative, got {l}"),
            )),
            Self::PerPixel(f) => match f.data.iter().position(|&x| bad(x)) {
                Some(id) => {
                    let (u, v) = f.grid.coords(id);
                    Err(IntegrationError::invalid(
                        "lambda",
                        format!("entry ({u}, {v}) = {} is negative or not finite", f.data[id]),
                    ))
                }
                None => Ok(()),
            },
            Self::Uniform(_) => Ok(()),
        }
    }

    #[inline]
    fn at(&self, id: usize) -> f64 {
        match self {
            Self::Uniform(l) => *l,
            Self::PerPixel(f) => f.data[id],
        }
    }
}

/// Prior, weights and domain shared by the variational integrators.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationalSetup {
    z0: ScalarField2D,
    lambda: RegularizationWeight,
    mask: DomainMask,
}

impl VariationalSetup {
    /// Full domain, default λ.
    pub fn new(z0: ScalarField2D) -> Self {
        let mask = DomainMask::full(z0.grid);
        Self {
            z0,
            lambda: RegularizationWeight::default(),
            mask,
        }
    }

    pub fn with_lambda(mut self, lambda: RegularizationWeight) -> Result<Self> {
        lambda.validate()?;
        if let RegularizationWeight::PerPixel(f) = &lambda {
            ensure_same_grid("lambda", self.z0.grid, f.grid)?;
        }
        self.lambda = lambda;
        Ok(self)
    }

    pub fn with_mask(mut self, mask: DomainMask) -> Result<Self> {
        ensure_same_grid("mask", self.z0.grid, mask.grid)?;
        self.mask = mask;
        Ok(self)
    }

    pub fn prior(&self) -> &ScalarField2D {
        &self.z0
    }

    pub fn lambda(&self) -> &RegularizationWeight {
        &self.lambda
    }

    pub fn mask(&self) -> &DomainMask {
        &self.mask
    }

    /// Validate the gradient against the prior and restrict everything to Ω.
    fn restrict(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<Restricted> {
        let g = GradientField::new(p, q)?;
        ensure_same_grid("p (against prior z0)", self.z0.grid, g.grid())?;

        let dom = DomainIndex::new(&self.mask);
        let p = dom.gather(g.p);
        let q = dom.gather(g.q);
        let z0 = dom.gather(&self.z0);
        let lambda = dom.pixels.iter().map(|&id| self.lambda.at(id)).collect();
        Ok(Restricted {
            dom,
            p,
            q,
            z0,
            lambda,
        })
    }

    /// Prior everywhere, solution on Ω.
    fn assemble(&self, dom: &DomainIndex, x: &[f64]) -> ScalarField2D {
        let mut z = self.z0.clone();
        dom.scatter(x, &mut z);
        z
    }
}

/// Problem data restricted to the active slots.
struct Restricted {
    dom: DomainIndex,
    p: Vec<f64>,
    q: Vec<f64>,
    z0: Vec<f64>,
    lambda: Vec<f64>,
}

impl Restricted {
    /// Λ² z0
    fn weighted_prior(&self) -> Vec<f64> {
        self.lambda
            .iter()
            .zip(&self.z0)
            .map(|(l, z)| l * z)
            .collect()
    }
}
