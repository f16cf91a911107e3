// src/variational/quadratic.rs
//
// Quadratic variational integration:
//
//   E(z) = ½ Σ_{D ∈ {D_u⁺, D_u⁻}} |D z - p|² + ½ Σ_{D ∈ {D_v⁺, D_v⁻}} |D z - q|² + |Λ(z - z0)|²
//
// Normal equations  A z = b:
//   A = L + Λ²,  L = ½(D_u⁺ᵀD_u⁺ + D_u⁻ᵀD_u⁻ + D_v⁺ᵀD_v⁺ + D_v⁻ᵀD_v⁻)
//   b = D_u p + D_v q + Λ² z0,  D_u = ½(D_u⁺ᵀ + D_u⁻ᵀ), D_v = ½(D_v⁺ᵀ + D_v⁻ᵀ)
//
// A is SPD as soon as λ > 0 somewhere on every connected component of Ω, so CG from
// any start reaches the same solution; the start (z0) only changes the iteration count.

use super::{RegularizationWeight, VariationalSetup};
use crate::cg::{conjugate_gradient, CgSettings, SolveReport};
use crate::difference::{DifferenceOperator, ScaledLaplacian};
use crate::error::Result;
use crate::field::ScalarField2D;
use crate::mask::DomainMask;
use crate::Integrator;

#[derive(Debug, Clone, PartialEq)]
pub struct Quadratic {
    setup: VariationalSetup,
    cg: CgSettings,
}

impl Quadratic {
    /// Integrator with prior `z0`, default λ and the full domain.
    pub fn new(z0: ScalarField2D) -> Self {
        Self {
            setup: VariationalSetup::new(z0),
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

    pub fn with_cg(mut self, cg: CgSettings) -> Result<Self> {
        cg.validate()?;
        self.cg = cg;
        Ok(self)
    }

    pub fn setup(&self) -> &VariationalSetup {
        &self.setup
    }

    /// Integrate and report how the CG solve ended.
    pub fn integrate_with_report(
        &self,
        p: &ScalarField2D,
        q: &ScalarField2D,
    ) -> Result<(ScalarField2D, SolveReport)> {
        let prob = self.setup.restrict(p, q)?;
        let dom = &prob.dom;

        let mut b = prob.weighted_prior();
        for op in [DifferenceOperator::U_FORWARD, DifferenceOperator::U_BACKWARD] {
            op.add_transpose(dom, &prob.p, 0.5, &mut b);
        }
        for op in [DifferenceOperator::V_FORWARD, DifferenceOperator::V_BACKWARD] {
            op.add_transpose(dom, &prob.q, 0.5, &mut b);
        }

        let a = ScaledLaplacian::new(dom, 1.0, &prob.lambda);
        let mut x = prob.z0.clone();
        let report = conjugate_gradient(&a, &b, &mut x, &self.cg);

        log::debug!(
            "[quadratic] {} active of {} pixels, cg {} iterations, converged={}",
            dom.len(),
            dom.grid.n_cells(),
            report.iterations,
            report.converged
        );

        Ok((self.setup.assemble(dom, &x), report))
    }
}

impl Integrator for Quadratic {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        self.integrate_with_report(p, q).map(|(z, _)| z)
    }
}
