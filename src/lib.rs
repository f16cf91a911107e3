// src/lib.rs
//
// Height-map reconstruction from a dense gradient field (p = ∂z/∂u, q = ∂z/∂v).
// Every method implements `Integrator`; they are independent and interchangeable.

pub mod cg;
pub mod config;
pub mod difference;
pub mod error;
pub mod field;
pub mod fourier;
pub mod grid;
pub mod mask;
pub mod path;
pub mod relaxation;
pub mod variational;

pub use config::{IntegratorConfig, RunConfig};
pub use error::{IntegrationError, Result};
pub use field::{GradientField, HeightMap, ScalarField2D};
pub use fourier::Frankot;
pub use grid::Grid2D;
pub use mask::DomainMask;
pub use path::{Path, SplitPath};
pub use relaxation::{Durou, Horn, RelaxSettings};
pub use variational::{Quadratic, RegularizationWeight, TotalVariation};

/// A gradient-to-height method, configured once and reusable across calls.
pub trait Integrator: Send + Sync {
    /// Short method identifier (also used for output file names).
    fn name(&self) -> &'static str;

    /// Reconstruct z from (p, q). The result has the shape of the inputs.
    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D>;
}
