// src/field.rs

use crate::error::{ensure_same_grid, IntegrationError, Result};
use crate::grid::Grid2D;

/// Real scalar field on a 2D grid (row-major).
///
/// Used for the gradient components `p`, `q`, the prior `z0`, per-pixel weights, and
/// the reconstructed height map.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField2D {
    pub grid: Grid2D,
    pub data: Vec<f64>,
}

/// Height maps share the field representation.
pub type HeightMap = ScalarField2D;

impl ScalarField2D {
    /// New field on the given grid, initialised to zero.
    pub fn zeros(grid: Grid2D) -> Self {
        Self::filled(grid, 0.0)
    }

    pub fn filled(grid: Grid2D, value: f64) -> Self {
        Self {
            grid,
            data: vec![value; grid.n_cells()],
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(grid: Grid2D, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.n_cells() {
            return Err(IntegrationError::LengthMismatch {
                what: "field data",
                expected: grid.n_cells(),
                found: data.len(),
            });
        }
        Ok(Self { grid, data })
    }

    /// Build a field by evaluating `f(u, v)` at every pixel.
    pub fn from_fn<F>(grid: Grid2D, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut data = Vec::with_capacity(grid.n_cells());
        for u in 0..grid.rows {
            for v in 0..grid.cols {
                data.push(f(u, v));
            }
        }
        Self { grid, data }
    }

    #[inline]
    pub fn idx(&self, u: usize, v: usize) -> usize {
        self.grid.idx(u, v)
    }

    #[inline]
    pub fn get(&self, u: usize, v: usize) -> f64 {
        self.data[self.grid.idx(u, v)]
    }

    #[inline]
    pub fn set(&mut self, u: usize, v: usize, value: f64) {
        let id = self.grid.idx(u, v);
        self.data[id] = value;
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Multiply every value by `s` in place.
    pub fn scale(&mut self, s: f64) {
        for v in &mut self.data {
            *v *= s;
        }
    }

    /// Copy scaled so the maximum is 1 (the usual display normalisation).
    ///
    /// Returned unchanged when the maximum is not positive.
    pub fn normalized_by_max(&self) -> Self {
        let m = self.max();
        let mut out = self.clone();
        if m > 0.0 && m.is_finite() {
            out.scale(1.0 / m);
        }
        out
    }

    /// Pearson correlation between two fields on the same grid.
    ///
    /// Invariant to affine rescaling of either field, so it compares reconstructions
    /// that differ by an additive constant or a global scale. Returns 0 when either
    /// field is constant.
    pub fn pearson_correlation(&self, other: &Self) -> Result<f64> {
        ensure_same_grid("correlation operand", self.grid, other.grid)?;
        let ma = self.mean();
        let mb = other.mean();
        let mut sab = 0.0;
        let mut saa = 0.0;
        let mut sbb = 0.0;
        for (&a, &b) in self.data.iter().zip(other.data.iter()) {
            let da = a - ma;
            let db = b - mb;
            sab += da * db;
            saa += da * da;
            sbb += db * db;
        }
        if saa <= 0.0 || sbb <= 0.0 {
            return Ok(0.0);
        }
        Ok(sab / (saa.sqrt() * sbb.sqrt()))
    }

    /// Largest absolute pointwise difference.
    pub fn max_abs_diff(&self, other: &Self) -> Result<f64> {
        ensure_same_grid("comparison operand", self.grid, other.grid)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}

/// Surface gradient `(p, q) = (∂z/∂u, ∂z/∂v)` on a common grid of at least 3×3.
#[derive(Debug, Clone, Copy)]
pub struct GradientField<'a> {
    pub p: &'a ScalarField2D,
    pub q: &'a ScalarField2D,
}

impl<'a> GradientField<'a> {
    pub fn new(p: &'a ScalarField2D, q: &'a ScalarField2D) -> Result<Self> {
        ensure_same_grid("q", p.grid, q.grid)?;
        let grid = p.grid;
        if grid.rows < 3 || grid.cols < 3 {
            return Err(IntegrationError::GridTooSmall {
                rows: grid.rows,
                cols: grid.cols,
            });
        }
        Ok(Self { p, q })
    }

    pub fn grid(&self) -> Grid2D {
        self.p.grid
    }
}
