// src/mask.rs
//
// Domain masks for the variational integrators.
//
// Notes:
// - A mask is one boolean per pixel (true = inside the integration domain Ω).
// - Inactive pixels are held at the prior z0 by the solvers.
// - `DomainIndex` is the per-call arena mapping Ω to a dense solve vector and back.

use crate::error::{ensure_positive, ensure_same_grid, Result};
use crate::field::{GradientField, ScalarField2D};
use crate::grid::Grid2D;

/// Boolean integration domain on a grid (length = rows*cols).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMask {
    pub grid: Grid2D,
    pub active: Vec<bool>,
}

impl DomainMask {
    /// Full rectangular domain.
    pub fn full(grid: Grid2D) -> Self {
        Self {
            grid,
            active: vec![true; grid.n_cells()],
        }
    }

    /// Build a mask from a predicate f(u, v) -> bool.
    pub fn from_fn<F>(grid: Grid2D, f: F) -> Self
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut active = vec![false; grid.n_cells()];
        for u in 0..grid.rows {
            for v in 0..grid.cols {
                active[grid.idx(u, v)] = f(u, v);
            }
        }
        Self { grid, active }
    }

    pub fn from_bools(grid: Grid2D, active: Vec<bool>) -> Result<Self> {
        if active.len() != grid.n_cells() {
            return Err(crate::error::IntegrationError::LengthMismatch {
                what: "mask",
                expected: grid.n_cells(),
                found: active.len(),
            });
        }
        Ok(Self { grid, active })
    }

    /// 0/1 array convention: entries equal to 1 are active, everything else is not.
    pub fn from_field(field: &ScalarField2D) -> Self {
        Self {
            grid: field.grid,
            active: field.data.iter().map(|&x| x == 1.0).collect(),
        }
    }

    /// Mask out pixels where the gradient field is locally non-integrable.
    ///
    /// The discrete curl `|∂p/∂v − ∂q/∂u|` is taken with forward differences (zero on
    /// the last row/column). Pixels whose curl exceeds `threshold` are inactive.
    pub fn from_integrability(
        p: &ScalarField2D,
        q: &ScalarField2D,
        threshold: f64,
    ) -> Result<Self> {
        let g = GradientField::new(p, q)?;
        ensure_positive("threshold", threshold)?;
        let curl = integrability_residual(&g);
        Ok(Self {
            grid: curl.grid,
            active: curl.data.iter().map(|&c| c <= threshold).collect(),
        })
    }

    #[inline]
    pub fn is_active(&self, u: usize, v: usize) -> bool {
        self.active[self.grid.idx(u, v)]
    }

    pub fn count_active(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn invert(&self) -> Self {
        Self {
            grid: self.grid,
            active: self.active.iter().map(|&a| !a).collect(),
        }
    }

    /// Intersection (A ∩ B).
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        ensure_same_grid("mask", self.grid, other.grid)?;
        Ok(Self {
            grid: self.grid,
            active: self
                .active
                .iter()
                .zip(other.active.iter())
                .map(|(&a, &b)| a && b)
                .collect(),
        })
    }

    /// Mask as a 0/1 field.
    pub fn to_field(&self) -> ScalarField2D {
        ScalarField2D {
            grid: self.grid,
            data: self
                .active
                .iter()
                .map(|&a| if a { 1.0 } else { 0.0 })
                .collect(),
        }
    }
}

/// Pointwise `|∂p/∂v − ∂q/∂u|` with forward differences.
pub fn integrability_residual(g: &GradientField<'_>) -> ScalarField2D {
    let grid = g.grid();
    let (p, q) = (g.p, g.q);
    ScalarField2D::from_fn(grid, |u, v| {
        let dp_dv = if v + 1 < grid.cols {
            p.get(u, v + 1) - p.get(u, v)
        } else {
            0.0
        };
        let dq_du = if u + 1 < grid.rows {
            q.get(u + 1, v) - q.get(u, v)
        } else {
            0.0
        };
        (dp_dv - dq_du).abs()
    })
}

/// Sentinel for "no active neighbour in this direction".
pub const NO_NEIGHBOUR: usize = usize::MAX;

/// Explicit index table for the active domain Ω.
///
/// Slots are numbered in row-major order of their pixels. Neighbour tables hold the
/// slot of the adjacent active pixel along each axis, or [`NO_NEIGHBOUR`].
#[derive(Debug, Clone)]
pub struct DomainIndex {
    pub grid: Grid2D,
    /// slot -> flat grid index
    pub pixels: Vec<usize>,
    /// flat grid index -> slot (NO_NEIGHBOUR when inactive)
    pub slots: Vec<usize>,
    pub u_next: Vec<usize>,
    pub u_prev: Vec<usize>,
    pub v_next: Vec<usize>,
    pub v_prev: Vec<usize>,
}

impl DomainIndex {
    pub fn new(mask: &DomainMask) -> Self {
        let grid = mask.grid;
        let mut pixels = Vec::with_capacity(mask.count_active());
        let mut slots = vec![NO_NEIGHBOUR; grid.n_cells()];
        for (id, &a) in mask.active.iter().enumerate() {
            if a {
                slots[id] = pixels.len();
                pixels.push(id);
            }
        }

        let n = pixels.len();
        let mut u_next = vec![NO_NEIGHBOUR; n];
        let mut u_prev = vec![NO_NEIGHBOUR; n];
        let mut v_next = vec![NO_NEIGHBOUR; n];
        let mut v_prev = vec![NO_NEIGHBOUR; n];

        for (s, &id) in pixels.iter().enumerate() {
            let (u, v) = grid.coords(id);
            if u + 1 < grid.rows {
                u_next[s] = slots[grid.idx(u + 1, v)];
            }
            if u > 0 {
                u_prev[s] = slots[grid.idx(u - 1, v)];
            }
            if v + 1 < grid.cols {
                v_next[s] = slots[grid.idx(u, v + 1)];
            }
            if v > 0 {
                v_prev[s] = slots[grid.idx(u, v - 1)];
            }
        }

        Self {
            grid,
            pixels,
            slots,
            u_next,
            u_prev,
            v_next,
            v_prev,
        }
    }

    /// Number of unknowns.
    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Gather a grid field into a solve vector.
    pub fn gather(&self, field: &ScalarField2D) -> Vec<f64> {
        self.pixels.iter().map(|&id| field.data[id]).collect()
    }

    /// Write a solve vector back over `out` (inactive pixels untouched).
    pub fn scatter(&self, x: &[f64], out: &mut ScalarField2D) {
        debug_assert_eq!(x.len(), self.len());
        for (&id, &val) in self.pixels.iter().zip(x.iter()) {
            out.data[id] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_table_round_trips_active_pixels() {
        let g = Grid2D::new(3, 4);
        // Knock out the centre-left pixel (1,1).
        let mask = DomainMask::from_fn(g, |u, v| !(u == 1 && v == 1));
        let idx = DomainIndex::new(&mask);
        assert_eq!(idx.len(), 11);
        assert_eq!(idx.slots[g.idx(1, 1)], NO_NEIGHBOUR);

        let s00 = idx.slots[g.idx(0, 0)];
        let s01 = idx.slots[g.idx(0, 1)];
        let s10 = idx.slots[g.idx(1, 0)];
        assert_eq!(idx.v_next[s00], s01);
        assert_eq!(idx.u_next[s00], s10);
        assert_eq!(idx.u_prev[s00], NO_NEIGHBOUR);
        // (0,1) sits above the hole.
        assert_eq!(idx.u_next[s01], NO_NEIGHBOUR);

        let f = ScalarField2D::from_fn(g, |u, v| (u * 10 + v) as f64);
        let x = idx.gather(&f);
        let mut back = ScalarField2D::filled(g, -1.0);
        idx.scatter(&x, &mut back);
        assert_eq!(back.get(2, 3), 23.0);
        assert_eq!(back.get(1, 1), -1.0);
    }

    #[test]
    fn integrability_mask_flags_curl() {
        let g = Grid2D::new(5, 5);
        // Gradient of z = u*v is integrable: p = v, q = u (forward-difference exact).
        let p = ScalarField2D::from_fn(g, |_, v| v as f64);
        let q = ScalarField2D::from_fn(g, |u, _| u as f64);
        let m = DomainMask::from_integrability(&p, &q, 0.5).unwrap();
        // Only the last row/column carry a one-sided residual.
        assert!(m.is_active(1, 1));
        assert!(m.is_active(2, 3));

        // A rotational field is nowhere integrable.
        let p = ScalarField2D::from_fn(g, |_, v| -(v as f64));
        let m = DomainMask::from_integrability(&p, &q, 0.5).unwrap();
        assert!(!m.is_active(1, 1));

        assert!(DomainMask::from_integrability(&p, &q, 0.0).is_err());
    }

    #[test]
    fn field_conversion_uses_one_as_active() {
        let g = Grid2D::new(3, 3);
        let f = ScalarField2D::from_fn(g, |u, _| if u == 0 { 1.0 } else { 0.5 });
        let m = DomainMask::from_field(&f);
        assert_eq!(m.count_active(), 3);
        assert_eq!(m.invert().count_active(), 6);
        assert_eq!(m.to_field().get(0, 2), 1.0);
        let both = m.intersection(&DomainMask::full(g)).unwrap();
        assert_eq!(both, m);
    }
}
