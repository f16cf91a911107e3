// src/difference.rs
//
// Matrix-free directional finite differences on a masked domain Ω.
//
//   (D_u⁺ z)_i = z[u+1,v] - z[u,v]   if (u+1,v) ∈ Ω, else 0
//   (D_u⁻ z)_i = z[u,v] - z[u-1,v]   if (u-1,v) ∈ Ω, else 0
//   (same along v)
//
// Vectors are indexed by `DomainIndex` slots. Rows whose neighbour leaves Ω are zero,
// which restricts each operator to its sub-domain Ω_u⁺, Ω_u⁻, Ω_v⁺, Ω_v⁻.
//
// Identity used by the normal operators: D⁺ᵀD⁺ = D⁻ᵀD⁻ = L_axis, the graph Laplacian
// of Ω along that axis. Hence
//   L    = ½(D_u⁺ᵀD_u⁺ + D_u⁻ᵀD_u⁻ + D_v⁺ᵀD_v⁺ + D_v⁻ᵀD_v⁻) = L_u + L_v
// and the normal matrices are applied as a gather stencil, never assembled.

use crate::cg::LinearOperator;
use crate::mask::{DomainIndex, NO_NEIGHBOUR};

use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    U,
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Forward,
    Backward,
}

/// One of D_u⁺, D_u⁻, D_v⁺, D_v⁻.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceOperator {
    pub axis: Axis,
    pub sign: Sign,
}

impl DifferenceOperator {
    pub const U_FORWARD: Self = Self::new(Axis::U, Sign::Forward);
    pub const U_BACKWARD: Self = Self::new(Axis::U, Sign::Backward);
    pub const V_FORWARD: Self = Self::new(Axis::V, Sign::Forward);
    pub const V_BACKWARD: Self = Self::new(Axis::V, Sign::Backward);

    pub const ALL: [Self; 4] = [
        Self::U_FORWARD,
        Self::U_BACKWARD,
        Self::V_FORWARD,
        Self::V_BACKWARD,
    ];

    pub const fn new(axis: Axis, sign: Sign) -> Self {
        Self { axis, sign }
    }

    #[inline]
    fn neighbours<'a>(&self, dom: &'a DomainIndex) -> &'a [usize] {
        match (self.axis, self.sign) {
            (Axis::U, Sign::Forward) => &dom.u_next,
            (Axis::U, Sign::Backward) => &dom.u_prev,
            (Axis::V, Sign::Forward) => &dom.v_next,
            (Axis::V, Sign::Backward) => &dom.v_prev,
        }
    }

    /// True when row `slot` of the operator is non-zero.
    #[inline]
    pub fn defined_at(&self, dom: &DomainIndex, slot: usize) -> bool {
        self.neighbours(dom)[slot] != NO_NEIGHBOUR
    }

    /// out = D z
    pub fn apply(&self, dom: &DomainIndex, z: &[f64], out: &mut [f64]) {
        debug_assert_eq!(z.len(), dom.len());
        debug_assert_eq!(out.len(), dom.len());
        let nb = self.neighbours(dom);
        let forward = self.sign == Sign::Forward;
        out.par_iter_mut().enumerate().for_each(|(i, o)| {
            let j = nb[i];
            *o = if j == NO_NEIGHBOUR {
                0.0
            } else if forward {
                z[j] - z[i]
            } else {
                z[i] - z[j]
            };
        });
    }

    /// out += scale · Dᵀ y
    ///
    /// Written as a gather: slot i collects its own row and the row of the opposite
    /// neighbour that points back at it.
    pub fn add_transpose(&self, dom: &DomainIndex, y: &[f64], scale: f64, out: &mut [f64]) {
        debug_assert_eq!(y.len(), dom.len());
        debug_assert_eq!(out.len(), dom.len());
        let nb = self.neighbours(dom);
        let back = self.reversed().neighbours(dom);
        let s = match self.sign {
            Sign::Forward => 1.0,
            Sign::Backward => -1.0,
        };
        out.par_iter_mut().enumerate().for_each(|(i, o)| {
            let mut acc = 0.0;
            if nb[i] != NO_NEIGHBOUR {
                acc -= s * y[i];
            }
            let k = back[i];
            if k != NO_NEIGHBOUR {
                acc += s * y[k];
            }
            *o += scale * acc;
        });
    }

    fn reversed(&self) -> Self {
        let sign = match self.sign {
            Sign::Forward => Sign::Backward,
            Sign::Backward => Sign::Forward,
        };
        Self::new(self.axis, sign)
    }

    /// Dense `|Ω| × |Ω|` matrix (row-major). Only for validating on tiny grids.
    pub fn to_dense(&self, dom: &DomainIndex) -> Vec<Vec<f64>> {
        let n = dom.len();
        let nb = self.neighbours(dom);
        let mut m = vec![vec![0.0; n]; n];
        for (i, row) in m.iter_mut().enumerate() {
            let j = nb[i];
            if j == NO_NEIGHBOUR {
                continue;
            }
            match self.sign {
                Sign::Forward => {
                    row[i] = -1.0;
                    row[j] = 1.0;
                }
                Sign::Backward => {
                    row[i] = 1.0;
                    row[j] = -1.0;
                }
            }
        }
        m
    }
}

/// `A = s·L + diag(w)` on Ω, with L = L_u + L_v.
///
/// With s = 1 this is the quadratic normal matrix L + Λ²; with s = α/2 it is the
/// ADMM z-update matrix (α/8)Σ_{UV}(D_u^Uᵀ D_u^U + D_v^Vᵀ D_v^V) + Λ².
pub struct ScaledLaplacian<'a> {
    pub dom: &'a DomainIndex,
    pub scale: f64,
    /// Per-slot diagonal weights (λ restricted to Ω).
    pub diag: &'a [f64],
}

impl<'a> ScaledLaplacian<'a> {
    pub fn new(dom: &'a DomainIndex, scale: f64, diag: &'a [f64]) -> Self {
        debug_assert_eq!(diag.len(), dom.len());
        Self { dom, scale, diag }
    }
}

impl LinearOperator for ScaledLaplacian<'_> {
    fn dim(&self) -> usize {
        self.dom.len()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let dom = self.dom;
        let s = self.scale;
        let diag = self.diag;
        y.par_iter_mut().enumerate().for_each(|(i, out)| {
            let xi = x[i];
            let mut lap = 0.0;
            for nb in [dom.u_next[i], dom.u_prev[i], dom.v_next[i], dom.v_prev[i]] {
                if nb != NO_NEIGHBOUR {
                    lap += xi - x[nb];
                }
            }
            *out = s * lap + diag[i] * xi;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;
    use crate::mask::DomainMask;

    fn l_shaped_domain() -> DomainIndex {
        let g = Grid2D::new(4, 5);
        let mask = DomainMask::from_fn(g, |u, v| !(u >= 2 && v >= 3));
        DomainIndex::new(&mask)
    }

    fn dense_mul(m: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
        m.iter()
            .map(|row| row.iter().zip(x).map(|(a, b)| a * b).sum())
            .collect()
    }

    fn dense_tmul(m: &[Vec<f64>], y: &[f64]) -> Vec<f64> {
        let n = m[0].len();
        let mut out = vec![0.0; n];
        for (i, row) in m.iter().enumerate() {
            for j in 0..n {
                out[j] += row[j] * y[i];
            }
        }
        out
    }

    fn test_vector(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 37 % 11) as f64) * 0.3 - 1.0).collect()
    }

    #[test]
    fn forward_u_on_a_2x2_grid() {
        let dom = DomainIndex::new(&DomainMask::full(Grid2D::new(2, 2)));
        // Row-major slots: (0,0),(0,1),(1,0),(1,1); u is the row axis.
        let d = DifferenceOperator::U_FORWARD.to_dense(&dom);
        assert_eq!(d[0], vec![-1.0, 0.0, 1.0, 0.0]);
        assert_eq!(d[1], vec![0.0, -1.0, 0.0, 1.0]);
        assert_eq!(d[2], vec![0.0; 4]);
        assert_eq!(d[3], vec![0.0; 4]);
    }

    #[test]
    fn matrix_free_apply_and_transpose_match_dense() {
        let dom = l_shaped_domain();
        let n = dom.len();
        let x = test_vector(n);

        for op in DifferenceOperator::ALL {
            let dense = op.to_dense(&dom);

            let mut y = vec![0.0; n];
            op.apply(&dom, &x, &mut y);
            let y_ref = dense_mul(&dense, &x);
            for (a, b) in y.iter().zip(&y_ref) {
                assert!((a - b).abs() < 1e-14, "{:?}", op);
            }

            let mut t = vec![0.5; n];
            op.add_transpose(&dom, &x, 2.0, &mut t);
            let t_ref = dense_tmul(&dense, &x);
            for (a, b) in t.iter().zip(&t_ref) {
                assert!((a - (0.5 + 2.0 * b)).abs() < 1e-14, "{:?}", op);
            }
        }
    }

    #[test]
    fn stencil_laplacian_matches_assembled_normal_matrix() {
        let dom = l_shaped_domain();
        let n = dom.len();
        let x = test_vector(n);
        let diag: Vec<f64> = (0..n).map(|i| 0.01 * i as f64).collect();

        // ½ Σ DᵀD x, assembled from the dense operators.
        let mut reference = vec![0.0; n];
        for op in DifferenceOperator::ALL {
            let d = op.to_dense(&dom);
            let dtdx = dense_tmul(&d, &dense_mul(&d, &x));
            for (r, v) in reference.iter_mut().zip(dtdx) {
                *r += 0.5 * v;
            }
        }

        let a = ScaledLaplacian::new(&dom, 3.0, &diag);
        let mut y = vec![0.0; n];
        a.apply(&x, &mut y);
        for i in 0..n {
            let expected = 3.0 * reference[i] + diag[i] * x[i];
            assert!((y[i] - expected).abs() < 1e-12, "slot {}", i);
        }
    }
}
