// src/path.rs
//
// Direct path-integration methods.
//
// Both methods anchor z(0,0) = 0 and use forward-difference accumulation
// (z[u,v] - z[u-1,v] = p[u-1,v]), so they are exact on integrable forward-difference
// data and leave streak artefacts along the integration paths otherwise.

use crate::error::Result;
use crate::field::{GradientField, ScalarField2D};
use crate::Integrator;

/// Average of two L-shaped line integrals:
/// down the first column then along the row, and along the first row then down the
/// column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Path;

impl Path {
    pub fn new() -> Self {
        Self
    }
}

impl Integrator for Path {
    fn name(&self) -> &'static str {
        "path"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        let g = GradientField::new(p, q)?;
        Ok(two_path_average(&g))
    }
}

fn two_path_average(g: &GradientField<'_>) -> ScalarField2D {
    let grid = g.grid();
    let (rows, cols) = (grid.rows, grid.cols);

    // col_p[u,v] = Σ_{j<u} p[j,v],  row_q[u,v] = Σ_{i<v} q[u,i]
    let mut col_p = ScalarField2D::zeros(grid);
    let mut row_q = ScalarField2D::zeros(grid);
    for u in 1..rows {
        for v in 0..cols {
            let val = col_p.get(u - 1, v) + g.p.get(u - 1, v);
            col_p.set(u, v, val);
        }
    }
    for u in 0..rows {
        for v in 1..cols {
            let val = row_q.get(u, v - 1) + g.q.get(u, v - 1);
            row_q.set(u, v, val);
        }
    }

    ScalarField2D::from_fn(grid, |u, v| {
        let first_column_then_row = col_p.get(u, 0) + row_q.get(u, v);
        let first_row_then_column = row_q.get(0, v) + col_p.get(u, v);
        0.5 * (first_column_then_row + first_row_then_column)
    })
}

/// Pointwise two-path average:
/// `z[u,v] = ½(z[u-1,v] + p[u-1,v] + z[u,v-1] + q[u,v-1])`.
///
/// Evaluated as a single forward sweep from the top-left corner; every pixel reads
/// already-final values of its upper and left neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitPath;

impl SplitPath {
    pub fn new() -> Self {
        Self
    }
}

impl Integrator for SplitPath {
    fn name(&self) -> &'static str {
        "split_path"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        let g = GradientField::new(p, q)?;
        Ok(split_path_sweep(&g))
    }
}

fn split_path_sweep(g: &GradientField<'_>) -> ScalarField2D {
    let grid = g.grid();
    let mut z = ScalarField2D::zeros(grid);

    // Row-major order respects the (u-1,v), (u,v-1) dependency wavefront.
    for u in 0..grid.rows {
        for v in 0..grid.cols {
            let val = match (u, v) {
                (0, 0) => 0.0,
                (_, 0) => z.get(u - 1, 0) + g.p.get(u - 1, 0),
                (0, _) => z.get(0, v - 1) + g.q.get(0, v - 1),
                _ => {
                    0.5 * (z.get(u - 1, v)
                        + g.p.get(u - 1, v)
                        + z.get(u, v - 1)
                        + g.q.get(u, v - 1))
                }
            };
            z.set(u, v, val);
        }
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;

    fn rough_field(grid: Grid2D) -> (ScalarField2D, ScalarField2D) {
        let p = ScalarField2D::from_fn(grid, |u, v| ((u * 7 + v * 3) % 5) as f64 - 2.0);
        let q = ScalarField2D::from_fn(grid, |u, v| ((u * 2 + v * 5) % 4) as f64 - 1.5);
        (p, q)
    }

    #[test]
    fn path_matches_hand_computed_values() {
        let grid = Grid2D::new(3, 3);
        let p = ScalarField2D::from_fn(grid, |u, v| (u + v) as f64);
        let q = ScalarField2D::from_fn(grid, |u, v| (u * v) as f64);
        let z = Path.integrate(&p, &q).unwrap();

        assert_eq!(z.get(0, 0), 0.0);
        // (1,1): col path p[0,0] + q[1,0] = 0 + 0; row path q[0,0] + p[0,1] = 0 + 1.
        assert!((z.get(1, 1) - 0.5).abs() < 1e-15);
        // (2,2): col path p[0,0]+p[1,0] + q[2,0]+q[2,1] = 1 + 2 = 3
        //        row path q[0,0]+q[0,1] + p[0,2]+p[1,2] = 0 + 5 = 5
        assert!((z.get(2, 2) - 4.0).abs() < 1e-15);
    }

    #[test]
    fn split_path_output_satisfies_recurrence_everywhere() {
        let grid = Grid2D::new(6, 7);
        let (p, q) = rough_field(grid);
        let z = SplitPath.integrate(&p, &q).unwrap();

        assert_eq!(z.get(0, 0), 0.0);
        for u in 0..grid.rows {
            for v in 0..grid.cols {
                let expected = match (u, v) {
                    (0, 0) => 0.0,
                    (_, 0) => z.get(u - 1, 0) + p.get(u - 1, 0),
                    (0, _) => z.get(0, v - 1) + q.get(0, v - 1),
                    _ => {
                        0.5 * (z.get(u - 1, v) + p.get(u - 1, v) + z.get(u, v - 1) + q.get(u, v - 1))
                    }
                };
                assert!((z.get(u, v) - expected).abs() < 1e-12, "({}, {})", u, v);
            }
        }
    }

    #[test]
    fn split_path_differs_from_out_of_order_evaluation() {
        let grid = Grid2D::new(6, 7);
        let (p, q) = rough_field(grid);
        let in_order = SplitPath.integrate(&p, &q).unwrap();

        // Same recurrence swept bottom-right to top-left: predecessors are still zero
        // when read.
        let mut reversed = ScalarField2D::zeros(grid);
        for u in (0..grid.rows).rev() {
            for v in (0..grid.cols).rev() {
                let val = match (u, v) {
                    (0, 0) => 0.0,
                    (_, 0) => reversed.get(u - 1, 0) + p.get(u - 1, 0),
                    (0, _) => reversed.get(0, v - 1) + q.get(0, v - 1),
                    _ => {
                        0.5 * (reversed.get(u - 1, v)
                            + p.get(u - 1, v)
                            + reversed.get(u, v - 1)
                            + q.get(u, v - 1))
                    }
                };
                reversed.set(u, v, val);
            }
        }

        let diff = in_order.max_abs_diff(&reversed).unwrap();
        assert!(diff > 1e-3, "out-of-order sweep should disagree (diff={})", diff);
    }

    #[test]
    fn both_paths_agree_on_integrable_field() {
        // z = u² + u·v sampled with forward differences.
        let grid = Grid2D::new(5, 6);
        let zt = |u: usize, v: usize| (u * u + u * v) as f64;
        let p = ScalarField2D::from_fn(grid, |u, v| zt(u + 1, v) - zt(u, v));
        let q = ScalarField2D::from_fn(grid, |u, v| zt(u, v + 1) - zt(u, v));
        let truth = ScalarField2D::from_fn(grid, zt);

        let a = Path.integrate(&p, &q).unwrap();
        let b = SplitPath.integrate(&p, &q).unwrap();
        assert!(a.max_abs_diff(&truth).unwrap() < 1e-12);
        assert!(b.max_abs_diff(&truth).unwrap() < 1e-12);
    }
}
