// tests/common/mod.rs
//
// Synthetic surfaces and their discrete gradients, shared by the integration tests.

#![allow(dead_code)]

use normal_integration::field::ScalarField2D;
use normal_integration::grid::Grid2D;

/// z = sqrt(r² - d²) inside a centred disc of radius `radius`, 0 outside.
pub fn hemisphere(grid: Grid2D, radius: f64) -> ScalarField2D {
    let cu = (grid.rows / 2) as f64;
    let cv = (grid.cols / 2) as f64;
    ScalarField2D::from_fn(grid, |u, v| {
        let d2 = (u as f64 - cu).powi(2) + (v as f64 - cv).powi(2);
        (radius * radius - d2).max(0.0).sqrt()
    })
}

/// z = a·u + b·v + c
pub fn plane(grid: Grid2D, a: f64, b: f64, c: f64) -> ScalarField2D {
    ScalarField2D::from_fn(grid, |u, v| a * u as f64 + b * v as f64 + c)
}

/// Forward differences (p, q) of z, zero on the last row / column.
pub fn forward_gradient(z: &ScalarField2D) -> (ScalarField2D, ScalarField2D) {
    let (rows, cols) = (z.rows(), z.cols());
    let p = ScalarField2D::from_fn(z.grid, |u, v| {
        if u + 1 < rows {
            z.get(u + 1, v) - z.get(u, v)
        } else {
            0.0
        }
    });
    let q = ScalarField2D::from_fn(z.grid, |u, v| {
        if v + 1 < cols {
            z.get(u, v + 1) - z.get(u, v)
        } else {
            0.0
        }
    });
    (p, q)
}

/// Largest pointwise difference after removing each field's mean.
pub fn max_diff_up_to_constant(a: &ScalarField2D, b: &ScalarField2D) -> f64 {
    let (ma, mb) = (a.mean(), b.mean());
    a.data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| ((x - ma) - (y - mb)).abs())
        .fold(0.0, f64::max)
}

/// Mean over the outer one-pixel frame.
pub fn frame_mean(z: &ScalarField2D) -> f64 {
    let (rows, cols) = (z.rows(), z.cols());
    let mut sum = 0.0;
    let mut count = 0usize;
    for u in 0..rows {
        for v in 0..cols {
            if u == 0 || v == 0 || u + 1 == rows || v + 1 == cols {
                sum += z.get(u, v);
                count += 1;
            }
        }
    }
    sum / count as f64
}

/// Fix the free constant by setting the frame mean to 0, then divide by the maximum.
///
/// For surfaces that are flat along the border this puts the background near 0 and
/// the peak at 1; a reconstruction with the wrong shape lands well outside that.
pub fn normalise_for_display(z: &ScalarField2D) -> ScalarField2D {
    let base = frame_mean(z);
    let anchored = ScalarField2D::from_fn(z.grid, |u, v| z.get(u, v) - base);
    anchored.normalized_by_max()
}
