// src/fourier.rs
//
// Frankot–Chellappa integration: solve ∇²z = ∂p/∂u + ∂q/∂v in the Fourier domain.
//
//   Ẑ(ωu, ωv) = (ωu P̂ + ωv Q̂) / (i (ωu² + ωv²)),   Ẑ(0, 0) = 0
//
// Notes:
// - Even edges are zero-padded by one row/column so every axis has a well-defined
//   centre frequency (no unpaired Nyquist bin). The padding is cropped on return.
// - The periodic solve cannot represent a plane; the mean slope (DC of P̂, Q̂) is
//   added back afterwards as mean(p)·u + mean(q)·v.

use crate::error::Result;
use crate::field::{GradientField, ScalarField2D};
use crate::grid::Grid2D;
use crate::Integrator;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use std::f64::consts::PI;
use std::sync::Arc;

/// Frankot–Chellappa integrator. Takes no parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frankot;

impl Frankot {
    pub fn new() -> Self {
        Self
    }
}

impl Integrator for Frankot {
    fn name(&self) -> &'static str {
        "frankot"
    }

    fn integrate(&self, p: &ScalarField2D, q: &ScalarField2D) -> Result<ScalarField2D> {
        let g = GradientField::new(p, q)?;
        Ok(frankot_chellappa(&g))
    }
}

#[inline]
fn odd_len(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Signed angular frequency of FFT bin `k` on an axis of length `n` (n odd).
#[inline]
fn angular_frequency(k: usize, n: usize) -> f64 {
    let f = if k <= n / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    };
    2.0 * PI * f / n as f64
}

fn frankot_chellappa(g: &GradientField<'_>) -> ScalarField2D {
    let grid = g.grid();
    let pr = odd_len(grid.rows);
    let pc = odd_len(grid.cols);
    let n = pr * pc;

    // Zero-padded complex copies of p and q.
    let mut p_hat = vec![Complex::new(0.0, 0.0); n];
    let mut q_hat = vec![Complex::new(0.0, 0.0); n];
    for u in 0..grid.rows {
        for v in 0..grid.cols {
            p_hat[u * pc + v].re = g.p.get(u, v);
            q_hat[u * pc + v].re = g.q.get(u, v);
        }
    }
    let mean_p = p_hat.iter().map(|c| c.re).sum::<f64>() / n as f64;
    let mean_q = q_hat.iter().map(|c| c.re).sum::<f64>() / n as f64;

    let mut planner = FftPlanner::<f64>::new();
    let fwd_rows = planner.plan_fft_forward(pc);
    let fwd_cols = planner.plan_fft_forward(pr);
    let inv_rows = planner.plan_fft_inverse(pc);
    let inv_cols = planner.plan_fft_inverse(pr);

    fft2_in_place(&mut p_hat, pc, pr, &fwd_rows, &fwd_cols);
    fft2_in_place(&mut q_hat, pc, pr, &fwd_rows, &fwd_cols);

    // Reuse p_hat as the Ẑ buffer.
    p_hat
        .par_chunks_mut(pc)
        .zip(q_hat.par_chunks(pc))
        .enumerate()
        .for_each(|(ku, (z_row, q_row))| {
            let wu = angular_frequency(ku, pr);
            for kv in 0..pc {
                let wv = angular_frequency(kv, pc);
                let denom = wu * wu + wv * wv;
                if denom == 0.0 {
                    z_row[kv] = Complex::new(0.0, 0.0);
                    continue;
                }
                let num = z_row[kv] * wu + q_row[kv] * wv;
                // num / (i·denom) = -i·num / denom
                z_row[kv] = Complex::new(num.im / denom, -num.re / denom);
            }
        });

    fft2_in_place(&mut p_hat, pc, pr, &inv_rows, &inv_cols);

    // rustfft is unnormalised -> scale
    let scale = 1.0 / n as f64;
    let mut z = ScalarField2D::zeros(grid);
    for u in 0..grid.rows {
        for v in 0..grid.cols {
            let val = p_hat[u * pc + v].re * scale + mean_p * u as f64 + mean_q * v as f64;
            z.set(u, v, val);
        }
    }

    log::debug!(
        "[frankot] {} grid (padded {}), mean slope ({:.3e}, {:.3e})",
        grid,
        Grid2D::new(pr, pc),
        mean_p,
        mean_q
    );
    z
}

/// 2D FFT in place on a row-major `ny × nx` buffer: parallel rows, then gathered columns.
fn fft2_in_place(
    data: &mut [Complex<f64>],
    nx: usize,
    ny: usize,
    fft_x: &Arc<dyn Fft<f64>>,
    fft_y: &Arc<dyn Fft<f64>>,
) {
    data.par_chunks_mut(nx).for_each(|row| {
        fft_x.process(row);
    });

    let mut col_buf = vec![Complex::new(0.0, 0.0); ny];
    for x in 0..nx {
        for y in 0..ny {
            col_buf[y] = data[y * nx + x];
        }
        fft_y.process(&mut col_buf);
        for y in 0..ny {
            data[y * nx + x] = col_buf[y];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_field(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> ScalarField2D {
        ScalarField2D::from_fn(Grid2D::new(rows, cols), f)
    }

    #[test]
    fn recovers_single_fourier_modes_exactly() {
        let (nr, nc) = (9usize, 11usize);
        let ku = 2.0 * PI / nr as f64;
        let kv = 4.0 * PI / nc as f64;
        let z = grid_field(nr, nc, |u, v| (ku * u as f64).sin() + (kv * v as f64).cos());
        let p = grid_field(nr, nc, |u, _| ku * (ku * u as f64).cos());
        let q = grid_field(nr, nc, |_, v| -kv * (kv * v as f64).sin());

        let out = Frankot.integrate(&p, &q).unwrap();
        let err = out.max_abs_diff(&z).unwrap();
        assert!(err < 1e-10, "max error {}", err);
    }

    #[test]
    fn plane_is_restored_from_mean_slope() {
        let p = grid_field(7, 9, |_, _| 0.3);
        let q = grid_field(7, 9, |_, _| -1.2);
        let out = Frankot.integrate(&p, &q).unwrap();
        for u in 0..7 {
            for v in 0..9 {
                let expected = 0.3 * u as f64 - 1.2 * v as f64;
                assert!((out.get(u, v) - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn even_input_matches_explicitly_padded_odd_input() {
        let p4 = grid_field(4, 4, |u, v| ((u * 3 + v) % 5) as f64 * 0.1 - 0.2);
        let q4 = grid_field(4, 4, |u, v| ((u + 2 * v) % 3) as f64 * 0.2 - 0.1);
        let pad = |f: &ScalarField2D| {
            grid_field(5, 5, |u, v| if u < 4 && v < 4 { f.get(u, v) } else { 0.0 })
        };

        let z4 = Frankot.integrate(&p4, &q4).unwrap();
        let z5 = Frankot.integrate(&pad(&p4), &pad(&q4)).unwrap();

        assert_eq!(z4.grid, Grid2D::new(4, 4));
        for u in 0..4 {
            for v in 0..4 {
                assert!((z4.get(u, v) - z5.get(u, v)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn frequency_grid_is_centred() {
        assert_eq!(angular_frequency(0, 5), 0.0);
        assert!((angular_frequency(2, 5) - 4.0 * PI / 5.0).abs() < 1e-15);
        assert!((angular_frequency(3, 5) + 4.0 * PI / 5.0).abs() < 1e-15);
    }
}
