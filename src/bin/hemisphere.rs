// src/bin/hemisphere.rs
//
// Hemisphere reconstruction demo:
//   Grid: 151x151, radius 38, centred
//   z = sqrt(r² - d²) inside the disc, 0 outside
//   p, q = forward differences of z (0 on the last row / column)
//
// Run:
//   cargo run --release --bin hemisphere
//   NI_METHOD=total_variation NI_ADMM_ITER=20 RUST_LOG=debug cargo run --release --bin hemisphere
//
// Output:
//   out/hemisphere/<method>.csv   (u, v, z_true, z, z_normalised)
//   out/hemisphere/config.json

use std::error::Error;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use normal_integration::config::{IntegratorConfig, RunConfig, RunInfo};
use normal_integration::field::ScalarField2D;
use normal_integration::grid::Grid2D;

const N: usize = 151;
const RADIUS: f64 = 38.0;

fn hemisphere(grid: Grid2D, radius: f64) -> ScalarField2D {
    let cu = (grid.rows / 2) as f64;
    let cv = (grid.cols / 2) as f64;
    ScalarField2D::from_fn(grid, |u, v| {
        let d2 = (u as f64 - cu).powi(2) + (v as f64 - cv).powi(2);
        (radius * radius - d2).max(0.0).sqrt()
    })
}

fn forward_gradient(z: &ScalarField2D) -> (ScalarField2D, ScalarField2D) {
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

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let grid = Grid2D::new(N, N);
    let truth = hemisphere(grid, RADIUS);
    let (p, q) = forward_gradient(&truth);

    let cfg = IntegratorConfig::from_env()?;
    let integrator = cfg.build(grid, None, None)?;

    let t0 = Instant::now();
    let z = integrator.integrate(&p, &q)?;
    let elapsed = t0.elapsed();

    let z_norm = z.normalized_by_max();
    let corr = z.pearson_correlation(&truth)?;

    let out_dir = Path::new("out").join("hemisphere");
    create_dir_all(&out_dir)?;

    let file_name = format!("{}.csv", integrator.name());
    let mut w = BufWriter::new(File::create(out_dir.join(&file_name))?);
    writeln!(w, "u,v,z_true,z,z_normalised")?;
    for u in 0..grid.rows {
        for v in 0..grid.cols {
            writeln!(
                w,
                "{},{},{:.16e},{:.16e},{:.16e}",
                u,
                v,
                truth.get(u, v),
                z.get(u, v),
                z_norm.get(u, v)
            )?;
        }
    }
    w.flush()?;

    let run = RunConfig {
        grid,
        integrator: cfg,
        run: RunInfo {
            binary: "hemisphere".to_string(),
            run_id: integrator.name().to_string(),
            git_commit: None,
            timestamp_utc: None,
        },
    };
    run.write_to_dir(&out_dir)?;

    println!(
        "[hemisphere] method={} grid={} time={:.3}s corr={:.4} z range=[{:.4}, {:.4}]",
        integrator.name(),
        grid,
        elapsed.as_secs_f64(),
        corr,
        z.min(),
        z.max()
    );
    println!("Wrote out/hemisphere/{} and out/hemisphere/config.json", file_name);
    Ok(())
}
