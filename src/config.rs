// src/config.rs
//
// Serialisable method selection plus the provenance record written next to run outputs.
//
// Environment overrides (all optional):
//   NI_METHOD       frankot | path | split_path | horn | durou | quadratic | total_variation
//   NI_MAX_ITER     relaxation sweeps (horn, durou)
//   NI_EPSILON      pixel spacing (horn, durou)
//   NI_TOL          early-exit tolerance (horn, durou, total_variation)
//   NI_LAMBDA       uniform regularisation weight (quadratic, total_variation)
//   NI_ALPHA        ADMM step size (total_variation)
//   NI_ADMM_ITER    ADMM outer iterations (total_variation)
//   NI_CG_TOL       CG relative tolerance (quadratic, total_variation)
//   NI_CG_MAX_ITER  CG iteration cap (quadratic, total_variation)
//
// Values are validated when the integrator is built, not when they are read.

use crate::cg::CgSettings;
use crate::error::{ensure_same_grid, IntegrationError, Result};
use crate::field::ScalarField2D;
use crate::fourier::Frankot;
use crate::grid::Grid2D;
use crate::mask::DomainMask;
use crate::path::{Path as PathIntegrator, SplitPath};
use crate::relaxation::{Durou, Horn, RelaxSettings};
use crate::variational::{AdmmSettings, Quadratic, TotalVariation, DEFAULT_LAMBDA};
use crate::Integrator;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IntegratorConfig {
    Frankot,
    Path,
    SplitPath,
    Horn(RelaxSettings),
    Durou(RelaxSettings),
    Quadratic {
        lambda: f64,
        cg: CgSettings,
    },
    TotalVariation {
        lambda: f64,
        alpha: f64,
        admm: AdmmSettings,
        cg: CgSettings,
    },
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self::Frankot
    }
}

impl IntegratorConfig {
    /// Defaults for a method identifier (as returned by `Integrator::name`).
    pub fn for_method(method: &str) -> Result<Self> {
        let cfg = match method.trim() {
            "frankot" => Self::Frankot,
            "path" => Self::Path,
            "split_path" => Self::SplitPath,
            "horn" => Self::Horn(RelaxSettings::default()),
            "durou" => Self::Durou(RelaxSettings::default()),
            "quadratic" => Self::Quadratic {
                lambda: DEFAULT_LAMBDA,
                cg: CgSettings::default(),
            },
            "total_variation" => Self::TotalVariation {
                lambda: DEFAULT_LAMBDA,
                alpha: 1.0,
                admm: AdmmSettings::default(),
                cg: CgSettings::default(),
            },
            other => {
                return Err(IntegrationError::invalid(
                    "method",
                    format!("unknown integration method '{other}'"),
                ))
            }
        };
        Ok(cfg)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Frankot => "frankot",
            Self::Path => "path",
            Self::SplitPath => "split_path",
            Self::Horn(_) => "horn",
            Self::Durou(_) => "durou",
            Self::Quadratic { .. } => "quadratic",
            Self::TotalVariation { .. } => "total_variation",
        }
    }

    /// Read `NI_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `get`.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_usize = |name: &str| get(name).and_then(|s| s.trim().parse::<usize>().ok());
        let get_f64 = |name: &str| get(name).and_then(|s| s.trim().parse::<f64>().ok());

        let mut cfg = match get("NI_METHOD") {
            Some(m) => Self::for_method(&m)?,
            None => Self::default(),
        };

        let apply_cg = |cg: &mut CgSettings| {
            if let Some(v) = get_f64("NI_CG_TOL") {
                cg.rel_tol = v;
            }
            if let Some(v) = get_usize("NI_CG_MAX_ITER") {
                cg.max_iter = v;
            }
        };

        match &mut cfg {
            Self::Frankot | Self::Path | Self::SplitPath => {}
            Self::Horn(s) | Self::Durou(s) => {
                if let Some(v) = get_usize("NI_MAX_ITER") {
                    s.max_iter = v;
                }
                if let Some(v) = get_f64("NI_EPSILON") {
                    s.epsilon = v;
                }
                if let Some(v) = get_f64("NI_TOL") {
                    s.tol = Some(v);
                }
            }
            Self::Quadratic { lambda, cg } => {
                if let Some(v) = get_f64("NI_LAMBDA") {
                    *lambda = v;
                }
                apply_cg(cg);
            }
            Self::TotalVariation {
                lambda,
                alpha,
                admm,
                cg,
            } => {
                if let Some(v) = get_f64("NI_LAMBDA") {
                    *lambda = v;
                }
                if let Some(v) = get_f64("NI_ALPHA") {
                    *alpha = v;
                }
                if let Some(v) = get_usize("NI_ADMM_ITER") {
                    admm.max_iter = v;
                }
                if let Some(v) = get_f64("NI_TOL") {
                    admm.tol = Some(v);
                }
                apply_cg(cg);
            }
        }
        Ok(cfg)
    }

    /// Build the configured integrator for gradients on `grid`.
    ///
    /// `z0` (default: zeros) and `mask` (default: full) are only used by the
    /// variational methods.
    pub fn build(
        &self,
        grid: Grid2D,
        z0: Option<ScalarField2D>,
        mask: Option<DomainMask>,
    ) -> Result<Box<dyn Integrator>> {
        let prior = |z0: Option<ScalarField2D>| -> Result<ScalarField2D> {
            match z0 {
                Some(z) => {
                    ensure_same_grid("z0", grid, z.grid)?;
                    Ok(z)
                }
                None => Ok(ScalarField2D::zeros(grid)),
            }
        };
        let mask = mask.unwrap_or_else(|| DomainMask::full(grid));

        let integrator: Box<dyn Integrator> = match self {
            Self::Frankot => Box::new(Frankot::new()),
            Self::Path => Box::new(PathIntegrator::new()),
            Self::SplitPath => Box::new(SplitPath::new()),
            Self::Horn(s) => Box::new(Horn::from_settings(*s)?),
            Self::Durou(s) => Box::new(Durou::from_settings(*s)?),
            Self::Quadratic { lambda, cg } => Box::new(
                Quadratic::new(prior(z0)?)
                    .with_uniform_lambda(*lambda)?
                    .with_mask(mask)?
                    .with_cg(*cg)?,
            ),
            Self::TotalVariation {
                lambda,
                alpha,
                admm,
                cg,
            } => Box::new(
                TotalVariation::new(prior(z0)?)
                    .with_uniform_lambda(*lambda)?
                    .with_mask(mask)?
                    .with_alpha(*alpha)?
                    .with_admm(*admm)?
                    .with_cg(*cg)?,
            ),
        };
        Ok(integrator)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub grid: Grid2D,
    pub integrator: IntegratorConfig,
    pub run: RunInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,

    // Optional provenance (can be filled later)
    pub git_commit: Option<String>,
    pub timestamp_utc: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
