// src/error.rs
//
// Errors raised for malformed inputs or configuration. Numerical non-convergence is
// never an error here: iterative solvers report it through their result annotations.

use crate::grid::Grid2D;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: Grid2D,
        found: Grid2D,
    },

    #[error("buffer length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("grid {rows}x{cols} is too small (need at least 3x3)")]
    GridTooSmall { rows: usize, cols: usize },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, IntegrationError>;

impl IntegrationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Fail unless `found` has the same shape as `expected`.
pub(crate) fn ensure_same_grid(what: &'static str, expected: Grid2D, found: Grid2D) -> Result<()> {
    if expected != found {
        return Err(IntegrationError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(IntegrationError::invalid(
            name,
            format!("must be a finite positive number, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_nonzero(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(IntegrationError::invalid(name, "must be at least 1"));
    }
    Ok(())
}
