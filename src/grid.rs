// src/grid.rs

/// Rectangular pixel grid. `u` runs over rows, `v` over columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Grid2D {
    pub rows: usize,
    pub cols: usize,
}

impl Grid2D {
    /// Create a grid with `rows × cols` pixels.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of pixels.
    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Convert (u, v) indices to a flat row-major index.
    #[inline]
    pub fn idx(&self, u: usize, v: usize) -> usize {
        debug_assert!(u < self.rows && v < self.cols);
        u * self.cols + v
    }

    /// Inverse of [`Grid2D::idx`].
    #[inline]
    pub fn coords(&self, id: usize) -> (usize, usize) {
        debug_assert!(id < self.n_cells());
        (id / self.cols, id % self.cols)
    }
}

impl std::fmt::Display for Grid2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}
