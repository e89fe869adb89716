//! Grids, layered-frame normalization and cell diffs.
//!
//! A [`Grid`] is a dense row-major matrix of palette indices. Colour `0` is
//! the background. Frames may arrive as a single 2-D grid or as a stack of
//! layers; the last layer is authoritative.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PerceptionConfig;
use crate::error::GridError;

/// Palette index of a cell.
pub type Color = u8;

pub const BACKGROUND: Color = 0;

/// Number of named palette entries.
pub const PALETTE_SIZE: usize = 16;

const PALETTE: [&str; PALETTE_SIZE] = [
    "white",
    "blue",
    "gray",
    "dark-gray",
    "darker-gray",
    "black",
    "brown",
    "light-gray",
    "red",
    "blue",
    "green",
    "yellow",
    "orange",
    "magenta",
    "light-green",
    "purple",
];

/// Human readable name of a palette index.
pub fn color_name(color: Color) -> &'static str {
    PALETTE.get(color as usize).copied().unwrap_or("unknown")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Color>,
}

impl Grid {
    /// All-background grid.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![BACKGROUND; rows * cols],
        }
    }

    /// The "closed eyes" grid compared against on the very first turn.
    pub fn background(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols)
    }

    /// Build from nested rows, validating shape and palette range.
    pub fn from_rows(rows: &[Vec<i64>]) -> Result<Self, GridError> {
        let h = rows.len();
        let w = rows.first().map(|r| r.len()).unwrap_or(0);
        if h == 0 || w == 0 {
            return Err(GridError::Empty);
        }

        let mut cells = Vec::with_capacity(h * w);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != w {
                return Err(GridError::Ragged {
                    row: i,
                    expected: w,
                    found: row.len(),
                });
            }
            for &v in row {
                let c = Color::try_from(v).map_err(|_| GridError::ColorOutOfRange { value: v })?;
                cells.push(c);
            }
        }

        Ok(Self {
            rows: h,
            cols: w,
            cells,
        })
    }

    /// Normalize a layered frame: only the last layer is kept.
    pub fn from_layers(layers: &[Vec<Vec<i64>>]) -> Result<Self, GridError> {
        let last = layers.last().ok_or(GridError::NoLayers)?;
        Self::from_rows(last)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<Color> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    /// Set a cell. Out-of-bounds writes are ignored and return `false`.
    pub fn set(&mut self, row: usize, col: usize, color: Color) -> bool {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = color;
            true
        } else {
            false
        }
    }

    pub fn cells(&self) -> &[Color] {
        &self.cells
    }

    /// Iterate `(row, col, color)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Color)> + '_ {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &c)| (i / cols, i % cols, c))
    }

    pub fn non_background_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != BACKGROUND).count()
    }

    /// Top-left `rows x cols` window. Requested sizes are clamped to the grid.
    pub fn crop(&self, rows: usize, cols: usize) -> Grid {
        let rows = rows.min(self.rows);
        let cols = cols.min(self.cols);
        let mut out = Grid::new(rows, cols);
        for r in 0..rows {
            let src = &self.cells[r * self.cols..r * self.cols + cols];
            out.cells[r * cols..(r + 1) * cols].copy_from_slice(src);
        }
        out
    }

    /// Compact text rendering, one row per line, hex digit per cell.
    pub fn render(&self) -> String {
        let mut s = String::with_capacity(self.rows * (self.cols + 1));
        for r in 0..self.rows {
            for c in 0..self.cols {
                let v = self.cells[r * self.cols + c];
                s.push(char::from_digit(u32::from(v % 16), 16).unwrap_or('?'));
            }
            s.push('\n');
        }
        s
    }
}

/// Frame payload as it arrives from a game: flat or layered.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum RawFrame {
    Flat(Vec<Vec<i64>>),
    Layered(Vec<Vec<Vec<i64>>>),
}

impl RawFrame {
    pub fn to_grid(&self) -> Result<Grid, GridError> {
        match self {
            RawFrame::Flat(rows) => Grid::from_rows(rows),
            RawFrame::Layered(layers) => Grid::from_layers(layers),
        }
    }

    /// Like [`RawFrame::to_grid`], but a malformed payload becomes an
    /// all-background grid of the configured default shape.
    pub fn to_grid_or_default(&self, cfg: &PerceptionConfig) -> Grid {
        self.to_grid().unwrap_or_else(|e| {
            warn!(error = %e, rows = cfg.default_rows, cols = cfg.default_cols,
                "malformed frame; using background grid");
            Grid::background(cfg.default_rows, cfg.default_cols)
        })
    }
}

/// How two grids of possibly different shape were made comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Reconciliation {
    Exact,
    /// Both grids cropped to their common top-left window.
    Cropped,
    /// An empty grid was replaced by the default background grid.
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellChange {
    pub row: usize,
    pub col: usize,
    pub before: Color,
    pub after: Color,
}

#[derive(Debug, Clone)]
pub struct GridDiff {
    pub before: Grid,
    pub after: Grid,
    /// Changed cells, row-major.
    pub changed: Vec<CellChange>,
    pub reconciliation: Reconciliation,
}

impl GridDiff {
    pub fn total_cells(&self) -> usize {
        self.after.rows() * self.after.cols()
    }

    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }

    /// Signed colour delta at a cell (`after - before`).
    pub fn delta(&self, row: usize, col: usize) -> i16 {
        match (self.before.get(row, col), self.after.get(row, col)) {
            (Some(b), Some(a)) => i16::from(a) - i16::from(b),
            _ => 0,
        }
    }
}

/// Computes cell-level diffs between consecutive frames.
#[derive(Debug, Clone)]
pub struct GridDiffer {
    default_rows: usize,
    default_cols: usize,
}

impl Default for GridDiffer {
    fn default() -> Self {
        Self::new(&PerceptionConfig::default())
    }
}

impl GridDiffer {
    pub fn new(cfg: &PerceptionConfig) -> Self {
        Self {
            default_rows: cfg.default_rows,
            default_cols: cfg.default_cols,
        }
    }

    /// Diff two grids. Never fails: mismatched shapes are reconciled and
    /// the method used is recorded on the result.
    pub fn diff(&self, before: &Grid, after: &Grid) -> GridDiff {
        let mut reconciliation = Reconciliation::Exact;

        let fallback = || Grid::background(self.default_rows, self.default_cols);
        let before = if before.is_empty() {
            reconciliation = Reconciliation::Defaulted;
            fallback()
        } else {
            before.clone()
        };
        let after = if after.is_empty() {
            reconciliation = Reconciliation::Defaulted;
            fallback()
        } else {
            after.clone()
        };

        let (before, after) = if before.shape() != after.shape() {
            let rows = before.rows().min(after.rows());
            let cols = before.cols().min(after.cols());
            if reconciliation == Reconciliation::Exact {
                reconciliation = Reconciliation::Cropped;
            }
            warn!(
                before = ?before.shape(),
                after = ?after.shape(),
                rows,
                cols,
                "grid shapes differ; cropping to common window"
            );
            (before.crop(rows, cols), after.crop(rows, cols))
        } else {
            (before, after)
        };

        if reconciliation == Reconciliation::Defaulted {
            warn!("empty grid replaced with default background");
        }

        let changed = before
            .cells()
            .iter()
            .zip(after.cells())
            .enumerate()
            .filter(|(_, (b, a))| b != a)
            .map(|(i, (&b, &a))| CellChange {
                row: i / after.cols(),
                col: i % after.cols(),
                before: b,
                after: a,
            })
            .collect();

        GridDiff {
            before,
            after,
            changed,
            reconciliation,
        }
    }
}
