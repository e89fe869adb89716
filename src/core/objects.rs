//! Connected-component object detection.
//!
//! Objects are maximal 4-connected runs of one non-background colour. The
//! detector scans row-major and grows each component with an explicit stack,
//! so large grids cannot overflow the call stack.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grid::{color_name, Color, Grid, BACKGROUND};

/// One tile of the static 3x3 partition of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Region {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::TopLeft,
        Region::TopCenter,
        Region::TopRight,
        Region::MiddleLeft,
        Region::Center,
        Region::MiddleRight,
        Region::BottomLeft,
        Region::BottomCenter,
        Region::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::TopLeft => "top-left",
            Region::TopCenter => "top-center",
            Region::TopRight => "top-right",
            Region::MiddleLeft => "middle-left",
            Region::Center => "center",
            Region::MiddleRight => "middle-right",
            Region::BottomLeft => "bottom-left",
            Region::BottomCenter => "bottom-center",
            Region::BottomRight => "bottom-right",
        }
    }

    /// Tile containing `(row, col)` in a `rows x cols` grid.
    ///
    /// Borders sit at `dim*21/64` and `dim*43/64`, i.e. 21 and 43 on the
    /// usual 64-wide grid.
    pub fn locate(row: usize, col: usize, rows: usize, cols: usize) -> Region {
        let band = |v: usize, dim: usize| {
            let a = dim * 21 / 64;
            let b = dim * 43 / 64;
            if v < a {
                0
            } else if v < b {
                1
            } else {
                2
            }
        };
        Region::ALL[band(row, rows) * 3 + band(col, cols)]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeClass {
    Pixel,
    VerticalLine { length: usize },
    HorizontalLine { length: usize },
    Square { side: usize },
    Rectangle { width: usize, height: usize },
    Complex { size: usize },
}

impl ShapeClass {
    /// Classify a component from its size and bounding box extent.
    pub fn classify(size: usize, width: usize, height: usize) -> ShapeClass {
        if size == 1 {
            ShapeClass::Pixel
        } else if width == 1 {
            ShapeClass::VerticalLine { length: height }
        } else if height == 1 {
            ShapeClass::HorizontalLine { length: width }
        } else if size == width * height {
            if width == height {
                ShapeClass::Square { side: width }
            } else {
                ShapeClass::Rectangle { width, height }
            }
        } else {
            ShapeClass::Complex { size }
        }
    }
}

impl fmt::Display for ShapeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ShapeClass::Pixel => f.write_str("pixel"),
            ShapeClass::VerticalLine { length } => write!(f, "vertical-line-{length}"),
            ShapeClass::HorizontalLine { length } => write!(f, "horizontal-line-{length}"),
            ShapeClass::Square { side } => write!(f, "square-{side}x{side}"),
            ShapeClass::Rectangle { width, height } => write!(f, "rectangle-{width}x{height}"),
            ShapeClass::Complex { size } => write!(f, "complex-{size}pixels"),
        }
    }
}

/// Inclusive bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl Bounds {
    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    /// Integer centre `(row, col)`.
    pub fn center(&self) -> (usize, usize) {
        (
            (self.min_row + self.max_row) / 2,
            (self.min_col + self.max_col) / 2,
        )
    }
}

/// A single-coloured 4-connected component. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectedObject {
    /// Sequential per grid, starting at 1.
    pub id: u32,
    pub shape: ShapeClass,
    pub color: Color,
    /// Sorted, non-empty.
    pub positions: Vec<(usize, usize)>,
    pub bounds: Bounds,
    pub region: Region,
}

impl DetectedObject {
    pub fn size(&self) -> usize {
        self.positions.len()
    }

    pub fn label(&self) -> String {
        format!("obj_{}", self.id)
    }

    pub fn color_name(&self) -> &'static str {
        color_name(self.color)
    }

    /// Row/col centroid of the positions.
    pub fn centroid(&self) -> (f32, f32) {
        let n = self.positions.len().max(1) as f32;
        let (sr, sc) = self
            .positions
            .iter()
            .fold((0usize, 0usize), |(a, b), &(r, c)| (a + r, b + c));
        (sr as f32 / n, sc as f32 / n)
    }

    /// e.g. `"red square-2x2 at top-left (4 px)"`.
    pub fn describe(&self) -> String {
        format!(
            "{} {} at {} ({} px)",
            self.color_name(),
            self.shape,
            self.region,
            self.size()
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectDetector;

impl ObjectDetector {
    pub fn new() -> Self {
        Self
    }

    /// All non-background components of `grid`, in row-major discovery order.
    pub fn detect(&self, grid: &Grid) -> Vec<DetectedObject> {
        let (rows, cols) = grid.shape();
        let mut visited = vec![false; rows * cols];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut out = Vec::new();
        let mut next_id = 1u32;

        for (r0, c0, color) in grid.iter() {
            if color == BACKGROUND || visited[r0 * cols + c0] {
                continue;
            }

            let mut positions = Vec::new();
            visited[r0 * cols + c0] = true;
            stack.push((r0, c0));
            while let Some((r, c)) = stack.pop() {
                positions.push((r, c));
                let neighbors = [
                    (r.wrapping_sub(1), c),
                    (r + 1, c),
                    (r, c.wrapping_sub(1)),
                    (r, c + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr >= rows || nc >= cols {
                        continue;
                    }
                    let idx = nr * cols + nc;
                    if !visited[idx] && grid.get(nr, nc) == Some(color) {
                        visited[idx] = true;
                        stack.push((nr, nc));
                    }
                }
            }

            positions.sort_unstable();
            out.push(build_object(next_id, color, positions, rows, cols));
            next_id += 1;
        }

        out
    }
}

fn build_object(
    id: u32,
    color: Color,
    positions: Vec<(usize, usize)>,
    rows: usize,
    cols: usize,
) -> DetectedObject {
    let mut bounds = Bounds {
        min_row: usize::MAX,
        max_row: 0,
        min_col: usize::MAX,
        max_col: 0,
    };
    for &(r, c) in &positions {
        bounds.min_row = bounds.min_row.min(r);
        bounds.max_row = bounds.max_row.max(r);
        bounds.min_col = bounds.min_col.min(c);
        bounds.max_col = bounds.max_col.max(c);
    }

    let shape = ShapeClass::classify(positions.len(), bounds.width(), bounds.height());
    let (cr, cc) = bounds.center();

    DetectedObject {
        id,
        shape,
        color,
        positions,
        bounds,
        region: Region::locate(cr, cc, rows, cols),
    }
}
