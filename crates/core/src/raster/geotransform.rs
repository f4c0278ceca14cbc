//! North-up georeferencing for grids described by their bounding box

use serde::{Deserialize, Serialize};

/// Maps (column, row) cell indices to map coordinates and back.
///
/// Grids are north-up: `origin_x`/`origin_y` is the west/north corner,
/// `pixel_width` is positive and `pixel_height` negative.
/// ```text
/// x = origin_x + (col + 0.5) * pixel_width
/// y = origin_y + (row + 0.5) * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner (west edge)
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner (north edge)
    pub origin_y: f64,
    /// Cell size in X
    pub pixel_width: f64,
    /// Cell size in Y, negative for north-up grids
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Build from edge coordinates and grid dimensions.
    pub fn from_bounds(north: f64, south: f64, east: f64, west: f64, rows: usize, cols: usize) -> Self {
        let pixel_width = if cols > 0 { (east - west) / cols as f64 } else { 0.0 };
        let pixel_height = if rows > 0 { -(north - south) / rows as f64 } else { 0.0 };
        Self::new(west, north, pixel_width, pixel_height)
    }

    /// Center of cell `(col, row)`; indices outside the grid extrapolate linearly.
    pub fn cell_center(&self, col: isize, row: isize) -> (f64, f64) {
        (self.x_from_column(col), self.y_from_row(row))
    }

    pub fn x_from_column(&self, col: isize) -> f64 {
        self.origin_x + (col as f64 + 0.5) * self.pixel_width
    }

    pub fn y_from_row(&self, row: isize) -> f64 {
        self.origin_y + (row as f64 + 0.5) * self.pixel_height
    }

    /// Column containing `x`. May be negative or past the last column.
    pub fn column_from_x(&self, x: f64) -> isize {
        if self.pixel_width == 0.0 {
            return 0;
        }
        ((x - self.origin_x) / self.pixel_width).floor() as isize
    }

    /// Row containing `y`. May be negative or past the last row.
    pub fn row_from_y(&self, y: f64) -> isize {
        if self.pixel_height == 0.0 {
            return 0;
        }
        ((y - self.origin_y) / self.pixel_height).floor() as isize
    }

    /// Absolute cell size in X.
    pub fn cell_size_x(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Absolute cell size in Y.
    pub fn cell_size_y(&self) -> f64 {
        self.pixel_height.abs()
    }

    /// `(west, south, east, north)` for a grid of the given dimensions.
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let east = self.origin_x + cols as f64 * self.pixel_width;
        let south = self.origin_y + rows as f64 * self.pixel_height;
        (
            self.origin_x.min(east),
            self.origin_y.min(south),
            self.origin_x.max(east),
            self.origin_y.max(south),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
