use serde::{Deserialize, Serialize};

/// Axis-aligned box in some CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self { left, bottom, right, top }
    }

    pub(crate) fn empty() -> Self {
        Self {
            left: f64::INFINITY,
            bottom: f64::INFINITY,
            right: f64::NEG_INFINITY,
            top: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn extend(&mut self, x: f64, y: f64) {
        self.left = self.left.min(x);
        self.right = self.right.max(x);
        self.bottom = self.bottom.min(y);
        self.top = self.top.max(y);
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.bottom.is_finite() && self.right.is_finite() && self.top.is_finite()
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.left, self.bottom, self.right, self.top]
    }
}

/// Fractional pixel window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub col_off: f64,
    pub row_off: f64,
    pub width: f64,
    pub height: f64,
}

impl Window {
    pub fn full(width: usize, height: usize) -> Self {
        Self { col_off: 0.0, row_off: 0.0, width: width as f64, height: height as f64 }
    }
}

/// Affine pixel -> world transform, GDAL coefficient order.
///
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform from the top-left corner and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// World -> fractional pixel. `None` for a degenerate transform.
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;
        Some((col, row))
    }

    /// Area of one pixel in CRS units.
    pub fn pixel_area(&self) -> f64 {
        self.determinant().abs()
    }

    /// Transform for the same extent sampled with pixels `sx` x `sy` times larger.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            origin_x: self.origin_x,
            pixel_width: self.pixel_width * sx,
            row_rotation: self.row_rotation * sy,
            origin_y: self.origin_y,
            col_rotation: self.col_rotation * sx,
            pixel_height: self.pixel_height * sy,
        }
    }

    /// Pixel window covering `bounds` (corners mapped, then min/max).
    pub fn window_from_bounds(&self, bounds: Bounds) -> Option<Window> {
        let mut cols = [0.0; 4];
        let mut rows = [0.0; 4];
        let corners = [
            (bounds.left, bounds.top),
            (bounds.right, bounds.top),
            (bounds.left, bounds.bottom),
            (bounds.right, bounds.bottom),
        ];
        for (i, (x, y)) in corners.into_iter().enumerate() {
            let (c, r) = self.to_pixel(x, y)?;
            cols[i] = c;
            rows[i] = r;
        }
        let min_c = cols.iter().copied().fold(f64::INFINITY, f64::min);
        let max_c = cols.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_r = rows.iter().copied().fold(f64::INFINITY, f64::min);
        let max_r = rows.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Window { col_off: min_c, row_off: min_r, width: max_c - min_c, height: max_r - min_r })
    }

    /// Extent of a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let mut b = Bounds::empty();
        let (w, h) = (width as f64, height as f64);
        for (c, r) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
            let (x, y) = self.apply(c, r);
            b.extend(x, y);
        }
        b
    }
}
