//! In-memory raster with georeferencing and resampled window reads.

use std::path::Path;

use crate::crs::{transform_bounds, Crs};
use crate::error::{RasterError, Result};
use crate::geo_transform::{Bounds, GeoTransform, Window};

/// Points added per edge when reprojecting raster extents.
pub const DENSIFY_PTS: usize = 21;

/// A decoded raster held band-major as `f32`.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    bands: Vec<Vec<f32>>,
    alpha: Option<Vec<u8>>,
    transform: GeoTransform,
    crs: Crs,
    nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        bands: Vec<Vec<f32>>,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidArgument("raster has zero size".into()));
        }
        if bands.is_empty() {
            return Err(RasterError::InvalidArgument("raster has no bands".into()));
        }
        if let Some(bad) = bands.iter().position(|b| b.len() != width * height) {
            return Err(RasterError::InvalidArgument(format!(
                "band {} has {} samples, expected {}",
                bad + 1,
                bands[bad].len(),
                width * height
            )));
        }
        Ok(Self { width, height, bands, alpha: None, transform, crs, nodata: None })
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_alpha(mut self, alpha: Vec<u8>) -> Result<Self> {
        if alpha.len() != self.width * self.height {
            return Err(RasterError::InvalidArgument("alpha mask size mismatch".into()));
        }
        self.alpha = Some(alpha);
        Ok(self)
    }

    /// Decode a GeoTIFF from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        crate::geotiff::read_geotiff(path.as_ref())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Band samples, zero-based index.
    pub fn band(&self, index: usize) -> &[f32] {
        &self.bands[index]
    }

    pub fn bands(&self) -> &[Vec<f32>] {
        &self.bands
    }

    pub fn alpha(&self) -> Option<&[u8]> {
        self.alpha.as_deref()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Extent in the native CRS.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }

    pub fn bounds_wgs84(&self) -> Result<Bounds> {
        transform_bounds(self.crs, Crs::WGS84, self.bounds(), DENSIFY_PTS)
    }

    /// Validity of one pixel, derived from the alpha band or from the first
    /// band's nodata value.
    pub fn is_valid(&self, idx: usize) -> bool {
        if let Some(alpha) = &self.alpha {
            return alpha[idx] != 0;
        }
        match self.nodata {
            Some(nd) if nd.is_nan() => !self.bands[0][idx].is_nan(),
            Some(nd) => f64::from(self.bands[0][idx]) != nd,
            None => true,
        }
    }

    fn sample(&self, band: &[f32], col: isize, row: isize) -> f32 {
        if col < 0 || row < 0 || col as usize >= self.width || row as usize >= self.height {
            return 0.0;
        }
        let v = band[row as usize * self.width + col as usize];
        if v.is_nan() {
            0.0
        } else {
            v
        }
    }

    /// Bilinear read of `window` into an `out_w` x `out_h` grid for the given
    /// zero-based band indexes. Pixels outside the raster read as 0.
    pub fn read_window(&self, band_indexes: &[usize], window: Window, out_w: usize, out_h: usize) -> Result<Vec<Vec<f32>>> {
        if out_w == 0 || out_h == 0 {
            return Err(RasterError::InvalidArgument("output shape must be non-empty".into()));
        }
        if let Some(&bad) = band_indexes.iter().find(|&&b| b >= self.bands.len()) {
            return Err(RasterError::InvalidArgument(format!("band {} out of range", bad + 1)));
        }

        let sx = window.width / out_w as f64;
        let sy = window.height / out_h as f64;

        let mut out = Vec::with_capacity(band_indexes.len());
        for &b in band_indexes {
            let band = &self.bands[b];
            let mut buf = vec![0.0f32; out_w * out_h];
            for j in 0..out_h {
                let fy = window.row_off + (j as f64 + 0.5) * sy - 0.5;
                let y0 = fy.floor();
                let ty = (fy - y0) as f32;
                let y0 = y0 as isize;
                for i in 0..out_w {
                    let fx = window.col_off + (i as f64 + 0.5) * sx - 0.5;
                    let x0 = fx.floor();
                    let tx = (fx - x0) as f32;
                    let x0 = x0 as isize;

                    let v00 = self.sample(band, x0, y0);
                    let v10 = self.sample(band, x0 + 1, y0);
                    let v01 = self.sample(band, x0, y0 + 1);
                    let v11 = self.sample(band, x0 + 1, y0 + 1);
                    let top = v00 + (v10 - v00) * tx;
                    let bottom = v01 + (v11 - v01) * tx;
                    buf[j * out_w + i] = top + (bottom - top) * ty;
                }
            }
            out.push(buf);
        }
        Ok(out)
    }

    /// Nearest-neighbour validity mask for `window`. Pixels outside the
    /// raster are invalid.
    pub fn read_mask_window(&self, window: Window, out_w: usize, out_h: usize) -> Vec<bool> {
        let sx = window.width / out_w.max(1) as f64;
        let sy = window.height / out_h.max(1) as f64;
        let mut out = vec![false; out_w * out_h];
        for j in 0..out_h {
            let row = (window.row_off + (j as f64 + 0.5) * sy).floor();
            if row < 0.0 || row >= self.height as f64 {
                continue;
            }
            for i in 0..out_w {
                let col = (window.col_off + (i as f64 + 0.5) * sx).floor();
                if col < 0.0 || col >= self.width as f64 {
                    continue;
                }
                out[j * out_w + i] = self.is_valid(row as usize * self.width + col as usize);
            }
        }
        out
    }

    /// Resample the whole raster by `factor` (2 halves each side), keeping
    /// the extent.
    pub fn downsample(&self, factor: f64) -> Result<Raster> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RasterError::InvalidArgument(format!("invalid downsample factor {factor}")));
        }
        let new_w = ((self.width as f64 / factor) as usize).max(1);
        let new_h = ((self.height as f64 / factor) as usize).max(1);
        let full = Window::full(self.width, self.height);

        let indexes: Vec<usize> = (0..self.bands.len()).collect();
        let bands = self.read_window(&indexes, full, new_w, new_h)?;
        let transform = self
            .transform
            .scaled(self.width as f64 / new_w as f64, self.height as f64 / new_h as f64);

        let mut out = Raster::new(new_w, new_h, bands, transform, self.crs)?.with_nodata(self.nodata);
        if self.alpha.is_some() {
            let mask = self.read_mask_window(full, new_w, new_h);
            out = out.with_alpha(mask.into_iter().map(|v| if v { 255 } else { 0 }).collect())?;
        }
        Ok(out)
    }

    /// Write as a float32 GeoTIFF.
    pub fn write_geotiff(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::geotiff::write_geotiff(self, path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> Raster {
        let band: Vec<f32> = (0..width * height).map(|i| (i % width) as f32).collect();
        Raster::new(width, height, vec![band], GeoTransform::north_up(0.0, height as f64, 1.0, 1.0), Crs(32633)).unwrap()
    }

    #[test]
    fn identity_window_returns_source() {
        let r = ramp(4, 3);
        let out = r.read_window(&[0], Window::full(4, 3), 4, 3).unwrap();
        assert_eq!(out[0], r.band(0));
    }

    #[test]
    fn boundless_read_fills_zero() {
        let r = ramp(4, 4);
        let w = Window { col_off: -8.0, row_off: -8.0, width: 4.0, height: 4.0 };
        let out = r.read_window(&[0], w, 2, 2).unwrap();
        assert!(out[0].iter().all(|&v| v == 0.0));
        assert!(r.read_mask_window(w, 2, 2).iter().all(|&v| !v));
    }

    #[test]
    fn nodata_masks_pixels() {
        let mut band = vec![1.0f32; 4];
        band[2] = -9999.0;
        let r = Raster::new(2, 2, vec![band], GeoTransform::north_up(0.0, 2.0, 1.0, 1.0), Crs::WGS84)
            .unwrap()
            .with_nodata(Some(-9999.0));
        assert_eq!(r.read_mask_window(Window::full(2, 2), 2, 2), vec![true, true, false, true]);
    }

    #[test]
    fn downsample_keeps_extent() {
        let r = ramp(8, 8);
        let d = r.downsample(2.0).unwrap();
        assert_eq!((d.width(), d.height()), (4, 4));
        assert_eq!(d.bounds(), r.bounds());
    }

    #[test]
    fn rejects_short_band() {
        let err = Raster::new(2, 2, vec![vec![0.0; 3]], GeoTransform::north_up(0.0, 0.0, 1.0, 1.0), Crs::WGS84);
        assert!(err.is_err());
    }
}
