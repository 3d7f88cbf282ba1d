//! XYZ tile rendering.

use std::f64::consts::PI;
use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::crs::{transform_bounds, Crs};
use crate::dataset::{Raster, DENSIFY_PTS};
use crate::error::{RasterError, Result};
use crate::geo_transform::Bounds;
use crate::stats::{render_bands, RenderStats};

pub const TILE_SIZE: usize = 256;

/// 1x1 fully transparent PNG returned when a tile cannot be rendered.
pub const TRANSPARENT_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xB5, 0x1C, 0x0C,
    0x02, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x60, 0x60, 0x00, 0x00,
    0x00, 0x03, 0x00, 0x01, 0xB8, 0xAD, 0x3A, 0x63, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44,
    0xAE, 0x42, 0x60, 0x82,
];

/// WGS84 bounds of slippy-map tile `(x, y)` at zoom `z`.
pub fn tile_bounds_wgs84(x: u32, y: u32, z: u32) -> Result<Bounds> {
    if z > 30 {
        return Err(RasterError::InvalidArgument(format!("zoom {z} out of range")));
    }
    let n = f64::from(1u32 << z);
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    let (x, y) = (f64::from(x), f64::from(y));
    Ok(Bounds::new(lon(x), lat(y + 1.0), lon(x + 1.0), lat(y)))
}

/// Render tile `(z, x, y)` as RGBA with the raster's shared stretch.
///
/// One band renders as grey, three or more as RGB from the first three.
/// Two-band rasters have no colour mapping and are rejected.
pub fn render_tile(raster: &Raster, stats: &RenderStats, z: u32, x: u32, y: u32) -> Result<RgbaImage> {
    if raster.band_count() == 2 {
        return Err(RasterError::Unsupported("two-band rasters cannot be rendered".into()));
    }
    let wgs = tile_bounds_wgs84(x, y, z)?;
    let native = transform_bounds(Crs::WGS84, raster.crs(), wgs, DENSIFY_PTS)?;
    let window = raster
        .transform()
        .window_from_bounds(native)
        .ok_or_else(|| RasterError::Unsupported("degenerate geotransform".into()))?;

    let bands = raster.read_window(&render_bands(raster), window, TILE_SIZE, TILE_SIZE)?;
    let mask = raster.read_mask_window(window, TILE_SIZE, TILE_SIZE);

    let stretched: Vec<Vec<u8>> = bands
        .iter()
        .enumerate()
        .map(|(b, data)| {
            let (vmin, vmax) = stats.bounds_for(b);
            data.iter().map(|&v| stretch(v, vmin, vmax)).collect()
        })
        .collect();

    let mut img = RgbaImage::new(TILE_SIZE as u32, TILE_SIZE as u32);
    for (i, px) in img.pixels_mut().enumerate() {
        let (r, g, b) = match stretched.as_slice() {
            [grey] => (grey[i], grey[i], grey[i]),
            [r, g, b, ..] => (r[i], g[i], b[i]),
            _ => return Err(RasterError::Unsupported(format!("cannot render {} bands", stretched.len()))),
        };
        let a = if mask[i] { 255 } else { 0 };
        *px = image::Rgba([r, g, b, a]);
    }
    Ok(img)
}

fn stretch(v: f32, vmin: f32, vmax: f32) -> u8 {
    let t = ((v - vmin) / (vmax - vmin)).clamp(0.0, 1.0);
    (t * 255.0) as u8
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
