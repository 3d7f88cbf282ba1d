//! Percentile stretch statistics shared by every tile of a raster.

use serde::{Deserialize, Serialize};

use crate::dataset::Raster;
use crate::error::Result;
use crate::geo_transform::Window;

/// Longest side of the overview the statistics are sampled from.
pub const STATS_OVERVIEW_MAX: usize = 1024;
pub const LOW_PERCENTILE: f64 = 2.0;
pub const HIGH_PERCENTILE: f64 = 98.0;

/// Per-band `(min, max)` stretch bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    pub vmins: Vec<f32>,
    pub vmaxs: Vec<f32>,
}

impl RenderStats {
    /// Bounds for output band `b`; bands past the end reuse the last entry.
    pub fn bounds_for(&self, b: usize) -> (f32, f32) {
        let i = b.min(self.vmins.len().saturating_sub(1));
        (self.vmins.get(i).copied().unwrap_or(0.0), self.vmaxs.get(i).copied().unwrap_or(1.0))
    }
}

/// Zero-based indexes of the bands that get rendered (at most three).
pub fn render_bands(raster: &Raster) -> Vec<usize> {
    (0..raster.band_count().min(3)).collect()
}

/// Linear-interpolated percentile of `values` (sorted in place).
pub fn percentile(values: &mut [f32], q: f64) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

pub fn compute_render_stats(raster: &Raster) -> Result<RenderStats> {
    let (w, h) = (raster.width(), raster.height());
    let longest = w.max(h);
    let scale = if longest > STATS_OVERVIEW_MAX { longest as f64 / STATS_OVERVIEW_MAX as f64 } else { 1.0 };
    let out_w = ((w as f64 / scale) as usize).max(1);
    let out_h = ((h as f64 / scale) as usize).max(1);

    let full = Window::full(w, h);
    let bands = raster.read_window(&render_bands(raster), full, out_w, out_h)?;
    let mask = raster.read_mask_window(full, out_w, out_h);

    let mut vmins = Vec::with_capacity(bands.len());
    let mut vmaxs = Vec::with_capacity(bands.len());
    for band in bands {
        let mut vals: Vec<f32> = band
            .into_iter()
            .zip(mask.iter())
            .filter(|(_, &valid)| valid)
            .map(|(v, _)| v)
            .collect();

        match (percentile(&mut vals, LOW_PERCENTILE), percentile(&mut vals, HIGH_PERCENTILE)) {
            (Some(vmin), Some(mut vmax)) => {
                if vmax <= vmin {
                    vmax = vmin + 1.0;
                }
                vmins.push(vmin);
                vmaxs.push(vmax);
            }
            _ => {
                vmins.push(0.0);
                vmaxs.push(1.0);
            }
        }
    }

    Ok(RenderStats { vmins, vmaxs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geo_transform::GeoTransform;

    #[test]
    fn percentile_matches_linear_interpolation() {
        let mut v: Vec<f32> = (0..=100).map(|i| i as f32).collect();
        assert_eq!(percentile(&mut v, 2.0), Some(2.0));
        assert_eq!(percentile(&mut v, 98.0), Some(98.0));
        let mut small = vec![4.0, 1.0, 3.0, 2.0];
        // rank = 0.5 * 3 = 1.5
        assert_eq!(percentile(&mut small, 50.0), Some(2.5));
    }

    #[test]
    fn flat_band_gets_unit_range() {
        let r = Raster::new(3, 3, vec![vec![7.0; 9]], GeoTransform::north_up(0.0, 3.0, 1.0, 1.0), Crs::WGS84).unwrap();
        let s = compute_render_stats(&r).unwrap();
        assert_eq!(s, RenderStats { vmins: vec![7.0], vmaxs: vec![8.0] });
    }

    #[test]
    fn fully_masked_band_defaults() {
        let r = Raster::new(2, 2, vec![vec![0.0; 4]], GeoTransform::north_up(0.0, 2.0, 1.0, 1.0), Crs::WGS84)
            .unwrap()
            .with_nodata(Some(0.0));
        let s = compute_render_stats(&r).unwrap();
        assert_eq!(s, RenderStats { vmins: vec![0.0], vmaxs: vec![1.0] });
    }

    #[test]
    fn only_first_three_bands() {
        let bands = vec![vec![1.0; 4]; 5];
        let r = Raster::new(2, 2, bands, GeoTransform::north_up(0.0, 2.0, 1.0, 1.0), Crs::WGS84).unwrap();
        assert_eq!(compute_render_stats(&r).unwrap().vmins.len(), 3);
    }

    #[test]
    fn bounds_for_reuses_last_band() {
        let s = RenderStats { vmins: vec![1.0, 2.0], vmaxs: vec![3.0, 4.0] };
        assert_eq!(s.bounds_for(5), (2.0, 4.0));
    }
}
