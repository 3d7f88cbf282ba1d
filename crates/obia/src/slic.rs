//! SLIC superpixels (simple linear iterative clustering).

use georaster::Raster;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ObiaError, Result};

/// Fraction of the mean segment size below which a component is absorbed
/// by a neighbour.
const MIN_SIZE_FACTOR: f64 = 0.5;
const UNASSIGNED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlicParams {
    /// Approximate segment side length in pixels.
    pub scale: f64,
    /// Weight of spatial proximity against colour similarity.
    pub compactness: f64,
    /// Gaussian pre-smoothing; 0 disables it.
    pub sigma: f64,
    pub max_iter: usize,
}

impl SlicParams {
    pub fn new(scale: f64, compactness: f64) -> Self {
        Self { scale, compactness, sigma: 1.0, max_iter: 10 }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale < 1.0 {
            return Err(ObiaError::InvalidInput(format!("scale must be at least 1 pixel, got {}", self.scale)));
        }
        if !self.compactness.is_finite() || self.compactness < 0.0 {
            return Err(ObiaError::InvalidInput(format!(
                "compactness must be non-negative, got {}",
                self.compactness
            )));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(ObiaError::InvalidInput(format!("sigma must be non-negative, got {}", self.sigma)));
        }
        Ok(())
    }

    /// Never more segments than pixels.
    pub fn n_segments(&self, width: usize, height: usize) -> usize {
        let pixels = (width * height).max(1);
        (((pixels as f64) / (self.scale * self.scale)) as usize).clamp(1, pixels)
    }
}

/// Row-major label grid; labels run from 1 to `count`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelImage {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u32>,
    pub count: u32,
}

impl LabelImage {
    pub fn get(&self, col: usize, row: usize) -> u32 {
        self.labels[row * self.width + col]
    }
}

fn normalize(band: &[f32]) -> Vec<f32> {
    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in band.iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !(hi > lo) {
        return vec![0.0; band.len()];
    }
    band.iter()
        .map(|&v| if v.is_finite() { (v - lo) / (hi - lo) } else { 0.0 })
        .collect()
}

fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (4.0 * sigma).ceil() as isize;
    let mut k: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp() as f32)
        .collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

/// Separable Gaussian blur with edge clamping.
fn blur(band: &[f32], width: usize, height: usize, kernel: &[f32]) -> Vec<f32> {
    let r = (kernel.len() / 2) as isize;
    let clamp = |v: isize, n: usize| v.clamp(0, n as isize - 1) as usize;

    let mut tmp = vec![0.0f32; band.len()];
    for y in 0..height {
        let row = &band[y * width..(y + 1) * width];
        for x in 0..width {
            tmp[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * row[clamp(x as isize + k as isize - r, width)])
                .sum();
        }
    }

    let mut out = vec![0.0f32; band.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * tmp[clamp(y as isize + k as isize - r, height) * width + x])
                .sum();
        }
    }
    out
}

#[derive(Debug, Clone)]
struct Center {
    x: f64,
    y: f64,
    color: Vec<f64>,
}

fn initial_centers(features: &[Vec<f32>], width: usize, height: usize, n_segments: usize) -> (Vec<Center>, f64) {
    let step = ((width * height) as f64 / n_segments.max(1) as f64).sqrt().max(1.0);
    let nx = ((width as f64 / step).round() as usize).max(1);
    let ny = ((height as f64 / step).round() as usize).max(1);
    let (sx, sy) = (width as f64 / nx as f64, height as f64 / ny as f64);

    let mut centers = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = (i as f64 + 0.5) * sx;
            let y = (j as f64 + 0.5) * sy;
            let idx = (y as usize).min(height - 1) * width + (x as usize).min(width - 1);
            centers.push(Center { x, y, color: features.iter().map(|f| f64::from(f[idx])).collect() });
        }
    }
    (centers, sx.max(sy))
}

/// Segment `raster` into superpixels.
pub fn slic(raster: &Raster, params: &SlicParams) -> Result<LabelImage> {
    params.validate()?;
    let (width, height) = (raster.width(), raster.height());
    let n = width * height;

    let kernel = (params.sigma > 0.0).then(|| gaussian_kernel(params.sigma));
    let features: Vec<Vec<f32>> = raster
        .bands()
        .iter()
        .map(|b| {
            let norm = normalize(b);
            match &kernel {
                Some(k) => blur(&norm, width, height, k),
                None => norm,
            }
        })
        .collect();

    let n_segments = params.n_segments(width, height);
    let (mut centers, step) = initial_centers(&features, width, height, n_segments);
    let spatial_weight = (params.compactness / step).powi(2);
    let reach = step.ceil() as isize;

    let mut assign = vec![UNASSIGNED; n];
    let mut dist = vec![f64::INFINITY; n];

    for _ in 0..params.max_iter {
        dist.iter_mut().for_each(|d| *d = f64::INFINITY);

        for (k, c) in centers.iter().enumerate() {
            let (cx, cy) = (c.x as isize, c.y as isize);
            let y0 = (cy - reach).max(0) as usize;
            let y1 = ((cy + reach) as usize).min(height - 1);
            let x0 = (cx - reach).max(0) as usize;
            let x1 = ((cx + reach) as usize).min(width - 1);
            for y in y0..=y1 {
                let dy = y as f64 - c.y;
                for x in x0..=x1 {
                    let idx = y * width + x;
                    let dx = x as f64 - c.x;
                    let colour: f64 = features
                        .iter()
                        .zip(&c.color)
                        .map(|(f, &cc)| {
                            let d = f64::from(f[idx]) - cc;
                            d * d
                        })
                        .sum();
                    let d = colour + (dx * dx + dy * dy) * spatial_weight;
                    if d < dist[idx] {
                        dist[idx] = d;
                        assign[idx] = k as u32;
                    }
                }
            }
        }

        // recentre
        let bands = features.len();
        let mut acc = vec![(0.0f64, 0.0f64, 0usize); centers.len()];
        let mut colour_acc = vec![0.0f64; centers.len() * bands];
        for (idx, &k) in assign.iter().enumerate() {
            if k == UNASSIGNED {
                continue;
            }
            let k = k as usize;
            let a = &mut acc[k];
            a.0 += (idx % width) as f64;
            a.1 += (idx / width) as f64;
            a.2 += 1;
            for (b, f) in features.iter().enumerate() {
                colour_acc[k * bands + b] += f64::from(f[idx]);
            }
        }
        for (k, c) in centers.iter_mut().enumerate() {
            let (sx, sy, count) = acc[k];
            if count == 0 {
                continue;
            }
            let cnt = count as f64;
            c.x = sx / cnt;
            c.y = sy / cnt;
            for b in 0..bands {
                c.color[b] = colour_acc[k * bands + b] / cnt;
            }
        }
    }

    let min_size = (MIN_SIZE_FACTOR * n as f64 / n_segments as f64) as usize;
    let (labels, count) = enforce_connectivity(&assign, width, height, min_size);
    debug!(width, height, n_segments, segments = count, "slic done");

    Ok(LabelImage { width, height, labels, count })
}

/// Relabel 4-connected components sequentially from 1, merging components
/// smaller than `min_size` (and unassigned pixels) into an adjacent one.
pub fn enforce_connectivity(assign: &[u32], width: usize, height: usize, min_size: usize) -> (Vec<u32>, u32) {
    let n = width * height;
    let mut out = vec![0u32; n];
    let mut next = 1u32;
    let mut queue: Vec<usize> = Vec::new();

    for start in 0..n {
        if out[start] != 0 {
            continue;
        }
        let class = assign[start];
        queue.clear();
        queue.push(start);
        out[start] = next;
        let mut adjacent = 0u32;

        let mut head = 0;
        while head < queue.len() {
            let p = queue[head];
            head += 1;
            let (x, y) = (p % width, p / width);
            let mut visit = |q: usize| {
                if out[q] == 0 && assign[q] == class {
                    out[q] = next;
                    queue.push(q);
                } else if out[q] != 0 && out[q] != next {
                    adjacent = out[q];
                }
            };
            if x > 0 {
                visit(p - 1);
            }
            if x + 1 < width {
                visit(p + 1);
            }
            if y > 0 {
                visit(p - width);
            }
            if y + 1 < height {
                visit(p + width);
            }
        }

        if (queue.len() < min_size || class == UNASSIGNED) && adjacent != 0 {
            for &p in &queue {
                out[p] = adjacent;
            }
        } else {
            next += 1;
        }
    }

    (out, next - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use georaster::{Crs, GeoTransform};

    fn two_halves(width: usize, height: usize) -> Raster {
        let band: Vec<f32> = (0..width * height)
            .map(|i| if i % width < width / 2 { 10.0 } else { 200.0 })
            .collect();
        Raster::new(width, height, vec![band], GeoTransform::north_up(0.0, height as f64, 1.0, 1.0), Crs(32633)).unwrap()
    }

    #[test]
    fn n_segments_from_scale() {
        let p = SlicParams::new(10.0, 1.0);
        assert_eq!(p.n_segments(100, 50), 50);
        assert_eq!(p.n_segments(3, 3), 1);
    }

    #[test]
    fn labels_cover_image_and_start_at_one() {
        let r = two_halves(40, 40);
        let out = slic(&r, &SlicParams::new(10.0, 0.1)).unwrap();
        assert_eq!(out.labels.len(), 1600);
        assert!(out.labels.iter().all(|&l| l >= 1 && l <= out.count));
        assert!(out.count >= 2);
    }

    #[test]
    fn segments_respect_strong_edge() {
        let r = two_halves(40, 40);
        let out = slic(&r, &SlicParams { sigma: 0.0, ..SlicParams::new(10.0, 0.1) }).unwrap();
        for y in 0..40 {
            // no label straddles the step between column 19 and 20
            let left: Vec<u32> = (0..20).map(|x| out.get(x, y)).collect();
            let right: Vec<u32> = (20..40).map(|x| out.get(x, y)).collect();
            assert!(left.iter().all(|l| !right.contains(l)));
        }
    }

    #[test]
    fn connectivity_merges_small_islands() {
        // 1 isolated pixel of class 1 inside class 0
        let mut assign = vec![0u32; 25];
        assign[12] = 1;
        let (labels, count) = enforce_connectivity(&assign, 5, 5, 2);
        assert_eq!(count, 1);
        assert!(labels.iter().all(|&l| l == 1));
    }

    #[test]
    fn connectivity_splits_disjoint_parts() {
        // same class on both sides of a wall
        let assign = vec![0, 1, 0, 0, 1, 0, 0, 1, 0];
        let (labels, count) = enforce_connectivity(&assign, 3, 3, 0);
        assert_eq!(count, 3);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn rejects_bad_scale() {
        let r = two_halves(4, 4);
        assert!(slic(&r, &SlicParams::new(0.0, 1.0)).is_err());
        assert!(slic(&r, &SlicParams::new(f64::NAN, 1.0)).is_err());
    }

    #[test]
    fn sub_pixel_scale_is_rejected_before_allocating() {
        let r = two_halves(40, 40);
        for scale in [1e-200, 0.01, 0.999] {
            let err = slic(&r, &SlicParams { sigma: 0.0, ..SlicParams::new(scale, 1.0) }).unwrap_err();
            assert!(matches!(err, ObiaError::InvalidInput(_)), "scale {scale}: {err:?}");
        }
    }

    #[test]
    fn segment_count_is_capped_at_pixel_count() {
        assert_eq!(SlicParams::new(1e-200, 1.0).n_segments(40, 40), 1600);
        assert_eq!(SlicParams::new(0.5, 1.0).n_segments(3, 2), 6);
        assert_eq!(SlicParams::new(1e200, 1.0).n_segments(40, 40), 1);
        assert_eq!(SlicParams::new(10.0, 1.0).n_segments(0, 0), 1);
    }

    #[test]
    fn one_pixel_scale_segments_without_overflow() {
        let r = two_halves(12, 6);
        let out = slic(&r, &SlicParams { sigma: 0.0, ..SlicParams::new(1.0, 1.0) }).unwrap();
        assert_eq!(out.labels.len(), 72);
        assert!(out.count >= 2 && out.count <= 72);
        assert!(out.labels.iter().all(|&l| l >= 1 && l <= out.count));
    }

    #[test]
    fn huge_scale_yields_a_single_segment() {
        let r = two_halves(40, 40);
        let out = slic(&r, &SlicParams::new(1e9, 1.0)).unwrap();
        // a single centre, so every pixel joins it
        assert_eq!(out.count, 1);
        assert!(out.labels.iter().all(|&l| l == 1));
    }

    #[test]
    fn zero_compactness_is_colour_only() {
        let r = two_halves(40, 40);
        let out = slic(&r, &SlicParams { sigma: 0.0, ..SlicParams::new(10.0, 0.0) }).unwrap();
        assert!(out.count >= 2);
        assert!(out.labels.iter().all(|&l| l >= 1 && l <= out.count));
        assert_ne!(out.get(0, 0), out.get(39, 0));
    }
}
