//! Per-segment spectral statistics.

use geojson::JsonObject;
use serde_json::Value;

use crate::slic::LabelImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl BandStats {
    fn from_values(values: &mut [f32]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = values.iter().map(|&v| (f64::from(v) - mean).powi(2)).sum::<f64>() / n;
        values.sort_by(f32::total_cmp);
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (f64::from(values[mid - 1]) + f64::from(values[mid])) / 2.0
        } else {
            f64::from(values[mid])
        };
        Self {
            mean,
            std: var.sqrt(),
            min: f64::from(values[0]),
            max: f64::from(values[values.len() - 1]),
            median,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStats {
    pub segment_id: u32,
    pub area_pixels: usize,
    pub bands: Vec<BandStats>,
}

impl SegmentStats {
    /// Feature properties: `segment_id`, `area_pixels` and
    /// `band_<n>_{mean,std,min,max,median}` with 1-based band numbers.
    pub fn to_properties(&self) -> JsonObject {
        let mut props = JsonObject::new();
        props.insert("segment_id".into(), Value::from(self.segment_id));
        props.insert("area_pixels".into(), Value::from(self.area_pixels));
        for (i, b) in self.bands.iter().enumerate() {
            let n = i + 1;
            for (name, v) in [("mean", b.mean), ("std", b.std), ("min", b.min), ("max", b.max), ("median", b.median)] {
                props.insert(format!("band_{n}_{name}"), finite(v));
            }
        }
        props
    }
}

fn finite(v: f64) -> Value {
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Statistics for labels `1..=count`, indexed by `label - 1`. Labels with
/// no pixels are skipped.
pub fn segment_stats(labels: &LabelImage, bands: &[Vec<f32>]) -> Vec<SegmentStats> {
    let count = labels.count as usize;

    // bucket pixel indexes by label
    let mut starts = vec![0usize; count + 2];
    for &l in &labels.labels {
        starts[l as usize + 1] += 1;
    }
    for i in 1..starts.len() {
        starts[i] += starts[i - 1];
    }
    let mut order = vec![0usize; labels.labels.len()];
    let mut fill = starts.clone();
    for (idx, &l) in labels.labels.iter().enumerate() {
        order[fill[l as usize]] = idx;
        fill[l as usize] += 1;
    }

    let mut scratch = Vec::new();
    (1..=count)
        .filter_map(|label| {
            let pixels = &order[starts[label]..starts[label + 1]];
            if pixels.is_empty() {
                return None;
            }
            let band_stats = bands
                .iter()
                .map(|band| {
                    scratch.clear();
                    scratch.extend(pixels.iter().map(|&p| band[p]));
                    BandStats::from_values(&mut scratch)
                })
                .collect();
            Some(SegmentStats { segment_id: label as u32, area_pixels: pixels.len(), bands: band_stats })
        })
        .collect()
}
