use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::layout::Layout;
use crate::naming::basename;

/// User-labelled segments of one segmentation result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub segment_id: String,
    /// Class label to segment ids.
    pub samples: BTreeMap<String, Vec<Value>>,
}

impl SampleSet {
    /// Legacy location `results/samples_<id>.json`.
    pub fn legacy_path(layout: &Layout, segment_id: &str) -> PathBuf {
        layout.results.join(format!("samples_{segment_id}.json"))
    }

    /// Canonical location `results/samples/<id>.json`.
    pub fn canonical_path(layout: &Layout, segment_id: &str) -> PathBuf {
        layout.samples.join(format!("{segment_id}.json"))
    }

    fn check_id(segment_id: &str) -> Result<()> {
        if segment_id.is_empty() || basename(segment_id) != segment_id || segment_id.starts_with('.') {
            return Err(CatalogError::InvalidName(segment_id.to_string()));
        }
        Ok(())
    }

    /// Write to both the legacy and the canonical path.
    pub fn save(&self, layout: &Layout) -> Result<()> {
        Self::check_id(&self.segment_id)?;
        let body = serde_json::to_vec_pretty(self)?;
        fs::write(Self::legacy_path(layout, &self.segment_id), &body)?;
        fs::write(Self::canonical_path(layout, &self.segment_id), &body)?;
        Ok(())
    }

    /// Load from the canonical path, falling back to the legacy one. A
    /// file holding a bare label map instead of `{"samples": ...}` is accepted.
    pub fn load(layout: &Layout, segment_id: &str) -> Result<Option<SampleSet>> {
        Self::check_id(segment_id)?;
        for path in [Self::canonical_path(layout, segment_id), Self::legacy_path(layout, segment_id)] {
            let text = match fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut payload: Value = serde_json::from_str(&text)?;
            let samples = match payload.get_mut("samples") {
                Some(inner) => inner.take(),
                None => payload,
            };
            let samples = serde_json::from_value(samples)?;
            return Ok(Some(SampleSet { segment_id: segment_id.to_string(), samples }));
        }
        Ok(None)
    }
}
