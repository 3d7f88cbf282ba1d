use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const METADATA_FILE: &str = "_rasters.json";

/// Directory layout under the data root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub uploads: PathBuf,
    pub results: PathBuf,
    pub segments: PathBuf,
    pub classify: PathBuf,
    pub samples: PathBuf,
}

impl Layout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let results = root.join("results");
        Self {
            uploads: root.join("uploads"),
            segments: results.join("segments"),
            classify: results.join("classify"),
            samples: results.join("samples"),
            results,
        }
    }

    /// Create every directory and an empty catalog file if missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.uploads, &self.results, &self.segments, &self.classify, &self.samples] {
            fs::create_dir_all(dir)?;
        }
        let meta = self.metadata_path();
        if !meta.exists() {
            fs::write(&meta, b"{\n  \"items\": []\n}")?;
        }
        Ok(())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.uploads.join(METADATA_FILE)
    }

    pub fn segment_path(&self, segment_id: &str) -> PathBuf {
        self.segments.join(format!("{segment_id}.geojson"))
    }

    /// Public URL of a file under `results/`, `None` outside it.
    pub fn results_url(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.results).ok()?;
        let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        Some(format!("/results/{}", parts.join("/")))
    }
}
