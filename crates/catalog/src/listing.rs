//! Directory scans over generated GeoJSON artefacts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::Layout;
use crate::schema::ArtifactItem;

/// Files in `dir` (not recursive) ending in `suffix` and starting with
/// `prefix`, sorted by name. A missing directory lists as empty.
fn files_matching(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_file() && !name.starts_with('.') && name.starts_with(prefix) && name.ends_with(suffix) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

fn item(layout: &Layout, path: &Path, has_samples: Option<bool>) -> Option<ArtifactItem> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let id = path.file_stem()?.to_string_lossy().into_owned();
    let url = layout.results_url(path)?;
    Some(ArtifactItem { id, name, url, has_samples })
}

fn has_any_samples(layout: &Layout, stem: &str) -> bool {
    layout.results.join(format!("samples_{stem}.json")).exists() || layout.samples.join(format!("{stem}.json")).exists()
}

/// Every GeoJSON under `segments/`, `classify/` and the results root,
/// flagged with whether a sample set exists for its stem.
pub fn list_geojsons(layout: &Layout) -> Result<Vec<ArtifactItem>> {
    let mut out = Vec::new();
    for dir in [&layout.segments, &layout.classify, &layout.results] {
        for p in files_matching(dir, "", ".geojson")? {
            let stem = p.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            out.extend(item(layout, &p, Some(has_any_samples(layout, &stem))));
        }
    }
    Ok(out)
}

/// Segment layers: `segments/*.geojson` plus `segment_*.geojson` in the
/// results root.
pub fn list_segments(layout: &Layout) -> Result<Vec<ArtifactItem>> {
    let mut paths = files_matching(&layout.segments, "", ".geojson")?;
    paths.extend(files_matching(&layout.results, "segment_", ".geojson")?);
    Ok(paths.iter().filter_map(|p| item(layout, p, None)).collect())
}

/// Segment layers with a sample set in `samples/`.
pub fn list_segments_with_samples(layout: &Layout) -> Result<Vec<ArtifactItem>> {
    Ok(list_segments(layout)?
        .into_iter()
        .filter(|it| {
            layout.samples.join(format!("{}.json", it.id)).exists()
                || layout.samples.join(format!("samples_{}.json", it.id)).exists()
        })
        .collect())
}
