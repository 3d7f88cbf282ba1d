use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CatalogError, Result};
use crate::layout::Layout;
use crate::naming::{basename, split_ext};
use crate::store::RasterCatalog;

pub const DELETABLE_EXTS: [&str; 7] = [".geojson", ".json", ".tif", ".tiff", ".png", ".jpg", ".jpeg"];
const RASTER_EXTS: [&str; 5] = [".tif", ".tiff", ".png", ".jpg", ".jpeg"];

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// File names tried for a client-supplied `name`: its basename when the
/// extension is deletable, otherwise the basename with each deletable
/// extension appended.
pub fn delete_candidates(name: &str) -> Result<Vec<String>> {
    let base = basename(name.trim());
    if base.is_empty() || base == "." || base == ".." {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    let (_, ext) = split_ext(base);
    if !ext.is_empty() && DELETABLE_EXTS.contains(&ext.to_lowercase().as_str()) {
        Ok(vec![base.to_string()])
    } else {
        Ok(DELETABLE_EXTS.iter().map(|e| format!("{base}{e}")).collect())
    }
}

/// Delete matching files from every direct subdirectory of `results/`,
/// from `uploads/` and its direct subdirectories. Rasters removed from the
/// uploads tree are pruned from the catalog. Returns the removed paths.
pub fn delete_by_name(layout: &Layout, catalog: &RasterCatalog, name: &str) -> Result<Vec<PathBuf>> {
    let candidates = delete_candidates(name)?;

    let mut scan = subdirs(&layout.results)?;
    if layout.uploads.is_dir() {
        scan.push(layout.uploads.clone());
        scan.extend(subdirs(&layout.uploads)?);
    }

    let metadata = layout.metadata_path();
    let mut removed = Vec::new();
    let mut upload_rasters = HashSet::new();
    for dir in &scan {
        for cand in &candidates {
            let p = dir.join(cand);
            if !p.is_file() || p == metadata {
                continue;
            }
            fs::remove_file(&p)?;
            info!(path = %p.display(), "deleted file");
            let (_, ext) = split_ext(cand);
            if p.starts_with(&layout.uploads) && RASTER_EXTS.contains(&ext.to_lowercase().as_str()) {
                upload_rasters.insert(cand.clone());
            }
            removed.push(p);
        }
    }

    if !upload_rasters.is_empty() {
        catalog.prune_names(&upload_rasters)?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_for_names() {
        assert_eq!(delete_candidates("a/b/x.geojson").unwrap(), vec!["x.geojson"]);
        assert_eq!(delete_candidates("x.GeoJSON").unwrap(), vec!["x.GeoJSON"]);
        let c = delete_candidates("segment_a").unwrap();
        assert_eq!(c.len(), DELETABLE_EXTS.len());
        assert_eq!(c[0], "segment_a.geojson");
        assert_eq!(delete_candidates("v1.2").unwrap()[0], "v1.2.geojson");
        assert!(delete_candidates("../").is_err());
    }
}
