use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::Result;
use crate::naming::{basename, unique_display_name};
use crate::schema::{new_raster_id, RasterList, RasterRecord, RasterSummary};

const HASH_CHUNK: usize = 1024 * 1024;

/// blake3 of a file, streamed in 1 MiB chunks.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Result of registering an uploaded file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ingested {
    pub record: RasterRecord,
    /// True when identical content was already catalogued; the upload was discarded.
    pub dedup: bool,
}

/// Raster metadata kept in a single JSON file. Every call re-reads the
/// file; writers are serialised by an internal lock.
#[derive(Debug)]
pub struct RasterCatalog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RasterCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<RasterList> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RasterList::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, list: &RasterList) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(list)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<RasterRecord>> {
        let _g = self.guard();
        Ok(self.load()?.items)
    }

    pub fn find(&self, id: &str) -> Result<Option<RasterRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Record for `id` whose file still exists.
    pub fn find_existing(&self, id: &str) -> Result<Option<RasterRecord>> {
        Ok(self.find(id)?.filter(|r| Path::new(&r.path).exists()))
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Option<RasterRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.content_hash == hash))
    }

    pub fn add(&self, record: RasterRecord) -> Result<()> {
        let _g = self.guard();
        let mut list = self.load()?;
        list.items.push(record);
        self.save(&list)
    }

    /// Remove a record by id, returning it.
    pub fn remove(&self, id: &str) -> Result<Option<RasterRecord>> {
        let _g = self.guard();
        let mut list = self.load()?;
        let Some(pos) = list.items.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let removed = list.items.remove(pos);
        self.save(&list)?;
        Ok(Some(removed))
    }

    /// Drop records whose display name or file name is in `names`.
    pub fn prune_names(&self, names: &HashSet<String>) -> Result<Vec<RasterRecord>> {
        let _g = self.guard();
        let mut list = self.load()?;
        let (pruned, keep): (Vec<_>, Vec<_>) = list
            .items
            .into_iter()
            .partition(|r| names.contains(&r.name) || names.contains(basename(&r.path)));
        list.items = keep;
        if !pruned.is_empty() {
            self.save(&list)?;
            debug!(count = pruned.len(), "pruned raster records");
        }
        Ok(pruned)
    }

    /// Listing of catalogued rasters whose file exists, sizes in MiB
    /// rounded to two decimals.
    pub fn summaries(&self) -> Result<Vec<RasterSummary>> {
        Ok(self
            .list()?
            .into_iter()
            .filter_map(|r| {
                let size = fs::metadata(&r.path).ok()?.len() as f64;
                let size_mb = (size / (1024.0 * 1024.0) * 100.0).round() / 100.0;
                Some(RasterSummary { id: r.id, name: r.name, size_mb })
            })
            .collect())
    }

    /// Catalogue a file already written to `tmp` inside `uploads`: when its
    /// content hash is known the file is deleted and the existing record
    /// returned, otherwise it is renamed to a unique display name derived
    /// from `filename`.
    pub fn ingest(&self, uploads: &Path, tmp: &Path, filename: &str) -> Result<Ingested> {
        let hash = hash_file(tmp)?;

        let _g = self.guard();
        let mut list = self.load()?;
        if let Some(existing) = list.items.iter().find(|r| r.content_hash == hash) {
            fs::remove_file(tmp)?;
            info!(id = %existing.id, name = %existing.name, "duplicate upload");
            return Ok(Ingested { record: existing.clone(), dedup: true });
        }

        let names: Vec<&str> = list.items.iter().map(|r| r.name.as_str()).collect();
        let name = unique_display_name(basename(filename), &names);
        let final_path = uploads.join(&name);
        fs::rename(tmp, &final_path)?;

        let record = RasterRecord {
            id: new_raster_id(),
            name,
            path: final_path.to_string_lossy().into_owned(),
            content_hash: hash,
        };
        list.items.push(record.clone());
        self.save(&list)?;
        info!(id = %record.id, name = %record.name, "raster registered");
        Ok(Ingested { record, dedup: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;

    fn setup() -> (tempfile::TempDir, Layout, RasterCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure().unwrap();
        let catalog = RasterCatalog::new(layout.metadata_path());
        (dir, layout, catalog)
    }

    fn upload(layout: &Layout, catalog: &RasterCatalog, name: &str, bytes: &[u8]) -> Ingested {
        let tmp = layout.uploads.join(format!("tmp_{}", new_raster_id()));
        fs::write(&tmp, bytes).unwrap();
        catalog.ingest(&layout.uploads, &tmp, name).unwrap()
    }

    #[test]
    fn ingest_dedups_by_content() {
        let (_dir, layout, catalog) = setup();
        let a = upload(&layout, &catalog, "ortho.tif", b"one");
        assert!(!a.dedup);
        assert!(Path::new(&a.record.path).exists());

        let b = upload(&layout, &catalog, "copy.tif", b"one");
        assert!(b.dedup);
        assert_eq!(b.record.id, a.record.id);
        assert_eq!(catalog.list().unwrap().len(), 1);
        // only the catalog file and the first upload remain
        assert_eq!(fs::read_dir(&layout.uploads).unwrap().count(), 2);
    }

    #[test]
    fn same_name_different_content_is_numbered() {
        let (_dir, layout, catalog) = setup();
        upload(&layout, &catalog, "ortho.tif", b"one");
        let second = upload(&layout, &catalog, "ortho.tif", b"two");
        assert_eq!(second.record.name, "ortho 1.tif");
        assert!(layout.uploads.join("ortho 1.tif").exists());
    }

    #[test]
    fn remove_and_prune() {
        let (_dir, layout, catalog) = setup();
        let a = upload(&layout, &catalog, "a.tif", b"a");
        upload(&layout, &catalog, "b.tif", b"b");

        assert_eq!(catalog.remove(&a.record.id).unwrap().unwrap().name, "a.tif");
        assert!(catalog.remove(&a.record.id).unwrap().is_none());

        let pruned = catalog.prune_names(&HashSet::from(["b.tif".to_string()])).unwrap();
        assert_eq!(pruned.len(), 1);
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn summaries_skip_missing_files() {
        let (_dir, layout, catalog) = setup();
        let a = upload(&layout, &catalog, "a.tif", &vec![0u8; 1024 * 1024]);
        let b = upload(&layout, &catalog, "b.tif", b"b");
        fs::remove_file(&b.record.path).unwrap();

        let s = catalog.summaries().unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].id, a.record.id);
        assert_eq!(s[0].size_mb, 1.0);
        assert!(catalog.find_existing(&b.record.id).unwrap().is_none());
    }
}
