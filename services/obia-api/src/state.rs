use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use catalog::{Layout, RasterCatalog, RasterRecord};
use georaster::{compute_render_stats, Raster, RenderStats};
use moka::future::Cache;
use tracing::debug;

use crate::blocking::run_blocking;
use crate::error::ApiError;

pub type SharedState = Arc<AppState>;

const MIB: u64 = 1024 * 1024;
/// Stats are a few floats per band; this only bounds the id count.
const RENDER_STATS_ENTRIES: u64 = 4096;

pub struct AppState {
    pub layout: Layout,
    pub catalog: Arc<RasterCatalog>,
    /// Decoded rasters by id, weighed in MiB of band data.
    rasters: Cache<String, Arc<Raster>>,
    /// Percentile stretch by raster id, shared by all of its tiles.
    render_stats: Cache<String, Arc<RenderStats>>,
}

/// Decoded size of `raster` in whole MiB, at least 1.
fn weight_mib(raster: &Raster) -> u32 {
    let planes = raster.band_count() as u64 + u64::from(raster.alpha().is_some());
    let bytes = (raster.width() * raster.height()) as u64 * planes * 4;
    u32::try_from(bytes.div_ceil(MIB).max(1)).unwrap_or(u32::MAX)
}

impl AppState {
    /// Create the directory layout under `data_dir` and open its catalog.
    /// Decoded rasters are kept up to `raster_cache_mb` MiB in total.
    pub fn new(data_dir: impl Into<PathBuf>, raster_cache_mb: u64) -> catalog::Result<Self> {
        let layout = Layout::new(data_dir.into());
        layout.ensure()?;
        let catalog = Arc::new(RasterCatalog::new(layout.metadata_path()));
        let rasters = Cache::builder()
            .max_capacity(raster_cache_mb)
            .weigher(|_id: &String, raster: &Arc<Raster>| weight_mib(raster))
            .build();
        let render_stats = Cache::builder().max_capacity(RENDER_STATS_ENTRIES).build();
        Ok(Self { layout, catalog, rasters, render_stats })
    }

    /// Catalogued raster whose file still exists.
    pub async fn record(&self, id: &str) -> Result<Option<RasterRecord>, ApiError> {
        let catalog = self.catalog.clone();
        let id = id.to_string();
        run_blocking(move || catalog.find_existing(&id)).await
    }

    /// Decoded raster for `record`, decoding on first use. Concurrent misses
    /// for the same id share one decode.
    pub async fn raster(&self, record: &RasterRecord) -> Result<Arc<Raster>, ApiError> {
        let path = PathBuf::from(&record.path);
        let id = record.id.clone();
        let load = async move {
            let raster = run_blocking(move || Raster::open(path)).await?;
            debug!(%id, width = raster.width(), height = raster.height(), "raster decoded");
            Ok::<_, ApiError>(Arc::new(raster))
        };
        Ok(self.rasters.try_get_with(record.id.clone(), load).await?)
    }

    /// Put an already decoded raster in the cache.
    pub async fn remember(&self, id: &str, raster: Arc<Raster>) {
        self.rasters.insert(id.to_string(), raster).await;
    }

    /// Render statistics for raster `id`, computed once from `raster`.
    pub async fn render_stats(&self, id: &str, raster: Arc<Raster>) -> Result<Arc<RenderStats>, ApiError> {
        let key = id.to_string();
        let load = async move {
            let stats = run_blocking(move || compute_render_stats(&raster)).await?;
            debug!(id = %key, vmins = ?stats.vmins, vmaxs = ?stats.vmaxs, "render stats computed");
            Ok::<_, ApiError>(Arc::new(stats))
        };
        Ok(self.render_stats.try_get_with(id.to_string(), load).await?)
    }

    pub async fn forget(&self, id: &str) {
        self.rasters.invalidate(id).await;
        self.render_stats.invalidate(id).await;
    }

    /// Drop cached entries for rasters no longer in `live`.
    pub async fn retain(&self, live: &HashSet<String>) {
        let stale: HashSet<String> = self
            .rasters
            .iter()
            .map(|(id, _)| id)
            .chain(self.render_stats.iter().map(|(id, _)| id))
            .filter(|id| !live.contains(id.as_str()))
            .map(|id| id.to_string())
            .collect();
        for id in &stale {
            self.forget(id).await;
        }
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.rasters.contains_key(id) || self.render_stats.contains_key(id)
    }

    /// MiB of decoded rasters held after pending evictions have run.
    pub async fn cached_raster_mib(&self) -> u64 {
        self.rasters.run_pending_tasks().await;
        self.rasters.weighted_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georaster::{Crs, GeoTransform};

    #[test]
    fn weight_rounds_up_to_whole_mib() {
        let gt = GeoTransform::north_up(0.0, 10.0, 1.0, 1.0);
        let small = Raster::new(4, 4, vec![vec![0.0; 16]], gt, Crs::WGS84).unwrap();
        assert_eq!(weight_mib(&small), 1);
        // 3 bands of 512x512 f32 are exactly 3 MiB
        let big = Raster::new(512, 512, vec![vec![0.0; 512 * 512]; 3], gt, Crs::WGS84).unwrap();
        assert_eq!(weight_mib(&big), 3);
    }
}
