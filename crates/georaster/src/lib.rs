//! Georeferenced raster access for the OBIA service.
//!
//! Decodes GeoTIFFs into memory, reprojects extents, samples windows and
//! renders web-map tiles with a percentile stretch.

mod crs;
mod dataset;
mod error;
mod geo_transform;
mod geotiff;
mod stats;
mod tile;

pub use crs::{transform_bounds, CoordTransformer, Crs, EPSG_WEB_MERCATOR, EPSG_WGS84};
pub use dataset::{Raster, DENSIFY_PTS};
pub use error::{RasterError, Result};
pub use geo_transform::{Bounds, GeoTransform, Window};
pub use stats::{compute_render_stats, percentile, render_bands, RenderStats};
pub use tile::{encode_png, render_tile, tile_bounds_wgs84, TILE_SIZE, TRANSPARENT_PNG};
