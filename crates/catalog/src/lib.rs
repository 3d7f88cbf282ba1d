//! File-backed bookkeeping for rasters and generated artefacts.

mod delete;
mod error;
mod layout;
mod listing;
mod naming;
mod samples;
mod schema;
mod store;

pub use delete::{delete_by_name, delete_candidates, DELETABLE_EXTS};
pub use error::{CatalogError, Result};
pub use layout::{Layout, METADATA_FILE};
pub use listing::{list_geojsons, list_segments, list_segments_with_samples};
pub use naming::{
    basename, classified_filename, downsampled_name, format_g6, merged_filename, reserve_segment_filename,
    sanitize_base, split_ext, unique_display_name,
};
pub use samples::SampleSet;
pub use schema::{new_raster_id, ArtifactItem, RasterList, RasterRecord, RasterSummary};
pub use store::{hash_file, Ingested, RasterCatalog};
