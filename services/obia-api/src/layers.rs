//! GeoJSON layers on disk.

use std::fs;
use std::path::Path;

use geojson::FeatureCollection;

use crate::error::ApiError;

pub fn read_collection(path: &Path) -> Result<FeatureCollection, ApiError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| ApiError::internal(format!("{} is not a FeatureCollection: {e}", path.display())))
}

/// Write atomically so a concurrent static read never sees half a layer.
pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<(), ApiError> {
    let tmp = path.with_extension("geojson.tmp");
    fs::write(&tmp, serde_json::to_vec(collection)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reject anything but a bare file name.
pub fn check_file_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.starts_with('.') || catalog::basename(name) != name {
        return Err(ApiError::bad_request(format!("invalid name: {name}")));
    }
    Ok(())
}
