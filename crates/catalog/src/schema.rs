use serde::{Deserialize, Serialize};

/// One uploaded raster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterRecord {
    pub id: String,
    /// Display name, unique across the catalog.
    pub name: String,
    pub path: String,
    /// blake3 of the file content, hex encoded. Older catalogs call it `sha1`.
    #[serde(alias = "sha1", default)]
    pub content_hash: String,
}

/// On-disk shape of the catalog file: `{"items": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterList {
    #[serde(default)]
    pub items: Vec<RasterRecord>,
}

/// Listing entry for `GET /rasters`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RasterSummary {
    pub id: String,
    pub name: String,
    pub size_mb: f64,
}

/// A generated GeoJSON file as exposed through the listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactItem {
    /// File stem.
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_samples: Option<bool>,
}

/// New raster id: UUID v4 in 32-char hex form.
pub fn new_raster_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
