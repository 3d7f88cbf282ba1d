use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObiaError {
    #[error("Raster error: {0}")]
    Raster(#[from] georaster::RasterError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported method. Use one of: rf | svm | knn")]
    UnsupportedMethod(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),
}

pub type Result<T> = std::result::Result<T, ObiaError>;
