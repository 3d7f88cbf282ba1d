//! HTTP surface of the OBIA service.

pub mod blocking;
pub mod config;
pub mod error;
pub mod form;
pub mod layers;
pub mod routes_classify;
pub mod routes_files;
pub mod routes_rasters;
pub mod routes_samples;
pub mod routes_segments;
pub mod routes_tiles;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::{AppState, SharedState};

pub fn router(state: SharedState, max_body_bytes: usize) -> Router {
    let results = ServeDir::new(&state.layout.results);

    Router::new()
        .route("/health", get(routes_rasters::health))
        .route("/rasters", get(routes_rasters::list_rasters).post(routes_rasters::upload_raster))
        .route("/rasters/:id", delete(routes_rasters::delete_raster))
        .route("/rasters/:id/status", get(routes_rasters::raster_status))
        .route("/rasters/:id/downsample", post(routes_rasters::downsample_raster))
        .route("/tiles/:id/:z/:x/:y", get(routes_tiles::tile_png))
        .route("/segment", post(routes_segments::segment))
        .route("/geojsons", get(routes_files::geojsons))
        .route("/segments", get(routes_files::segments))
        .route("/segments_index", get(routes_files::segments_index))
        .route("/samples", post(routes_samples::save_samples))
        .route("/classify", post(routes_classify::classify_segments))
        .route("/merge_clean", post(routes_files::merge_clean_layer))
        .route("/delete", post(routes_files::delete_file))
        .nest_service("/results", results)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
