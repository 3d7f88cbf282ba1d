use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use georaster::{encode_png, render_tile, TRANSPARENT_PNG};
use tracing::debug;

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::state::{AppState, SharedState};

fn png(bytes: Vec<u8>) -> Response {
    ([(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "no-cache")], bytes).into_response()
}

async fn render(st: &AppState, id: &str, record: &catalog::RasterRecord, z: u32, x: u32, y: u32) -> Result<Vec<u8>, ApiError> {
    let raster = st.raster(record).await?;
    let stats = st.render_stats(id, raster.clone()).await?;
    run_blocking(move || {
        let img = render_tile(&raster, &stats, z, x, y)?;
        encode_png(&img)
    })
    .await
}

/// `GET /tiles/{id}/{z}/{x}/{y}.png`. Unknown rasters are a 404; any
/// failure while rendering yields a transparent pixel.
pub async fn tile_png(
    State(st): State<SharedState>,
    Path((id, z, x, y)): Path<(String, u32, u32, String)>,
) -> Result<Response, ApiError> {
    let y: u32 = y
        .strip_suffix(".png")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::not_found("tile not found"))?;
    let record = st.record(&id).await?.ok_or_else(|| ApiError::not_found("raster not found"))?;

    match render(&st, &id, &record, z, x, y).await {
        Ok(bytes) => Ok(png(bytes)),
        Err(e) => {
            debug!(id = %id, z, x, y, error = %e.message, "tile fell back to transparent");
            Ok(png(TRANSPARENT_PNG.to_vec()))
        }
    }
}
