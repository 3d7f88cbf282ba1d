use axum::extract::State;
use axum::Json;
use catalog::reserve_segment_filename;
use obia::{segment_raster, SlicParams};
use serde_json::{json, Value};
use tracing::info;

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::form::FormFields;
use crate::layers::write_collection;
use crate::state::SharedState;

/// `POST /segment`: SLIC superpixels of a raster as a GeoJSON layer under
/// `results/segments/`.
pub async fn segment(State(st): State<SharedState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    let raster_id = form.require("raster_id")?.to_string();
    let scale = form.require_f64("scale")?;
    let compactness = form.require_f64("compactness")?;
    let params = SlicParams::new(scale, compactness);
    params.validate()?;

    let record = st
        .record(&raster_id)
        .await?
        .ok_or_else(|| ApiError::not_found("raster_id not found"))?;
    let raster = st.raster(&record).await?;

    let layout = st.layout.clone();
    let (fname, collection) = run_blocking(move || {
        let collection = segment_raster(&raster, &params)?;
        let fname = reserve_segment_filename(&layout.segments, &record.name, scale, compactness)?;
        let path = layout.segments.join(&fname);
        if let Err(e) = write_collection(&path, &collection) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        Ok::<_, ApiError>((fname, collection))
    })
    .await?;

    let id = fname.trim_end_matches(".geojson").to_string();
    info!(raster = %raster_id, segment = %id, features = collection.features.len(), "segmentation saved");
    Ok(Json(json!({
        "id": id,
        "geojson": collection,
        "geojson_url": format!("/results/segments/{fname}"),
    })))
}
