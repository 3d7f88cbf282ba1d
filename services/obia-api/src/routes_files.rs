use std::collections::HashSet;

use axum::extract::State;
use axum::Json;
use catalog::{basename, delete_by_name, list_geojsons, list_segments, list_segments_with_samples, merged_filename};
use obia::{merge_clean, ALL_CLASSES, CLASS_FIELD};
use serde_json::{json, Value};
use tracing::info;

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::form::FormFields;
use crate::layers::{check_file_name, read_collection, write_collection};
use crate::state::SharedState;

pub async fn geojsons(State(st): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let layout = st.layout.clone();
    let items = run_blocking(move || list_geojsons(&layout)).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn segments(State(st): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let layout = st.layout.clone();
    let segments = run_blocking(move || list_segments(&layout)).await?;
    Ok(Json(json!({ "segments": segments })))
}

/// Segment layers that have samples saved.
pub async fn segments_index(State(st): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let layout = st.layout.clone();
    let items = run_blocking(move || list_segments_with_samples(&layout)).await?;
    Ok(Json(json!({ "items": items })))
}

/// `POST /delete`: remove every artefact or upload called `name`.
pub async fn delete_file(State(st): State<SharedState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    let name = form.require("name")?.to_string();

    let layout = st.layout.clone();
    let catalog = st.catalog.clone();
    let (removed, live) = run_blocking(move || {
        let removed = delete_by_name(&layout, &catalog, &name)?;
        let live: HashSet<String> = catalog.list()?.into_iter().map(|r| r.id).collect();
        Ok::<_, catalog::CatalogError>((removed, live))
    })
    .await?;
    st.retain(&live).await;

    if removed.is_empty() {
        return Err(ApiError::not_found("file not found"));
    }
    let removed: Vec<String> = removed.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    info!(count = removed.len(), "files deleted");
    Ok(Json(json!({ "removed": removed })))
}

/// `POST /merge_clean`: dissolve a classified layer per class into
/// `<stem>_merged.geojson` next to it.
pub async fn merge_clean_layer(State(st): State<SharedState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    let filename = basename(form.require("filename")?).to_string();
    check_file_name(&filename)?;
    let filename = if filename.ends_with(".geojson") { filename } else { format!("{filename}.geojson") };
    let target = form.get_or("target_class", ALL_CLASSES).to_string();

    let layout = st.layout.clone();
    let (out_name, merged) = run_blocking(move || {
        let source = layout.classify.join(&filename);
        if !source.is_file() {
            return Err(ApiError::not_found(format!("file not found: {filename}")));
        }
        let merged = merge_clean(&read_collection(&source)?, CLASS_FIELD, &target)?;
        let out_name = merged_filename(&filename);
        write_collection(&layout.classify.join(&out_name), &merged)?;
        Ok((out_name, merged))
    })
    .await?;

    info!(output = %out_name, features = merged.features.len(), "merged layer saved");
    Ok(Json(json!({
        "geojson": merged,
        "geojson_url": format!("/results/classify/{out_name}"),
    })))
}
