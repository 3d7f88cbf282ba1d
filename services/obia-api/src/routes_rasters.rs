use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use catalog::{basename, downsampled_name, split_ext, Ingested};
use georaster::Raster;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::form::FormFields;
use crate::state::SharedState;

const UPLOAD_EXTS: [&str; 2] = [".tif", ".tiff"];
const MAX_ZOOM: u32 = 22;

fn ingested_json(ingested: &Ingested) -> Value {
    let mut body = json!({ "id": ingested.record.id, "name": ingested.record.name });
    if ingested.dedup {
        body["dedup"] = Value::Bool(true);
    }
    body
}

fn tmp_upload_path(uploads: &FsPath, ext: &str) -> PathBuf {
    uploads.join(format!("tmp_{}{ext}", uuid::Uuid::new_v4().simple()))
}

/// Decode `path` and check its footprint reprojects to WGS84, so nothing is
/// catalogued that cannot be tiled or segmented.
fn open_checked(path: &FsPath) -> Result<Raster, ApiError> {
    let unsupported = |e: georaster::RasterError| ApiError::bad_request(format!("unsupported raster: {e}"));
    let raster = Raster::open(path).map_err(unsupported)?;
    raster.bounds_wgs84().map_err(unsupported)?;
    Ok(raster)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn list_rasters(State(st): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let catalog = st.catalog.clone();
    let rasters = run_blocking(move || catalog.summaries()).await?;
    Ok(Json(json!({ "rasters": rasters })))
}

pub async fn upload_raster(State(st): State<SharedState>, mut mp: Multipart) -> Result<Json<Value>, ApiError> {
    while let Some(mut field) = mp.next_field().await.map_err(|e| ApiError::bad_request(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = basename(field.file_name().unwrap_or_default()).to_string();
        let ext = split_ext(&filename).1.to_lowercase();
        if !UPLOAD_EXTS.contains(&ext.as_str()) {
            return Err(ApiError::bad_request("Only .tif/.tiff allowed."));
        }

        let tmp = tmp_upload_path(&st.layout.uploads, &ext);
        let mut out = tokio::fs::File::create(&tmp).await?;
        let copied = async {
            while let Some(chunk) = field.chunk().await.map_err(|e| ApiError::bad_request(e.to_string()))? {
                out.write_all(&chunk).await?;
            }
            out.flush().await?;
            Ok::<_, ApiError>(())
        }
        .await;
        drop(out);
        if let Err(e) = copied {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        let catalog = st.catalog.clone();
        let uploads = st.layout.uploads.clone();
        let tmp_for_task = tmp.clone();
        let ingested = run_blocking(move || {
            let raster = open_checked(&tmp_for_task)?;
            let ingested = catalog.ingest(&uploads, &tmp_for_task, &filename)?;
            Ok::<_, ApiError>((ingested, raster))
        })
        .await;
        let (ingested, raster) = match ingested {
            Ok(i) => i,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                if e.status.is_client_error() {
                    warn!(error = %e.message, "upload rejected");
                }
                return Err(e);
            }
        };
        st.forget(&ingested.record.id).await;
        if !ingested.dedup {
            st.remember(&ingested.record.id, Arc::new(raster)).await;
        }
        return Ok(Json(ingested_json(&ingested)));
    }
    Err(ApiError::bad_request("file is required"))
}

pub async fn raster_status(State(st): State<SharedState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let record = st.record(&id).await?.ok_or_else(|| ApiError::not_found("raster not found"))?;

    let bounds = match st.raster(&record).await {
        Ok(raster) => match raster.bounds_wgs84() {
            Ok(b) => Some(b.to_array()),
            Err(e) => {
                warn!(id = %id, error = %e, "bounds not reprojectable");
                None
            }
        },
        Err(e) => {
            warn!(id = %id, error = %e, "raster unreadable");
            None
        }
    };

    Ok(Json(json!({
        "status": { "state": "done" },
        "tile_url": format!("/tiles/{id}/{{z}}/{{x}}/{{y}}.png"),
        "zooms": (0..=MAX_ZOOM).collect::<Vec<_>>(),
        "bounds": bounds,
    })))
}

pub async fn delete_raster(State(st): State<SharedState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let catalog = st.catalog.clone();
    let rid = id.clone();
    let removed = run_blocking(move || {
        let removed = catalog.remove(&rid)?;
        if let Some(record) = &removed {
            if let Err(e) = std::fs::remove_file(&record.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %record.path, error = %e, "raster file not removed");
                }
            }
        }
        Ok::<_, catalog::CatalogError>(removed)
    })
    .await?;
    st.forget(&id).await;

    if let Some(record) = &removed {
        info!(id = %record.id, name = %record.name, "raster deleted");
    }
    Ok(Json(json!({ "deleted": removed.is_some() })))
}

/// Resample raster `id` by `factor` and register the result as a new raster.
pub async fn downsample_raster(
    State(st): State<SharedState>,
    Path(id): Path<String>,
    form: FormFields,
) -> Result<Json<Value>, ApiError> {
    let factor = form.require_f64("factor")?;
    if factor <= 0.0 {
        return Err(ApiError::bad_request("factor must be positive"));
    }
    let record = st.record(&id).await?.ok_or_else(|| ApiError::not_found("raster not found"))?;
    let raster = st.raster(&record).await?;

    let name = downsampled_name(&record.name, factor);
    let tmp = tmp_upload_path(&st.layout.uploads, split_ext(&name).1);
    let catalog = st.catalog.clone();
    let uploads = st.layout.uploads.clone();
    let ingested = run_blocking(move || {
        let small = raster.downsample(factor)?;
        if let Err(e) = small.write_geotiff(&tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(ApiError::from(e));
        }
        catalog.ingest(&uploads, &tmp, &name).map_err(ApiError::from)
    })
    .await?;

    info!(source = %id, id = %ingested.record.id, factor, "raster downsampled");
    let mut body = ingested_json(&ingested);
    body["source_id"] = Value::String(id);
    Ok(Json(body))
}
