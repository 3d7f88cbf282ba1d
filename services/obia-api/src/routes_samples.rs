use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use catalog::SampleSet;
use serde_json::{json, Value};
use tracing::info;

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::state::SharedState;

const REQUIRED: &str = "segment_id and samples required";

fn parse_sample_set(body: &[u8]) -> Result<SampleSet, ApiError> {
    let mut payload: Value = serde_json::from_slice(body).map_err(|_| ApiError::bad_request(REQUIRED))?;
    let segment_id = match payload.get("segment_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(ApiError::bad_request(REQUIRED)),
    };
    let samples = match payload.get_mut("samples").map(Value::take) {
        None => Default::default(),
        Some(v @ Value::Object(_)) => serde_json::from_value(v)
            .map_err(|e| ApiError::bad_request(format!("samples must map labels to id lists: {e}")))?,
        Some(_) => return Err(ApiError::bad_request(REQUIRED)),
    };
    Ok(SampleSet { segment_id, samples })
}

/// `POST /samples` with `{"segment_id": ..., "samples": {label: [ids]}}`.
pub async fn save_samples(State(st): State<SharedState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let set = parse_sample_set(&body)?;
    let layout = st.layout.clone();
    let (segment_id, labels) = (set.segment_id.clone(), set.samples.len());
    run_blocking(move || set.save(&layout)).await?;
    info!(segment = %segment_id, labels, "samples saved");
    Ok(Json(json!({ "saved": true })))
}
