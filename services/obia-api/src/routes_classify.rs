use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use catalog::{classified_filename, SampleSet};
use geojson::JsonObject;
use obia::{classify, ClassifierKind, ObiaError};
use serde_json::{json, Value};
use tracing::info;

use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::form::FormFields;
use crate::layers::{check_file_name, read_collection, write_collection};
use crate::state::SharedState;

fn parse_params(raw: Option<&str>) -> Result<JsonObject, ApiError> {
    let Some(raw) = raw else {
        return Ok(JsonObject::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::bad_request("params must be a JSON object")),
    }
}

fn classification_error(e: ObiaError) -> ApiError {
    let e = ApiError::from(e);
    if e.status == StatusCode::BAD_REQUEST {
        e
    } else {
        ApiError::internal(format!("classification failed: {}", e.message))
    }
}

/// `POST /classify`: train on the samples saved for `segment_id` and label
/// every segment of that layer.
pub async fn classify_segments(State(st): State<SharedState>, form: FormFields) -> Result<Json<Value>, ApiError> {
    let segment_id = form.require("segment_id")?.to_string();
    check_file_name(&segment_id)?;
    let method = form.get_or("method", "rf").to_string();
    let params = parse_params(form.get("params"))?;

    let layout = st.layout.clone();
    let sid = segment_id.clone();
    let (out_name, outcome) = run_blocking(move || {
        let segment_path = layout.segment_path(&sid);
        if !segment_path.is_file() {
            return Err(ApiError::not_found(format!("Segment not found: {sid}")));
        }
        let samples = SampleSet::load(&layout, &sid)?
            .ok_or_else(|| ApiError::not_found(format!("Samples not found: {sid}")))?;
        let collection = read_collection(&segment_path)?;
        let kind: ClassifierKind = method.parse().map_err(classification_error)?;

        let outcome = classify(&collection, &samples.samples, kind, &params).map_err(classification_error)?;
        let out_name = classified_filename(&sid);
        write_collection(&layout.classify.join(&out_name), &outcome.collection)?;
        Ok((out_name, outcome))
    })
    .await?;

    info!(segment = %segment_id, output = %out_name, accuracy = ?outcome.accuracy, "classification saved");
    let mut body = json!({
        "geojson": outcome.collection,
        "geojson_url": format!("/results/classify/{out_name}"),
        "accuracy": outcome.accuracy,
        "classes": outcome.classes,
    });
    if let Some(importances) = outcome.feature_importances {
        body["feature_importances"] = importances.into_iter().map(|(k, v)| (k, json!(v))).collect::<JsonObject>().into();
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_must_be_an_object() {
        assert!(parse_params(None).unwrap().is_empty());
        assert_eq!(parse_params(Some(r#"{"n_neighbors": 3}"#)).unwrap()["n_neighbors"], json!(3));
        assert!(parse_params(Some("[1]")).is_err());
        assert!(parse_params(Some("{")).is_err());
    }

    #[test]
    fn failures_are_prefixed_unless_client_errors() {
        let e = classification_error(ObiaError::InvalidInput("no samples provided".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        let e = classification_error(ObiaError::EmptyResult("nothing".into()));
        assert!(e.message.starts_with("classification failed: "));
    }
}
