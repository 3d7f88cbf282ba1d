use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use bytes::Bytes;
use serde_json::Value;

use crate::error::ApiError;

/// Text fields of a form-like request: `multipart/form-data`,
/// `application/x-www-form-urlencoded` or a JSON object body. Query
/// parameters fill in keys the body does not set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields(pub HashMap<String, String>);

impl FormFields {
    /// Trimmed value of `key`, `None` when absent or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn require(&self, key: &str) -> Result<&str, ApiError> {
        self.get(key).ok_or_else(|| ApiError::bad_request(format!("{key} is required")))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, ApiError> {
        let raw = self.require(key)?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ApiError::bad_request(format!("{key} must be a number, got {raw:?}")))
    }

    fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;
        let Value::Object(map) = value else {
            return Err(ApiError::bad_request("JSON body must be an object"));
        };
        let fields = map
            .into_iter()
            .filter_map(|(k, v)| {
                let text = match v {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((k, text))
            })
            .collect();
        Ok(Self(fields))
    }

    async fn from_multipart(mut mp: Multipart) -> Result<Self, ApiError> {
        let mut fields = HashMap::new();
        while let Some(field) = mp.next_field().await.map_err(|e| ApiError::bad_request(e.to_string()))? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                continue;
            }
            let text = field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
            fields.insert(name, text);
        }
        Ok(Self(fields))
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map(|q| q.0)
            .unwrap_or_default();
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut fields = if content_type.starts_with("multipart/form-data") {
            let mp = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Self::from_multipart(mp).await?
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(map) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Self(map)
        } else if content_type.contains("json") {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Self::from_json(&body)?
        } else {
            Self::default()
        };

        for (k, v) in query {
            fields.0.entry(k).or_insert(v);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(req: axum::http::Request<Body>) -> Result<FormFields, ApiError> {
        FormFields::from_request(req, &()).await
    }

    #[tokio::test]
    async fn urlencoded_body() {
        let req = axum::http::Request::post("/segment")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("raster_id=abc&scale=12.5&compactness=%201%20"))
            .unwrap();
        let f = extract(req).await.unwrap();
        assert_eq!(f.get("raster_id"), Some("abc"));
        assert_eq!(f.require_f64("scale").unwrap(), 12.5);
        assert_eq!(f.require_f64("compactness").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn json_body_and_query() {
        let req = axum::http::Request::post("/delete?name=from_query&extra=q")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name": "segment_a", "params": {"n_neighbors": 3}, "skip": null}"#))
            .unwrap();
        let f = extract(req).await.unwrap();
        assert_eq!(f.get("name"), Some("segment_a"));
        assert_eq!(f.get("extra"), Some("q"));
        assert_eq!(f.get("params"), Some(r#"{"n_neighbors":3}"#));
        assert_eq!(f.get("skip"), None);
    }

    #[tokio::test]
    async fn multipart_body() {
        let body = "--XX\r\n\
Content-Disposition: form-data; name=\"segment_id\"\r\n\r\n\
segment_a_10_1\r\n\
--XX\r\n\
Content-Disposition: form-data; name=\"method\"\r\n\r\n\
knn\r\n\
--XX--\r\n";
        let req = axum::http::Request::post("/classify")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XX")
            .body(Body::from(body))
            .unwrap();
        let f = extract(req).await.unwrap();
        assert_eq!(f.require("segment_id").unwrap(), "segment_a_10_1");
        assert_eq!(f.get_or("method", "rf"), "knn");
    }

    #[tokio::test]
    async fn missing_and_bad_values() {
        let req = axum::http::Request::post("/segment").body(Body::empty()).unwrap();
        let f = extract(req).await.unwrap();
        assert_eq!(f.require("raster_id").unwrap_err().message, "raster_id is required");

        let f = FormFields([("scale".to_string(), "big".to_string())].into_iter().collect());
        assert_eq!(f.require_f64("scale").unwrap_err().status, axum::http::StatusCode::BAD_REQUEST);

        let req = axum::http::Request::post("/delete")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("[1, 2]"))
            .unwrap();
        assert!(extract(req).await.is_err());
    }
}
