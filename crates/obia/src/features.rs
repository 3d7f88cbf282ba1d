//! Numeric feature matrix built from segment properties.

use std::collections::BTreeSet;

use geojson::FeatureCollection;
use serde_json::Value;

use crate::error::{ObiaError, Result};

/// Property carrying the segment identifier.
pub const SEGMENT_ID: &str = "segment_id";
/// Property written by the classifier.
pub const CLASS_FIELD: &str = "classification";

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Canonical `segment_id` of each row, if the feature has one.
    pub segment_ids: Vec<Option<String>>,
}

impl FeatureMatrix {
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }
}

/// String form used to match segment ids from samples against features:
/// integral numbers print without a fractional part.
pub fn canonical_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

/// Every property holding a number on at least one feature becomes a
/// column (sorted by name), except the id and class fields. Missing or
/// non-numeric cells read as 0.
pub fn feature_matrix(fc: &FeatureCollection) -> Result<FeatureMatrix> {
    let columns: Vec<String> = fc
        .features
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(|p| p.iter())
        .filter(|(k, v)| v.is_number() && k.as_str() != SEGMENT_ID && k.as_str() != CLASS_FIELD)
        .map(|(k, _)| k.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if columns.is_empty() {
        return Err(ObiaError::InvalidInput("segments carry no numeric attributes".into()));
    }

    let mut rows = Vec::with_capacity(fc.features.len());
    let mut segment_ids = Vec::with_capacity(fc.features.len());
    for f in &fc.features {
        let props = f.properties.as_ref();
        rows.push(
            columns
                .iter()
                .map(|c| props.and_then(|p| p.get(c)).and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
        );
        segment_ids.push(props.and_then(|p| p.get(SEGMENT_ID)).and_then(canonical_id));
    }

    Ok(FeatureMatrix { columns, rows, segment_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_ids() {
        assert_eq!(canonical_id(&json!(7)).as_deref(), Some("7"));
        assert_eq!(canonical_id(&json!(7.0)).as_deref(), Some("7"));
        assert_eq!(canonical_id(&json!(" 7 ")).as_deref(), Some("7"));
        assert_eq!(canonical_id(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(canonical_id(&json!(null)), None);
    }

    #[test]
    fn matrix_columns_are_sorted_and_filled() {
        let fc: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": null,
                 "properties": {"segment_id": 1, "b": 2.0, "a": 1.0, "name": "x"}},
                {"type": "Feature", "geometry": null,
                 "properties": {"segment_id": 2, "a": 3.0, "classification": "roof"}}
            ]
        }))
        .unwrap();

        let m = feature_matrix(&fc).unwrap();
        assert_eq!(m.columns, vec!["a", "b"]);
        assert_eq!(m.rows, vec![vec![1.0, 2.0], vec![3.0, 0.0]]);
        assert_eq!(m.segment_ids, vec![Some("1".into()), Some("2".into())]);
    }
}
