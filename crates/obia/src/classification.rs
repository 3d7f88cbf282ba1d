use std::collections::{BTreeMap, BTreeSet, HashMap};

use geojson::{FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::classifier::ClassifierKind;
use crate::error::{ObiaError, Result};
use crate::features::{canonical_id, feature_matrix, CLASS_FIELD};

/// Class label to the segment ids marked with it.
pub type Samples = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationOutcome {
    pub collection: FeatureCollection,
    /// Out-of-bag score for random forests, training accuracy otherwise.
    pub accuracy: Option<f64>,
    /// Per-column importance, for models that report it.
    pub feature_importances: Option<Vec<(String, f64)>>,
    pub classes: Vec<String>,
}

/// Map canonical segment id to class. A segment listed under several
/// labels keeps the last one in label order.
fn sample_lookup(samples: &Samples) -> HashMap<String, &str> {
    let mut lookup = HashMap::new();
    for (label, ids) in samples {
        for id in ids.iter().filter_map(canonical_id) {
            lookup.insert(id, label.as_str());
        }
    }
    lookup
}

/// Train `kind` on the sampled segments of `collection` and label every
/// segment with the predicted class in the `classification` property.
pub fn classify(
    collection: &FeatureCollection,
    samples: &Samples,
    kind: ClassifierKind,
    params: &JsonObject,
) -> Result<ClassificationOutcome> {
    let lookup = sample_lookup(samples);
    if lookup.is_empty() {
        return Err(ObiaError::InvalidInput("no samples provided".into()));
    }

    let matrix = feature_matrix(collection)?;
    let training: Vec<(usize, &str)> = matrix
        .segment_ids
        .iter()
        .enumerate()
        .filter_map(|(row, id)| id.as_ref().and_then(|id| lookup.get(id)).map(|&label| (row, label)))
        .collect();
    if training.is_empty() {
        return Err(ObiaError::InvalidInput("none of the sampled segments exist in the layer".into()));
    }

    let classes: Vec<String> = training
        .iter()
        .map(|&(_, l)| l)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    let class_index: HashMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

    let x: Vec<Vec<f64>> = training.iter().map(|&(row, _)| matrix.rows[row].clone()).collect();
    let y: Vec<usize> = training.iter().map(|&(_, l)| class_index[l]).collect();

    let mut model = kind.build(params)?;
    model.fit(&x, &y, classes.len())?;

    let accuracy = model.accuracy_estimate().or_else(|| {
        let hits = model.predict(&x).iter().zip(&y).filter(|(p, t)| p == t).count();
        Some(hits as f64 / y.len() as f64)
    });
    let feature_importances = model
        .feature_importances()
        .map(|imp| matrix.columns.iter().cloned().zip(imp).collect());

    let predicted = model.predict(&matrix.rows);
    let mut out = collection.clone();
    for (feature, class) in out.features.iter_mut().zip(predicted) {
        feature
            .properties
            .get_or_insert_with(JsonObject::new)
            .insert(CLASS_FIELD.into(), Value::String(classes[class].clone()));
    }

    info!(
        method = %kind,
        training = training.len(),
        classes = classes.len(),
        segments = out.features.len(),
        accuracy = ?accuracy,
        "classified segments"
    );

    Ok(ClassificationOutcome { collection: out, accuracy, feature_importances, classes })
}
