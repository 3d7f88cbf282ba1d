//! Dissolve classified segments into one clean polygon set per class.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Geometry as GeoGeometry, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::features::canonical_id;

/// Target meaning every class.
pub const ALL_CLASSES: &str = "all";
const AREA_FIELD: &str = "area_pixels";

fn polygons_of(feature: &Feature) -> Result<Vec<Polygon<f64>>> {
    let Some(geometry) = &feature.geometry else {
        return Ok(Vec::new());
    };
    Ok(match GeoGeometry::<f64>::try_from(geometry.value.clone())? {
        GeoGeometry::Polygon(p) => vec![p],
        GeoGeometry::MultiPolygon(mp) => mp.0,
        _ => Vec::new(),
    })
}

/// Pairwise union in a balanced tree.
fn cascaded_union(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        parts = parts
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => a.union(b),
                [a] => a.clone(),
                _ => MultiPolygon::new(Vec::new()),
            })
            .collect();
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Union the polygons and keep only outer rings.
fn dissolve(polys: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
    let parts = polys.into_iter().map(|p| MultiPolygon::new(vec![p])).collect();
    cascaded_union(parts)
        .into_iter()
        .map(|p| Polygon::new(p.exterior().clone(), vec![]).orient(Direction::Default))
        .filter(|p| p.unsigned_area() > 0.0)
        .collect()
}

fn class_of<'a>(feature: &'a Feature, class_field: &str) -> Option<&'a Value> {
    feature.properties.as_ref()?.get(class_field).filter(|v| !v.is_null())
}

fn polygon_feature(polygon: &Polygon<f64>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoJsonValue::from(polygon))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Merge touching polygons of the same class. With `target` equal to
/// [`ALL_CLASSES`] every class is dissolved and only the class property is
/// kept; otherwise only the target class is dissolved and the remaining
/// features are passed through. Holes are dropped. When the input carried
/// `area_pixels`, it is recomputed as the planar area of each output
/// geometry. Unusable input is returned unchanged.
pub fn merge_clean(collection: &FeatureCollection, class_field: &str, target: &str) -> Result<FeatureCollection> {
    let has_class = collection.features.iter().any(|f| class_of(f, class_field).is_some());
    if collection.features.is_empty() || !has_class {
        warn!(class_field, "nothing to merge: empty layer or missing class column");
        return Ok(collection.clone());
    }
    let had_area = collection
        .features
        .iter()
        .any(|f| f.properties.as_ref().is_some_and(|p| p.contains_key(AREA_FIELD)));

    let mut features = Vec::new();
    if target == ALL_CLASSES {
        let mut classes: Vec<&Value> = Vec::new();
        for f in &collection.features {
            if let Some(c) = class_of(f, class_field) {
                if !classes.contains(&c) {
                    classes.push(c);
                }
            }
        }
        for class in classes {
            let mut polys = Vec::new();
            for f in collection.features.iter().filter(|f| class_of(f, class_field) == Some(class)) {
                polys.extend(polygons_of(f)?);
            }
            for p in dissolve(polys) {
                let mut props = JsonObject::new();
                props.insert(class_field.to_string(), class.clone());
                features.push(polygon_feature(&p, props));
            }
        }
    } else {
        let is_target = |f: &Feature| class_of(f, class_field).and_then(canonical_id).as_deref() == Some(target);
        let (targets, others): (Vec<&Feature>, Vec<&Feature>) = collection.features.iter().partition(|f| is_target(f));
        if targets.is_empty() {
            warn!(target, "no features of the target class");
            return Ok(collection.clone());
        }
        let class = class_of(targets[0], class_field).cloned().unwrap_or(Value::Null);
        let mut polys = Vec::new();
        for f in &targets {
            polys.extend(polygons_of(f)?);
        }
        for p in dissolve(polys) {
            let mut props = JsonObject::new();
            props.insert(class_field.to_string(), class.clone());
            features.push(polygon_feature(&p, props));
        }
        features.extend(others.into_iter().filter(|f| f.geometry.is_some()).cloned());
    }

    if had_area {
        for f in &mut features {
            let area = polygons_of(f)?.iter().map(|p| p.unsigned_area()).sum::<f64>();
            if let (Some(props), Some(n)) = (f.properties.as_mut(), serde_json::Number::from_f64(area)) {
                props.insert(AREA_FIELD.into(), Value::Number(n));
            }
        }
    }

    info!(input = collection.features.len(), output = features.len(), target, "merged classified polygons");
    Ok(FeatureCollection { bbox: None, features, foreign_members: None })
}
