use std::collections::BTreeMap;

use geo::orient::{Direction, Orient};
use geo::{Coord, MapCoords, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use georaster::{CoordTransformer, Crs, Raster};
use tracing::info;

use crate::attributes::segment_stats;
use crate::error::{ObiaError, Result};
use crate::polygonize::polygonize;
use crate::slic::{slic, SlicParams};

/// Segment `raster` with SLIC and return one feature per segment in
/// EPSG:4326 carrying its spectral attributes.
pub fn segment_raster(raster: &Raster, params: &SlicParams) -> Result<FeatureCollection> {
    let labels = slic(raster, params)?;
    let stats = segment_stats(&labels, raster.bands());

    let mut parts: BTreeMap<u32, Vec<Polygon<f64>>> = BTreeMap::new();
    for lp in polygonize(&labels) {
        parts.entry(lp.label).or_default().push(lp.polygon);
    }

    let to_wgs84 = CoordTransformer::new(raster.crs(), Crs::WGS84)?;
    let gt = *raster.transform();
    let project = |c: Coord<f64>| -> Result<Coord<f64>> {
        let (x, y) = gt.apply(c.x, c.y);
        let (lon, lat) = to_wgs84.transform(x, y)?;
        Ok(Coord { x: lon, y: lat })
    };

    let mut features = Vec::with_capacity(stats.len());
    for s in &stats {
        let Some(polys) = parts.remove(&s.segment_id) else {
            continue;
        };
        let polys = polys
            .iter()
            .map(|p| Ok(p.try_map_coords(&project)?.orient(Direction::Default)))
            .collect::<Result<Vec<_>>>()?;
        let value = match <[Polygon<f64>; 1]>::try_from(polys) {
            Ok([single]) => Value::from(&single),
            Err(many) => Value::from(&MultiPolygon::new(many)),
        };
        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: Some(geojson::feature::Id::Number(s.segment_id.into())),
            properties: Some(s.to_properties()),
            foreign_members: None,
        });
    }

    if features.is_empty() {
        return Err(ObiaError::EmptyResult("segmentation produced no polygons".into()));
    }
    info!(segments = features.len(), crs = %raster.crs(), "segmented raster");

    Ok(FeatureCollection { bbox: None, features, foreign_members: None })
}
