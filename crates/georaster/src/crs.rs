//! Coordinate reference systems and point transforms.
//!
//! Every transform is routed through WGS84 lon/lat. Web Mercator is handled
//! with closed-form math; any other EPSG code is looked up in the
//! `crs-definitions` table and goes through proj4rs.

use std::f64::consts::PI;
use std::fmt;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};
use crate::geo_transform::Bounds;

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_ETRS89: u32 = 4258;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Half the earth's circumference in Web Mercator meters
const HALF_EARTH: f64 = 20_037_508.342_789_244;
/// Latitude limit of the Web Mercator square
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

const LONLAT_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS84: Crs = Crs(EPSG_WGS84);
    pub const WEB_MERCATOR: Crs = Crs(EPSG_WEB_MERCATOR);

    pub fn epsg(self) -> u32 {
        self.0
    }

    /// Lon/lat in degrees, either WGS84-equivalent or any `+proj=longlat`
    /// definition.
    pub fn is_geographic(self) -> bool {
        matches!(self.0, EPSG_WGS84 | EPSG_ETRS89)
            || self.proj_string().is_some_and(|def| def.contains("+proj=longlat"))
    }

    /// proj4 definition of this EPSG code, if it is a known one.
    pub fn proj_string(self) -> Option<&'static str> {
        let code = u16::try_from(self.0).ok()?;
        crs_definitions::from_code(code).map(|def| def.proj4)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// One side of a transform: native CRS <-> lon/lat degrees.
enum Leg {
    LonLat,
    Mercator,
    /// proj4rs works in radians for geographic systems, so `degrees` marks a
    /// native side whose coordinates need converting.
    Proj { native: Box<Proj>, lonlat: Box<Proj>, degrees: bool },
}

impl Leg {
    fn for_crs(crs: Crs) -> Result<Self> {
        match crs.epsg() {
            EPSG_WGS84 | EPSG_ETRS89 => return Ok(Leg::LonLat),
            EPSG_WEB_MERCATOR => return Ok(Leg::Mercator),
            _ => {}
        }
        let def = crs
            .proj_string()
            .ok_or_else(|| RasterError::Projection(format!("{crs} not supported")))?;
        let native = Proj::from_proj_string(def)
            .map_err(|e| RasterError::Projection(format!("{crs} not supported: {e:?}")))?;
        let lonlat = Proj::from_proj_string(LONLAT_PROJ)
            .map_err(|e| RasterError::Projection(format!("invalid lon/lat projection: {e:?}")))?;
        let degrees = def.contains("+proj=longlat");
        Ok(Leg::Proj { native: Box::new(native), lonlat: Box::new(lonlat), degrees })
    }

    fn to_lonlat(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self {
            Leg::LonLat => Ok((x, y)),
            Leg::Mercator => Ok((merc_x_to_lon(x), merc_y_to_lat(y))),
            Leg::Proj { native, lonlat, degrees } => {
                let mut point = if *degrees { (x.to_radians(), y.to_radians(), 0.0) } else { (x, y, 0.0) };
                transform(native, lonlat, &mut point)
                    .map_err(|e| RasterError::Projection(format!("transform failed: {e:?}")))?;
                Ok((point.0.to_degrees(), point.1.to_degrees()))
            }
        }
    }

    fn from_lonlat(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        match self {
            Leg::LonLat => Ok((lon, lat)),
            Leg::Mercator => Ok((lon_to_merc_x(lon), lat_to_merc_y(lat))),
            Leg::Proj { native, lonlat, degrees } => {
                let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
                transform(lonlat, native, &mut point)
                    .map_err(|e| RasterError::Projection(format!("transform failed: {e:?}")))?;
                if *degrees {
                    Ok((point.0.to_degrees(), point.1.to_degrees()))
                } else {
                    Ok((point.0, point.1))
                }
            }
        }
    }
}

fn merc_x_to_lon(x: f64) -> f64 {
    x * 180.0 / HALF_EARTH
}

fn merc_y_to_lat(y: f64) -> f64 {
    let y_rad = y * PI / HALF_EARTH;
    (2.0 * y_rad.exp().atan() - PI / 2.0).to_degrees()
}

fn lon_to_merc_x(lon: f64) -> f64 {
    lon * HALF_EARTH / 180.0
}

fn lat_to_merc_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (PI / 4.0 + lat / 2.0).tan().ln() * HALF_EARTH / PI
}

/// Point transformer between two EPSG-coded systems.
pub struct CoordTransformer {
    source: Crs,
    target: Crs,
    inbound: Leg,
    outbound: Leg,
}

impl fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        Ok(Self {
            source,
            target,
            inbound: Leg::for_crs(source)?,
            outbound: Leg::for_crs(target)?,
        })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn target(&self) -> Crs {
        self.target
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.is_identity() {
            return Ok((x, y));
        }
        let (lon, lat) = self.inbound.to_lonlat(x, y)?;
        self.outbound.from_lonlat(lon, lat)
    }
}

/// Transform a bounding box, densifying each edge with `densify` extra points
/// so curved edges in the target system are enclosed.
pub fn transform_bounds(source: Crs, target: Crs, bounds: Bounds, densify: usize) -> Result<Bounds> {
    let tr = CoordTransformer::new(source, target)?;
    if tr.is_identity() {
        return Ok(bounds);
    }

    let steps = densify + 1;
    let mut out = Bounds::empty();
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = bounds.left + (bounds.right - bounds.left) * t;
        let y = bounds.bottom + (bounds.top - bounds.bottom) * t;
        for (px, py) in [(x, bounds.bottom), (x, bounds.top), (bounds.left, y), (bounds.right, y)] {
            let (tx, ty) = tr.transform(px, py)?;
            out.extend(tx, ty);
        }
    }

    if !out.is_finite() {
        return Err(RasterError::Projection(format!("bounds not representable in {target}")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_round_trip_through_lonlat() {
        let tr = CoordTransformer::new(Crs::WGS84, Crs::WEB_MERCATOR).unwrap();
        let (x, y) = tr.transform(13.4, 52.5).unwrap();
        let back = CoordTransformer::new(Crs::WEB_MERCATOR, Crs::WGS84).unwrap();
        let (lon, lat) = back.transform(x, y).unwrap();
        assert!((lon - 13.4).abs() < 1e-9);
        assert!((lat - 52.5).abs() < 1e-9);
    }

    #[test]
    fn mercator_edge_matches_constant() {
        let tr = CoordTransformer::new(Crs::WGS84, Crs::WEB_MERCATOR).unwrap();
        let (x, _) = tr.transform(180.0, 0.0).unwrap();
        assert!((x - HALF_EARTH).abs() < 1e-6);
    }

    #[test]
    fn utm_central_meridian_has_false_easting() {
        // UTM 33N central meridian is 15E
        let tr = CoordTransformer::new(Crs::WGS84, Crs(32633)).unwrap();
        let (x, y) = tr.transform(15.0, 0.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-3);
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn unknown_epsg_is_rejected() {
        for code in [0, 1, 999_999] {
            let err = CoordTransformer::new(Crs(code), Crs::WGS84).unwrap_err();
            assert!(matches!(err, RasterError::Projection(_)), "EPSG:{code}");
        }
    }

    #[test]
    fn lambert_93_origin() {
        // RGF93 / Lambert-93: lon_0 = 3E, lat_0 = 46.5N at (700000, 6600000)
        let tr = CoordTransformer::new(Crs::WGS84, Crs(2154)).unwrap();
        let (x, y) = tr.transform(3.0, 46.5).unwrap();
        assert!((x - 700_000.0).abs() < 1.0, "{x}");
        assert!((y - 6_600_000.0).abs() < 1.0, "{y}");
        let (lon, lat) = CoordTransformer::new(Crs(2154), Crs::WGS84).unwrap().transform(x, y).unwrap();
        assert!((lon - 3.0).abs() < 1e-6 && (lat - 46.5).abs() < 1e-6);
    }

    #[test]
    fn etrs89_utm_from_table() {
        // ETRS89 / UTM 32N central meridian is 9E
        let tr = CoordTransformer::new(Crs::WGS84, Crs(25832)).unwrap();
        let (x, _) = tr.transform(9.0, 50.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-3);
    }

    #[test]
    fn other_geographic_systems_take_degrees() {
        // NAD83 shares the GRS80 ellipsoid with a zero datum shift
        assert!(Crs(4269).is_geographic());
        assert!(!Crs(32633).is_geographic());
        let tr = CoordTransformer::new(Crs(4269), Crs::WGS84).unwrap();
        let (lon, lat) = tr.transform(-100.0, 40.0).unwrap();
        assert!((lon + 100.0).abs() < 1e-5, "{lon}");
        assert!((lat - 40.0).abs() < 1e-5, "{lat}");
    }

    #[test]
    fn identity_bounds_are_untouched() {
        let b = Bounds::new(1.0, 2.0, 3.0, 4.0);
        let out = transform_bounds(Crs::WGS84, Crs::WGS84, b, 21).unwrap();
        assert_eq!(out, b);
    }
}
