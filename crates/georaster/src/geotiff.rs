//! GeoTIFF decoding and encoding on top of the `tiff` crate.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::crs::{Crs, EPSG_WGS84};
use crate::dataset::Raster;
use crate::error::{RasterError, Result};
use crate::geo_transform::GeoTransform;

const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

#[derive(Debug, Default)]
struct GeoKeys {
    raster_type: Option<u16>,
    geographic: Option<u16>,
    projected: Option<u16>,
}

fn parse_geokeys(dir: &[u16]) -> GeoKeys {
    let mut keys = GeoKeys::default();
    if dir.len() < 4 {
        return keys;
    }
    let count = dir[3] as usize;
    for entry in dir[4..].chunks_exact(4).take(count) {
        // location 0 => value stored inline
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            KEY_RASTER_TYPE => keys.raster_type = Some(entry[3]),
            KEY_GEOGRAPHIC_TYPE => keys.geographic = Some(entry[3]),
            KEY_PROJECTED_CS_TYPE => keys.projected = Some(entry[3]),
            _ => {}
        }
    }
    keys
}

fn crs_from_keys(keys: &GeoKeys) -> Result<Crs> {
    if let Some(code) = keys.projected.filter(|&c| c != USER_DEFINED && c != 0) {
        return Ok(Crs(u32::from(code)));
    }
    if let Some(code) = keys.geographic.filter(|&c| c != USER_DEFINED && c != 0) {
        return Ok(Crs(u32::from(code)));
    }
    Err(RasterError::Unsupported("GeoTIFF has no EPSG-coded CRS".into()))
}

fn read_f64_tag<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(tag)? {
        Some(v) => Ok(Some(v.into_f64_vec()?)),
        None => Ok(None),
    }
}

fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Some(m) = read_f64_tag(decoder, Tag::ModelTransformationTag)? {
        if m.len() >= 8 {
            return Ok(GeoTransform {
                origin_x: m[3],
                pixel_width: m[0],
                row_rotation: m[1],
                origin_y: m[7],
                col_rotation: m[4],
                pixel_height: m[5],
            });
        }
    }

    let scale = read_f64_tag(decoder, Tag::ModelPixelScaleTag)?;
    let tie = read_f64_tag(decoder, Tag::ModelTiepointTag)?;
    match (scale, tie) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            // tiepoint (i, j, k) -> (x, y, z)
            let origin_x = t[3] - t[0] * s[0];
            let origin_y = t[4] + t[1] * s[1];
            Ok(GeoTransform::north_up(origin_x, origin_y, s[0], s[1]))
        }
        _ => Err(RasterError::Unsupported("GeoTIFF has no georeferencing tags".into())),
    }
}

fn samples_per_pixel(color: ColorType) -> Result<(usize, bool)> {
    match color {
        ColorType::Gray(_) => Ok((1, false)),
        ColorType::GrayA(_) => Ok((2, true)),
        ColorType::RGB(_) => Ok((3, false)),
        ColorType::RGBA(_) => Ok((4, true)),
        ColorType::Multiband { num_samples, .. } => Ok((num_samples as usize, false)),
        other => Err(RasterError::Unsupported(format!("color type {other:?}"))),
    }
}

fn to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    #[allow(unreachable_patterns)]
    let out = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(RasterError::Unsupported("sample format".into())),
    };
    Ok(out)
}

pub(crate) fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

    let (w, h) = decoder.dimensions()?;
    let (width, height) = (w as usize, h as usize);
    let (spp, has_alpha) = samples_per_pixel(decoder.colortype()?)?;

    let transform = read_transform(&mut decoder)?;
    let keys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(v) => parse_geokeys(&v.into_u16_vec()?),
        None => GeoKeys::default(),
    };
    let crs = crs_from_keys(&keys)?;

    let mut transform = transform;
    if keys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
        let (x, y) = transform.apply(-0.5, -0.5);
        transform.origin_x = x;
        transform.origin_y = y;
    }

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(v) => v.into_string()?.trim_matches(char::from(0)).trim().parse::<f64>().ok(),
        None => None,
    };

    let samples = to_f32(decoder.read_image()?)?;
    if samples.len() < width * height * spp {
        return Err(RasterError::Unsupported("truncated image data".into()));
    }

    let data_bands = if has_alpha { spp - 1 } else { spp };
    let mut bands = vec![Vec::with_capacity(width * height); data_bands];
    let mut alpha = has_alpha.then(|| Vec::with_capacity(width * height));
    for px in samples.chunks_exact(spp).take(width * height) {
        for (b, band) in bands.iter_mut().enumerate() {
            band.push(px[b]);
        }
        if let Some(a) = alpha.as_mut() {
            a.push(if px[spp - 1] > 0.0 { 255 } else { 0 });
        }
    }

    debug!(path = %path.display(), width, height, bands = data_bands, %crs, "decoded geotiff");

    let mut raster = Raster::new(width, height, bands, transform, crs)?.with_nodata(nodata);
    if let Some(a) = alpha {
        raster = raster.with_alpha(a)?;
    }
    Ok(raster)
}

fn geokey_directory(crs: Crs) -> Vec<u16> {
    let code = u16::try_from(crs.epsg()).unwrap_or(USER_DEFINED);
    let (model_type, key) = if crs.is_geographic() { (2, KEY_GEOGRAPHIC_TYPE) } else { (1, KEY_PROJECTED_CS_TYPE) };
    vec![
        1, 1, 0, 3, //
        1024, 0, 1, model_type, // GTModelTypeGeoKey
        KEY_RASTER_TYPE, 0, 1, 1, // PixelIsArea
        key, 0, 1, code,
    ]
}

pub(crate) fn write_geotiff(raster: &Raster, path: &Path) -> Result<()> {
    let (w, h) = (raster.width(), raster.height());
    let width = u32::try_from(w).map_err(|_| RasterError::InvalidArgument("raster too wide".into()))?;
    let height = u32::try_from(h).map_err(|_| RasterError::InvalidArgument("raster too tall".into()))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width.abs(), gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    let keys = geokey_directory(raster.crs());

    let mut nodata = raster.nodata();

    // Alpha becomes a fourth RGB sample, or NaN nodata on a single band.
    let alpha_band: Option<Vec<f32>> = raster.alpha().map(|a| a.iter().map(|&v| f32::from(v)).collect());
    let masked_gray: Option<Vec<f32>> = (raster.band_count() == 1 && raster.alpha().is_some()).then(|| {
        raster.band(0).iter().enumerate()
            .map(|(i, &v)| if raster.is_valid(i) { v } else { f32::NAN })
            .collect()
    });

    let bands: Vec<&[f32]> = match (&masked_gray, &alpha_band) {
        (Some(gray), _) => {
            nodata = Some(f64::NAN);
            vec![gray.as_slice()]
        }
        (None, Some(a)) if raster.band_count() == 3 => {
            let mut v: Vec<&[f32]> = raster.bands().iter().map(|b| b.as_slice()).collect();
            v.push(a.as_slice());
            v
        }
        _ => raster.bands().iter().map(|b| b.as_slice()).collect(),
    };

    let mut data = Vec::with_capacity(w * h * bands.len());
    for i in 0..w * h {
        for b in &bands {
            data.push(b[i]);
        }
    }

    let file = BufWriter::new(File::create(path)?);
    let mut tiff = TiffEncoder::new(file)?;

    macro_rules! write_image {
        ($ct:ty) => {{
            let mut image = tiff.new_image::<$ct>(width, height)?;
            image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
            image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
            image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
            if let Some(nd) = nodata {
                let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
                image.encoder().write_tag(Tag::GdalNodata, text.as_str())?;
            }
            image.write_data(&data)?;
        }};
    }

    match bands.len() {
        1 => write_image!(colortype::Gray32Float),
        3 => write_image!(colortype::RGB32Float),
        4 => write_image!(colortype::RGBA32Float),
        n => return Err(RasterError::Unsupported(format!("cannot write {n} bands"))),
    }
    Ok(())
}
