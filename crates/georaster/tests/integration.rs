use georaster::{compute_render_stats, encode_png, render_tile, Crs, GeoTransform, Raster};

fn utm_rgb(width: usize, height: usize) -> Raster {
    let n = width * height;
    let r: Vec<f32> = (0..n).map(|i| (i % width) as f32 * 10.0).collect();
    let g: Vec<f32> = (0..n).map(|i| (i / width) as f32 * 10.0).collect();
    let b: Vec<f32> = vec![50.0; n];
    // 10 m pixels in UTM 33N, around 15E 52N
    let gt = GeoTransform::north_up(500_000.0, 5_761_000.0, 10.0, 10.0);
    Raster::new(width, height, vec![r, g, b], gt, Crs(32633)).unwrap()
}

#[test]
fn geotiff_round_trip_keeps_georeferencing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ortho.tif");

    let src = utm_rgb(16, 8);
    src.write_geotiff(&path).unwrap();

    let back = Raster::open(&path).unwrap();
    assert_eq!((back.width(), back.height(), back.band_count()), (16, 8, 3));
    assert_eq!(back.crs(), Crs(32633));
    assert_eq!(back.bounds(), src.bounds());
    assert_eq!(back.band(0), src.band(0));
    assert!(back.alpha().is_none());
}

#[test]
fn alpha_survives_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alpha.tif");

    let mut alpha = vec![255u8; 16];
    alpha[0] = 0;
    let src = utm_rgb(4, 4).with_alpha(alpha).unwrap();
    src.write_geotiff(&path).unwrap();

    let back = Raster::open(&path).unwrap();
    assert_eq!(back.band_count(), 3);
    assert!(!back.is_valid(0));
    assert!(back.is_valid(1));
}

#[test]
fn bounds_wgs84_encloses_utm_extent() {
    let r = utm_rgb(100, 100);
    let b = r.bounds_wgs84().unwrap();
    // 1 km square east of the 15E meridian at ~52N
    assert!(b.left >= 14.99 && b.right <= 15.03);
    assert!(b.bottom > 51.9 && b.top < 52.1);
    assert!(b.right > b.left && b.top > b.bottom);
}

#[test]
fn tile_over_raster_is_opaque_png() {
    let r = utm_rgb(100, 100);
    let stats = compute_render_stats(&r).unwrap();
    let b = r.bounds_wgs84().unwrap();

    // zoom 14 tile containing the raster centre
    let z = 14u32;
    let n = f64::from(1u32 << z);
    let lon = (b.left + b.right) / 2.0;
    let lat = ((b.bottom + b.top) / 2.0).to_radians();
    let x = ((lon + 180.0) / 360.0 * n) as u32;
    let y = ((1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * n) as u32;

    let img = render_tile(&r, &stats, z, x, y).unwrap();
    assert!(img.pixels().any(|p| p.0[3] == 255));

    let png = encode_png(&img).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn downsample_writes_smaller_raster() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("half.tif");

    let d = utm_rgb(20, 10).downsample(2.0).unwrap();
    d.write_geotiff(&path).unwrap();
    let back = Raster::open(&path).unwrap();
    assert_eq!((back.width(), back.height()), (10, 5));
    assert_eq!(back.transform().pixel_width, 20.0);
}
