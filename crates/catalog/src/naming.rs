//! File naming for uploads and generated artefacts.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

const BASE_MAX_CHARS: usize = 12;
const SEGMENT_PREFIX: &str = "segment_";

/// Split `name` at its last dot. Leading dots do not start an extension.
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Final path component of a client-supplied name.
pub fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Display name without extension, whitespace runs joined by `_`, at most
/// 12 characters; `raster` when nothing is left.
pub fn sanitize_base(display_name: &str) -> String {
    let (stem, _) = split_ext(display_name);
    let joined = stem.split_whitespace().collect::<Vec<_>>().join("_");
    let capped: String = joined.chars().take(BASE_MAX_CHARS).collect();
    if capped.is_empty() {
        "raster".to_string()
    } else {
        capped
    }
}

/// Shortest form with 6 significant digits, like C's `%.6g`.
pub fn format_g6(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if (-4..6).contains(&exp) {
        let decimals = (5 - exp) as usize;
        strip_zeros(&format!("{v:.decimals$}"))
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_zeros(mantissa), exp.abs())
    }
}

fn strip_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Claim `segment_<base>_<scale>_<compactness>.geojson` in `dir`, suffixed
/// `_1`, `_2`, ... when taken. The name is created empty with `create_new`,
/// so concurrent callers never receive the same one; the caller overwrites it.
pub fn reserve_segment_filename(dir: &Path, display_name: &str, scale: f64, compactness: f64) -> Result<String> {
    let stem = format!("{SEGMENT_PREFIX}{}_{}_{}", sanitize_base(display_name), format_g6(scale), format_g6(compactness));
    let mut candidate = format!("{stem}.geojson");
    let mut i = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(dir.join(&candidate)) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                candidate = format!("{stem}_{i}.geojson");
                i += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// `classify_<segment id without its segment_ prefix>.geojson`.
pub fn classified_filename(segment_id: &str) -> String {
    let base = segment_id.strip_prefix(SEGMENT_PREFIX).unwrap_or(segment_id);
    format!("classify_{base}.geojson")
}

/// `<classified stem>_merged.geojson`.
pub fn merged_filename(classified_name: &str) -> String {
    let (stem, _) = split_ext(basename(classified_name));
    format!("{stem}_merged.geojson")
}

/// `name`, or `"<stem> 1<ext>"`, `"<stem> 2<ext>"`, ... avoiding `existing`.
pub fn unique_display_name<S: AsRef<str>>(name: &str, existing: &[S]) -> String {
    let taken = |c: &str| existing.iter().any(|e| e.as_ref() == c);
    let (stem, ext) = split_ext(name);
    let mut candidate = name.to_string();
    let mut i = 1;
    while taken(&candidate) {
        candidate = format!("{stem} {i}{ext}");
        i += 1;
    }
    candidate
}

/// Downsampled copy name: `<stem>_x<factor><ext>`.
pub fn downsampled_name(name: &str, factor: f64) -> String {
    let (stem, ext) = split_ext(name);
    format!("{stem}_x{}{ext}", format_g6(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn g6_matches_printf() {
        assert_eq!(format_g6(10.0), "10");
        assert_eq!(format_g6(0.5), "0.5");
        assert_eq!(format_g6(1.0 / 3.0), "0.333333");
        assert_eq!(format_g6(123456.0), "123456");
        assert_eq!(format_g6(1234567.0), "1.23457e+06");
        assert_eq!(format_g6(0.0001), "0.0001");
        assert_eq!(format_g6(0.00001), "1e-05");
        assert_eq!(format_g6(-2.5), "-2.5");
        assert_eq!(format_g6(999999.5), "1e+06");
        assert_eq!(format_g6(0.0), "0");
    }

    #[test]
    fn sanitized_base() {
        assert_eq!(sanitize_base("my ortho  photo.tif"), "my_ortho_pho");
        assert_eq!(sanitize_base("a.tif"), "a");
        assert_eq!(sanitize_base(".tif"), ".tif");
        assert_eq!(sanitize_base("   .tif"), "raster");
    }

    #[test]
    fn ext_split() {
        assert_eq!(split_ext("a.b.tif"), ("a.b", ".tif"));
        assert_eq!(split_ext("noext"), ("noext", ""));
        assert_eq!(split_ext("..a"), ("..a", ""));
    }

    #[test]
    fn segment_names_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let first = reserve_segment_filename(dir.path(), "field.tif", 30.0, 0.5).unwrap();
        assert_eq!(first, "segment_field_30_0.5.geojson");
        assert!(dir.path().join(&first).is_file());
        std::fs::write(dir.path().join(&first), "{}").unwrap();
        let second = reserve_segment_filename(dir.path(), "field.tif", 30.0, 0.5).unwrap();
        assert_eq!(second, "segment_field_30_0.5_1.geojson");
    }

    #[test]
    fn concurrent_reservations_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| reserve_segment_filename(dir.path(), "field.tif", 30.0, 0.5).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: std::collections::HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), 8);
        assert!(names.contains(&"segment_field_30_0.5.geojson".to_string()));
        assert!(names.contains(&"segment_field_30_0.5_7.geojson".to_string()));
    }

    #[test]
    fn reservation_fails_in_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(reserve_segment_filename(&dir.path().join("absent"), "field.tif", 30.0, 0.5).is_err());
    }

    #[test]
    fn derived_names() {
        assert_eq!(classified_filename("segment_field_30_0.5"), "classify_field_30_0.5.geojson");
        assert_eq!(classified_filename("custom"), "classify_custom.geojson");
        assert_eq!(merged_filename("classify_field_30_0.5.geojson"), "classify_field_30_0.5_merged.geojson");
        assert_eq!(downsampled_name("ortho.tif", 4.0), "ortho_x4.tif");
    }

    #[test]
    fn display_names_are_numbered() {
        let existing = ["ortho.tif", "ortho 1.tif"];
        assert_eq!(unique_display_name("ortho.tif", &existing), "ortho 2.tif");
        assert_eq!(unique_display_name("other.tif", &existing), "other.tif");
    }

    #[test]
    fn basenames() {
        assert_eq!(basename("../../etc/passwd"), "passwd");
        assert_eq!(basename("x.geojson"), "x.geojson");
    }
}
