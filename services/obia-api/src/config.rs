use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const MIB: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Holds `uploads/` and `results/`.
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Budget for decoded rasters kept in memory, in MiB.
    pub raster_cache_mb: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("OBIA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let data_dir = PathBuf::from(std::env::var("OBIA_DATA_DIR").unwrap_or_else(|_| ".".to_string()));
        let max_upload_mb = match std::env::var("OBIA_MAX_UPLOAD_MB") {
            Ok(v) => parse_mb("OBIA_MAX_UPLOAD_MB", &v)?,
            Err(_) => 2048,
        };
        let raster_cache_mb = match std::env::var("OBIA_RASTER_CACHE_MB") {
            Ok(v) => parse_mb("OBIA_RASTER_CACHE_MB", &v)?,
            Err(_) => 1024,
        };

        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!("OBIA_BIND_ADDR must be host:port, got {bind_addr:?}");
        }

        Ok(Self {
            bind_addr,
            data_dir,
            max_upload_bytes: max_upload_mb.saturating_mul(MIB),
            raster_cache_mb: raster_cache_mb as u64,
        })
    }
}

fn parse_mb(var: &str, v: &str) -> Result<usize> {
    let mb: usize = v
        .trim()
        .parse()
        .with_context(|| format!("{var} must be a whole number of MiB, got {v:?}"))?;
    if mb == 0 {
        bail!("{var} must be positive");
    }
    Ok(mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mib_parsing() {
        assert_eq!(parse_mb("OBIA_MAX_UPLOAD_MB", " 16 ").unwrap(), 16);
        assert!(parse_mb("OBIA_MAX_UPLOAD_MB", "0").is_err());
        let err = parse_mb("OBIA_RASTER_CACHE_MB", "lots").unwrap_err();
        assert!(err.to_string().contains("OBIA_RASTER_CACHE_MB"));
    }
}
