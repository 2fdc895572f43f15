use crate::canvas::composite::RgbaBuffer;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum LoadError {
    Missing(PathBuf),
    Corrupt(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Missing(path) => write!(f, "raster file missing: {}", path.display()),
            LoadError::Corrupt(detail) => write!(f, "raster data unreadable: {detail}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Decodes a raster file into an RGBA buffer.
pub fn load_path(path: &Path) -> Result<RgbaBuffer, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoadError::Missing(path.to_path_buf())
        } else {
            LoadError::Corrupt(e.to_string())
        }
    })?;
    load_bytes(&bytes)
}

pub fn load_bytes(bytes: &[u8]) -> Result<RgbaBuffer, LoadError> {
    let img = image::load_from_memory(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))?;
    let rgba = img.to_rgba8();
    Ok(RgbaBuffer::from_pixels(
        rgba.width(),
        rgba.height(),
        rgba.into_raw(),
    ))
}
