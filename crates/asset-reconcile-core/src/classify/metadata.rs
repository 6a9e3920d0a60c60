use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

use crate::error::ClassifyError;
use crate::storage::DerivedMetadata;

/// Read-only: dimensions, aspect ratio and a tiny PNG placeholder as a data
/// URI. Deterministic for identical input bytes.
pub fn derive_metadata(path: &Path, placeholder_size: u32) -> Result<DerivedMetadata, ClassifyError> {
    let img = ImageReader::open(path)
        .map_err(|e| ClassifyError::Unreadable(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| ClassifyError::Unreadable(e.to_string()))?
        .decode()
        .map_err(|e| ClassifyError::Corrupt(e.to_string()))?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifyError::Corrupt("zero-sized image".to_string()));
    }

    let size = placeholder_size.max(1);
    let thumb = img.thumbnail(size, size);
    let mut buf = Cursor::new(Vec::new());
    thumb
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ClassifyError::Corrupt(e.to_string()))?;

    Ok(DerivedMetadata {
        width,
        height,
        aspect_ratio: aspect_ratio(width, height),
        placeholder: format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner())),
    })
}

/// width / height, rounded to four decimals so reports stay stable.
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    let ratio = width as f64 / height as f64;
    (ratio * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::fixtures::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_metadata_from_jpeg_with_png_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poster.png");
        fs::write(&path, jpeg_bytes(40, 30, 10)).unwrap();

        let meta = derive_metadata(&path, 16).unwrap();
        assert_eq!((meta.width, meta.height), (40, 30));
        assert_eq!(meta.aspect_ratio, 1.3333);
        assert!(meta.placeholder.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_metadata_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, transparent_png_bytes(20, 10)).unwrap();
        assert_eq!(derive_metadata(&path, 8).unwrap(), derive_metadata(&path, 8).unwrap());
    }

    #[test]
    fn test_metadata_of_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"\xFF\xD8\xFFgarbage").unwrap();
        assert!(derive_metadata(&path, 8).is_err());
    }

    #[test]
    fn test_aspect_ratio_rounding() {
        assert_eq!(aspect_ratio(16, 9), 1.7778);
        assert_eq!(aspect_ratio(1, 1), 1.0);
    }
}
