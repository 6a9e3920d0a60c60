//! Decides what a file actually is, from its bytes.
//!
//! Classification only decides. The one mutating step, recoding an opaque
//! PNG to JPEG, lives in [`recode`] and is only reached from the executor.

pub mod metadata;
pub mod recode;

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ClassifyError;

pub use metadata::derive_metadata;
pub use recode::recode_to_jpeg;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
}

impl MediaFormat {
    pub fn canonical_extension(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::Webp => "webp",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Tiff => "tiff",
        }
    }

    /// Format family an extension spelling belongs to, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "gif" => Some(MediaFormat::Gif),
            "webp" => Some(MediaFormat::Webp),
            "bmp" => Some(MediaFormat::Bmp),
            "tif" | "tiff" => Some(MediaFormat::Tiff),
            _ => None,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(MediaFormat::Jpeg),
            ImageFormat::Png => Some(MediaFormat::Png),
            ImageFormat::Gif => Some(MediaFormat::Gif),
            ImageFormat::WebP => Some(MediaFormat::Webp),
            ImageFormat::Bmp => Some(MediaFormat::Bmp),
            ImageFormat::Tiff => Some(MediaFormat::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::Webp => "webp",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Tiff => "tiff",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub actual_format: MediaFormat,
    /// Only inspected for PNG; always false for other formats.
    pub has_transparency: bool,
}

/// What has to happen to a file for its name to tell the truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Correction {
    None,
    ForceExtension { from: String, to: String },
    RecodeToJpeg,
}

impl Classification {
    pub fn needs_recode(&self) -> bool {
        self.actual_format == MediaFormat::Png && !self.has_transparency
    }

    /// Format the file will have once corrected.
    pub fn target_format(&self) -> MediaFormat {
        if self.needs_recode() {
            MediaFormat::Jpeg
        } else {
            self.actual_format
        }
    }

    pub fn correction(&self, current_extension: &str) -> Correction {
        if self.needs_recode() {
            return Correction::RecodeToJpeg;
        }
        let wanted = self.actual_format.canonical_extension();
        if current_extension == wanted {
            Correction::None
        } else {
            Correction::ForceExtension {
                from: current_extension.to_string(),
                to: wanted.to_string(),
            }
        }
    }
}

/// Inspect raw bytes. Never looks at a file name.
pub fn classify(bytes: &[u8]) -> Result<Classification, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::Corrupt("empty file".to_string()));
    }
    let actual_format = image::guess_format(bytes)
        .ok()
        .and_then(MediaFormat::from_image_format)
        .ok_or(ClassifyError::Unrecognized)?;

    let has_transparency = match actual_format {
        MediaFormat::Png => png_has_transparency(bytes)?,
        _ => false,
    };

    Ok(Classification {
        actual_format,
        has_transparency,
    })
}

pub fn classify_file(path: &Path) -> Result<Classification, ClassifyError> {
    let bytes = fs::read(path).map_err(|e| ClassifyError::Unreadable(e.to_string()))?;
    classify(&bytes)
}

struct PngHeader {
    color_type: u8,
    has_trns: bool,
}

impl PngHeader {
    /// Walks the chunk list up to the first IDAT.
    fn parse(bytes: &[u8]) -> Result<Self, ClassifyError> {
        let corrupt = |what: &str| ClassifyError::Corrupt(format!("png: {}", what));

        if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
            return Err(corrupt("bad signature"));
        }
        let mut offset = PNG_SIGNATURE.len();
        let mut color_type = None;
        let mut has_trns = false;

        while offset + 8 <= bytes.len() {
            let length = u32::from_be_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]) as usize;
            let kind = &bytes[offset + 4..offset + 8];
            let data_start = offset + 8;
            let data_end = data_start
                .checked_add(length)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| corrupt("truncated chunk"))?;

            match kind {
                b"IHDR" => {
                    if length < 13 {
                        return Err(corrupt("short IHDR"));
                    }
                    color_type = Some(bytes[data_start + 9]);
                }
                b"tRNS" => has_trns = true,
                b"IDAT" | b"IEND" => break,
                _ => {}
            }
            offset = data_end + 4;
        }

        let color_type = color_type.ok_or_else(|| corrupt("missing IHDR"))?;
        Ok(Self {
            color_type,
            has_trns,
        })
    }

    /// Colour types 4 (grey + alpha) and 6 (RGBA).
    fn declares_alpha(&self) -> bool {
        self.color_type == 4 || self.color_type == 6
    }
}

fn png_has_transparency(bytes: &[u8]) -> Result<bool, ClassifyError> {
    let header = PngHeader::parse(bytes)?;
    if !header.declares_alpha() && !header.has_trns {
        return Ok(false);
    }

    // An alpha channel may still be fully opaque; only real pixels decide.
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| ClassifyError::Corrupt(e.to_string()))?;
    if !img.color().has_alpha() {
        return Ok(false);
    }
    Ok(img.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    pub fn jpeg_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([shade, 40, 90]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
    }

    pub fn opaque_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    /// RGBA PNG whose alpha channel is fully opaque.
    pub fn opaque_rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    pub fn transparent_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Gif)
    }
}
