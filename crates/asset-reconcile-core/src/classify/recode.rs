use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::RecodeSettings;
use crate::error::{io_err, ExecutionError};

/// Decode `source` (whatever its extension says), flatten it onto the
/// configured background and write it to `dest` as JPEG.
pub fn recode_to_jpeg(
    source: &Path,
    dest: &Path,
    settings: &RecodeSettings,
) -> Result<(), ExecutionError> {
    let image_err = |message: String| ExecutionError::Image {
        path: source.to_path_buf(),
        message,
    };

    let img = ImageReader::open(source)
        .map_err(|e| io_err(source, e))?
        .with_guessed_format()
        .map_err(|e| io_err(source, e))?
        .decode()
        .map_err(|e| image_err(e.to_string()))?;
    let flat = flatten(&img.to_rgba8(), settings.background);

    let file = File::create(dest).map_err(|e| io_err(dest, e))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, settings.jpeg_quality.clamp(1, 100));
    flat.write_with_encoder(encoder)
        .map_err(|e| image_err(e.to_string()))?;
    writer.flush().map_err(|e| io_err(dest, e))?;
    Ok(())
}

/// Alpha-composite every pixel over an opaque background.
pub fn flatten(rgba: &RgbaImage, background: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let alpha = p[3] as u32;
        let mut out = [0u8; 3];
        for (channel, slot) in out.iter_mut().enumerate() {
            let fg = p[channel] as u32;
            let bg = background[channel] as u32;
            *slot = ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8;
        }
        image::Rgb(out)
    })
}
