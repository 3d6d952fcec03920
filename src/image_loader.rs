// Image loading module
// Decodes an image file into a fresh RGBA frame for a single redraw

use crate::error::ImageLoadError;
use image::{ImageFormat, RgbaImage};
use log::debug;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Decode `path` into straight-alpha RGBA pixels.
///
/// The result is owned by the calling redraw and is never cached.
pub fn load_image(path: &Path) -> Result<RgbaImage, ImageLoadError> {
    let data = fs::read(path).map_err(|source| ImageLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let frame = load_from_bytes(path, &data)?;
    debug!(
        "Decoded {:?}: {}x{} pixels",
        path,
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

/// Decode raw bytes, sniffing the format first and falling back to the extension
fn load_from_bytes(path: &Path, data: &[u8]) -> Result<RgbaImage, ImageLoadError> {
    let format = image::guess_format(data).ok().or_else(|| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(format_from_extension)
    });
    let Some(format) = format else {
        return Err(ImageLoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    };

    let img = image::load(Cursor::new(data), format).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(img.to_rgba8())
}

/// Get the appropriate image format from file extension
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    match ext.to_lowercase().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "gif" => Some(ImageFormat::Gif),
        "webp" => Some(ImageFormat::WebP),
        "bmp" => Some(ImageFormat::Bmp),
        "ico" => Some(ImageFormat::Ico),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn test_load_png_as_rgba() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dot.png");
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(1, 1, Rgba([10, 20, 30, 40]));
        img.save(&path).unwrap();

        let frame = load_image(&path).unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.get_pixel(1, 1), &Rgba([10, 20, 30, 40]));
        assert_eq!(frame.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_image(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, ImageLoadError::Read { .. }));
    }

    #[test]
    fn test_corrupt_png_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();
        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, ImageLoadError::Decode { .. }));
    }

    #[test]
    fn test_unknown_content_and_extension_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, ImageLoadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(format_from_extension("TIF"), Some(ImageFormat::Tiff));
        assert_eq!(format_from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_extension("txt"), None);
    }
}
