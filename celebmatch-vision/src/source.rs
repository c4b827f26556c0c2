use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use ndarray::Array3;

/// Every form an input image may arrive in.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Encoded image bytes (PNG, JPEG, ...) such as an upload body.
    InlineBytes(Vec<u8>),
    /// Path to an encoded image on disk.
    FilePath(PathBuf),
    /// Already decoded pixels laid out as `[height, width, 3]` RGB.
    DecodedArray(Array3<u8>),
}

impl ImageSource {
    /// Decode into an RGB image.
    pub fn resolve(self) -> Result<DynamicImage> {
        match self {
            ImageSource::InlineBytes(bytes) => {
                let img = image::load_from_memory(&bytes).context("decoding image bytes")?;
                Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
            }
            ImageSource::FilePath(path) => {
                let img =
                    image::open(&path).with_context(|| format!("opening {}", path.display()))?;
                Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
            }
            ImageSource::DecodedArray(pixels) => {
                let (height, width, channels) = pixels.dim();
                if channels != 3 {
                    anyhow::bail!("expected 3 colour channels, got {}", channels);
                }
                let raw: Vec<u8> = pixels.iter().copied().collect();
                let buf = RgbImage::from_raw(width as u32, height as u32, raw)
                    .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))?;
                Ok(DynamicImage::ImageRgb8(buf))
            }
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::InlineBytes(bytes)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::FilePath(path)
    }
}

impl From<Array3<u8>> for ImageSource {
    fn from(pixels: Array3<u8>) -> Self {
        ImageSource::DecodedArray(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_inline_bytes() {
        let img = ImageSource::from(png_bytes(4, 3)).resolve().unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(1, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(ImageSource::InlineBytes(b"not an image".to_vec())
            .resolve()
            .is_err());
    }

    #[test]
    fn test_decoded_array_layout() {
        // height 2, width 3
        let mut pixels = Array3::<u8>::zeros((2, 3, 3));
        pixels[[1, 2, 0]] = 200;
        let img = ImageSource::from(pixels).resolve().unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0[0], 200);
    }

    #[test]
    fn test_decoded_array_rejects_alpha() {
        let pixels = Array3::<u8>::zeros((2, 2, 4));
        assert!(ImageSource::from(pixels).resolve().is_err());
    }

    #[test]
    fn test_missing_file() {
        let src = ImageSource::from(PathBuf::from("/nonexistent/face.png"));
        assert!(src.resolve().is_err());
    }
}
