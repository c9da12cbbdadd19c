use crate::error::DecodeError;
use image::RgbImage;
use std::fmt;

/// A decoded upload in 8-bit RGB, no alpha channel.
#[derive(Clone)]
pub struct ValidatedImage {
    pixels: RgbImage,
}

impl ValidatedImage {
    /// A solid white image, used to warm the model up before serving.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Dimensions formatted as `WxH`.
    pub fn size_label(&self) -> String {
        format!("{}x{}", self.width(), self.height())
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

impl fmt::Debug for ValidatedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Decodes `bytes`, guessing the format from the content, and converts the
/// result to RGB8.
pub fn decode_image(bytes: &[u8]) -> Result<ValidatedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError {
            message: "image data is empty".to_string(),
        });
    }

    let decoded = image::load_from_memory(bytes)?;

    Ok(ValidatedImage {
        pixels: decoded.to_rgb8(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_rgba(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_png_and_drops_alpha() {
        let bytes = encode_rgba(3, 2, ImageFormat::Png);
        let img = decode_image(&bytes).unwrap();

        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.size_label(), "3x2");
        assert_eq!(img.pixels().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn decodes_gif() {
        let bytes = encode_rgba(4, 4, ImageFormat::Gif);
        let img = decode_image(&bytes).unwrap();
        assert_eq!(img.size_label(), "4x4");
    }

    #[test]
    fn rejects_empty_and_corrupt_bytes() {
        let err = decode_image(&[]).unwrap_err();
        assert_eq!(err.message, "image data is empty");

        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn rejects_truncated_png() {
        let bytes = encode_rgba(8, 8, ImageFormat::Png);
        assert!(decode_image(&bytes[..bytes.len() / 2]).is_err());
    }
}
