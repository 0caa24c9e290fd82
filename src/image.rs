use crate::error::CacheError;
use image::{codecs::jpeg::JpegEncoder, ColorType, GenericImageView};
use std::io::Cursor;

/// A decoded, in-memory image. Pixel data is always stored as tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    rgba: Vec<u8>,
}

impl DecodedImage {
    /// Decode raw image bytes (any format the `image` crate recognizes) into RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let img = image::load_from_memory(bytes).map_err(|_| CacheError::InvalidImageData)?;
        let (width, height) = img.dimensions();
        let rgba = img.into_rgba8().into_raw();
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// The accounted memory cost of this image, used by [`crate::memory::MemoryCache`] for its
    /// bounded LRU accounting. Four bytes per pixel (RGBA8) plus a small fixed overhead.
    pub fn byte_cost(&self) -> usize {
        self.rgba.len() + 64
    }

    /// Raw RGBA8 pixel bytes, tightly packed, row-major.
    pub fn rgba_bytes(&self) -> &[u8] {
        &self.rgba
    }

    /// Re-encode this image as JPEG bytes at the given quality (1-100). Since JPEG carries no
    /// alpha channel, pixels are flattened onto opaque black: this is a lossy, one-way transform
    /// suitable for disk persistence, not for round-tripping alpha-sensitive images.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, CacheError> {
        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.rgba.chunks_exact(4) {
            let alpha = px[3] as u32;
            rgb.push(((px[0] as u32 * alpha) / 255) as u8);
            rgb.push(((px[1] as u32 * alpha) / 255) as u8);
            rgb.push(((px[2] as u32 * alpha) / 255) as u8);
        }

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), quality);
        encoder
            .encode(&rgb, self.width, self.height, ColorType::Rgb8.into())
            .map_err(|_| CacheError::InvalidImageData)?;
        Ok(out)
    }
}
