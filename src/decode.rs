//! Raw capture decoding.
//!
//! Full-resolution captures are large, so the decoded pixels are packed into
//! a 16-bit format by default. The sensor is mounted a quarter turn from the
//! device's natural orientation, so every image is rotated 90° clockwise
//! before packing.

use crate::config::{DecodeOptions, PixelFormat};
use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;

/// 4×4 Bayer threshold matrix, values 0..16.
const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Errors that can occur while decoding a capture.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The device delivered no bytes.
    #[error("empty capture buffer")]
    Empty,
    /// The bytes are not a supported image.
    #[error("failed to decode capture: {0}")]
    Image(#[from] image::ImageError),
}

/// Packed pixel storage.
#[derive(Clone, PartialEq, Eq)]
pub enum PixelData {
    /// One `u16` per pixel, red in the high five bits.
    Rgb565(Vec<u16>),
    /// Four bytes per pixel.
    Rgba8888(Vec<u8>),
}

/// A decoded, oriented capture.
#[derive(Clone)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: PixelData,
}

impl DecodedImage {
    /// Image width after rotation.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height after rotation.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        match self.pixels {
            PixelData::Rgb565(_) => PixelFormat::Rgb565,
            PixelData::Rgba8888(_) => PixelFormat::Rgba8888,
        }
    }

    /// Packed pixel storage.
    #[inline]
    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        match &self.pixels {
            PixelData::Rgb565(data) => data.len() * 2,
            PixelData::Rgba8888(data) => data.len(),
        }
    }

    /// RGB value at (`x`, `y`), expanded back to 8 bits per channel.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        match &self.pixels {
            PixelData::Rgb565(data) => data.get(index).map(|&p| unpack_rgb565(p)),
            PixelData::Rgba8888(data) => {
                let px = data.get(index * 4..index * 4 + 3)?;
                Some((px[0], px[1], px[2]))
            }
        }
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format())
            .field("bytes", &self.byte_len())
            .finish()
    }
}

/// Decodes, downsamples, rotates and packs a raw capture.
///
/// Consumes the raw buffer so it is freed as soon as decoding is done.
pub fn decode_capture(raw: Vec<u8>, options: &DecodeOptions) -> Result<DecodedImage, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let raw_len = raw.len();
    let decoded = image::load_from_memory(&raw)?;
    drop(raw);
    tracing::trace!(raw_bytes = raw_len, "Released raw capture buffer");

    let decoded = if options.sample_size > 1 {
        let width = (decoded.width() / options.sample_size).max(1);
        let height = (decoded.height() / options.sample_size).max(1);
        decoded.resize_exact(width, height, FilterType::Triangle)
    } else {
        decoded
    };

    // Rotate in the decoded color type; widening to RGBA happens only when
    // RGBA is the requested output.
    let rotated = decoded.rotate90();
    drop(decoded);

    let (width, height) = (rotated.width(), rotated.height());
    let pixels = match options.pixel_format {
        PixelFormat::Rgb565 => {
            let rgb = rotated.into_rgb8();
            PixelData::Rgb565(pack_rgb565(&rgb, options.dither))
        }
        PixelFormat::Rgba8888 => PixelData::Rgba8888(rotated.into_rgba8().into_raw()),
    };

    Ok(DecodedImage {
        width,
        height,
        pixels,
    })
}

fn pack_rgb565(image: &RgbImage, dither: bool) -> Vec<u16> {
    image
        .enumerate_pixels()
        .map(|(x, y, px)| {
            let threshold = if dither {
                BAYER_4X4[(y % 4) as usize][(x % 4) as usize]
            } else {
                0
            };
            let r = quantize(px[0], 5, threshold);
            let g = quantize(px[1], 6, threshold);
            let b = quantize(px[2], 5, threshold);
            (r << 11) | (g << 5) | b
        })
        .collect()
}

/// Reduces an 8-bit channel to `bits`, nudged up by a Bayer threshold.
#[inline]
fn quantize(value: u8, bits: u32, threshold: u8) -> u16 {
    let step = 1u16 << (8 - bits);
    let bias = u16::from(threshold) * step / 16;
    (u16::from(value) + bias).min(255) >> (8 - bits)
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn unpack_rgb565(pixel: u16) -> (u8, u8, u8) {
    let r = (pixel >> 11) & 0x1F;
    let g = (pixel >> 5) & 0x3F;
    let b = pixel & 0x1F;
    (
        ((r << 3) | (r >> 2)) as u8,
        ((g << 2) | (g >> 4)) as u8,
        ((b << 3) | (b >> 2)) as u8,
    )
}
