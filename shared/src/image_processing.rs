use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader, Limits};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("image too large: {width}x{height} = {pixels} pixels, max {max_pixels}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("unsupported image format")]
    UnsupportedFormat,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub max_image_pixels: u64,
    pub max_input_bytes: usize,
    pub max_alloc_bytes: u64,
    pub max_dimension: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_image_pixels: 100_000_000,
            max_input_bytes: 50 * 1024 * 1024,
            max_alloc_bytes: 512 * 1024 * 1024,
            max_dimension: 15_000,
        }
    }
}

/// Model-ready tensor plus the dimensions of the (oriented) source photo.
///
/// The tensor is NHWC `[1, input_size, input_size, 3]` with channels in
/// `[0, 1]`. `width`/`height` are what detections get mapped back onto.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub tensor: Array4<f32>,
    pub width: u32,
    pub height: u32,
}

pub struct Preprocessor {
    config: ProcessingConfig,
    input_size: u32,
}

impl Preprocessor {
    pub fn new(config: ProcessingConfig, input_size: u32) -> Self {
        Self { config, input_size }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Decodes, orients and stretches the photo onto the square model grid.
    ///
    /// No letterboxing: the aspect ratio is not preserved, which is what the
    /// coordinate mapping downstream assumes.
    #[instrument(skip(self, raw_bytes), fields(input_size = raw_bytes.len()))]
    pub fn prepare(&self, raw_bytes: &[u8]) -> Result<PreparedImage, ImageProcessingError> {
        let img = decode_image(&self.config, raw_bytes)?;
        let (width, height) = img.dimensions();

        if width == 0 || height == 0 {
            return Err(ImageProcessingError::InvalidDimensions { width, height });
        }

        let size = self.input_size;
        let rgb = img
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        let edge = size as usize;
        let tensor = Array4::from_shape_fn((1, edge, edge, 3), |(_, y, x, channel)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[channel]) / 255.0
        });

        debug!(width, height, size, "image prepared");

        Ok(PreparedImage {
            tensor,
            width,
            height,
        })
    }
}

fn decode_image(
    config: &ProcessingConfig,
    raw_bytes: &[u8],
) -> Result<DynamicImage, ImageProcessingError> {
    if raw_bytes.is_empty() {
        return Err(ImageProcessingError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(ImageProcessingError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageProcessingError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(ImageProcessingError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    let (w, h) = img.dimensions();
    let pixels = u64::from(w) * u64::from(h);

    if pixels > config.max_image_pixels {
        return Err(ImageProcessingError::ImageTooLarge {
            width: w,
            height: h,
            pixels,
            max_pixels: config.max_image_pixels,
        });
    }

    Ok(img)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ExtendedColorType, ImageBuffer, ImageEncoder, Rgb};

    pub(crate) fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| {
                if x < width / 2 {
                    Rgb([255, 0, 0])
                } else {
                    Rgb([0, 0, 255])
                }
            });
        let mut buffer = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    #[test]
    fn decode_rejects_empty() {
        let config = ProcessingConfig::default();
        assert!(matches!(
            decode_image(&config, &[]),
            Err(ImageProcessingError::EmptyInput)
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        let config = ProcessingConfig::default();
        assert!(decode_image(&config, &[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn decode_rejects_oversized_input() {
        let config = ProcessingConfig {
            max_input_bytes: 100,
            ..Default::default()
        };
        let data = vec![0u8; 101];
        let result = decode_image(&config, &data);
        assert!(matches!(result, Err(ImageProcessingError::InputTooLarge { .. })));
    }

    #[test]
    fn decode_rejects_too_many_pixels() {
        let config = ProcessingConfig {
            max_image_pixels: 99,
            ..Default::default()
        };
        let png = create_test_png(10, 10);
        assert!(matches!(
            decode_image(&config, &png),
            Err(ImageProcessingError::ImageTooLarge { pixels: 100, .. })
        ));
    }

    #[test]
    fn prepare_produces_nhwc_unit_tensor() {
        let preprocessor = Preprocessor::new(ProcessingConfig::default(), 32);
        let png = create_test_png(200, 100);

        let prepared = preprocessor.prepare(&png).unwrap();

        assert_eq!((prepared.width, prepared.height), (200, 100));
        assert_eq!(prepared.tensor.shape(), &[1, 32, 32, 3]);
        assert!(prepared.tensor.iter().all(|v| (0.0..=1.0).contains(v)));

        // left half red, right half blue
        assert!((prepared.tensor[[0, 16, 2, 0]] - 1.0).abs() < 0.01);
        assert!(prepared.tensor[[0, 16, 2, 2]] < 0.01);
        assert!((prepared.tensor[[0, 16, 29, 2]] - 1.0).abs() < 0.01);
        assert!(prepared.tensor[[0, 16, 29, 0]] < 0.01);
    }

    #[test]
    fn prepare_propagates_decode_errors() {
        let preprocessor = Preprocessor::new(ProcessingConfig::default(), 32);
        assert!(matches!(
            preprocessor.prepare(b"definitely not an image"),
            Err(ImageProcessingError::UnsupportedFormat | ImageProcessingError::Decode { .. })
        ));
    }
}
