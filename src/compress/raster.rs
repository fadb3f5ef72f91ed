//! Raster image compressor
//!
//! Downscales images that exceed the configured bounds and re-encodes them
//! as JPEG. Decoding and encoding run on the blocking pool.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};

use super::{CompressError, CompressionOptions, Compressor};
use crate::job::SourceFile;

/// Formats that are decoded and re-encoded; anything else passes through
const REENCODED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// Compressor for JPEG, PNG and WebP inputs
///
/// - Non-images, GIFs and images with an alpha channel are returned unchanged
/// - Images larger than `max_width` x `max_height` are resized to fit,
///   preserving aspect ratio
/// - The output is kept only if it is smaller than the input
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCompressor;

impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }

    fn compress_blocking(
        file: SourceFile,
        options: CompressionOptions,
    ) -> Result<SourceFile, CompressError> {
        let format = match image::guess_format(&file.bytes) {
            Ok(format) if REENCODED_FORMATS.contains(&format) => format,
            _ => return Ok(file),
        };

        let img = image::load_from_memory_with_format(&file.bytes, format)
            .map_err(|e| CompressError::Decode(e.to_string()))?;

        if img.color().has_alpha() {
            tracing::debug!(file = %file.name, "Image has alpha channel, skipping compression");
            return Ok(file);
        }

        let (width, height) = img.dimensions();
        let img = if width > options.max_width || height > options.max_height {
            img.resize(options.max_width, options.max_height, FilterType::Triangle)
        } else {
            img
        };

        let encoded = encode_jpeg(&img, options.quality_percent())?;

        if encoded.len() >= file.bytes.len() {
            tracing::debug!(
                file = %file.name,
                original = file.bytes.len(),
                encoded = encoded.len(),
                "Re-encoded image is not smaller, keeping original"
            );
            return Ok(file);
        }

        tracing::debug!(
            file = %file.name,
            original = file.bytes.len(),
            compressed = encoded.len(),
            width = img.width(),
            height = img.height(),
            "Image compressed"
        );

        Ok(SourceFile {
            name: file.name,
            content_type: Some("image/jpeg".to_string()),
            bytes: Bytes::from(encoded),
        })
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| CompressError::Encode(e.to_string()))?;
    Ok(out)
}

#[async_trait]
impl Compressor for ImageCompressor {
    #[tracing::instrument(
        name = "compress.image",
        skip(self, file, options),
        fields(file = %file.name, bytes = file.bytes.len()),
        err
    )]
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> Result<SourceFile, CompressError> {
        let file = file.clone();
        let options = *options;
        tokio::task::spawn_blocking(move || Self::compress_blocking(file, options))
            .await
            .map_err(|e| CompressError::Task(e.to_string()))?
    }
}
