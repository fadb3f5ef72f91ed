//! Compression step
//!
//! Runs before transmission and produces a (possibly smaller) payload.
//! Compression never mutates its input and may hand it back unchanged when
//! it does not apply to the file's type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::SourceFile;

mod raster;

pub use raster::ImageCompressor;

/// Compression errors
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Compression canceled")]
    Canceled,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Compression task failed: {0}")]
    Task(String),
}

impl CompressError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, CompressError::Canceled)
    }
}

/// Target bounds handed to the compressor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality factor in (0.0, 1.0]
    pub quality: f32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: 1000,
            max_height: 1000,
            quality: 0.8,
        }
    }
}

impl CompressionOptions {
    /// Quality scaled to the 1..=100 range used by lossy encoders
    pub fn quality_percent(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Compression step contract
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Produce the payload to transmit for `file`
    async fn compress(
        &self,
        file: &SourceFile,
        options: &CompressionOptions,
    ) -> Result<SourceFile, CompressError>;
}

/// Compressor that always transmits the original payload
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

#[async_trait]
impl Compressor for PassthroughCompressor {
    async fn compress(
        &self,
        file: &SourceFile,
        _options: &CompressionOptions,
    ) -> Result<SourceFile, CompressError> {
        Ok(file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CompressionOptions::default();
        assert_eq!(options.max_width, 1000);
        assert_eq!(options.max_height, 1000);
        assert_eq!(options.quality, 0.8);
        assert_eq!(options.quality_percent(), 80);
    }

    #[test]
    fn test_quality_percent_is_clamped() {
        let options = CompressionOptions {
            quality: 0.0,
            ..Default::default()
        };
        assert_eq!(options.quality_percent(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_returns_input() {
        let file = SourceFile::new("notes.txt", "hello");
        let out = PassthroughCompressor
            .compress(&file, &CompressionOptions::default())
            .await
            .unwrap();
        assert_eq!(out, file);
    }

    #[test]
    fn test_canceled_is_distinguishable() {
        assert!(CompressError::Canceled.is_canceled());
        assert!(!CompressError::Decode("bad".into()).is_canceled());
    }
}
