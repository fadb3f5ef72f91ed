//! Upload job model
//!
//! One [`UploadJob`] exists per submitted file. Jobs are owned by the engine's
//! registry and only ever handed out as clones, so every field here describes
//! a point-in-time view. Mutating a clone never reaches the registry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::progress::rounded_percentage;

/// Opaque, unique identifier of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Allocate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a job's current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Queued or running (compressing or transmitting)
    Progress,
    Success,
    Error,
    Canceled,
}

impl UploadStatus {
    /// Whether the attempt has reached a terminal state
    pub fn is_settled(&self) -> bool {
        !matches!(self, UploadStatus::Progress)
    }

    /// Whether a retry makes sense from this state
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadStatus::Error | UploadStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Progress => "progress",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
            UploadStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file payload handed to the engine, the compressor and the transport
///
/// The payload is reference counted, so cloning a `SourceFile` never copies
/// the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk
    ///
    /// The content type is taken from the image header when the bytes are a
    /// recognised image format.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let content_type = image::guess_format(&bytes)
            .ok()
            .map(|format| image_mime(format).to_string());

        Ok(Self {
            name,
            content_type,
            bytes: Bytes::from(bytes),
        })
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

fn image_mime(format: image::ImageFormat) -> &'static str {
    match format {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::WebP => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Point-in-time view of one file's upload lifecycle
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: UploadId,
    pub name: String,
    pub file: SourceFile,
    pub status: UploadStatus,
    pub original_size_bytes: u64,
    /// Set once compression finished for the current attempt
    pub compressed_size_bytes: Option<u64>,
    /// Reset to 0 at the start of every attempt
    pub uploaded_size_bytes: u64,
    /// Present iff `status == Success`
    pub remote_url: Option<String>,
    /// Number of the current attempt, 0 before the first one starts
    pub attempt: u64,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl UploadJob {
    /// Create a freshly queued job for `file`
    pub fn new(id: UploadId, file: SourceFile) -> Self {
        Self {
            id,
            name: file.name.clone(),
            original_size_bytes: file.size(),
            file,
            status: UploadStatus::Progress,
            compressed_size_bytes: None,
            uploaded_size_bytes: 0,
            remote_url: None,
            attempt: 0,
            cancellation: None,
        }
    }

    /// Denominator used for progress: compressed size once known
    pub fn effective_total_bytes(&self) -> u64 {
        self.compressed_size_bytes
            .unwrap_or(self.original_size_bytes)
    }

    /// Whether an attempt is in flight and can still be canceled
    pub fn has_active_attempt(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Per-job completion percentage, 0..=100
    pub fn progress_percentage(&self) -> u8 {
        match self.status {
            UploadStatus::Success => 100,
            _ => rounded_percentage(self.uploaded_size_bytes, self.effective_total_bytes()),
        }
    }

    /// Fraction of the original size saved by compression
    ///
    /// `None` until compression has run for the current attempt.
    pub fn compression_ratio(&self) -> Option<f64> {
        let compressed = self.compressed_size_bytes?;
        if self.original_size_bytes == 0 {
            return Some(0.0);
        }
        let saved = self.original_size_bytes.saturating_sub(compressed);
        Some(saved as f64 / self.original_size_bytes as f64)
    }
}

/// Partial update applied to a job by the registry
///
/// Fields left as `None` are untouched. The nested options on
/// `compressed_size_bytes` and `remote_url` allow clearing a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct JobPatch {
    pub(crate) status: Option<UploadStatus>,
    pub(crate) compressed_size_bytes: Option<Option<u64>>,
    pub(crate) uploaded_size_bytes: Option<u64>,
    pub(crate) remote_url: Option<Option<String>>,
}

impl JobPatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn status(mut self, status: UploadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn compressed_size(mut self, bytes: Option<u64>) -> Self {
        self.compressed_size_bytes = Some(bytes);
        self
    }

    pub(crate) fn uploaded(mut self, bytes: u64) -> Self {
        self.uploaded_size_bytes = Some(bytes);
        self
    }

    pub(crate) fn remote_url(mut self, url: Option<String>) -> Self {
        self.remote_url = Some(url);
        self
    }

    /// Apply the patch, returning whether anything changed
    pub(crate) fn apply(self, job: &mut UploadJob) -> bool {
        let mut changed = false;

        if let Some(status) = self.status {
            changed |= job.status != status;
            job.status = status;
        }
        if let Some(compressed) = self.compressed_size_bytes {
            changed |= job.compressed_size_bytes != compressed;
            job.compressed_size_bytes = compressed;
        }
        if let Some(uploaded) = self.uploaded_size_bytes {
            changed |= job.uploaded_size_bytes != uploaded;
            job.uploaded_size_bytes = uploaded;
        }
        if let Some(url) = self.remote_url {
            changed |= job.remote_url != url;
            job.remote_url = url;
        }

        changed
    }
}
