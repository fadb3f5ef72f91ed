//! One run of the compress → transmit pipeline for a job

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::EngineInner;
use crate::compress::CompressError;
use crate::job::{JobPatch, SourceFile, UploadId, UploadStatus};
use crate::metrics;
use crate::transport::{ProgressFn, TransportError};

/// Failure of a single attempt
#[derive(Error, Debug)]
enum AttemptError {
    #[error("compression failed: {0}")]
    Compress(#[from] CompressError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl AttemptError {
    fn is_canceled(&self) -> bool {
        match self {
            AttemptError::Compress(e) => e.is_canceled(),
            AttemptError::Transport(e) => e.is_canceled(),
        }
    }
}

pub(crate) struct Attempt {
    id: UploadId,
    number: u64,
    token: CancellationToken,
    file: SourceFile,
}

impl Attempt {
    pub(crate) fn new(id: UploadId, number: u64, token: CancellationToken, file: SourceFile) -> Self {
        Self {
            id,
            number,
            token,
            file,
        }
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }

    /// Run the pipeline and settle the job
    ///
    /// Every failure is converted into a registry transition here; nothing
    /// propagates to the caller.
    #[tracing::instrument(
        name = "upload.attempt",
        skip(self, inner),
        fields(upload.id = %self.id, upload.attempt = self.number)
    )]
    pub(crate) async fn run(self, inner: Arc<EngineInner>) {
        let started = Instant::now();
        let outcome = self.pipeline(&inner).await;

        let (status, patch, failure) = match outcome {
            Ok(url) => (
                UploadStatus::Success,
                JobPatch::new()
                    .status(UploadStatus::Success)
                    .remote_url(Some(url)),
                None,
            ),
            Err(e) if e.is_canceled() => (
                UploadStatus::Canceled,
                JobPatch::new().status(UploadStatus::Canceled),
                None,
            ),
            Err(e) => (
                UploadStatus::Error,
                JobPatch::new().status(UploadStatus::Error),
                Some(e),
            ),
        };

        let elapsed = started.elapsed();
        let applied = inner.registry.update_attempt(&self.id, self.number, patch);

        if inner.metrics {
            if applied {
                metrics::record_attempt_settled(status, elapsed.as_secs_f64());
            } else {
                metrics::record_attempt_superseded(elapsed.as_secs_f64());
            }
        }

        if !applied {
            tracing::debug!(status = %status, "Attempt superseded, outcome discarded");
            return;
        }

        match (status, failure) {
            (UploadStatus::Success, _) => tracing::info!(
                duration_ms = elapsed.as_millis(),
                "Upload completed"
            ),
            (UploadStatus::Canceled, _) => tracing::warn!("Upload canceled"),
            (_, Some(e)) => tracing::error!(error = %e, "Upload failed"),
            _ => {}
        }
    }

    async fn pipeline(&self, inner: &Arc<EngineInner>) -> Result<String, AttemptError> {
        let compressed = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CompressError::Canceled),
            result = inner.compressor.compress(&self.file, &inner.options) => result,
        }?;

        let compressed_size = compressed.size();
        inner.registry.update_attempt(
            &self.id,
            self.number,
            JobPatch::new().compressed_size(Some(compressed_size)),
        );
        if inner.metrics {
            metrics::record_compression(self.file.size(), compressed_size);
        }
        tracing::debug!(
            original = self.file.size(),
            compressed = compressed_size,
            "Compression finished"
        );

        let on_progress: ProgressFn = {
            let inner = Arc::clone(inner);
            let id = self.id;
            let number = self.number;
            Arc::new(move |sent| {
                inner
                    .registry
                    .update_attempt(&id, number, JobPatch::new().uploaded(sent));
            })
        };

        let response = inner
            .transport
            .send(compressed, on_progress, self.token.clone())
            .await?;

        if response.url.trim().is_empty() {
            return Err(TransportError::InvalidResponse("empty url".into()).into());
        }
        if inner.metrics {
            metrics::record_uploaded_bytes(compressed_size);
        }

        Ok(response.url)
    }
}
