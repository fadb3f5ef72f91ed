//! Orchestration engine
//!
//! Owns the job registry and drives every job through compression and
//! transport. The three operations, [`add_uploads`](UploadEngine::add_uploads),
//! [`retry_upload`](UploadEngine::retry_upload) and
//! [`cancel_upload`](UploadEngine::cancel_upload), return immediately and
//! never fail: each attempt runs as its own Tokio task and its outcome is only
//! observable through the registry.
//!
//! # Attempts
//!
//! Every attempt gets a fresh [`CancellationToken`] and an attempt number.
//! Registry writes made by an attempt are tagged with that number, so once a
//! retry supersedes it nothing the old attempt reports can reach the job.
//! Retrying a job whose attempt is still running cancels that attempt first.
//!
//! # Observation
//!
//! The engine is the registry's only writer. Observers get owned snapshots
//! and job clones; there is no handle that writes to the registry.
//!
//! ```compile_fail
//! # fn observe(engine: &upload_orchestrator::UploadEngine) {
//! let registry = engine.registry();
//! # }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use upload_orchestrator::config::Config;
//! use upload_orchestrator::engine::UploadEngine;
//! use upload_orchestrator::job::SourceFile;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = UploadEngine::from_config(&Config::with_base_url("http://localhost:3333"))?;
//!
//! let ids = engine.add_uploads(vec![SourceFile::new("a.txt", "hello")]);
//! let snapshot = engine.wait_idle().await;
//! println!("{:?}", snapshot.get(&ids[0]).map(|job| job.status));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::compress::{CompressionOptions, Compressor, ImageCompressor};
use crate::config::Config;
use crate::job::{SourceFile, UploadId, UploadJob, UploadStatus};
use crate::metrics;
use crate::progress::AggregateProgress;
use crate::registry::{JobRegistry, RegistrySnapshot};
use crate::transport::{HttpTransport, Transport, TransportError};

mod attempt;

use attempt::Attempt;

/// Engine construction errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Upload engine must be created inside a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Why an attempt was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Submit,
    Retry,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Submit => "submit",
            Trigger::Retry => "retry",
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) registry: JobRegistry,
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) options: CompressionOptions,
    pub(crate) metrics: bool,
    runtime: Handle,
}

/// Upload orchestration engine
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct UploadEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`UploadEngine`]
pub struct EngineBuilder {
    compressor: Arc<dyn Compressor>,
    transport: Arc<dyn Transport>,
    options: CompressionOptions,
    metrics: bool,
}

impl EngineBuilder {
    /// Compression bounds and quality. Default: [`CompressionOptions::default`]
    pub fn compression(mut self, options: CompressionOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable or disable Prometheus recording. Default: enabled
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Build the engine
    ///
    /// Must be called from within a Tokio runtime; attempts are spawned on
    /// that runtime.
    pub fn build(self) -> Result<UploadEngine, EngineError> {
        let runtime = Handle::try_current()?;
        Ok(UploadEngine {
            inner: Arc::new(EngineInner {
                registry: JobRegistry::new(),
                compressor: self.compressor,
                transport: self.transport,
                options: self.options,
                metrics: self.metrics,
                runtime,
            }),
        })
    }
}

impl UploadEngine {
    /// Start building an engine with the given collaborators
    pub fn builder(compressor: Arc<dyn Compressor>, transport: Arc<dyn Transport>) -> EngineBuilder {
        EngineBuilder {
            compressor,
            transport,
            options: CompressionOptions::default(),
            metrics: true,
        }
    }

    /// Create an engine with the given collaborators and metrics enabled
    pub fn new(
        compressor: Arc<dyn Compressor>,
        transport: Arc<dyn Transport>,
        options: CompressionOptions,
    ) -> Result<Self, EngineError> {
        Self::builder(compressor, transport).compression(options).build()
    }

    /// Create an engine with the image compressor and HTTP transport
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let transport = HttpTransport::new(config.http_transport())?;
        Self::builder(Arc::new(ImageCompressor::new()), Arc::new(transport))
            .compression(config.compression)
            .metrics(config.metrics.enabled)
            .build()
    }

    /// Register one job per file and start their attempts
    ///
    /// Returns the new ids in submission order. Attempts run concurrently
    /// and may complete in any order.
    #[tracing::instrument(name = "engine.add_uploads", skip(self, files), fields(files = tracing::field::Empty))]
    pub fn add_uploads<I>(&self, files: I) -> Vec<UploadId>
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let mut ids = Vec::new();

        for file in files {
            let mut id = UploadId::new();
            let mut job = UploadJob::new(id, file);
            while !self.inner.registry.insert(id, job.clone()) {
                id = UploadId::new();
                job.id = id;
            }

            tracing::info!(
                upload.id = %id,
                upload.name = %job.name,
                upload.bytes = job.original_size_bytes,
                "Upload queued"
            );

            self.start_attempt(id, Trigger::Submit);
            ids.push(id);
        }

        tracing::Span::current().record("files", ids.len());
        ids
    }

    /// Start a brand-new attempt for `id`
    ///
    /// Unknown ids are ignored. A running attempt is canceled and superseded.
    #[tracing::instrument(name = "engine.retry_upload", skip(self), fields(upload.id = %id))]
    pub fn retry_upload(&self, id: &UploadId) {
        if !self.inner.registry.contains(id) {
            tracing::debug!("Retry for unknown upload ignored");
            return;
        }
        self.start_attempt(*id, Trigger::Retry);
    }

    /// Request cancellation of the running attempt for `id`
    ///
    /// The job moves to `canceled` once the attempt observes the request.
    /// Unknown ids and jobs without a running attempt are ignored.
    #[tracing::instrument(name = "engine.cancel_upload", skip(self), fields(upload.id = %id))]
    pub fn cancel_upload(&self, id: &UploadId) {
        let token = self
            .inner
            .registry
            .get(id)
            .and_then(|job| job.cancellation);

        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                tracing::info!("Upload cancellation requested");
            }
            _ => tracing::debug!("No running attempt to cancel"),
        }
    }

    /// Receiver woken on every registry change
    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.inner.registry.subscribe()
    }

    /// Copy of the current registry state
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.registry.snapshot()
    }

    pub fn get(&self, id: &UploadId) -> Option<UploadJob> {
        self.inner.registry.get(id)
    }

    /// Current aggregate progress
    pub fn progress(&self) -> AggregateProgress {
        self.inner.registry.progress()
    }

    /// Wait until no job is in `progress` and return that snapshot
    pub async fn wait_idle(&self) -> RegistrySnapshot {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|snapshot| !snapshot.progress().any_pending)
            .await
            .map(|snapshot| snapshot.clone());
        // The sender lives as long as `self`, so waiting cannot fail
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Reset the job for a new attempt and spawn its pipeline
    fn start_attempt(&self, id: UploadId, trigger: Trigger) {
        let started = self.inner.registry.modify(&id, |job| {
            if let Some(previous) = job.cancellation.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            job.attempt += 1;
            job.cancellation = Some(token.clone());
            job.status = UploadStatus::Progress;
            job.uploaded_size_bytes = 0;
            job.compressed_size_bytes = None;
            job.remote_url = None;
            Some(Attempt::new(id, job.attempt, token, job.file.clone()))
        });

        let Some(attempt) = started.flatten() else {
            return;
        };

        tracing::debug!(
            upload.id = %id,
            upload.attempt = attempt.number(),
            trigger = trigger.as_str(),
            "Starting upload attempt"
        );

        if self.inner.metrics {
            metrics::record_attempt_started(trigger.as_str());
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(attempt.run(inner));
    }
}
