//! Shared test infrastructure
//!
//! Scripted compressor and transport whose behaviour is selected by the
//! file name, plus helpers to wait for registry states.
//!
//! | Name contains | Compressor | Transport |
//! |---------------|------------|-----------|
//! | `slow` | waits for a compression permit | |
//! | `badimg` | fails to decode | |
//! | `quarter` | returns a quarter of the payload | |
//! | `hold` | | reports half, then waits for a transport permit |
//! | `fail` | | fails with a request error |

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use upload_orchestrator::compress::{CompressError, CompressionOptions, Compressor};
use upload_orchestrator::transport::{ProgressFn, Transport, TransportError, UploadResponse};
use upload_orchestrator::{RegistrySnapshot, SourceFile, UploadEngine};

/// Upper bound for any wait in the tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ScriptedCompressor {
    pub gate: Arc<Semaphore>,
    pub calls: AtomicUsize,
}

impl ScriptedCompressor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            calls: AtomicUsize::new(0),
        })
    }

    /// Let one gated compression finish
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Compressor for ScriptedCompressor {
    async fn compress(
        &self,
        file: &SourceFile,
        _options: &CompressionOptions,
    ) -> Result<SourceFile, CompressError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if file.name.contains("slow") {
            self.gate
                .acquire()
                .await
                .map_err(|e| CompressError::Task(e.to_string()))?
                .forget();
        }
        if file.name.contains("badimg") {
            return Err(CompressError::Decode("not an image".into()));
        }
        if file.name.contains("quarter") {
            let len = file.bytes.len() / 4;
            return Ok(SourceFile {
                name: file.name.clone(),
                content_type: file.content_type.clone(),
                bytes: file.bytes.slice(..len),
            });
        }
        Ok(file.clone())
    }
}

pub struct ScriptedTransport {
    pub gate: Arc<Semaphore>,
    pub sends: AtomicUsize,
    pub cancellations: AtomicUsize,
    /// When set, `fail` files succeed from this send count on
    pub fail_until: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            sends: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            fail_until: AtomicUsize::new(usize::MAX),
        })
    }

    /// Let one held transfer finish
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        payload: SourceFile,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<UploadResponse, TransportError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Canceled);
        }

        if payload.name.contains("fail") && n < self.fail_until.load(Ordering::SeqCst) {
            return Err(TransportError::Request("connection reset".into()));
        }

        let size = payload.size();
        on_progress(size / 2);
        tokio::task::yield_now().await;

        if payload.name.contains("hold") {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    return Err(TransportError::Canceled);
                }
                permit = self.gate.acquire() => {
                    permit
                        .map_err(|e| TransportError::Request(e.to_string()))?
                        .forget();
                }
            }
        }

        on_progress(size);
        Ok(UploadResponse {
            url: format!("https://cdn.test/{}/{}", n, payload.name),
        })
    }
}

/// Engine wired to fresh scripted collaborators
pub fn scripted_engine() -> (UploadEngine, Arc<ScriptedCompressor>, Arc<ScriptedTransport>) {
    let compressor = ScriptedCompressor::new();
    let transport = ScriptedTransport::new();
    let engine = UploadEngine::builder(compressor.clone(), transport.clone())
        .metrics(false)
        .build()
        .expect("inside a runtime");
    (engine, compressor, transport)
}

/// File of `size` bytes named `name`
pub fn file(name: &str, size: usize) -> SourceFile {
    SourceFile::new(name, vec![0xAB; size])
}

/// Wait until the registry satisfies `predicate`
pub async fn wait_until<F>(engine: &UploadEngine, mut predicate: F) -> RegistrySnapshot
where
    F: FnMut(&RegistrySnapshot) -> bool,
{
    let mut rx = engine.subscribe();
    let waited = tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for registry state")
        .expect("registry sender dropped")
        .clone();
    waited
}

/// Wait until a counter reaches `target`
pub async fn wait_for_count(counter: impl Fn() -> usize, target: usize) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while counter() < target {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for counter");
}
