//! Transport client
//!
//! Sends one payload to the storage endpoint, reporting byte-level progress
//! and honouring a cancellation token.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::job::SourceFile;

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};

/// Progress callback, invoked with the cumulative number of bytes sent
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Upload canceled")]
    Canceled,

    #[error("Invalid transport configuration: {0}")]
    Config(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Storage responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, TransportError::Canceled)
    }
}

/// Storage response for a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    /// Canonical URL of the stored object
    pub url: String,
}

/// Transport client contract
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload`, calling `on_progress` as bytes go out
    ///
    /// Must fail with [`TransportError::Canceled`] once `cancel` has been
    /// triggered and the transfer observed it.
    async fn send(
        &self,
        payload: SourceFile,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<UploadResponse, TransportError>;
}
