//! HTTP multipart transport
//!
//! Uploads a payload as `multipart/form-data` (field `file`) with
//! `POST {base_url}/uploads` and expects a JSON body carrying the stored
//! object's `url`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use upload_orchestrator::job::SourceFile;
//! use upload_orchestrator::transport::{HttpTransport, HttpTransportConfig, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(HttpTransportConfig::new("http://localhost:3333"))?;
//!
//! let file = SourceFile::new("hello.txt", "Hello, World!");
//! let response = transport
//!     .send(file, Arc::new(|sent| println!("{sent} bytes")), CancellationToken::new())
//!     .await?;
//! println!("Stored at {}", response.url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ProgressFn, Transport, TransportError, UploadResponse};
use crate::job::SourceFile;

/// Default body chunk size, and so progress granularity: 64KB
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Multipart field carrying the payload
pub const FILE_FIELD: &str = "file";

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    /// Whole-request timeout, `None` for no limit
    pub timeout: Option<Duration>,
    pub chunk_size: usize,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Transport that posts files to a storage service over HTTP
pub struct HttpTransport {
    config: HttpTransportConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(TransportError::Config(format!(
                "base URL '{}' must start with http:// or https://",
                config.base_url
            )));
        }
        if config.chunk_size == 0 {
            return Err(TransportError::Config("chunk size must be positive".into()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        let endpoint = format!("{}/uploads", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    /// Full upload URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the multipart form, streaming the payload in chunks and
    /// reporting cumulative bytes as each chunk is handed to the connection
    fn build_form(&self, payload: &SourceFile, on_progress: ProgressFn) -> Result<Form, TransportError> {
        let chunks = split_chunks(&payload.bytes, self.config.chunk_size);
        let mut sent = 0u64;
        let body = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(body), payload.size())
            .file_name(payload.name.clone());
        if let Some(content_type) = &payload.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| TransportError::Request(format!("invalid content type: {}", e)))?;
        }

        Ok(Form::new().part(FILE_FIELD, part))
    }

    async fn post(&self, form: Form) -> Result<UploadResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        if parsed.url.trim().is_empty() {
            return Err(TransportError::InvalidResponse("empty url".into()));
        }

        Ok(parsed)
    }
}

fn split_chunks(bytes: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(bytes.len())))
        .collect()
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(
        name = "transport.http.send",
        skip(self, payload, on_progress, cancel),
        fields(
            http.method = "POST",
            http.url = %self.endpoint,
            upload.file = %payload.name,
            upload.bytes = payload.bytes.len()
        ),
        err
    )]
    async fn send(
        &self,
        payload: SourceFile,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<UploadResponse, TransportError> {
        let form = self.build_form(&payload, on_progress)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Upload request aborted");
                return Err(TransportError::Canceled);
            }
            result = self.post(form) => result?,
        };

        tracing::debug!(url = %response.url, "Upload stored");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let transport = HttpTransport::new(HttpTransportConfig::new("http://localhost:3333/")).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:3333/uploads");
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = HttpTransport::new(HttpTransportConfig::new("ftp://storage"));
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let mut config = HttpTransportConfig::new("http://localhost");
        config.chunk_size = 0;
        assert!(HttpTransport::new(config).is_err());
    }

    #[test]
    fn test_split_chunks() {
        let bytes = Bytes::from(vec![7u8; 10]);
        let chunks = split_chunks(&bytes, 4);
        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(split_chunks(&Bytes::new(), 4).is_empty());
    }
}
