//! Upload Orchestrator Library
//!
//! Tracks a batch of file uploads through a compress → transmit pipeline with
//! live per-file and aggregate progress, cancellation and retry.
//!
//! # Features
//!
//! - **Concurrent Jobs**: Every file runs as an independent Tokio task
//! - **Consistent Snapshots**: Observers read whole registry snapshots from a
//!   `watch` channel
//! - **Cooperative Cancellation**: Per-attempt tokens; a retry supersedes the
//!   previous attempt
//! - **Image Compression**: Oversized images are downscaled before upload
//! - **Multipart Transport**: Streams payloads to `POST {base_url}/uploads`
//!
//! # Example
//!
//! ```no_run
//! use upload_orchestrator::{Config, SourceFile, UploadEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = UploadEngine::from_config(&config)?;
//!
//!     engine.add_uploads(vec![SourceFile::from_path("photo.jpg").await?]);
//!
//!     let done = engine.wait_idle().await;
//!     for job in done.iter() {
//!         println!("{} -> {} {:?}", job.name, job.status, job.remote_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod compress;
pub mod config;
pub mod engine;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod progress;
mod registry;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineBuilder, UploadEngine};
pub use job::{SourceFile, UploadId, UploadJob, UploadStatus};
pub use progress::AggregateProgress;
pub use registry::RegistrySnapshot;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
