//! Upload Orchestrator - command line driver
//!
//! Uploads the given files through the orchestration engine and reports
//! progress until every upload has settled.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use upload_orchestrator::config::{Config, LogFormat};
use upload_orchestrator::{logging, metrics, SourceFile, UploadEngine, UploadStatus};

/// Upload files with compression, live progress and per-file outcome
#[derive(Parser, Debug)]
#[command(name = "upload-orchestrator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Storage base URL, overrides the configuration file
    #[arg(short, long)]
    base_url: Option<String>,

    /// Log filter (trace, debug, info, warn, error or a RUST_LOG directive)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after all uploads settle
    #[arg(long)]
    print_metrics: bool,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match (&args.base_url, args.config.exists()) {
        (_, true) => Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?,
        (Some(base_url), false) => Config::with_base_url(base_url.clone()),
        (None, false) => anyhow::bail!(
            "configuration file {} not found and no --base-url given",
            args.config.display()
        ),
    };

    if let Some(base_url) = &args.base_url {
        config.transport.base_url = base_url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json {
        config.logging.format = LogFormat::Json;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(&args)?;

    logging::init_subscriber(&config.logging)?;
    info!("Starting Upload Orchestrator v{}", upload_orchestrator::VERSION);

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = SourceFile::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(file);
    }

    let engine = UploadEngine::from_config(&config)?;
    let mut rx = engine.subscribe();
    engine.add_uploads(files);

    let mut last_percentage = None;
    loop {
        let progress = rx.borrow_and_update().progress();
        if last_percentage != Some(progress.global_percentage) {
            info!(percentage = progress.global_percentage, "Upload progress");
            last_percentage = Some(progress.global_percentage);
        }
        if !progress.any_pending || rx.changed().await.is_err() {
            break;
        }
    }

    let snapshot = engine.snapshot();
    let mut failed = 0usize;
    for job in snapshot.iter() {
        match job.status {
            UploadStatus::Success => info!(
                file = %job.name,
                url = job.remote_url.as_deref().unwrap_or_default(),
                bytes = job.compressed_size_bytes.unwrap_or(job.original_size_bytes),
                "Uploaded"
            ),
            status => {
                failed += 1;
                warn!(file = %job.name, status = %status, "Upload did not complete");
            }
        }
    }

    if args.print_metrics {
        print!("{}", metrics::gather_text()?);
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
