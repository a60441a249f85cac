//! bucketprobe -- find publicly readable objects in an S3 bucket.
//!
//! One invocation scans one bucket. Findings are written as JSON lines;
//! SIGTERM/SIGINT cancel the scan, which then reports what it confirmed
//! so far.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bucketprobe::bucket::{resolve_region, BucketDescriptor};
use bucketprobe::config::{Config, LoggingConfig};
use bucketprobe::findings::{FindingSink, JsonLinesSink};
use bucketprobe::http::{HttpClient, ReqwestHttpClient};
use bucketprobe::scan::lister::ListLimits;
use bucketprobe::scan::{ScanOptions, Scanner};
use bucketprobe::storage::aws::{AwsClientOptions, AwsStorageClient};
use bucketprobe::storage::backend::StorageApi;

/// Region assumed when neither configuration nor the endpoint name one.
const FALLBACK_REGION: &str = "us-east-1";

/// Command-line arguments for bucketprobe.
#[derive(Parser, Debug)]
#[command(
    name = "bucketprobe",
    version,
    about = "Discover publicly readable objects in an S3 bucket"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bucket to scan (overrides `bucket.name`).
    #[arg(short, long)]
    bucket: Option<String>,

    /// Bucket region (overrides `bucket.region`).
    #[arg(short, long)]
    region: Option<String>,

    /// The configured credentials own the bucket.
    #[arg(long)]
    owned: bool,

    /// File with extra candidate keys, one per line.
    #[arg(long)]
    keys_file: Option<PathBuf>,

    /// Write findings to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker pool width.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level (overrides `logging.level`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(bucket) = self.bucket {
            config.bucket.name = bucket;
        }
        if self.region.is_some() {
            config.bucket.region = self.region;
        }
        if self.owned {
            config.bucket.owned_by_credentials = true;
        }
        if self.keys_file.is_some() {
            config.scan.candidate_keys_file = self.keys_file;
        }
        if self.output.is_some() {
            config.output.path = self.output;
        }
        if let Some(workers) = self.workers {
            config.scan.workers = workers;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    // Logs go to stderr; stdout carries findings.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => bucketprobe::config::load_config(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.credentials.merge_env();

    init_tracing(&config.logging);

    if config.bucket.name.is_empty() {
        anyhow::bail!("no bucket given; set bucket.name or pass --bucket");
    }

    if config.observability.metrics {
        bucketprobe::metrics::init_metrics()?;
        bucketprobe::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new(config.scan.request_timeout())?);

    let template = BucketDescriptor::new(&config.bucket.name, "", &config.bucket.public_endpoint);
    let region = match config.bucket.region.clone() {
        Some(region) => region,
        None => resolve_region(http.as_ref(), &template.public_endpoint)
            .await
            .unwrap_or_else(|| FALLBACK_REGION.to_string()),
    };
    let bucket = BucketDescriptor::new(&config.bucket.name, &region, &config.bucket.public_endpoint);

    let storage: Option<Arc<dyn StorageApi>> = match config.credentials.credential_set() {
        Some(credentials) => {
            let options = AwsClientOptions {
                region: region.clone(),
                endpoint_url: config.bucket.endpoint_url.clone(),
                use_path_style: config.bucket.use_path_style,
                operation_timeout: config.scan.request_timeout(),
            };
            let client: Arc<dyn StorageApi> =
                Arc::new(AwsStorageClient::new(&credentials, &options).await);
            Some(client)
        }
        None => {
            info!("No AWS credentials supplied; using unauthenticated techniques only");
            None
        }
    };

    let sink: Arc<dyn FindingSink> = match config.output.path {
        Some(ref path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating findings file {}", path.display()))?;
            Arc::new(JsonLinesSink::new(file))
        }
        None => Arc::new(JsonLinesSink::new(std::io::stdout())),
    };

    let options = ScanOptions {
        workers: config.scan.workers,
        limits: ListLimits {
            api: config.scan.api_list_limit,
            http: config.scan.http_list_limit,
        },
        on_denied: config.scan.on_denied,
        bruteforce_found_objects: config.scan.bruteforce_found_objects,
        candidate_keys: config.scan.load_candidate_keys()?,
        deadline: config.scan.deadline(),
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let scanner = Scanner::new(bucket, storage, http, sink)
        .owned(config.bucket.owned_by_credentials)
        .options(options)
        .cancel_token(cancel);
    let report = scanner.run().await;

    info!(
        bucket = %config.bucket.name,
        session = ?report.session,
        passes = report.passes.len(),
        readable = report.readable.len(),
        findings = report.findings,
        cancelled = report.cancelled,
        "Scan finished"
    );

    if let (Some(path), Some(text)) = (
        config.observability.metrics_path.as_ref(),
        bucketprobe::metrics::render(),
    ) {
        std::fs::write(path, text)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then cancel the scan.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, cancelling scan");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling scan");
        },
    }
    cancel.cancel();
}
