//! Configuration loading and types for bucketprobe.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; a scan can be driven
//! entirely from command-line flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bucket::CredentialSet;
use crate::scan::classifier::DenialPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// The bucket to examine.
    #[serde(default)]
    pub bucket: BucketConfig,

    /// Optional storage credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Probing behaviour.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Where findings are written.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Bucket under examination.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Bucket name.
    #[serde(default)]
    pub name: String,

    /// AWS region. Resolved from the public endpoint when absent.
    #[serde(default)]
    pub region: Option<String>,

    /// Whether the bucket belongs to the configured credentials. Supplied
    /// by whoever knows the account inventory; never inferred.
    #[serde(default)]
    pub owned_by_credentials: bool,

    /// Public endpoint template; `{bucket}` is replaced by the bucket name.
    #[serde(default = "default_public_endpoint")]
    pub public_endpoint: String,

    /// Custom S3-compatible API endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Force path-style URL addressing for API calls.
    #[serde(default)]
    pub use_path_style: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            region: None,
            owned_by_credentials: false,
            public_endpoint: default_public_endpoint(),
            endpoint_url: None,
            use_path_style: false,
        }
    }
}

/// Storage credentials.
///
/// Field names accept both `access_key_id` and the shorter `access_key`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    #[serde(alias = "access_key", default)]
    pub access_key_id: Option<String>,

    #[serde(alias = "secret_key", default)]
    pub secret_access_key: Option<String>,
}

impl CredentialsConfig {
    /// Fill missing values from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    pub fn merge_env(&mut self) {
        if self.access_key_id.is_none() && self.secret_access_key.is_none() {
            self.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
            self.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        }
    }

    /// The configured credential set, if complete.
    pub fn credential_set(&self) -> Option<CredentialSet> {
        CredentialSet::from_parts(
            self.access_key_id.as_deref(),
            self.secret_access_key.as_deref(),
        )
    }
}

/// Probing behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Worker pool width for each classification pass.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum keys taken from the authenticated listing call.
    #[serde(default = "default_api_list_limit")]
    pub api_list_limit: usize,

    /// Maximum keys taken from the public XML index.
    #[serde(default = "default_http_list_limit")]
    pub http_list_limit: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Overall scan deadline in seconds (unset = no deadline).
    #[serde(default)]
    pub deadline_seconds: Option<u64>,

    /// What a worker does when a probe is denied.
    #[serde(default)]
    pub on_denied: DenialPolicy,

    /// Request a brute-force follow-up over the listed keys.
    #[serde(default = "default_true")]
    pub bruteforce_found_objects: bool,

    /// Extra candidate keys to classify even when listing is not public.
    #[serde(default)]
    pub candidate_keys: Vec<String>,

    /// File with one candidate key per line.
    #[serde(default)]
    pub candidate_keys_file: Option<PathBuf>,
}

impl ScanConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }

    /// Inline candidate keys followed by those read from
    /// `candidate_keys_file`. Blank lines and `#` comments are skipped.
    pub fn load_candidate_keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys = self.candidate_keys.clone();
        if let Some(ref path) = self.candidate_keys_file {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("failed to read candidate keys from {}: {e}", path.display())
            })?;
            keys.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string),
            );
        }
        Ok(keys)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            api_list_limit: default_api_list_limit(),
            http_list_limit: default_http_list_limit(),
            request_timeout_seconds: default_request_timeout(),
            deadline_seconds: None,
            on_denied: DenialPolicy::default(),
            bruteforce_found_objects: true,
            candidate_keys: Vec::new(),
            candidate_keys_file: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection.
    #[serde(default)]
    pub metrics: bool,

    /// Write the Prometheus exposition text here when the scan ends.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

/// Findings output.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputConfig {
    /// JSON-lines file receiving findings; stdout when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_public_endpoint() -> String {
    "https://{bucket}.s3.amazonaws.com".to_string()
}

fn default_workers() -> usize {
    20
}

fn default_api_list_limit() -> usize {
    1000
}

fn default_http_list_limit() -> usize {
    999
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
