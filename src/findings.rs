//! Findings and the sinks that receive them.
//!
//! A scan produces at most one finding of each kind.  Where they end up
//! (stdout, a file, an issue tracker) is the sink's business.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

use crate::scan::classifier::Strategy;
use crate::scan::lister::ListingSource;

/// Something worth reporting about a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// The bucket lists its keys to everyone or to any authenticated user.
    BucketListable {
        uri: String,
        source: ListingSource,
        proof: String,
        keys: Vec<String>,
    },
    /// Individual objects can be read without owning the bucket.
    ReadableObjects { strategy: Strategy, keys: Vec<String> },
    /// The bucket does not expose a listing.
    ListingNotPublic { uri: String },
    /// The public access block makes public objects impossible.
    PublicAccessBlocked,
    /// Follow-up brute-force task over the discovered keys.
    BruteforceRequested { keys: Vec<String> },
}

impl Finding {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Finding::BucketListable { .. } => "bucket_listable",
            Finding::ReadableObjects { .. } => "readable_objects",
            Finding::ListingNotPublic { .. } => "listing_not_public",
            Finding::PublicAccessBlocked => "public_access_blocked",
            Finding::BruteforceRequested { .. } => "bruteforce_requested",
        }
    }

    /// Whether this finding describes an exposure (as opposed to a
    /// negative result or a follow-up request).
    pub fn is_exposure(&self) -> bool {
        matches!(
            self,
            Finding::BucketListable { .. } | Finding::ReadableObjects { .. }
        )
    }
}

/// Receiver of findings.
pub trait FindingSink: Send + Sync {
    fn report(&self, bucket: &str, finding: &Finding) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct FindingRecord<'a> {
    bucket: &'a str,
    discovered_at: String,
    #[serde(flatten)]
    finding: &'a Finding,
}

/// Writes one JSON object per finding, newline-delimited.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> FindingSink for JsonLinesSink<W> {
    fn report(&self, bucket: &str, finding: &Finding) -> anyhow::Result<()> {
        let record = FindingRecord {
            bucket,
            discovered_at: chrono::Utc::now().to_rfc3339(),
            finding,
        };
        let line = serde_json::to_string(&record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("finding writer poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Collects findings in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    findings: Mutex<Vec<Finding>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.findings
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }
}

impl FindingSink for MemorySink {
    fn report(&self, _bucket: &str, finding: &Finding) -> anyhow::Result<()> {
        self.findings
            .lock()
            .map_err(|_| anyhow::anyhow!("finding store poisoned"))?
            .push(finding.clone());
        Ok(())
    }
}
