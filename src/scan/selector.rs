//! Strategy selection and the scan pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::classifier::{Classifier, DenialPolicy, PassReport, Prober, Strategy, DEFAULT_WORKERS};
use super::credentials::{self, CredentialState};
use super::lister::{self, ListLimits, Listing};
use super::policy::{self, GateDecision};
use super::session::{Session, SessionKind};
use crate::bucket::BucketDescriptor;
use crate::findings::{Finding, FindingSink};
use crate::http::HttpClient;
use crate::metrics::FINDINGS_TOTAL;
use crate::storage::backend::StorageApi;

/// Knobs of a single scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub workers: usize,
    pub limits: ListLimits,
    pub on_denied: DenialPolicy,
    /// Emit a brute-force follow-up over the listed keys.
    pub bruteforce_found_objects: bool,
    /// Keys to probe in addition to (or instead of) the listing.
    pub candidate_keys: Vec<String>,
    /// Overall time budget; the scan is cancelled when it runs out.
    pub deadline: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            limits: ListLimits::default(),
            on_denied: DenialPolicy::default(),
            bruteforce_found_objects: true,
            candidate_keys: Vec::new(),
            deadline: None,
        }
    }
}

/// Everything a scan observed, in pipeline order.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub credentials: CredentialState,
    pub session: SessionKind,
    /// `None` when the gate didn't run (bucket not owned).
    pub gate: Option<GateDecision>,
    #[serde(skip)]
    pub listing: Option<Listing>,
    pub passes: Vec<PassReport>,
    /// Union of readable keys over all passes, sorted.
    pub readable: Vec<String>,
    pub findings: usize,
    pub cancelled: bool,
}

impl ScanReport {
    fn new(credentials: CredentialState, session: SessionKind) -> Self {
        Self {
            credentials,
            session,
            gate: None,
            listing: None,
            passes: Vec::new(),
            readable: Vec::new(),
            findings: 0,
            cancelled: false,
        }
    }
}

/// Drives one bucket through validation, gating, listing and
/// classification, reporting findings as they are established.
pub struct Scanner {
    bucket: Arc<BucketDescriptor>,
    storage: Option<Arc<dyn StorageApi>>,
    http: Arc<dyn HttpClient>,
    owned: bool,
    options: ScanOptions,
    sink: Arc<dyn FindingSink>,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(
        bucket: BucketDescriptor,
        storage: Option<Arc<dyn StorageApi>>,
        http: Arc<dyn HttpClient>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        Self {
            bucket: Arc::new(bucket),
            storage,
            http,
            owned: false,
            options: ScanOptions::default(),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Mark the bucket as owned by the supplied credentials.
    pub fn owned(mut self, owned: bool) -> Self {
        self.owned = owned;
        self
    }

    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop the scan when `cancel` fires.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the scan to completion, the deadline, or cancellation.
    pub async fn run(&self) -> ScanReport {
        let cancel = self.cancel.child_token();
        let timer = self.options.deadline.map(|deadline| {
            let cancel = cancel.clone();
            let bucket = self.bucket.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(bucket = %bucket, ?deadline, "Scan deadline reached; cancelling");
                cancel.cancel();
            })
        });

        let mut report = self.run_pipeline(&cancel).await;
        report.cancelled = cancel.is_cancelled();

        if let Some(timer) = timer {
            timer.abort();
        }
        report
    }

    async fn run_pipeline(&self, cancel: &CancellationToken) -> ScanReport {
        let bucket = &self.bucket;
        info!(bucket = %bucket.name, region = %bucket.region, "Scanning bucket");

        let state = credentials::validate(self.storage.as_deref(), bucket, cancel).await;
        let session = Session::establish(state, self.storage.clone(), self.owned);
        let mut report = ScanReport::new(state, session.kind());

        if let Session::Owner(storage) = &session {
            let gate = policy::check_public_access_block(storage.as_ref(), bucket, cancel).await;
            report.gate = Some(gate);
            if gate == GateDecision::Blocked {
                self.emit(&mut report, Finding::PublicAccessBlocked);
                return report;
            }
        }

        let listing = lister::list_keys(
            bucket,
            session.storage().map(|s| s.as_ref()),
            self.http.as_ref(),
            self.options.limits,
            cancel,
        )
        .await;

        match &listing {
            Some(listing) => {
                let finding = Finding::BucketListable {
                    uri: bucket.public_endpoint.clone(),
                    source: listing.source,
                    proof: listing_proof(bucket, listing),
                    keys: listing.keys.clone(),
                };
                self.emit(&mut report, finding);
            }
            None if cancel.is_cancelled() => return report,
            None => {
                self.emit(
                    &mut report,
                    Finding::ListingNotPublic {
                        uri: bucket.public_endpoint.clone(),
                    },
                );
                if self.options.candidate_keys.is_empty() {
                    return report;
                }
                info!(
                    bucket = %bucket.name,
                    count = self.options.candidate_keys.len(),
                    "Listing not public; probing caller-supplied keys"
                );
            }
        }

        let keys = merge_keys(
            listing.as_ref().map(|l| l.keys.as_slice()).unwrap_or_default(),
            &self.options.candidate_keys,
        );
        report.listing = listing;

        if keys.is_empty() || cancel.is_cancelled() {
            return report;
        }

        let classifier = Classifier::new(
            bucket.clone(),
            self.options.workers,
            self.options.on_denied,
            cancel.clone(),
        );

        let mut strategies = vec![session.primary_strategy()];
        if strategies[0] != Strategy::UnauthenticatedProbe {
            strategies.push(Strategy::UnauthenticatedProbe);
        }

        for strategy in strategies {
            if cancel.is_cancelled() {
                break;
            }
            let Some(prober) = Prober::new(strategy, &session, &self.http) else {
                continue;
            };
            let pass = classifier.classify(prober, keys.clone()).await;
            let found = !pass.readable.is_empty();
            report.passes.push(pass);
            if found {
                break;
            }
            if strategy != Strategy::UnauthenticatedProbe {
                info!(
                    bucket = %bucket.name,
                    strategy = strategy.as_str(),
                    "No readable objects found; falling back to unauthenticated probing"
                );
            }
        }

        if let Some(pass) = report.passes.last() {
            if !pass.readable.is_empty() {
                report.readable = pass.readable.clone();
                let finding = Finding::ReadableObjects {
                    strategy: pass.strategy,
                    keys: pass.readable.clone(),
                };
                self.emit(&mut report, finding);
            }
        }

        if self.options.bruteforce_found_objects {
            if let Some(listing) = report.listing.as_ref().filter(|l| !l.keys.is_empty()) {
                let finding = Finding::BruteforceRequested {
                    keys: listing.keys.clone(),
                };
                self.emit(&mut report, finding);
            }
        }

        report
    }

    fn emit(&self, report: &mut ScanReport, finding: Finding) {
        counter!(FINDINGS_TOTAL, "kind" => finding.kind()).increment(1);
        if finding.is_exposure() {
            warn!(bucket = %self.bucket.name, kind = finding.kind(), "Bucket exposes data");
        } else {
            info!(bucket = %self.bucket.name, kind = finding.kind(), "Finding");
        }
        match self.sink.report(&self.bucket.name, &finding) {
            Ok(()) => report.findings += 1,
            Err(e) => warn!(
                bucket = %self.bucket.name,
                kind = finding.kind(),
                error = %e,
                "Failed to report finding"
            ),
        }
    }
}

fn listing_proof(bucket: &BucketDescriptor, listing: &Listing) -> String {
    let how = match listing.source {
        lister::ListingSource::Api => "an authenticated ListObjectsV2 call",
        lister::ListingSource::Http => "an unauthenticated GET",
    };
    format!(
        "Bucket {} returned {} object key(s) to {} on {}",
        bucket.name,
        listing.keys.len(),
        how,
        bucket.public_endpoint
    )
}

/// Listing keys first, then unseen candidates, each key once.
fn merge_keys(listed: &[String], candidates: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(listed.len() + candidates.len());
    listed
        .iter()
        .chain(candidates)
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}
