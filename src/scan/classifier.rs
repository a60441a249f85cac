//! Readability classification.
//!
//! A pass probes every candidate key with exactly one [`Strategy`],
//! spread over a bounded pool of workers that drain a shared
//! [`WorkQueue`].  The pass returns once every worker has stopped, either
//! because the queue is empty, the worker gave up after a denial, or the
//! scan was cancelled.

use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::cancellable;
use super::queue::{ResultSet, WorkQueue};
use super::session::Session;
use crate::bucket::BucketDescriptor;
use crate::errors::ProbeError;
use crate::http::HttpClient;
use crate::metrics::{ABANDONED_KEYS_TOTAL, PASS_DURATION_SECONDS, PROBES_TOTAL};
use crate::storage::backend::StorageApi;

/// Default worker pool width.
pub const DEFAULT_WORKERS: usize = 20;

/// How a key's readability is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Inspect object ACLs for public group grants (owned buckets).
    Acl,
    /// Signed `GetObject` with non-owning credentials.
    AuthenticatedProbe,
    /// Anonymous GET on the public object URL.
    UnauthenticatedProbe,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Acl => "acl",
            Strategy::AuthenticatedProbe => "authenticated_probe",
            Strategy::UnauthenticatedProbe => "unauthenticated_probe",
        }
    }
}

/// What a worker does after a signed probe is denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialPolicy {
    /// Stop this worker; keys it would have taken stay queued for its
    /// siblings or are abandoned when no sibling is left.
    #[default]
    ExitWorker,
    /// Skip the denied key and keep draining the queue.
    SkipKey,
}

/// Result of probing a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Readable,
    NotReadable,
    Denied,
    NotFound,
    TransportError,
    Cancelled,
}

impl ProbeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeOutcome::Readable => "readable",
            ProbeOutcome::NotReadable => "not_readable",
            ProbeOutcome::Denied => "denied",
            ProbeOutcome::NotFound => "not_found",
            ProbeOutcome::TransportError => "transport_error",
            ProbeOutcome::Cancelled => "cancelled",
        }
    }

    fn from_error(err: &ProbeError) -> Self {
        match err {
            ProbeError::AccessDenied { .. } => ProbeOutcome::Denied,
            ProbeError::NotFound { .. } => ProbeOutcome::NotFound,
            ProbeError::Cancelled => ProbeOutcome::Cancelled,
            ProbeError::InvalidCredentials { .. }
            | ProbeError::ListingUnavailable { .. }
            | ProbeError::Transport(_) => ProbeOutcome::TransportError,
        }
    }
}

/// A strategy bound to the client it needs.
#[derive(Clone)]
pub enum Prober {
    Acl(Arc<dyn StorageApi>),
    Authenticated(Arc<dyn StorageApi>),
    Unauthenticated(Arc<dyn HttpClient>),
}

impl Prober {
    /// Bind `strategy` to the clients of `session`. `None` when the
    /// strategy needs a storage client the session doesn't have.
    pub fn new(strategy: Strategy, session: &Session, http: &Arc<dyn HttpClient>) -> Option<Self> {
        match strategy {
            Strategy::Acl => session.storage().cloned().map(Prober::Acl),
            Strategy::AuthenticatedProbe => session.storage().cloned().map(Prober::Authenticated),
            Strategy::UnauthenticatedProbe => Some(Prober::Unauthenticated(http.clone())),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Prober::Acl(_) => Strategy::Acl,
            Prober::Authenticated(_) => Strategy::AuthenticatedProbe,
            Prober::Unauthenticated(_) => Strategy::UnauthenticatedProbe,
        }
    }

    async fn probe(
        &self,
        bucket: &BucketDescriptor,
        key: &str,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        let result = match self {
            Prober::Acl(storage) => {
                cancellable(cancel, storage.get_object_acl(&bucket.name, key))
                    .await
                    .map(|grants| {
                        if grants.iter().any(|g| g.is_public_read()) {
                            ProbeOutcome::Readable
                        } else {
                            ProbeOutcome::NotReadable
                        }
                    })
            }
            Prober::Authenticated(storage) => {
                cancellable(cancel, storage.get_object(&bucket.name, key))
                    .await
                    .map(|()| ProbeOutcome::Readable)
            }
            Prober::Unauthenticated(http) => {
                let url = bucket.object_url(key);
                cancellable(cancel, http.get_status(&url))
                    .await
                    .map(|resp| match resp.status {
                        StatusCode::OK => ProbeOutcome::Readable,
                        StatusCode::NOT_FOUND => ProbeOutcome::NotFound,
                        _ => ProbeOutcome::NotReadable,
                    })
            }
        };

        result.unwrap_or_else(|e| {
            let outcome = ProbeOutcome::from_error(&e);
            if outcome == ProbeOutcome::TransportError {
                warn!(key, error = %e, "Probe failed");
            }
            outcome
        })
    }
}

/// Summary of one classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub strategy: Strategy,
    /// Workers spawned for the pass.
    pub workers: usize,
    /// Keys that received a definitive answer.
    pub probed: usize,
    /// Keys never answered (early worker exit or cancellation).
    pub abandoned: usize,
    /// Keys confirmed readable, sorted.
    pub readable: Vec<String>,
}

/// Runs classification passes against one bucket.
pub struct Classifier {
    bucket: Arc<BucketDescriptor>,
    workers: usize,
    on_denied: DenialPolicy,
    cancel: CancellationToken,
}

impl Classifier {
    pub fn new(
        bucket: Arc<BucketDescriptor>,
        workers: usize,
        on_denied: DenialPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bucket,
            workers: workers.max(1),
            on_denied,
            cancel,
        }
    }

    /// Probe `keys` with `prober`, blocking until the pool has drained.
    pub async fn classify(&self, prober: Prober, keys: Vec<String>) -> PassReport {
        let strategy = prober.strategy();
        let started = Instant::now();

        let queue = Arc::new(WorkQueue::new(keys));
        let results = Arc::new(ResultSet::new());
        let width = self.workers.min(queue.len().await);

        info!(
            bucket = %self.bucket.name,
            strategy = strategy.as_str(),
            workers = width,
            "Starting classification pass"
        );

        let prober = Arc::new(prober);
        let mut pool = JoinSet::new();
        for worker_id in 0..width {
            let worker = Worker {
                prober: prober.clone(),
                bucket: self.bucket.clone(),
                queue: queue.clone(),
                results: results.clone(),
                on_denied: self.on_denied,
                cancel: self.cancel.clone(),
            };
            let span = info_span!("probe_worker", worker_id, strategy = strategy.as_str());
            pool.spawn(worker.run().instrument(span));
        }

        let mut probed = 0;
        let mut cancelled = 0;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(stats) => {
                    probed += stats.probed;
                    cancelled += stats.cancelled;
                }
                Err(e) => warn!(error = %e, "Probe worker terminated abnormally"),
            }
        }

        let abandoned = queue.len().await + cancelled;
        if abandoned > 0 {
            warn!(
                bucket = %self.bucket.name,
                strategy = strategy.as_str(),
                abandoned,
                "Pass ended with unprobed keys; readable objects may be under-reported"
            );
            counter!(ABANDONED_KEYS_TOTAL, "strategy" => strategy.as_str())
                .increment(abandoned as u64);
        }
        histogram!(PASS_DURATION_SECONDS, "strategy" => strategy.as_str())
            .record(started.elapsed().as_secs_f64());

        let readable = results.to_sorted_vec().await;
        info!(
            bucket = %self.bucket.name,
            strategy = strategy.as_str(),
            readable = readable.len(),
            "Found {} public object(s) that are readable",
            readable.len()
        );

        PassReport {
            strategy,
            workers: width,
            probed,
            abandoned,
            readable,
        }
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    probed: usize,
    cancelled: usize,
}

struct Worker {
    prober: Arc<Prober>,
    bucket: Arc<BucketDescriptor>,
    queue: Arc<WorkQueue>,
    results: Arc<ResultSet>,
    on_denied: DenialPolicy,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> WorkerStats {
        let strategy = self.prober.strategy();
        let mut stats = WorkerStats::default();

        while let Some(key) = self.queue.pop().await {
            let outcome = self.prober.probe(&self.bucket, &key, &self.cancel).await;
            counter!(
                PROBES_TOTAL,
                "strategy" => strategy.as_str(),
                "outcome" => outcome.as_str()
            )
            .increment(1);

            match outcome {
                ProbeOutcome::Cancelled => {
                    stats.cancelled += 1;
                    break;
                }
                ProbeOutcome::Readable => {
                    debug!(key = %key, "Object is readable");
                    stats.probed += 1;
                    self.results.insert(key).await;
                }
                ProbeOutcome::Denied => {
                    stats.probed += 1;
                    if self.on_denied == DenialPolicy::ExitWorker {
                        debug!(key = %key, "Access denied; worker stopping");
                        break;
                    }
                }
                ProbeOutcome::NotReadable
                | ProbeOutcome::NotFound
                | ProbeOutcome::TransportError => stats.probed += 1,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::{Grant, ALL_USERS_URI, AUTHENTICATED_USERS_URI};
    use crate::http::ReqwestHttpClient;
    use crate::testing::{spawn_http_server, FakeHttp, FakeStorage, Reply};
    use std::collections::HashMap;
    use std::time::Duration;

    fn bucket() -> Arc<BucketDescriptor> {
        Arc::new(BucketDescriptor::new(
            "acme",
            "us-east-1",
            "https://{bucket}.s3.amazonaws.com",
        ))
    }

    fn classifier(workers: usize, on_denied: DenialPolicy) -> Classifier {
        Classifier::new(bucket(), workers, on_denied, CancellationToken::new())
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn grant(uri: &str, permission: &str) -> Grant {
        Grant {
            grantee_uri: Some(uri.to_string()),
            permission: permission.to_string(),
        }
    }

    #[tokio::test]
    async fn test_every_key_probed_exactly_once() {
        let names: Vec<String> = (0..57).map(|i| format!("obj-{i}")).collect();
        let mut http = FakeHttp::new().with_default_status(StatusCode::FORBIDDEN);
        for name in names.iter().filter(|n| n.ends_with('3')) {
            http = http.with_status(&format!("https://acme.s3.amazonaws.com/{name}"), StatusCode::OK);
        }
        let http = Arc::new(http);

        let report = classifier(20, DenialPolicy::ExitWorker)
            .classify(Prober::Unauthenticated(http.clone()), names.clone())
            .await;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for url in http.calls() {
            *counts.entry(url).or_default() += 1;
        }
        assert_eq!(counts.len(), names.len());
        assert!(counts.values().all(|&c| c == 1));

        assert_eq!(report.workers, 20);
        assert_eq!(report.probed, names.len());
        assert_eq!(report.abandoned, 0);
        assert_eq!(report.readable, keys(&["obj-13", "obj-23", "obj-3", "obj-33", "obj-43", "obj-53"]));
    }

    #[tokio::test]
    async fn test_pool_width_is_bounded() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_default_object(Reply::Ok(()))
                .with_latency(Duration::from_millis(20)),
        );
        let names: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();

        let report = classifier(20, DenialPolicy::ExitWorker)
            .classify(Prober::Authenticated(storage.clone()), names)
            .await;

        assert_eq!(report.readable.len(), 100);
        assert_eq!(storage.max_in_flight(), 20);
    }

    #[tokio::test]
    async fn test_pool_never_wider_than_key_count() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_default_object(Reply::Ok(()))
                .with_latency(Duration::from_millis(5)),
        );

        let report = classifier(20, DenialPolicy::ExitWorker)
            .classify(Prober::Authenticated(storage.clone()), keys(&["a", "b", "c"]))
            .await;

        assert_eq!(report.workers, 3);
        assert!(storage.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_empty_key_set_spawns_nothing() {
        let http = Arc::new(FakeHttp::new());
        let report = classifier(20, DenialPolicy::ExitWorker)
            .classify(Prober::Unauthenticated(http.clone()), Vec::new())
            .await;
        assert_eq!(report.workers, 0);
        assert!(report.readable.is_empty());
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_acl_strategy_detects_public_groups() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_acl("public.txt", Reply::Ok(vec![grant(ALL_USERS_URI, "READ")]))
                .with_acl(
                    "authed.txt",
                    Reply::Ok(vec![grant(AUTHENTICATED_USERS_URI, "FULL_CONTROL")]),
                )
                .with_acl("writable.txt", Reply::Ok(vec![grant(ALL_USERS_URI, "WRITE")]))
                .with_acl("private.txt", Reply::Ok(Vec::new())),
        );

        let report = classifier(20, DenialPolicy::ExitWorker)
            .classify(
                Prober::Acl(storage.clone()),
                keys(&["public.txt", "authed.txt", "writable.txt", "private.txt"]),
            )
            .await;

        assert_eq!(report.strategy, Strategy::Acl);
        assert_eq!(report.readable, keys(&["authed.txt", "public.txt"]));
        assert_eq!(storage.calls_to("get_object_acl").len(), 4);
    }

    #[tokio::test]
    async fn test_denial_exits_worker_and_abandons_queue() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_object("x", Reply::Err("AccessDenied"))
                .with_object("y", Reply::Ok(())),
        );

        let report = classifier(1, DenialPolicy::ExitWorker)
            .classify(Prober::Authenticated(storage.clone()), keys(&["x", "y"]))
            .await;

        assert!(report.readable.is_empty());
        assert_eq!(report.probed, 1);
        assert_eq!(report.abandoned, 1);
        assert_eq!(storage.calls_to("get_object"), vec!["get_object:x".to_string()]);
    }

    #[tokio::test]
    async fn test_denial_skips_key_when_configured() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_acl("x", Reply::Err("AccessDenied"))
                .with_acl("y", Reply::Ok(vec![grant(ALL_USERS_URI, "READ")])),
        );

        let report = classifier(1, DenialPolicy::SkipKey)
            .classify(Prober::Acl(storage), keys(&["x", "y"]))
            .await;

        assert_eq!(report.readable, keys(&["y"]));
        assert_eq!(report.abandoned, 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_denial_does_not_stop_worker() {
        let http = Arc::new(
            FakeHttp::new()
                .with_status("https://acme.s3.amazonaws.com/x", StatusCode::FORBIDDEN)
                .with_status("https://acme.s3.amazonaws.com/y", StatusCode::OK),
        );

        let report = classifier(1, DenialPolicy::ExitWorker)
            .classify(Prober::Unauthenticated(http), keys(&["x", "y"]))
            .await;

        assert_eq!(report.readable, keys(&["y"]));
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_abort_pass() {
        let http = Arc::new(
            FakeHttp::new().with_status("https://acme.s3.amazonaws.com/ok", StatusCode::OK),
        );

        let report = classifier(2, DenialPolicy::ExitWorker)
            .classify(Prober::Unauthenticated(http), keys(&["down-1", "ok", "down-2"]))
            .await;

        assert_eq!(report.readable, keys(&["ok"]));
        assert_eq!(report.probed, 3);
    }

    #[tokio::test]
    async fn test_cancelled_pass_returns_promptly() {
        let storage = Arc::new(
            FakeStorage::new()
                .with_default_object(Reply::Ok(()))
                .with_latency(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let classifier = Classifier::new(bucket(), 4, DenialPolicy::ExitWorker, cancel.clone());
        let names: Vec<String> = (0..10).map(|i| format!("k{i}")).collect();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            classifier.classify(Prober::Authenticated(storage), names),
        )
        .await
        .expect("pass must stop on cancellation");
        canceller.await.unwrap();

        assert!(report.readable.is_empty());
        assert_eq!(report.probed, 0);
        assert_eq!(report.abandoned, 10);
    }

    #[tokio::test]
    async fn test_slow_public_object_is_readable() {
        let server = spawn_http_server().await;
        let http = Arc::new(ReqwestHttpClient::new(Duration::from_secs(2)).unwrap());
        let bucket = Arc::new(BucketDescriptor::new("acme", "us-east-1", &server.endpoint()));
        let classifier = Classifier::new(bucket, 20, DenialPolicy::ExitWorker, CancellationToken::new());

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            classifier.classify(
                Prober::Unauthenticated(http),
                keys(&["big.bin", "index", "missing"]),
            ),
        )
        .await
        .expect("pass must not wait for object bodies");

        assert_eq!(report.readable, keys(&["big.bin", "index"]));
        assert_eq!(report.probed, 3);
    }

    #[test]
    fn test_prober_requires_storage_for_signed_strategies() {
        let http: Arc<dyn HttpClient> = Arc::new(FakeHttp::new());
        let anonymous = Session::Anonymous;
        assert!(Prober::new(Strategy::Acl, &anonymous, &http).is_none());
        assert!(Prober::new(Strategy::AuthenticatedProbe, &anonymous, &http).is_none());
        let prober = Prober::new(Strategy::UnauthenticatedProbe, &anonymous, &http).unwrap();
        assert_eq!(prober.strategy(), Strategy::UnauthenticatedProbe);
    }
}
