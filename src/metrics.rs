//! Prometheus metrics for bucketprobe.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines the metric names recorded by the scanner.  A one-shot CLI
//! has no scrape endpoint, so the exposition text is rendered on demand.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Per-key probe attempts (counter). Labels: strategy, outcome.
pub const PROBES_TOTAL: &str = "bucketprobe_probes_total";

/// Findings emitted to the sink (counter). Labels: kind.
pub const FINDINGS_TOTAL: &str = "bucketprobe_findings_total";

/// Wall time of one classification pass (histogram). Labels: strategy.
pub const PASS_DURATION_SECONDS: &str = "bucketprobe_pass_duration_seconds";

/// Keys left unprobed because their worker stopped early (counter). Labels: strategy.
pub const ABANDONED_KEYS_TOTAL: &str = "bucketprobe_abandoned_keys_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests).
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(PROBES_TOTAL, "Per-key probe attempts by strategy and outcome");
    describe_counter!(FINDINGS_TOTAL, "Findings emitted by kind");
    describe_histogram!(
        PASS_DURATION_SECONDS,
        "Classification pass duration in seconds"
    );
    describe_counter!(
        ABANDONED_KEYS_TOTAL,
        "Keys left unprobed after workers stopped early"
    );
}

/// Render the Prometheus exposition text, or `None` if no recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}
