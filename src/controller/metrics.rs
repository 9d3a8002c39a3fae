//! Prometheus metrics for the agent status controller
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `submariner_status_reconcile_duration_seconds` (histogram): duration of one pass.
//! - `submariner_status_reconcile_errors_total` (counter): failed passes labeled by error kind.
//! - `submariner_status_updates_total` (counter): publish results labeled `updated`/`unchanged`.
//! - `submariner_status_write_conflicts_total` (counter): conflicting status writes.
//! - `submariner_agent_degraded` (gauge): 1 while the target reports degraded, labeled by namespace/name.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Error kind/category, e.g. "kube", "cache_read", "timeout"
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpdateLabels {
    /// "updated" or "unchanged"
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TargetLabels {
    pub namespace: String,
    pub name: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Histogram> =
    // 1ms .. ~32s across 16 buckets.
    Lazy::new(|| Histogram::new(exponential_buckets(0.001, 2.0, 16)));

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static STATUS_UPDATES_TOTAL: Lazy<Family<UpdateLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static WRITE_CONFLICTS_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

pub static AGENT_DEGRADED: Lazy<Family<TargetLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "submariner_status_reconcile_duration_seconds",
        "Duration of status reconcile passes in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "submariner_status_reconcile_errors_total",
        "Total number of failed status reconcile passes",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "submariner_status_updates_total",
        "Total number of status publish attempts by result",
        STATUS_UPDATES_TOTAL.clone(),
    );
    registry.register(
        "submariner_status_write_conflicts_total",
        "Total number of status writes rejected because the object changed",
        WRITE_CONFLICTS_TOTAL.clone(),
    );
    registry.register(
        "submariner_agent_degraded",
        "Whether the Submariner agent is currently reported degraded",
        AGENT_DEGRADED.clone(),
    );

    registry
});

pub fn observe_reconcile_duration_seconds(seconds: f64) {
    RECONCILE_DURATION_SECONDS.observe(seconds);
}

pub fn inc_reconcile_error(kind: &str) {
    let labels = ErrorLabels {
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_status_update(changed: bool) {
    let labels = UpdateLabels {
        result: if changed { "updated" } else { "unchanged" }.to_string(),
    };
    STATUS_UPDATES_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_write_conflict() {
    WRITE_CONFLICTS_TOTAL.inc();
}

pub fn set_agent_degraded(namespace: &str, name: &str, degraded: bool) {
    let labels = TargetLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    AGENT_DEGRADED
        .get_or_create(&labels)
        .set(if degraded { 1 } else { 0 });
}

/// Drop the gauge of a target that no longer exists
pub fn clear_agent_degraded(namespace: &str, name: &str) {
    let labels = TargetLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    AGENT_DEGRADED.remove(&labels);
}

/// Render the registry in the Prometheus text format
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_exports_metrics() {
        inc_reconcile_error("cache_read");
        inc_status_update(true);
        set_agent_degraded("submariner-operator", "submariner", true);

        let text = encode_registry().unwrap();
        assert!(text.contains("submariner_status_reconcile_errors_total"));
        assert!(text.contains("kind=\"cache_read\""));
        assert!(text.contains("result=\"updated\""));
        assert!(text.contains("submariner_agent_degraded"));
    }

    #[test]
    fn test_cleared_target_is_not_exported() {
        set_agent_degraded("metrics-test", "removed", true);
        assert!(encode_registry().unwrap().contains("name=\"removed\""));

        clear_agent_degraded("metrics-test", "removed");
        assert!(!encode_registry().unwrap().contains("name=\"removed\""));
    }
}
