//! Ambient observability counters/histograms, following
//! `eosin-storage::metrics`'s free-function-over-macro style. Gated behind
//! the `metrics` feature so the core stays usable without a Prometheus
//! exporter wired in by the binary that embeds it.

use metrics::{counter, gauge, histogram};

pub fn pod_event_received(kind: &str) {
    counter!("autoscaler_pod_events_total", "kind" => kind.to_string()).increment(1);
}

pub fn metrics_tick(topic: &str, ok: bool) {
    counter!(
        "autoscaler_metrics_ticks_total",
        "topic" => topic.to_string(),
        "outcome" => if ok { "ok" } else { "error" },
    )
    .increment(1);
}

pub fn analyzer_tick_duration(duration_secs: f64) {
    histogram!("autoscaler_analyzer_tick_duration_seconds").record(duration_secs);
}

pub fn tenant_resize(tenant: &str, from: i64, to: i64) {
    counter!("autoscaler_tenant_resizes_total", "tenant" => tenant.to_string()).increment(1);
    gauge!("autoscaler_tenant_pod_count", "tenant" => tenant.to_string()).set(to as f64);
    let _ = from;
}

pub fn workload_mutation(kind: &str, retried: bool) {
    counter!(
        "autoscaler_workload_mutations_total",
        "kind" => kind.to_string(),
        "retried" => retried.to_string(),
    )
    .increment(1);
}

pub fn warm_pool_pending(count: u32) {
    gauge!("autoscaler_warm_pool_pending").set(count as f64);
}
