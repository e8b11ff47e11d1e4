//! Narrow capability traits for the external collaborators spec.md §1
//! places out of scope. Concrete implementations (the Kubernetes/CloneSet
//! client, the Prometheus HTTP client, the cloud topology publisher) live
//! outside this crate; tests substitute the in-memory fakes in
//! [`crate::fakes`].

use async_trait::async_trait;
use loom_types::{MetricTopic, PodEvent, PodName, TenantConfig, TenantName};

use crate::error::Result;

/// Resumable watch over the pod-event stream (spec §6). Implementations
/// reconnect internally using the last-seen resource version; the
/// controller only ever calls `next`.
#[async_trait]
pub trait PodEventSource: Send + Sync {
    async fn next(&mut self) -> Option<PodEvent>;
}

/// A single pod/value/timestamp reading, owned rather than borrowed so
/// trait objects can cross an await point freely.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricReading {
    pub pod: PodName,
    pub unix_seconds: i64,
    pub value: f64,
}

/// Metrics source abstraction over both the metrics-server direct-read path
/// and the TSDB range/instant-query path (spec §4.4/§6).
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// One tick's worth of samples for the given topic.
    async fn sample(&self, topic: MetricTopic) -> Result<Vec<MetricReading>>;

    /// One-shot back-fill of up to `window` of history per pod, at the
    /// fixed sample resolution, used by the collector's bootstrap phase.
    async fn bootstrap(
        &self,
        topic: MetricTopic,
        window: std::time::Duration,
    ) -> Result<Vec<MetricReading>>;
}

/// Outcome of a workload mutation, carrying the refreshed view needed for
/// the optimistic-retry loop in §4.6.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadSnapshot {
    pub replicas: i32,
    pub pods_to_delete: Vec<PodName>,
    pub resource_version: String,
}

/// Sink for mutating the external workload object (spec §6). A stale
/// version failure is communicated as `Error::Transient` carrying the
/// substring "please apply your changes to the latest version"; the
/// controller recognizes that substring to trigger refresh-and-retry.
#[async_trait]
pub trait WorkloadMutator: Send + Sync {
    async fn get(&self) -> Result<WorkloadSnapshot>;
    async fn update(&self, desired: WorkloadSnapshot) -> Result<WorkloadSnapshot>;
}

/// Publishes the resulting per-tenant pod-name topology. At-least-once,
/// non-blocking beyond a single I/O call from the controller's
/// perspective.
#[async_trait]
pub trait TopologyNotifier: Send + Sync {
    async fn publish_topology(&self, tenant: &TenantName, unix_nanos: i128, pods: &[PodName]);
}

pub(crate) const STALE_VERSION_MARKER: &str = "please apply your changes to the latest version";

/// Source of tenant configuration reloaded by the Analyzer each tick
/// (spec §4.5 step 1). Out of scope per spec §1 (the concrete config/CRD
/// store), modeled here as the same kind of narrow capability record as
/// the other external collaborators.
#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    async fn list_tenants(&self) -> Vec<TenantName>;
    async fn config_for(&self, tenant: &str) -> Option<TenantConfig>;
}
