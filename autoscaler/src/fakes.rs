//! In-memory implementations of every external-collaborator trait, for
//! deterministic `#[tokio::test]` coverage. Matches Design Note §9's "tests
//! substitute in-memory implementations"; style follows
//! `eosin-storage-operator::clusters::planner`'s plain-fixture test doubles
//! — no mocking framework.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use loom_types::{MetricTopic, PodEvent, PodName, TenantConfig, TenantName};

use crate::error::{Error, Result};
use crate::interfaces::{
    MetricReading, MetricsSource, PodEventSource, TenantConfigSource, TopologyNotifier,
    WorkloadMutator, WorkloadSnapshot, STALE_VERSION_MARKER,
};

/// Feeds a fixed queue of events to a `PodEventSource` consumer, then
/// reports exhaustion by returning `None`.
#[derive(Default)]
pub struct InMemoryPodEventSource {
    events: VecDeque<PodEvent>,
}

impl InMemoryPodEventSource {
    pub fn new(events: Vec<PodEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

#[async_trait]
impl PodEventSource for InMemoryPodEventSource {
    async fn next(&mut self) -> Option<PodEvent> {
        self.events.pop_front()
    }
}

struct Reading {
    pod: PodName,
    unix_seconds: i64,
    value: f64,
}

/// Queue of canned readings per topic, plus an optional one-shot failure
/// for exercising the collector's error path.
#[derive(Default)]
pub struct InMemoryMetricsSource {
    readings: StdMutex<std::collections::HashMap<MetricTopic, Vec<Reading>>>,
    fail_next: StdMutex<bool>,
}

impl InMemoryMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, topic: MetricTopic, pod: &str, unix_seconds: i64, value: f64) {
        self.readings
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push(Reading {
                pod: pod.to_string(),
                unix_seconds,
                value,
            });
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl MetricsSource for InMemoryMetricsSource {
    async fn sample(&self, topic: MetricTopic) -> Result<Vec<MetricReading>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(Error::Transient("fake metrics source failure".to_string()));
        }
        Ok(self
            .readings
            .lock()
            .unwrap()
            .get(&topic)
            .into_iter()
            .flatten()
            .map(|r| MetricReading {
                pod: r.pod.clone(),
                unix_seconds: r.unix_seconds,
                value: r.value,
            })
            .collect())
    }

    async fn bootstrap(
        &self,
        topic: MetricTopic,
        _window: std::time::Duration,
    ) -> Result<Vec<MetricReading>> {
        self.sample(topic).await
    }
}

/// In-memory workload object with one-shot stale-version injection, used
/// by the optimistic-retry test (scenario S6).
pub struct InMemoryWorkloadMutator {
    state: StdMutex<WorkloadSnapshot>,
    fail_next_with_stale_version: StdMutex<bool>,
}

impl InMemoryWorkloadMutator {
    pub fn new(initial_replicas: i32) -> Self {
        Self {
            state: StdMutex::new(WorkloadSnapshot {
                replicas: initial_replicas,
                pods_to_delete: Vec::new(),
                resource_version: "1".to_string(),
            }),
            fail_next_with_stale_version: StdMutex::new(false),
        }
    }

    pub fn inject_stale_version_once(&self) {
        *self.fail_next_with_stale_version.lock().unwrap() = true;
    }
}

#[async_trait]
impl WorkloadMutator for InMemoryWorkloadMutator {
    async fn get(&self) -> Result<WorkloadSnapshot> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn update(&self, desired: WorkloadSnapshot) -> Result<WorkloadSnapshot> {
        if std::mem::take(&mut *self.fail_next_with_stale_version.lock().unwrap()) {
            // Simulate a concurrent writer bumping the version underneath us.
            let mut state = self.state.lock().unwrap();
            state.resource_version = "2".to_string();
            return Err(Error::Transient(format!(
                "conflict: {STALE_VERSION_MARKER}"
            )));
        }
        let mut state = self.state.lock().unwrap();
        let mut next = desired;
        next.resource_version = {
            let n: u64 = state.resource_version.parse().unwrap_or(1);
            (n + 1).to_string()
        };
        *state = next.clone();
        Ok(next)
    }
}

/// Records every published topology for assertion, instead of delivering
/// it anywhere.
#[derive(Default)]
pub struct InMemoryTopologyNotifier {
    published: StdMutex<Vec<(TenantName, i128, Vec<PodName>)>>,
}

impl InMemoryTopologyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(TenantName, i128, Vec<PodName>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl TopologyNotifier for InMemoryTopologyNotifier {
    async fn publish_topology(&self, tenant: &TenantName, unix_nanos: i128, pods: &[PodName]) {
        self.published
            .lock()
            .unwrap()
            .push((tenant.clone(), unix_nanos, pods.to_vec()));
    }
}

/// Fixed tenant roster with canned configs, standing in for the
/// out-of-scope config/CRD store.
#[derive(Default)]
pub struct InMemoryTenantConfigSource {
    configs: StdMutex<std::collections::HashMap<TenantName, TenantConfig>>,
}

impl InMemoryTenantConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant: &str, config: TenantConfig) {
        self.configs
            .lock()
            .unwrap()
            .insert(tenant.to_string(), config);
    }
}

#[async_trait]
impl TenantConfigSource for InMemoryTenantConfigSource {
    async fn list_tenants(&self) -> Vec<TenantName> {
        self.configs.lock().unwrap().keys().cloned().collect()
    }

    async fn config_for(&self, tenant: &str) -> Option<TenantConfig> {
        self.configs.lock().unwrap().get(tenant).cloned()
    }
}
