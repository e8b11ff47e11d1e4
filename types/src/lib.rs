//! Shared data model for the tenant autoscaler: pods, tenants, time series
//! topics and the warm pool. Deliberately free of any Kubernetes/CRD
//! dependency — the concrete cluster client lives outside this crate and
//! maps its own resources onto these types at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable identity of a pod as reported by the pod-event stream.
pub type PodName = String;

/// Stable identity of a tenant (logical pool owner).
pub type TenantName = String;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Terminating,
    Gone,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub enum PodAssignment {
    #[default]
    Unassigned,
    Bound(TenantName),
}

/// A single pod record owned by `PodRegistry`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Pod {
    pub name: PodName,
    pub phase: PodPhase,
    pub assignment: PodAssignment,
    pub address: Option<String>,
    /// Last-seen resource version token from the event stream, used to
    /// detect stale/duplicate deliveries.
    pub version: String,
}

impl Pod {
    pub fn new(name: impl Into<PodName>) -> Self {
        Self {
            name: name.into(),
            phase: PodPhase::Pending,
            assignment: PodAssignment::Unassigned,
            address: None,
            version: String::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.assignment, PodAssignment::Bound(_))
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self.assignment, PodAssignment::Unassigned) && self.phase != PodPhase::Gone
    }
}

/// One axis of a per-pod time series.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricTopic {
    Cpu,
    TaskCnt,
    MemQuotaExceededCnt,
}

impl MetricTopic {
    pub const ALL: [MetricTopic; 3] = [
        MetricTopic::Cpu,
        MetricTopic::TaskCnt,
        MetricTopic::MemQuotaExceededCnt,
    ];
}

/// Fixed sample cadence assumed throughout §4.1's windowing algorithm.
pub const SAMPLE_RESOLUTION_SECONDS: u64 = 15;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TenantState {
    Paused,
    Resuming,
    Resumed,
    Pausing,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TenantConfig {
    pub min_pods: u32,
    pub init_pods: u32,
    pub max_pods: u32,
    pub cpu_lower_threshold: f64,
    pub cpu_upper_threshold: f64,
    pub scale_interval_seconds: u64,
    pub autopause_interval_seconds: u64,
    pub core_per_pod: f64,
}

impl TenantConfig {
    /// §3 invariant: `0 ≤ min_pods ≤ init_pods ≤ max_pods`.
    pub fn is_valid(&self) -> bool {
        self.min_pods <= self.init_pods
            && self.init_pods <= self.max_pods
            && self.cpu_lower_threshold <= self.cpu_upper_threshold
            && self.core_per_pod > 0.0
    }
}

/// A tenant's current pod set, ordered by bind time (oldest first). Exposed
/// as a thin newtype so release-newest-first tie-breaking lives in one
/// place (§4.2).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSet(pub Vec<PodName>);

impl PodSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|p| p == name)
    }

    pub fn push_bound(&mut self, name: PodName) {
        self.0.push(name);
    }

    /// Removes and returns up to `n` of the most-recently-bound pods.
    pub fn release_newest(&mut self, n: usize) -> Vec<PodName> {
        let n = n.min(self.0.len());
        self.0.split_off(self.0.len() - n)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(idx) = self.0.iter().position(|p| p == name) {
            self.0.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn as_set(&self) -> BTreeSet<&str> {
        self.0.iter().map(String::as_str).collect()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Tenant {
    pub name: TenantName,
    pub config: TenantConfig,
    pub state: TenantState,
    pub pod_set: PodSet,
}

impl Tenant {
    pub fn new(name: impl Into<TenantName>, config: TenantConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: TenantState::Paused,
            pod_set: PodSet::default(),
        }
    }
}

/// Result of a watched pod-event source delivery (§6).
#[derive(Clone, Debug, PartialEq)]
pub enum PodEventKind {
    Added,
    Modified,
    Deleted,
    Error,
    Bookmark,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PodEvent {
    pub kind: PodEventKind,
    pub pod: Pod,
    /// Opaque resumable token, advanced on every non-`Error` delivery.
    pub resource_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_set_releases_newest_first() {
        let mut set = PodSet(vec!["a".into(), "b".into(), "c".into()]);
        let released = set.release_newest(2);
        assert_eq!(released, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(set.0, vec!["a".to_string()]);
    }

    #[test]
    fn tenant_config_validates_bounds() {
        let ok = TenantConfig {
            min_pods: 1,
            init_pods: 2,
            max_pods: 8,
            cpu_lower_threshold: 0.3,
            cpu_upper_threshold: 0.7,
            scale_interval_seconds: 60,
            autopause_interval_seconds: 300,
            core_per_pod: 1.0,
        };
        assert!(ok.is_valid());
        let bad = TenantConfig {
            min_pods: 3,
            ..ok
        };
        assert!(!bad.is_valid());
    }
}
