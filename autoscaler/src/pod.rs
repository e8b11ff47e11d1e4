//! Pod index and warm-pool accounting (spec §4.3). Owns `Pod` records;
//! never calls into `TenantRegistry` while its own lock is held, preserving
//! the PodRegistry → TenantRegistry lock order spec §5 mandates.

use std::collections::HashMap;
use std::sync::Arc;

use loom_types::{Pod, PodAssignment, PodEvent, PodEventKind, PodName, PodPhase};
use tokio::sync::Mutex;

struct Inner {
    pods: HashMap<PodName, Pod>,
    /// Pods requested from the workload but not yet observed `Running`.
    pending: u32,
    /// Growth requested by tenant resizes this reconcile period that warm
    /// pods couldn't satisfy, accumulated from `ResizeOutcome::deficit` and
    /// drained by the warm-pool reconciler each tick.
    deficit: u32,
}

/// Cheap-to-clone handle over the pod index and warm-pool counters.
#[derive(Clone)]
pub struct PodRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for PodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PodRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pods: HashMap::new(),
                pending: 0,
                deficit: 0,
            })),
        }
    }

    /// Applies one `Added`/`Modified`/`Deleted` event. `Error` and
    /// `Bookmark` events are ignored by the caller before reaching here
    /// (spec §6). Returns the tenant a now-detached pod was bound to, if
    /// any, so the caller can mark that tenant dirty without this registry
    /// reaching into `TenantRegistry` itself.
    pub async fn apply_event(&self, event: &PodEvent) -> Option<loom_types::TenantName> {
        let mut inner = self.inner.lock().await;
        match event.kind {
            PodEventKind::Added | PodEventKind::Modified => {
                let entry = inner
                    .pods
                    .entry(event.pod.name.clone())
                    .or_insert_with(|| Pod::new(event.pod.name.clone()));
                let was_running = entry.phase == PodPhase::Running;
                entry.phase = event.pod.phase;
                entry.address = event.pod.address.clone();
                entry.version = event.resource_version.clone();
                if was_running && entry.phase != PodPhase::Running {
                    if let PodAssignment::Bound(tenant) = &entry.assignment {
                        return Some(tenant.clone());
                    }
                }
                None
            }
            PodEventKind::Deleted => {
                let removed = inner.pods.remove(&event.pod.name);
                removed.and_then(|p| match p.assignment {
                    PodAssignment::Bound(tenant) => Some(tenant),
                    PodAssignment::Unassigned => None,
                })
            }
            PodEventKind::Error | PodEventKind::Bookmark => None,
        }
    }

    /// Binds `pod` to `tenant`, as invoked by `TenantRegistry::resize_pods_of_tenant`
    /// after it has already decided which warm pods to consume.
    pub async fn mark_bound(&self, pod: &str, tenant: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(p) = inner.pods.get_mut(pod) {
            p.assignment = PodAssignment::Bound(tenant.to_string());
        }
    }

    pub async fn mark_unassigned(&self, pod: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(p) = inner.pods.get_mut(pod) {
            p.assignment = PodAssignment::Unassigned;
        }
    }

    pub async fn get(&self, pod: &str) -> Option<Pod> {
        self.inner.lock().await.pods.get(pod).cloned()
    }

    /// Names of pods that are `Running` and `Unassigned` — the warm pool's
    /// immediately consumable supply.
    pub async fn unassigned_running(&self) -> Vec<PodName> {
        self.inner
            .lock()
            .await
            .pods
            .values()
            .filter(|p| p.phase == PodPhase::Running && p.is_unassigned())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Pops up to `n` unassigned running pods for a tenant to bind.
    pub async fn take_unassigned_running(&self, n: usize) -> Vec<PodName> {
        let mut inner = self.inner.lock().await;
        let names: Vec<PodName> = inner
            .pods
            .values()
            .filter(|p| p.phase == PodPhase::Running && p.is_unassigned())
            .take(n)
            .map(|p| p.name.clone())
            .collect();
        for name in &names {
            if let Some(p) = inner.pods.get_mut(name) {
                p.assignment = PodAssignment::Bound(String::new());
            }
        }
        names
    }

    pub async fn running_bound_count(&self, tenant: &str) -> usize {
        self.inner
            .lock()
            .await
            .pods
            .values()
            .filter(|p| {
                p.phase == PodPhase::Running
                    && matches!(&p.assignment, PodAssignment::Bound(t) if t == tenant)
            })
            .count()
    }

    pub async fn pending(&self) -> u32 {
        self.inner.lock().await.pending
    }

    pub async fn add_pending(&self, n: u32) {
        self.inner.lock().await.pending += n;
    }

    /// Folds an unfulfilled resize's shortfall into this period's total
    /// deficit, per spec §4.3's `warm_desired = softLimit + Σ tenant_deficit`.
    pub async fn record_deficit(&self, amount: u32) {
        if amount > 0 {
            self.inner.lock().await.deficit += amount;
        }
    }

    /// Drains the accumulated deficit for one reconcile tick.
    pub async fn take_deficit(&self) -> u32 {
        std::mem::take(&mut self.inner.lock().await.deficit)
    }

    /// Counts down `pending` as requested pods turn up `Running`, called
    /// from the reconcile tick after each `ScanStateOfPods`.
    pub async fn settle_pending(&self, newly_running: u32) {
        let mut inner = self.inner.lock().await;
        inner.pending = inner.pending.saturating_sub(newly_running);
    }

    /// A full scan of current pod count by phase, for diagnostics and the
    /// warm-pool reconcile tick.
    pub async fn scan_state_of_pods(&self) -> PodStateCounts {
        let inner = self.inner.lock().await;
        let mut counts = PodStateCounts::default();
        for pod in inner.pods.values() {
            match pod.phase {
                PodPhase::Pending => counts.pending += 1,
                PodPhase::Running => counts.running += 1,
                PodPhase::Terminating => counts.terminating += 1,
                PodPhase::Gone => counts.gone += 1,
            }
        }
        counts
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodStateCounts {
    pub pending: u32,
    pub running: u32,
    pub terminating: u32,
    pub gone: u32,
}

/// `needed = softLimit + Σ tenant_unfulfilled_deficit − |Unassigned Running| − pending`,
/// clamped at zero (spec §4.3).
pub fn warm_pool_needed(soft_limit: u32, total_deficit: u32, unassigned_running: u32, pending: u32) -> u32 {
    let want = soft_limit as i64 + total_deficit as i64;
    let have = unassigned_running as i64 + pending as i64;
    (want - have).max(0) as u32
}
