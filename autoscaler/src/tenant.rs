//! Tenant config, pod-set membership, and the scaling state machine (spec
//! §4.2). Grounded on the same `Arc<Mutex<Inner>>` shape as
//! [`crate::timeseries`], following `eosin-storage::replication::ShardEngine`.

use std::collections::HashMap;
use std::sync::Arc;

use loom_types::{PodName, Tenant, TenantConfig, TenantName, TenantState};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::timeseries::TimeSeriesStore;

/// Outcome of one `resize_pods_of_tenant` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResizeOutcome {
    pub bound: Vec<PodName>,
    pub released: Vec<PodName>,
    /// Growth requested but not satisfiable from the warm pods handed in;
    /// the caller (warm-pool driver) should fold this into its own deficit
    /// accounting for the next replenishment tick.
    pub deficit: u32,
}

impl ResizeOutcome {
    fn unchanged() -> Self {
        Self::default()
    }
}

/// Per-pod aggregate, current-value and sample-count views over a tenant's
/// pod set on one metrics topic, as returned by `ComputeStatisticsOfTenant`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TenantStatistics {
    /// `None` when no pod in the tenant has any retained sample this
    /// window — the resize policy treats this as "undefined".
    pub avg: Option<f64>,
    pub per_pod_value: HashMap<PodName, f64>,
    pub per_pod_sample_count: HashMap<PodName, i64>,
}

struct Inner {
    tenants: HashMap<TenantName, Tenant>,
    /// Reverse index maintained alongside `Tenant::pod_set` for
    /// `GetTenantInfoOfPod` without scanning every tenant.
    pod_index: HashMap<PodName, TenantName>,
}

/// Cheap-to-clone handle guarding tenant state. One lock acquisition per
/// tenant-scoped operation, matching spec §5's "tenant lock held for the
/// duration of one tenant's evaluation" — callers do not interleave
/// multiple tenants' work under a single lock acquisition.
#[derive(Clone)]
pub struct TenantRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tenants: HashMap::new(),
                pod_index: HashMap::new(),
            })),
        }
    }

    pub async fn get_tenants(&self) -> Vec<TenantName> {
        self.inner.lock().await.tenants.keys().cloned().collect()
    }

    pub async fn get_tenant_desc(&self, name: &str) -> Option<Tenant> {
        self.inner.lock().await.tenants.get(name).cloned()
    }

    pub async fn get_tenant_info_of_pod(&self, pod: &str) -> Option<TenantName> {
        self.inner.lock().await.pod_index.get(pod).cloned()
    }

    /// Loads or updates a tenant's configuration. Creates the tenant
    /// (in `Paused` state) on first call, matching spec §3's "created on
    /// first configuration load". Cheap to call every tick when unchanged.
    pub async fn try_to_reload_conf(&self, name: &str, config: TenantConfig) -> Result<()> {
        if !config.is_valid() {
            return Err(Error::Config(format!(
                "invalid tenant config for {name}: {config:?}"
            )));
        }
        let mut inner = self.inner.lock().await;
        match inner.tenants.get_mut(name) {
            Some(t) => {
                if t.config != config {
                    t.config = config;
                }
            }
            None => {
                inner
                    .tenants
                    .insert(name.to_string(), Tenant::new(name, config));
            }
        }
        Ok(())
    }

    /// `Pause` is a no-op while already `Paused`; only `Resumed` starts the
    /// `Pausing` drain. Any other state is ignored with a warning, per
    /// spec §4.2's state table (no transition defined).
    pub async fn pause(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let tenant = inner
            .tenants
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
        match tenant.state {
            TenantState::Paused => {}
            TenantState::Resumed => tenant.state = TenantState::Pausing,
            other => {
                tracing::warn!(tenant = name, state = ?other, "pause requested in illegal state, ignoring");
            }
        }
        Ok(())
    }

    /// Idempotent: calling on a non-`Paused` tenant is a successful no-op.
    pub async fn resume(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let tenant = inner
            .tenants
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
        if tenant.state == TenantState::Paused {
            tenant.state = TenantState::Resuming;
        }
        Ok(())
    }

    /// Completes `Resuming → Resumed` once enough bound pods are observed
    /// `Running`. Returns whether the transition fired.
    pub async fn advance_resuming_if_ready(&self, name: &str, running_bound: usize) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let tenant = inner
            .tenants
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
        if tenant.state == TenantState::Resuming && running_bound as u32 >= tenant.config.min_pods
        {
            tenant.state = TenantState::Resumed;
            return Ok(true);
        }
        Ok(false)
    }

    /// Completes `Pausing → Paused` once every pod has been released.
    pub async fn advance_pausing_if_ready(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let tenant = inner
            .tenants
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
        if tenant.state == TenantState::Pausing && tenant.pod_set.is_empty() {
            tenant.state = TenantState::Paused;
            return Ok(true);
        }
        Ok(false)
    }

    /// Aggregates `topic`'s current statistics across every pod currently
    /// bound to `name`. `avg` is `None` when no bound pod has a sample this
    /// window (the resize policy's "undefined" case).
    pub async fn compute_statistics_of_tenant(
        &self,
        name: &str,
        topic: loom_types::MetricTopic,
        ts: &TimeSeriesStore,
    ) -> Result<TenantStatistics> {
        let pods = {
            let inner = self.inner.lock().await;
            let tenant = inner
                .tenants
                .get(name)
                .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
            tenant.pod_set.0.clone()
        };

        let mut per_pod_value = HashMap::new();
        let mut per_pod_sample_count = HashMap::new();
        let mut sum = 0.0;
        let mut any = false;
        for pod in &pods {
            if let Some(snap) = ts.get_snapshot_of_time_series(pod, topic).await {
                let v = snap.avgs.first().copied().unwrap_or(0.0);
                per_pod_value.insert(pod.clone(), v);
                per_pod_sample_count.insert(pod.clone(), snap.count as i64);
                sum += v;
                any = true;
            }
        }
        let avg = any.then(|| sum / pods.len().max(1) as f64);
        Ok(TenantStatistics {
            avg,
            per_pod_value,
            per_pod_sample_count,
        })
    }

    /// Sum of `TaskCnt`'s last-complete-window aggregate across the
    /// tenant's bound pods, used by the autopause check (spec §4.5).
    pub async fn task_cnt_last_window_sum(&self, name: &str, ts: &TimeSeriesStore) -> Result<f64> {
        let pods = {
            let inner = self.inner.lock().await;
            let tenant = inner
                .tenants
                .get(name)
                .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;
            tenant.pod_set.0.clone()
        };
        let mut total = 0.0;
        for pod in &pods {
            if let Some((_, last_full)) = ts
                .get_statistics_of_pod(pod, loom_types::MetricTopic::TaskCnt)
                .await
            {
                total += last_full.sum().first().copied().unwrap_or(0.0);
            }
        }
        Ok(total)
    }

    /// Grows or shrinks `name`'s pod set toward `desired`. Growth binds
    /// from `available_warm` (supplied by the warm-pool driver, already
    /// popped from the `Unassigned` index); shrink releases the
    /// most-recently-bound pods first. Resets each affected pod's time
    /// series, per spec §4.2's bind/release contract.
    pub async fn resize_pods_of_tenant(
        &self,
        name: &str,
        current: i64,
        desired: i64,
        available_warm: Vec<PodName>,
        ts: &TimeSeriesStore,
    ) -> Result<ResizeOutcome> {
        if desired == current {
            return Ok(ResizeOutcome::unchanged());
        }

        let mut inner = self.inner.lock().await;
        let tenant = inner
            .tenants
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTenant(name.to_string()))?;

        if desired > current {
            let want = (desired - current) as usize;
            let take = want.min(available_warm.len());
            let bound: Vec<PodName> = available_warm.into_iter().take(take).collect();
            for pod in &bound {
                tenant.pod_set.push_bound(pod.clone());
                inner.pod_index.insert(pod.clone(), name.to_string());
            }
            let deficit = (want - take) as u32;
            drop(inner);
            for pod in &bound {
                ts.reset_metrics_of_pod(pod).await;
            }
            Ok(ResizeOutcome {
                bound,
                released: Vec::new(),
                deficit,
            })
        } else {
            let drop_count = (current - desired) as usize;
            let released = tenant.pod_set.release_newest(drop_count);
            for pod in &released {
                inner.pod_index.remove(pod);
            }
            drop(inner);
            for pod in &released {
                ts.reset_metrics_of_pod(pod).await;
            }
            Ok(ResizeOutcome {
                bound: Vec::new(),
                released,
                deficit: 0,
            })
        }
    }
}

/// Pure resize policy (`ComputeBestPodsInRuleOfCompute`, spec §4.2). `u` is
/// the observed average CPU per pod this window, or `None` when undefined
/// (no samples), in which case the sentinel `-1` means "no change".
pub fn compute_best_pods_in_rule_of_compute(
    u: Option<f64>,
    lo: f64,
    hi: f64,
    min_pods: u32,
    max_pods: u32,
    n: u32,
) -> i64 {
    let Some(u) = u else {
        return -1;
    };
    if lo <= u && u <= hi {
        return n as i64;
    }
    let load = u * n as f64;
    let midpoint = (lo + hi) / 2.0;
    let n_ideal = (load / midpoint).ceil() as i64;
    n_ideal.clamp(min_pods as i64, max_pods as i64)
}
