//! Periodic ingestion driver (spec §4.4): one loop per metrics topic,
//! reading through the injected [`crate::interfaces::MetricsSource`] and
//! writing into [`crate::timeseries::TimeSeriesStore`]. Generalizes
//! `PromClient`/metrics-server access from
//! `original_source/autoscale/timeseries.go` and `cluster.go::collectMetrics`.

use std::sync::Arc;
use std::time::Duration;

use loom_types::MetricTopic;
use tokio_util::sync::CancellationToken;

use crate::interfaces::MetricsSource;
use crate::tenant::TenantRegistry;
use crate::timeseries::TimeSeriesStore;

/// Drives one topic's sampling loop at a fixed poll cadence. Late ticks are
/// skipped rather than burst-caught-up, per spec §4.4. The *window*
/// capacity each sample is inserted with, however, is not this cadence —
/// it is the owning tenant's own configured interval, looked up per pod on
/// every insert (spec §3/§4.1: the store's capacity derives from
/// `scale_interval_seconds`, or `autopause_interval_seconds` for `TaskCnt`).
pub struct MetricsCollector {
    source: Arc<dyn MetricsSource>,
    store: TimeSeriesStore,
    tenants: TenantRegistry,
    topic: MetricTopic,
    poll_cadence: Duration,
    /// Window capacity used for pods not (yet) bound to any tenant, since
    /// there is no tenant config to consult for them.
    default_interval_s: u64,
}

impl MetricsCollector {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        store: TimeSeriesStore,
        tenants: TenantRegistry,
        topic: MetricTopic,
        poll_cadence: Duration,
        default_interval_s: u64,
    ) -> Self {
        Self {
            source,
            store,
            tenants,
            topic,
            poll_cadence,
            default_interval_s,
        }
    }

    /// One-shot back-fill executed before the live loop starts, so the
    /// first analyzer tick sees a fully formed window (spec §4.4
    /// "Bootstrap"). `window` should cover the largest interval any tenant
    /// might be configured with; each reading is still inserted at its
    /// owning tenant's actual interval.
    pub async fn bootstrap(&self, window: Duration) {
        match self.source.bootstrap(self.topic, window).await {
            Ok(readings) => {
                for r in readings {
                    let interval_s = self.interval_for_pod(&r.pod).await;
                    self.store
                        .insert_with_user_cfg(&r.pod, r.unix_seconds, &[r.value], interval_s, self.topic)
                        .await;
                }
            }
            Err(e) => {
                tracing::warn!(topic = ?self.topic, error = %e, "bootstrap range query failed, starting with an empty window");
            }
        }
    }

    /// Runs until `shutdown` is cancelled. A `tokio::time::interval`
    /// ticking at `self.poll_cadence`; `MissedTickBehavior::Skip` is the
    /// default, matching "if a tick is late it is skipped".
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(topic = ?self.topic, "metrics collector shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.source.sample(self.topic).await {
            Ok(readings) => {
                for r in readings {
                    let interval_s = self.interval_for_pod(&r.pod).await;
                    self.store
                        .insert_with_user_cfg(&r.pod, r.unix_seconds, &[r.value], interval_s, self.topic)
                        .await;
                }
                #[cfg(feature = "metrics")]
                crate::metrics::metrics_tick(self.topic_label(), true);
            }
            Err(e) => {
                tracing::warn!(topic = ?self.topic, error = %e, "metrics sample tick failed, retaining last good state");
                #[cfg(feature = "metrics")]
                crate::metrics::metrics_tick(self.topic_label(), false);
            }
        }
    }

    /// The window capacity a sample for `pod` should be inserted with:
    /// the owning tenant's `scale_interval_seconds` (or
    /// `autopause_interval_seconds` for `TaskCnt`), falling back to
    /// `default_interval_s` for a pod with no tenant on record yet.
    async fn interval_for_pod(&self, pod: &str) -> u64 {
        let Some(tenant) = self.tenants.get_tenant_info_of_pod(pod).await else {
            return self.default_interval_s;
        };
        let Some(desc) = self.tenants.get_tenant_desc(&tenant).await else {
            return self.default_interval_s;
        };
        match self.topic {
            MetricTopic::TaskCnt => desc.config.autopause_interval_seconds,
            MetricTopic::Cpu | MetricTopic::MemQuotaExceededCnt => desc.config.scale_interval_seconds,
        }
    }

    #[cfg(feature = "metrics")]
    fn topic_label(&self) -> &'static str {
        match self.topic {
            MetricTopic::Cpu => "cpu",
            MetricTopic::TaskCnt => "task_cnt",
            MetricTopic::MemQuotaExceededCnt => "mem_quota_exceeded_cnt",
        }
    }
}
