//! Periodic policy loop (spec §4.5): reads aggregates from
//! [`crate::timeseries::TimeSeriesStore`], computes target sizes, and asks
//! [`crate::tenant::TenantRegistry`] to resize. One action per calendar
//! second; concurrent ticks are disallowed by driving the loop from a
//! single task.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use loom_types::{MetricTopic, TenantState};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::interfaces::{TenantConfigSource, TopologyNotifier};
use crate::pod::PodRegistry;
use crate::tenant::{compute_best_pods_in_rule_of_compute, TenantRegistry};
use crate::timeseries::TimeSeriesStore;

pub struct Analyzer {
    tenants: TenantRegistry,
    pods: PodRegistry,
    ts: TimeSeriesStore,
    notifier: Arc<dyn TopologyNotifier>,
    config_source: Arc<dyn TenantConfigSource>,
}

impl Analyzer {
    pub fn new(
        tenants: TenantRegistry,
        pods: PodRegistry,
        ts: TimeSeriesStore,
        notifier: Arc<dyn TopologyNotifier>,
        config_source: Arc<dyn TenantConfigSource>,
    ) -> Self {
        Self {
            tenants,
            pods,
            ts,
            notifier,
            config_source,
        }
    }

    pub async fn run(self, cadence: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("analyzer shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    pub async fn tick(&self) {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        for name in self.config_source.list_tenants().await {
            if let Err(e) = self.analyze_tenant(&name).await {
                if e.is_recoverable() {
                    tracing::debug!(tenant = %name, error = %e, "analyzer skipping tenant this tick");
                } else {
                    tracing::error!(tenant = %name, error = %e, "analyzer hit a fatal error for tenant");
                }
            }
        }

        #[cfg(feature = "metrics")]
        crate::metrics::analyzer_tick_duration(start.elapsed().as_secs_f64());
    }

    /// Runs the five steps of spec §4.5 for one tenant. Public so tests
    /// can drive a single tenant without a live ticker.
    pub async fn analyze_tenant(&self, name: &str) -> Result<()> {
        if let Some(cfg) = self.config_source.config_for(name).await {
            self.tenants.try_to_reload_conf(name, cfg).await?;
        }

        let desc = self
            .tenants
            .get_tenant_desc(name)
            .await
            .ok_or_else(|| crate::error::Error::UnknownTenant(name.to_string()))?;

        if desc.state != TenantState::Resumed {
            return Ok(());
        }

        let current = desc.pod_set.len() as i64;
        let mut desired = current;

        if (desc.pod_set.len() as u32) < desc.config.min_pods {
            desired = desc.config.init_pods as i64;
        } else {
            let stats = self
                .tenants
                .compute_statistics_of_tenant(name, MetricTopic::Cpu, &self.ts)
                .await?;
            let target = compute_best_pods_in_rule_of_compute(
                stats.avg,
                desc.config.cpu_lower_threshold,
                desc.config.cpu_upper_threshold,
                desc.config.min_pods,
                desc.config.max_pods,
                desc.pod_set.len() as u32,
            );
            if target >= 0 {
                desired = target;
            }
        }

        let mut resized = false;
        if desired != current {
            let growth = (desired - current).max(0) as usize;
            let warm = self.pods.take_unassigned_running(growth).await;
            let outcome = self
                .tenants
                .resize_pods_of_tenant(name, current, desired, warm, &self.ts)
                .await?;
            for pod in &outcome.bound {
                self.pods.mark_bound(pod, name).await;
            }
            for pod in &outcome.released {
                self.pods.mark_unassigned(pod).await;
            }
            self.pods.record_deficit(outcome.deficit).await;
            resized = true;
            #[cfg(feature = "metrics")]
            crate::metrics::tenant_resize(name, current, desired);
        }

        if desc.config.autopause_interval_seconds > 0 {
            let task_cnt_sum = self.tenants.task_cnt_last_window_sum(name, &self.ts).await?;
            if task_cnt_sum == 0.0 {
                self.tenants.pause(name).await?;
            }
        }

        if resized {
            if let Some(latest) = self.tenants.get_tenant_desc(name).await {
                let unix_nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as i128)
                    .unwrap_or(0);
                self.notifier
                    .publish_topology(&name.to_string(), unix_nanos, &latest.pod_set.0)
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{InMemoryTenantConfigSource, InMemoryTopologyNotifier};
    use loom_types::{PodEvent, PodEventKind, PodPhase, TenantConfig};

    fn tenant_config() -> TenantConfig {
        TenantConfig {
            min_pods: 1,
            init_pods: 2,
            max_pods: 8,
            cpu_lower_threshold: 0.3,
            cpu_upper_threshold: 0.7,
            scale_interval_seconds: 60,
            autopause_interval_seconds: 300,
            core_per_pod: 1.0,
        }
    }

    async fn running_unassigned_pods(pods: &PodRegistry, names: &[&str]) {
        for name in names {
            let mut pod = loom_types::Pod::new(*name);
            pod.phase = PodPhase::Running;
            pods.apply_event(&PodEvent {
                kind: PodEventKind::Added,
                pod,
                resource_version: "1".to_string(),
            })
            .await;
        }
    }

    #[tokio::test]
    async fn grows_to_init_pods_when_below_min() {
        let tenants = TenantRegistry::new();
        let pods = PodRegistry::new();
        let ts = TimeSeriesStore::new();
        let notifier = Arc::new(InMemoryTopologyNotifier::new());
        let config_source = Arc::new(InMemoryTenantConfigSource::new());
        config_source.set("t1", tenant_config());

        tenants.try_to_reload_conf("t1", tenant_config()).await.unwrap();
        tenants.resume("t1").await.unwrap();
        tenants.advance_resuming_if_ready("t1", 0).await.unwrap();
        // Force Resumed directly for this test's purposes: bind nothing yet,
        // but min_pods=1 > 0 so advance_resuming_if_ready above won't fire;
        // drive through resize once to reach Resumed with >= min_pods.
        running_unassigned_pods(&pods, &["p1", "p2"]).await;

        let analyzer = Analyzer::new(
            tenants.clone(),
            pods.clone(),
            ts.clone(),
            notifier.clone(),
            config_source.clone(),
        );

        // First tick: tenant is Resuming, not Resumed, so analyze_tenant
        // is a no-op until Resumed — drive the transition manually as the
        // pod registry would after observing bound pods running.
        let outcome = tenants
            .resize_pods_of_tenant("t1", 0, 2, pods.take_unassigned_running(2).await, &ts)
            .await
            .unwrap();
        assert_eq!(outcome.bound.len(), 2);
        tenants.advance_resuming_if_ready("t1", 2).await.unwrap();

        analyzer.analyze_tenant("t1").await.unwrap();
        let desc = tenants.get_tenant_desc("t1").await.unwrap();
        assert_eq!(desc.pod_set.len(), 2);
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn s3_resize_publishes_topology() {
        let tenants = TenantRegistry::new();
        let pods = PodRegistry::new();
        let ts = TimeSeriesStore::new();
        let notifier = Arc::new(InMemoryTopologyNotifier::new());
        let config_source = Arc::new(InMemoryTenantConfigSource::new());
        let cfg = tenant_config();
        config_source.set("t1", cfg.clone());
        tenants.try_to_reload_conf("t1", cfg).await.unwrap();
        tenants.resume("t1").await.unwrap();

        running_unassigned_pods(&pods, &["p1", "p2", "p3", "p4"]).await;
        let warm = pods.take_unassigned_running(2).await;
        tenants
            .resize_pods_of_tenant("t1", 0, 2, warm, &ts)
            .await
            .unwrap();
        tenants.advance_resuming_if_ready("t1", 2).await.unwrap();

        for pod in ["p1", "p2"] {
            ts.insert_with_user_cfg(pod, 0, &[0.9], 60, MetricTopic::Cpu)
                .await;
        }

        let analyzer = Analyzer::new(tenants.clone(), pods.clone(), ts.clone(), notifier.clone(), config_source);
        analyzer.analyze_tenant("t1").await.unwrap();

        let desc = tenants.get_tenant_desc("t1").await.unwrap();
        assert_eq!(desc.pod_set.len(), 4);
        assert_eq!(notifier.published().len(), 1);
    }
}
