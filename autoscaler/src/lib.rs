//! Tenant autoscaler controller: watches pod events, samples metrics,
//! and periodically resizes each tenant's pod set against its configured
//! CPU thresholds (spec's central loop, §4).
//!
//! [`Controller`] owns the shared registries and spawns one background
//! task per loop (pod-event ingestion, one [`MetricsCollector`] per
//! topic, the [`Analyzer`]), all stopped together by a single
//! [`CancellationToken`], following `loom-common::shutdown`'s
//! signal-then-select convention.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod interfaces;
#[cfg(test)]
pub mod fakes;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod metrics_collector;
pub mod pod;
pub mod tenant;
pub mod timeseries;
pub mod warmpool;
pub mod workload;

use std::sync::Arc;
use std::time::Duration;

use loom_types::MetricTopic;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use analyzer::Analyzer;
use config::ControllerConfig;
use error::Result;
use interfaces::{MetricsSource, PodEventSource, TenantConfigSource, TopologyNotifier, WorkloadMutator};
use metrics_collector::MetricsCollector;
use pod::PodRegistry;
use tenant::TenantRegistry;
use timeseries::TimeSeriesStore;
use warmpool::WarmPoolReconciler;
use workload::WorkloadController;

/// External collaborators the controller needs wired in at construction.
/// Kept as a plain struct rather than a builder: every field is required,
/// and a missing one should fail to compile rather than surface at
/// runtime, matching Design Note §9's "fail fast on missing wiring".
pub struct ControllerDeps {
    pub pod_events: Box<dyn PodEventSource>,
    pub metrics_sources: Vec<(MetricTopic, Arc<dyn MetricsSource>)>,
    pub workload_mutator: Arc<dyn WorkloadMutator>,
    pub topology_notifier: Arc<dyn TopologyNotifier>,
    pub tenant_config_source: Arc<dyn TenantConfigSource>,
}

/// Top-level handle: owns the shared state and the set of background
/// tasks it has spawned. Dropping this without calling
/// [`Controller::shutdown`] leaves the tasks running — callers are
/// expected to hold it for the process lifetime.
pub struct Controller {
    pub tenants: TenantRegistry,
    pub pods: PodRegistry,
    pub timeseries: TimeSeriesStore,
    pub workload: Arc<WorkloadController>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    /// Wires the registries together and spawns every background loop.
    /// Matches spec §4's fixed set of concurrent loops: one pod-event
    /// consumer, one `MetricsCollector` per topic, and one `Analyzer`.
    pub fn spawn(config: &ControllerConfig, deps: ControllerDeps) -> Result<Self> {
        config.validate()?;

        let tenants = TenantRegistry::new();
        let pods = PodRegistry::new();
        let timeseries = TimeSeriesStore::new();
        let workload = Arc::new(WorkloadController::new(deps.workload_mutator));
        let shutdown = CancellationToken::new();

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(pod_event_loop(
            deps.pod_events,
            pods.clone(),
            tenants.clone(),
            shutdown.clone(),
        )));

        let bootstrap_window = Duration::from_secs(config.max_scale_interval_seconds);
        let default_interval_s = config.sample_resolution.as_secs();
        for (topic, source) in deps.metrics_sources {
            let collector = MetricsCollector::new(
                source,
                timeseries.clone(),
                tenants.clone(),
                topic,
                config.sample_resolution,
                default_interval_s,
            );
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                collector.bootstrap(bootstrap_window).await;
                collector.run(shutdown).await;
            }));
        }

        let analyzer = Analyzer::new(
            tenants.clone(),
            pods.clone(),
            timeseries.clone(),
            deps.topology_notifier,
            deps.tenant_config_source,
        );
        let analyzer_interval = config.analyzer_interval;
        let analyzer_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            analyzer.run(analyzer_interval, analyzer_shutdown).await;
        }));

        let warm_pool = WarmPoolReconciler::new(pods.clone(), workload.clone(), config.soft_limit);
        let warm_pool_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            warm_pool.run(config.analyzer_interval, warm_pool_shutdown).await;
        }));

        Ok(Self {
            tenants,
            pods,
            timeseries,
            workload,
            shutdown,
            tasks,
        })
    }

    /// Signals every background loop to stop and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Consumes the pod-event stream forever, applying each event to
/// `pods` and advancing the owning tenant's `Resuming`/`Pausing`
/// transition when the event reveals enough bound pods turned
/// `Running`/empty (spec §4.3/§4.5's state-advance-on-observation rule).
/// The source returning `None` ends the loop; a resumable source never
/// should in steady state, so this only happens at shutdown.
async fn pod_event_loop(
    mut source: Box<dyn PodEventSource>,
    pods: PodRegistry,
    tenants: TenantRegistry,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("pod event loop shutting down");
                return;
            }
            event = source.next() => {
                let Some(event) = event else {
                    tracing::warn!("pod event source exhausted, stopping ingestion");
                    return;
                };
                #[cfg(feature = "metrics")]
                crate::metrics::pod_event_received(match event.kind {
                    loom_types::PodEventKind::Added => "added",
                    loom_types::PodEventKind::Modified => "modified",
                    loom_types::PodEventKind::Deleted => "deleted",
                    loom_types::PodEventKind::Error => "error",
                    loom_types::PodEventKind::Bookmark => "bookmark",
                });
                let dirty_tenant = pods.apply_event(&event).await;
                if let Some(tenant) = dirty_tenant {
                    reconcile_tenant_state(&pods, &tenants, &tenant).await;
                }
            }
        }
    }
}

/// Advances a tenant's `Resuming`/`Pausing` transition after an event
/// changed its bound-pod running count, per spec §4.2's state table.
async fn reconcile_tenant_state(pods: &PodRegistry, tenants: &TenantRegistry, tenant: &str) {
    let Some(desc) = tenants.get_tenant_desc(tenant).await else {
        return;
    };
    match desc.state {
        loom_types::TenantState::Resuming => {
            let running = pods.running_bound_count(tenant).await;
            let _ = tenants.advance_resuming_if_ready(tenant, running).await;
        }
        loom_types::TenantState::Pausing => {
            let _ = tenants.advance_pausing_if_ready(tenant).await;
        }
        _ => {}
    }
}
