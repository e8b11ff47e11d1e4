//! Warm-pool replenishment loop (spec §4.3): keeps a baseline of
//! `Unassigned`/`Running` pods topped up so tenant growth can bind
//! immediately instead of waiting on a cold pod start.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::pod::{warm_pool_needed, PodRegistry};
use crate::workload::WorkloadController;

pub struct WarmPoolReconciler {
    pods: PodRegistry,
    workload: Arc<WorkloadController>,
    soft_limit: u32,
}

impl WarmPoolReconciler {
    pub fn new(pods: PodRegistry, workload: Arc<WorkloadController>, soft_limit: u32) -> Self {
        Self {
            pods,
            workload,
            soft_limit,
        }
    }

    pub async fn run(self, cadence: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("warm pool reconciler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One replenishment pass: never shrinks the pool, only tops it up.
    /// Excess warm pods are released solely through a tenant's own resize
    /// targeting deletion (spec §4.3).
    pub async fn tick(&self) {
        let deficit = self.pods.take_deficit().await;
        let unassigned_running = self.pods.unassigned_running().await.len() as u32;
        let pending = self.pods.pending().await;
        let needed = warm_pool_needed(self.soft_limit, deficit, unassigned_running, pending);
        if needed == 0 {
            return;
        }
        match self.workload.add_replicas(needed as i32).await {
            Ok(_) => {
                self.pods.add_pending(needed).await;
                #[cfg(feature = "metrics")]
                crate::metrics::warm_pool_pending(self.pods.pending().await);
            }
            Err(e) => {
                tracing::warn!(error = %e, needed, "warm pool replenishment request failed, retrying next tick");
                // Put the deficit back so it isn't silently lost this period.
                self.pods.record_deficit(deficit).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::InMemoryWorkloadMutator;
    use loom_types::{Pod, PodEvent, PodEventKind, PodPhase};

    #[tokio::test]
    async fn tops_up_to_soft_limit_when_pool_empty() {
        let pods = PodRegistry::new();
        let mutator = Arc::new(InMemoryWorkloadMutator::new(0));
        let workload = Arc::new(WorkloadController::new(mutator.clone()));
        let reconciler = WarmPoolReconciler::new(pods.clone(), workload, 3);

        reconciler.tick().await;
        assert_eq!(pods.pending().await, 3);
        assert_eq!(mutator.get().await.unwrap().replicas, 3);
    }

    #[tokio::test]
    async fn does_not_request_when_already_satisfied() {
        let pods = PodRegistry::new();
        let mut pod = Pod::new("p1");
        pod.phase = PodPhase::Running;
        pods.apply_event(&PodEvent {
            kind: PodEventKind::Added,
            pod,
            resource_version: "1".to_string(),
        })
        .await;
        let mutator = Arc::new(InMemoryWorkloadMutator::new(0));
        let workload = Arc::new(WorkloadController::new(mutator.clone()));
        let reconciler = WarmPoolReconciler::new(pods, workload, 1);

        reconciler.tick().await;
        assert_eq!(mutator.get().await.unwrap().replicas, 0);
    }

    #[tokio::test]
    async fn folds_recorded_deficit_into_needed() {
        let pods = PodRegistry::new();
        pods.record_deficit(2).await;
        let mutator = Arc::new(InMemoryWorkloadMutator::new(0));
        let workload = Arc::new(WorkloadController::new(mutator.clone()));
        let reconciler = WarmPoolReconciler::new(pods, workload, 1);

        reconciler.tick().await;
        assert_eq!(mutator.get().await.unwrap().replicas, 3);
    }
}
