//! Translates desired warm-pool size and pod deletions into mutations of
//! the external workload object (spec §4.6). Serializes every mutation
//! behind a single mutex and implements optimistic-concurrency retry on a
//! stale-version failure.

use std::sync::Arc;

use loom_types::PodName;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::interfaces::{WorkloadMutator, WorkloadSnapshot, STALE_VERSION_MARKER};

/// `K = 3` per spec §4.6 ("K=1 sufficient in practice; 3 recommended").
const MAX_RETRIES: u32 = 3;

/// Serializes every workload mutation. Never held while any registry lock
/// is held, per spec §5.
pub struct WorkloadController {
    mutator: Arc<dyn WorkloadMutator>,
    cached: Mutex<Option<WorkloadSnapshot>>,
}

impl WorkloadController {
    pub fn new(mutator: Arc<dyn WorkloadMutator>) -> Self {
        Self {
            mutator,
            cached: Mutex::new(None),
        }
    }

    pub async fn add_replicas(&self, delta: i32) -> Result<WorkloadSnapshot> {
        self.mutate("add_replicas", |snapshot| snapshot.replicas += delta)
            .await
    }

    pub async fn remove_named_replicas(&self, names: &[PodName]) -> Result<WorkloadSnapshot> {
        let names = names.to_vec();
        self.mutate("remove_named_replicas", move |snapshot| {
            snapshot.replicas -= names.len() as i32;
            snapshot.pods_to_delete.extend(names.iter().cloned());
        })
        .await
    }

    /// Applies `apply` to the latest known snapshot and submits it,
    /// retrying from a freshly fetched snapshot on a stale-version
    /// conflict. After a successful mutation, the cache is replaced by the
    /// server's returned snapshot and `pods_to_delete` is cleared so it is
    /// not re-applied on the next call.
    async fn mutate(&self, kind: &str, apply: impl Fn(&mut WorkloadSnapshot)) -> Result<WorkloadSnapshot> {
        let mut cached = self.cached.lock().await;
        let mut current = match cached.clone() {
            Some(s) => s,
            None => self.mutator.get().await?,
        };

        let mut attempt = 0;
        loop {
            let mut desired = current.clone();
            apply(&mut desired);
            match self.mutator.update(desired).await {
                Ok(mut applied) => {
                    applied.pods_to_delete.clear();
                    *cached = Some(applied.clone());
                    #[cfg(feature = "metrics")]
                    crate::metrics::workload_mutation(kind, attempt > 0);
                    return Ok(applied);
                }
                Err(e) if is_stale_version(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, "workload update hit stale version, refreshing and retrying");
                    current = self.mutator.get().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_stale_version(e: &Error) -> bool {
    matches!(e, Error::Transient(msg) if msg.contains(STALE_VERSION_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::InMemoryWorkloadMutator;

    #[tokio::test]
    async fn s6_optimistic_retry_applies_delta_exactly_once() {
        let mutator = Arc::new(InMemoryWorkloadMutator::new(5));
        mutator.inject_stale_version_once();
        let controller = WorkloadController::new(mutator.clone());

        let result = controller.add_replicas(3).await.unwrap();
        assert_eq!(result.replicas, 8);

        let latest = mutator.get().await.unwrap();
        assert_eq!(latest.replicas, 8);
    }

    #[tokio::test]
    async fn pods_to_delete_cleared_after_success() {
        let mutator = Arc::new(InMemoryWorkloadMutator::new(5));
        let controller = WorkloadController::new(mutator);
        let result = controller
            .remove_named_replicas(&["p1".to_string()])
            .await
            .unwrap();
        assert_eq!(result.replicas, 4);
        assert!(result.pods_to_delete.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_resize_is_idempotent_modulo_retry_counter() {
        let mutator = Arc::new(InMemoryWorkloadMutator::new(5));
        let controller = WorkloadController::new(mutator);
        let a = controller.add_replicas(2).await.unwrap();
        let controller2 = WorkloadController::new(Arc::new(InMemoryWorkloadMutator::new(5)));
        let b = controller2.add_replicas(2).await.unwrap();
        assert_eq!(a.replicas, b.replicas);
    }
}
