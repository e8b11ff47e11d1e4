//! Bounded per-pod, per-topic ring of `(timestamp, value-vector)` samples
//! plus running aggregates (spec §4.1).
//!
//! Grounded on `original_source/autoscale/timeseries.go`'s
//! `SimpleTimeSeries`/`AvgSigma`, generalized from a fixed `Cpu`/`Mem` pair
//! to an arbitrary `MetricTopic`, and extended with the `last_full_window`
//! aggregate spec.md adds for autopause detection (Design Note §9).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use loom_types::{MetricTopic, PodName, SAMPLE_RESOLUTION_SECONDS};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Incremental sum/count aggregate over a set of retained samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    sum: Vec<f64>,
    cnt: i64,
}

impl Aggregate {
    fn zeroed(dims: usize) -> Self {
        Self {
            sum: vec![0.0; dims],
            cnt: 0,
        }
    }

    fn add(&mut self, values: &[f64]) {
        for (s, v) in self.sum.iter_mut().zip(values) {
            *s += v;
        }
        self.cnt += 1;
    }

    /// Subtracts a previously-added sample. `cnt` is signed specifically so
    /// a transient negative count from a racing reset cannot panic — it is
    /// simply treated as empty by `avg`.
    fn sub(&mut self, values: &[f64]) {
        for (s, v) in self.sum.iter_mut().zip(values) {
            *s -= v;
        }
        self.cnt -= 1;
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn cnt(&self) -> i64 {
        self.cnt
    }

    pub fn avg(&self) -> Vec<f64> {
        if self.cnt <= 0 {
            vec![0.0; self.sum.len()]
        } else {
            self.sum.iter().map(|s| s / self.cnt as f64).collect()
        }
    }
}

struct Series {
    samples: VecDeque<(i64, Vec<f64>)>,
    running: Aggregate,
    last_full_window: Aggregate,
    max_t: i64,
    cap: usize,
    interval_ms: i64,
}

impl Series {
    fn new(dims: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            running: Aggregate::zeroed(dims),
            last_full_window: Aggregate::zeroed(dims),
            max_t: 0,
            cap: 1,
            interval_ms: 0,
        }
    }

    fn min_t(&self) -> Option<i64> {
        self.samples.front().map(|(t, _)| *t)
    }

    /// Number of sample slots a window of `interval_s` holds at the fixed
    /// 15s sample resolution: a fencepost count of ticks spanning the
    /// window, e.g. a 30s window holds ticks at +0s/+15s/+30s = 3 slots.
    fn capacity_for(interval_s: u64) -> usize {
        (interval_s / SAMPLE_RESOLUTION_SECONDS) as usize + 1
    }

    /// Appends a sample and evicts per spec §4.1's windowing algorithm.
    /// Out-of-order samples (strictly older than the current max) are
    /// dropped per spec §5's ordering guarantee. A sample tying the
    /// current max timestamp replaces it instead of coexisting alongside
    /// it, preserving strict timestamp monotonicity (spec §3/§4.1: "the
    /// later-inserted sample is kept; the earlier is evicted").
    fn append(&mut self, t: i64, values: &[f64], interval_s: u64) {
        if !self.samples.is_empty() && t < self.max_t {
            return;
        }
        self.cap = Self::capacity_for(interval_s);
        self.interval_ms = interval_s as i64 * 1000;

        if !self.samples.is_empty() && t == self.max_t {
            if let Some(pos) = self.samples.iter().position(|(st, _)| *st == t) {
                if let Some((_, old_values)) = self.samples.remove(pos) {
                    self.running.sub(&old_values);
                }
            }
        }

        let pre_insert = self.running.clone();
        self.samples.push_back((t, values.to_vec()));
        self.max_t = self.max_t.max(t);
        self.running.add(values);

        let mut evicted_any = false;
        loop {
            let should_evict = self.samples.len() > self.cap
                || self.samples.front().is_some_and(|(front_t, _)| {
                    let back_t = self.samples.back().unwrap().0;
                    *front_t <= back_t - self.interval_ms
                });
            if !should_evict {
                break;
            }
            if !evicted_any {
                self.last_full_window = pre_insert.clone();
                evicted_any = true;
            }
            if let Some((_, front_values)) = self.samples.pop_front() {
                self.running.sub(&front_values);
            } else {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.samples.clear();
        let dims = self.running.sum.len();
        self.running = Aggregate::zeroed(dims);
        self.last_full_window = Aggregate::zeroed(dims);
        self.max_t = 0;
    }
}

/// Snapshot returned by `GetSnapshotOfTimeSeries`.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub count: usize,
    pub min_t: i64,
    pub max_t: i64,
    pub avgs: Vec<f64>,
}

type Key = (PodName, MetricTopic);

struct Inner {
    series: HashMap<Key, Series>,
}

/// Cheap-to-clone handle around the shared, mutex-guarded series map.
/// Every operation is O(1) amortized under the lock per spec §5's locking
/// discipline, and no `.await` happens while the lock is held.
#[derive(Clone)]
pub struct TimeSeriesStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                series: HashMap::new(),
            })),
        }
    }

    pub async fn insert_with_user_cfg(
        &self,
        pod: &str,
        t: i64,
        values: &[f64],
        interval_s: u64,
        topic: MetricTopic,
    ) {
        let mut inner = self.inner.lock().await;
        let key = (pod.to_string(), topic);
        let series = inner
            .series
            .entry(key)
            .or_insert_with(|| Series::new(values.len()));
        series.append(t, values, interval_s);
    }

    /// Returns `(current_agg, last_full_window_agg)` for the series, or
    /// `None` if no samples have ever been retained for this pod/topic.
    pub async fn get_statistics_of_pod(
        &self,
        pod: &str,
        topic: MetricTopic,
    ) -> Option<(Aggregate, Aggregate)> {
        let inner = self.inner.lock().await;
        inner
            .series
            .get(&(pod.to_string(), topic))
            .map(|s| (s.running.clone(), s.last_full_window.clone()))
    }

    pub async fn get_snapshot_of_time_series(
        &self,
        pod: &str,
        topic: MetricTopic,
    ) -> Option<Snapshot> {
        let inner = self.inner.lock().await;
        let series = inner.series.get(&(pod.to_string(), topic))?;
        let min_t = series.min_t()?;
        Some(Snapshot {
            count: series.samples.len(),
            min_t,
            max_t: series.max_t,
            avgs: series.running.avg(),
        })
    }

    /// Resets every topic's series for `pod` (bind/release and explicit
    /// release both funnel through this).
    pub async fn reset_metrics_of_pod(&self, pod: &str) {
        let mut inner = self.inner.lock().await;
        for topic in MetricTopic::ALL {
            if let Some(series) = inner.series.get_mut(&(pod.to_string(), topic)) {
                series.reset();
            }
        }
    }

    /// Drops all retained state for `pod` across every topic. Used when a
    /// pod is permanently gone rather than merely reassigned.
    pub async fn prune_pod(&self, pod: &str) {
        let mut inner = self.inner.lock().await;
        for topic in MetricTopic::ALL {
            inner.series.remove(&(pod.to_string(), topic));
        }
    }

    /// Debug dump of every retained sample for every pod on `topic`.
    pub async fn dump_all(&self, topic: MetricTopic) -> Vec<(PodName, Vec<(i64, Vec<f64>)>)> {
        let inner = self.inner.lock().await;
        inner
            .series
            .iter()
            .filter(|((_, t), _)| *t == topic)
            .map(|((pod, _), series)| {
                (
                    pod.clone(),
                    series.samples.iter().cloned().collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    /// Fails fast on an unrecognized topic reaching a code path that
    /// assumed one of the known `MetricTopic` variants — an invariant
    /// violation, not a transient condition (spec §7).
    pub fn require_known_topic(topic: &str) -> Result<()> {
        match topic {
            "Cpu" | "TaskCnt" | "MemQuotaExceededCnt" => Ok(()),
            other => Err(Error::Invariant(format!("unknown metrics topic: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s1_windowing_basic() {
        let store = TimeSeriesStore::new();
        store
            .insert_with_user_cfg("pod-a", 1000, &[1.0, 1.0], 2, MetricTopic::Cpu)
            .await;
        store
            .insert_with_user_cfg("pod-a", 2000, &[2.0, 3.0], 2, MetricTopic::Cpu)
            .await;

        let snap = store
            .get_snapshot_of_time_series("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.min_t, 2000);
        assert_eq!(snap.max_t, 2000);

        let (current, _) = store
            .get_statistics_of_pod("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(current.sum(), &[2.0, 3.0]);
        assert_eq!(current.cnt(), 1);
    }

    #[tokio::test]
    async fn s2_window_growth_and_last_full_window() {
        let store = TimeSeriesStore::new();
        store
            .insert_with_user_cfg("pod-a", 1000, &[1.0, 1.0], 2, MetricTopic::Cpu)
            .await;
        store
            .insert_with_user_cfg("pod-a", 2000, &[2.0, 3.0], 2, MetricTopic::Cpu)
            .await;

        for (t, v) in [
            (3000_i64, [3.0, 4.0]),
            (4000, [4.0, 5.0]),
            (5000, [5.0, 6.0]),
            (5001, [6.0, 7.0]),
            (5002, [7.0, 8.0]),
            (5003, [8.0, 9.0]),
            (5004, [9.0, 10.0]),
        ] {
            store
                .insert_with_user_cfg("pod-a", t, &v, 30, MetricTopic::Cpu)
                .await;
        }

        let (current, last_full) = store
            .get_statistics_of_pod("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(current.cnt(), 3);
        assert_eq!(current.sum(), &[24.0, 27.0]);
        assert_eq!(last_full.sum(), &[21.0, 24.0]);
    }

    #[tokio::test]
    async fn out_of_order_samples_are_dropped() {
        let store = TimeSeriesStore::new();
        store
            .insert_with_user_cfg("pod-a", 5000, &[1.0], 60, MetricTopic::Cpu)
            .await;
        store
            .insert_with_user_cfg("pod-a", 4000, &[99.0], 60, MetricTopic::Cpu)
            .await;

        let snap = store
            .get_snapshot_of_time_series("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.max_t, 5000);
    }

    #[tokio::test]
    async fn reset_clears_samples_but_keeps_entry_queryable() {
        let store = TimeSeriesStore::new();
        store
            .insert_with_user_cfg("pod-a", 1000, &[1.0], 60, MetricTopic::Cpu)
            .await;
        store.reset_metrics_of_pod("pod-a").await;
        assert!(
            store
                .get_snapshot_of_time_series("pod-a", MetricTopic::Cpu)
                .await
                .is_none()
        );
        let (current, _) = store
            .get_statistics_of_pod("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(current.cnt(), 0);
    }

    #[tokio::test]
    async fn equal_timestamp_tie_replaces_earlier_sample() {
        let store = TimeSeriesStore::new();
        store
            .insert_with_user_cfg("pod-a", 5000, &[1.0], 60, MetricTopic::Cpu)
            .await;
        store
            .insert_with_user_cfg("pod-a", 5000, &[9.0], 60, MetricTopic::Cpu)
            .await;

        let snap = store
            .get_snapshot_of_time_series("pod-a", MetricTopic::Cpu)
            .await
            .unwrap();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.avgs, vec![9.0]);
    }

    #[test]
    fn rejects_unknown_topic_strings() {
        assert!(TimeSeriesStore::require_known_topic("Cpu").is_ok());
        assert!(TimeSeriesStore::require_known_topic("Bogus").is_err());
    }
}
