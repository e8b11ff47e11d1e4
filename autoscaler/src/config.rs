use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// Immutable controller configuration, injected at construction.
///
/// Replaces the source's global mutable `OptionRunModeIsLocal`/`EnvRegion`
/// (see Design Note §9) with a `clap`-derived, environment-overridable
/// struct built once at startup.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ControllerConfig {
    /// Region name used to scope the workload mutator and notifier.
    #[arg(long, env = "REGION")]
    pub region: String,

    /// Disables node-affinity/placement constraints when running against a
    /// single-node or local development cluster.
    #[arg(long, env = "LOCAL_MODE", default_value_t = false)]
    pub local_mode: bool,

    /// Baseline warm-pool size the controller targets independent of
    /// tenant demand.
    #[arg(long, env = "SOFT_LIMIT", default_value_t = 0)]
    pub soft_limit: u32,

    /// Poll cadence of each metrics collector loop. Fixed at 15s per spec,
    /// but kept configurable for tests. Unrelated to any tenant's
    /// `scale_interval_seconds`/`autopause_interval_seconds`, which drive
    /// the time-series window capacity itself (see
    /// `MetricsCollector::interval_for_pod`).
    #[arg(skip = Duration::from_secs(loom_types::SAMPLE_RESOLUTION_SECONDS))]
    pub sample_resolution: Duration,

    /// Analyzer tick cadence.
    #[arg(skip = Duration::from_secs(1))]
    pub analyzer_interval: Duration,

    /// Upper bound on any tenant's configured scale/autopause interval,
    /// used only to size the one-shot bootstrap back-fill window before a
    /// tenant's own config has been loaded (`original_source/autoscale/
    /// cluster.go`'s `HardCodeMaxScaleIntervalSecOfCfg`). Per-pod window
    /// capacity after bootstrap always derives from the owning tenant's
    /// actual configured interval, never from this bound.
    #[arg(long, env = "MAX_SCALE_INTERVAL_SECONDS", default_value_t = 3600)]
    pub max_scale_interval_seconds: u64,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::Config("region must not be empty".into()));
        }
        if self.sample_resolution.is_zero() {
            return Err(Error::Config("sample_resolution must be > 0".into()));
        }
        if self.max_scale_interval_seconds == 0 {
            return Err(Error::Config("max_scale_interval_seconds must be > 0".into()));
        }
        Ok(())
    }

    /// A config suitable for tests: fixed region, no soft limit.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            region: "test-region".to_string(),
            local_mode: true,
            soft_limit: 0,
            sample_resolution: Duration::from_secs(loom_types::SAMPLE_RESOLUTION_SECONDS),
            analyzer_interval: Duration::from_millis(50),
            max_scale_interval_seconds: 3600,
        }
    }
}
