//! Ambient stack shared by every crate in the workspace: shutdown signal
//! wiring, log/color conventions, and tracing initialization. Kept
//! deliberately small — anything tied to a concrete external system belongs
//! to the crate that owns that boundary, not here.

pub mod colors;
pub mod shutdown;

/// Initializes a `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info` when unset. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Writes the readiness marker file consumed by the container's liveness
/// probe. Best-effort: a failure to write it is logged, not fatal, since
/// many local/test environments have no `/etc` to write to.
pub fn signal_ready() {
    if let Err(e) = std::fs::write("/etc/ready", "ready") {
        tracing::warn!(error = %e, "failed to write readiness file");
    }
}
