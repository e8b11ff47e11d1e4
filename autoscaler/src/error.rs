/// Error taxonomy per spec §7. Variants map onto the severities the
/// taxonomy implies; callers decide whether to log-and-continue or to let
/// an error bubble out of startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient external failure (metrics query failed, workload update
    /// lost a race after exhausting retries). Logged at `warn`; the
    /// relevant loop proceeds with the next tick.
    #[error("transient external failure: {0}")]
    Transient(String),

    /// Observation referred to a pod/series the registry doesn't know
    /// about. Logged and ignored; such gaps self-heal on the next
    /// observation.
    #[error("unknown pod: {0}")]
    UnknownPod(String),

    /// Operation named a tenant the registry has never loaded config for.
    /// Logged and ignored, same as `UnknownPod`.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("unknown series for pod {pod} topic {topic:?}")]
    UnknownSeries {
        pod: String,
        topic: loom_types::MetricTopic,
    },

    /// Configuration or startup failure. Fatal: the controller refuses to
    /// start.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("startup failure: {0}")]
    Startup(String),

    /// Programming error: a code path that requires an invariant to hold
    /// observed it violated (unknown metrics topic, tenant descriptor
    /// missing where one is required).
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// True for errors that a background loop should log and continue
    /// past, rather than let terminate the task.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transient(_)
                | Error::UnknownPod(_)
                | Error::UnknownTenant(_)
                | Error::UnknownSeries { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
