use thiserror::Error;

/// Error kinds surfaced by the Lifecycle Coordinator (spec §7). The HTTP
/// layer maps every variant to a 400 with `{"detail": "<message>"}`.
#[derive(Debug, Error)]
pub enum HubRuntimeError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("failed to start model '{name}': {message}")]
    StartFailed { name: String, message: String },

    #[error("model '{0}' failed health checks")]
    HealthCheckFailed(String),

    #[error("failed to reload hub config: {0}")]
    ReloadFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
