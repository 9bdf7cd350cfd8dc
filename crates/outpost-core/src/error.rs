use thiserror::Error;

/// Top-level error type for the Outpost runtime.
#[derive(Debug, Error)]
pub enum OutpostError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("platform call failed: {0}")]
    Platform(String),

    #[error("event pool is shutting down")]
    PoolShuttingDown,

    #[error("event channel for user {0} is full")]
    EventChannelFull(String),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("user {0} is not being monitored")]
    NotMonitored(String),

    #[error("scenario {scenario} is not active for user {user_id}")]
    ScenarioNotActive { user_id: String, scenario: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
