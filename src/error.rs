use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON document: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid runtime configuration: {0}")]
    Configuration(String),

    /// An access referenced a logical name that was never written.
    #[error("Cannot resolve access to unknown data '{0}'")]
    Resolution(String),

    #[error("Worker '{worker}' cannot currently host requirement {requirement}")]
    InsufficientResources { worker: String, requirement: String },

    #[error("No worker is able to run core element {0}")]
    NoCompatibleWorker(u64),

    /// Terminal failure of an action, reported to whoever waits on it.
    #[error("Action {action_id} failed terminally: {reason}")]
    ActionFailure { action_id: u64, reason: String },

    /// Tasks of an application that failed terminally since its previous barrier.
    #[error("{} tasks of application {app_id} failed: {tasks:?}", tasks.len())]
    TasksFailed { app_id: u64, tasks: Vec<u64> },

    #[error("Action {action_id} cannot '{operation}' while {state}")]
    InvalidTransition { action_id: u64, state: String, operation: &'static str },

    #[error("Action not found in arena")]
    ActionNotFound,

    #[error("Task {0} is unknown to the runtime")]
    TaskNotFound(u64),

    #[error("Graph node {0} does not exist")]
    NodeNotFound(String),

    #[error("Request rejected: shutdown in progress")]
    ShutdownInProgress,

    #[error("Request channel closed before a response was delivered")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
