use horde_core::ConfigError;
use thiserror::Error;

/// Errors that abort a run as a whole.
#[derive(Debug, Error)]
pub enum HordeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run driver failed: {0}")]
    Driver(#[from] tokio::task::JoinError),
}

/// Error returned by user-supplied task code (actions, hooks).
///
/// Any of these stops the virtual user that hit it; the rest of the run carries on.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("missing session data `{0}`")]
    MissingData(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ActionError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// A defect in task code that stops one virtual user.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user {user} ({class}) failed to start: {source}")]
    Bootstrap {
        user: u64,
        class: String,
        source: ActionError,
    },

    #[error("user {user} ({class}) task `{task}` failed: {source}")]
    Task {
        user: u64,
        class: String,
        task: String,
        source: ActionError,
    },

    #[error("user {user} ({class}) panicked in `{location}`: {message}")]
    Panicked {
        user: u64,
        class: String,
        location: String,
        message: String,
    },
}

/// Transport-level failure of a single request. Always recorded as a failed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}
