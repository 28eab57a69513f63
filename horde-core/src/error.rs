use std::time::Duration;
use thiserror::Error;

/// Invalid run configuration or user-class setup. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("user class `{class}` has no tasks")]
    NoTasks { class: String },

    #[error("task `{task}` in user class `{class}` has weight 0; weights must be positive")]
    ZeroWeight { class: String, task: String },

    #[error("user class `{class}` has wait time min {min:?} greater than max {max:?}")]
    InvalidWaitTime {
        class: String,
        min: Duration,
        max: Duration,
    },

    #[error("user class `{0}` is registered more than once")]
    DuplicateClass(String),

    #[error("user class `{0}` is configured but was never registered")]
    UnknownClass(String),

    #[error("no user classes configured")]
    NoUserClasses,

    #[error("user class `{class}` has an invalid spawn rate {rate}")]
    InvalidSpawnRate { class: String, rate: f64 },

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("max failure rate {0} is outside [0, 1]")]
    InvalidFailureRate(f64),

    #[error("invalid target host `{host}`: {reason}")]
    InvalidTargetHost { host: String, reason: String },
}
