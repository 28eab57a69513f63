use std::time::{Duration, SystemTime};

/// The classified result of one task invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub task: String,
    /// Request round trip only; think time is never included.
    pub latency: Duration,
    pub success: bool,
    pub reason: Option<String>,
    pub timestamp: SystemTime,
}

impl Outcome {
    pub fn success(task: &str, latency: Duration) -> Self {
        Self {
            task: task.to_string(),
            latency,
            success: true,
            reason: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn failure(task: &str, latency: Duration, reason: impl Into<String>) -> Self {
        Self {
            task: task.to_string(),
            latency,
            success: false,
            reason: Some(reason.into()),
            timestamp: SystemTime::now(),
        }
    }
}
