use std::time::Duration;

/// Spawn rate used when a user class sets neither a rate nor a ramp duration.
pub const DEFAULT_SPAWN_RATE: f64 = 1.0;

/// How long sessions get to honor a stop signal before they are aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence at which the reporter hands snapshots to its sinks.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Status codes the default classifier treats as success (`[200, 400)`).
pub const DEFAULT_SUCCESS_STATUS: std::ops::Range<u16> = 200..400;

/// Upper bound on distinct failure reasons kept per task. Anything beyond is
/// folded into [`OVERFLOW_FAILURE_REASON`].
pub const MAX_FAILURE_REASONS: usize = 64;

pub const OVERFLOW_FAILURE_REASON: &str = "other";

/// Failure reason recorded for requests that exceeded their timeout.
pub const TIMEOUT_REASON: &str = "timeout";
