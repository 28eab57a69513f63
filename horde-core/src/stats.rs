use serde::{Deserialize, Serialize};
use serde_with::{
    serde_as, DurationMilliSecondsWithFrac, DurationSecondsWithFrac, TimestampSecondsWithFrac,
};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Aggregated statistics for one task name.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_min: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_mean: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_max: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_p50: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_p90: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_p95: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub latency_p99: Duration,
    /// Failure reason -> occurrences.
    pub failures: BTreeMap<String, u64>,
}

impl TaskStats {
    pub fn failure_rate(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.failure_count as f64 / self.count as f64
        }
    }

    pub fn rps(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0. {
            self.count as f64 / secs
        } else {
            0.
        }
    }
}

/// Point-in-time, immutable copy of the aggregator's state.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tasks: BTreeMap<String, TaskStats>,
    pub total: TaskStats,
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    pub window_start: SystemTime,
    /// Timestamp of the most recent outcome folded in (or `window_start`).
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    pub window_end: SystemTime,
}

impl StatsSnapshot {
    pub fn task(&self, name: &str) -> Option<&TaskStats> {
        self.tasks.get(name)
    }

    pub fn elapsed(&self) -> Duration {
        self.window_end
            .duration_since(self.window_start)
            .unwrap_or_default()
    }

    pub fn failure_rate(&self) -> f64 {
        self.total.failure_rate()
    }
}

/// Number of virtual users in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub starting: usize,
    pub running: usize,
    pub pacing: usize,
    pub stopping: usize,
    pub stopped: usize,
    /// Aborted after ignoring the stop signal for the whole grace period.
    pub forced: usize,
    /// Stopped by a session-fatal error.
    pub failed: usize,
}

impl PopulationSnapshot {
    /// Users currently executing their loop.
    pub fn active(&self) -> usize {
        self.running + self.pacing
    }

    /// Users that made it past bootstrap, including ones that already finished.
    pub fn started(&self) -> usize {
        self.running + self.pacing + self.stopping + self.stopped
    }

    pub fn total(&self) -> usize {
        self.starting + self.started() + self.forced + self.failed
    }
}

/// Final report of a run.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub stats: StatsSnapshot,
    pub population: PopulationSnapshot,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    pub max_failure_rate: Option<f64>,
}

impl RunStatistics {
    pub fn forced_stops(&self) -> usize {
        self.population.forced
    }

    pub fn failed_sessions(&self) -> usize {
        self.population.failed
    }

    pub fn failure_rate(&self) -> f64 {
        self.stats.failure_rate()
    }

    /// Whether the aggregate failure rate stayed within the acceptable threshold.
    pub fn passed(&self) -> bool {
        match self.max_failure_rate {
            Some(max) => self.failure_rate() <= max,
            None => true,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}
