use horde_core::{
    Outcome, StatsSnapshot, TaskStats, MAX_FAILURE_REASONS, OVERFLOW_FAILURE_REASON,
};
use pdatastructs::tdigest::{TDigest, K1};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const TDIGEST_COMPRESSION: f64 = 100.;
const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Concurrency-safe per-task statistics.
///
/// Each task name gets its own mutex-guarded accumulator behind a read-mostly map, so
/// users recording different tasks never contend. Memory stays bounded by the number of
/// distinct task names: latencies go into a t-digest and failure reasons are capped.
///
/// The aggregate row has an accumulator of its own, so its counts and latencies always
/// describe the same set of outcomes. Mid-flight it may run a record or two ahead of or
/// behind the sum of the per-task rows.
#[derive(Debug)]
pub struct StatsAggregator {
    tasks: RwLock<HashMap<String, Arc<Mutex<TaskAccumulator>>>>,
    total: Mutex<TaskAccumulator>,
    window_start: SystemTime,
    /// Nanoseconds since the epoch of the latest recorded outcome; 0 when none.
    window_end: AtomicU64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    pub fn starting_at(window_start: SystemTime) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            total: Mutex::new(TaskAccumulator::default()),
            window_start,
            window_end: AtomicU64::new(0),
        }
    }

    pub fn record(&self, outcome: &Outcome) {
        let acc = self.accumulator(&outcome.task);
        lock(&acc).record(outcome);
        lock(&self.total).record(outcome);

        let ts = outcome
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.window_end.fetch_max(ts, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        {
            let task = outcome.task.clone();
            metrics::histogram!("horde_request_latency", "task" => task.clone())
                .record(outcome.latency.as_secs_f64());
            if outcome.success {
                metrics::counter!("horde_request_success", "task" => task).increment(1);
            } else {
                metrics::counter!("horde_request_failure", "task" => task).increment(1);
            }
        }
    }

    /// An immutable copy of the current state. Each per-task lock is held only while that
    /// task's statistics are computed.
    pub fn snapshot(&self) -> StatsSnapshot {
        let accumulators: Vec<(String, Arc<Mutex<TaskAccumulator>>)> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let tasks: BTreeMap<String, TaskStats> = accumulators
            .into_iter()
            .map(|(name, acc)| {
                let stats = lock(&acc).stats();
                (name, stats)
            })
            .collect();

        let total = lock(&self.total).stats();

        let window_end = match self.window_end.load(Ordering::Relaxed) {
            0 => self.window_start,
            nanos => UNIX_EPOCH + Duration::from_nanos(nanos),
        };

        StatsSnapshot {
            tasks,
            total,
            window_start: self.window_start,
            window_end: window_end.max(self.window_start),
        }
    }

    fn accumulator(&self, task: &str) -> Arc<Mutex<TaskAccumulator>> {
        if let Some(acc) = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task)
        {
            return acc.clone();
        }

        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(task.to_string())
            .or_default()
            .clone()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// A panic elsewhere must not take statistics down with it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct TaskAccumulator {
    success: u64,
    failure: u64,
    latency: LatencyDigest,
    failures: BTreeMap<String, u64>,
}

impl TaskAccumulator {
    fn record(&mut self, outcome: &Outcome) {
        self.latency.insert(outcome.latency);
        if outcome.success {
            self.success += 1;
            return;
        }

        self.failure += 1;
        let reason = outcome.reason.as_deref().unwrap_or(OVERFLOW_FAILURE_REASON);
        if let Some(n) = self.failures.get_mut(reason) {
            *n += 1;
        } else if self.failures.len() < MAX_FAILURE_REASONS {
            self.failures.insert(reason.to_string(), 1);
        } else {
            *self.failures.entry(OVERFLOW_FAILURE_REASON.to_string()).or_default() += 1;
        }
    }

    fn stats(&self) -> TaskStats {
        TaskStats {
            count: self.success + self.failure,
            success_count: self.success,
            failure_count: self.failure,
            failures: self.failures.clone(),
            ..self.latency.stats()
        }
    }
}

#[derive(Debug)]
struct LatencyDigest {
    digest: TDigest<K1>,
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
}

impl Default for LatencyDigest {
    fn default() -> Self {
        Self {
            digest: TDigest::new(K1::new(TDIGEST_COMPRESSION), TDIGEST_BACKLOG_SIZE),
            count: 0,
            sum: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

impl LatencyDigest {
    fn insert(&mut self, latency: Duration) {
        self.digest.insert(latency.as_secs_f64());
        self.count += 1;
        self.sum += latency;
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
    }

    fn quantile(&self, q: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }

        let secs = self.digest.quantile(q);
        let secs = if secs.is_finite() && secs >= 0. {
            secs
        } else {
            error!("Latency digest returned {secs} for q={q}");
            0.
        };
        Duration::from_secs_f64(secs)
    }

    /// Latency fields only; counts are left at zero.
    fn stats(&self) -> TaskStats {
        if self.count == 0 {
            return TaskStats::default();
        }

        TaskStats {
            latency_min: self.min,
            latency_mean: Duration::from_nanos(
                (self.sum.as_nanos() / u128::from(self.count)) as u64,
            ),
            latency_max: self.max,
            latency_p50: self.quantile(0.5),
            latency_p90: self.quantile(0.9),
            latency_p95: self.quantile(0.95),
            latency_p99: self.quantile(0.99),
            ..TaskStats::default()
        }
    }
}
