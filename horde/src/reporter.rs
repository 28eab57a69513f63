//! Periodic and final reporting.
use crate::aggregator::StatsAggregator;
use crate::user::StateGauge;
use arc_swap::ArcSwapOption;
use horde_core::{PopulationSnapshot, RunStatistics, StatsSnapshot, TaskStats};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Receives a snapshot every report interval and the final statistics once.
pub trait ReportSink: Send + Sync {
    fn report(&self, stats: &StatsSnapshot, population: &PopulationSnapshot);

    fn finish(&self, _run: &RunStatistics) {}
}

/// Prints a table to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&self, stats: &StatsSnapshot, population: &PopulationSnapshot) {
        println!("{}", render_table(stats, population));
    }

    fn finish(&self, run: &RunStatistics) {
        println!("{}", render_summary(run));
    }
}

/// Emits one `info!` line per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, stats: &StatsSnapshot, population: &PopulationSnapshot) {
        let total = &stats.total;
        info!(
            "users={} reqs={} fails={} rps={:.2} p50={} p99={}",
            population.active(),
            total.count,
            total.failure_count,
            total.rps(stats.elapsed()),
            ms(total.latency_p50),
            ms(total.latency_p99),
        );
    }

    fn finish(&self, run: &RunStatistics) {
        for line in render_summary(run).lines() {
            info!("{line}");
        }
    }
}

pub fn render_table(stats: &StatsSnapshot, population: &PopulationSnapshot) -> String {
    let elapsed = stats.elapsed();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:<32} {:>8} {:>8} {:>7} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Task", "Reqs", "Fails", "Fail%", "RPS", "Mean", "p50", "p90", "p99", "Max"
    );
    for (name, task) in &stats.tasks {
        row(&mut out, name, task, elapsed);
    }
    row(&mut out, "Aggregated", &stats.total, elapsed);

    let _ = write!(
        out,
        "Users: {} starting, {} running, {} pacing, {} stopping, {} stopped",
        population.starting,
        population.running,
        population.pacing,
        population.stopping,
        population.stopped,
    );
    out
}

fn row(out: &mut String, name: &str, t: &TaskStats, elapsed: Duration) {
    let _ = writeln!(
        out,
        "{:<32} {:>8} {:>8} {:>6.1}% {:>8.2} {:>9} {:>9} {:>9} {:>9} {:>9}",
        truncate(name, 32),
        t.count,
        t.failure_count,
        t.failure_rate() * 100.,
        t.rps(elapsed),
        ms(t.latency_mean),
        ms(t.latency_p50),
        ms(t.latency_p90),
        ms(t.latency_p99),
        ms(t.latency_max),
    );
}

pub fn render_summary(run: &RunStatistics) -> String {
    let mut out = String::new();
    let total = &run.stats.total;
    let elapsed = Duration::from_millis(run.elapsed.as_millis() as u64);

    let _ = writeln!(
        out,
        "Run finished after {}: {} requests, {} failures ({:.2}%)",
        humantime::format_duration(elapsed),
        total.count,
        total.failure_count,
        run.failure_rate() * 100.,
    );

    for (name, task) in &run.stats.tasks {
        for (reason, n) in &task.failures {
            let _ = writeln!(out, "  {name}: {n} x {reason}");
        }
    }

    if run.failed_sessions() > 0 {
        let _ = writeln!(out, "Sessions stopped by errors: {}", run.failed_sessions());
    }
    if run.forced_stops() > 0 {
        let _ = writeln!(out, "Users aborted after grace period: {}", run.forced_stops());
    }

    let verdict = if run.passed() { "PASSED" } else { "FAILED" };
    match run.max_failure_rate {
        Some(max) => {
            let _ = writeln!(out, "Result: {verdict} (max failure rate {:.2}%)", max * 100.);
        }
        None => {
            let _ = writeln!(out, "Result: {verdict}");
        }
    }

    out.push_str(&render_table(&run.stats, &run.population));
    out
}

fn ms(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Publishes snapshots on a fixed cadence until cancelled.
pub(crate) struct Reporter {
    interval: Interval,
    stats: Arc<StatsAggregator>,
    gauge: Arc<StateGauge>,
    sinks: Vec<Arc<dyn ReportSink>>,
    latest: Arc<ArcSwapOption<StatsSnapshot>>,
}

impl Reporter {
    pub fn new(
        period: Duration,
        stats: Arc<StatsAggregator>,
        gauge: Arc<StateGauge>,
        sinks: Vec<Arc<dyn ReportSink>>,
        latest: Arc<ArcSwapOption<StatsSnapshot>>,
    ) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            stats,
            gauge,
            sinks,
            latest,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        // NOTE: First tick completes instantly
        self.interval.tick().await;
        loop {
            tokio::select! {
                _ = self.interval.tick() => self.publish(),
                _ = cancel.cancelled() => break,
            }
        }
    }

    fn publish(&self) {
        let stats = self.stats.snapshot();
        let population = self.gauge.snapshot();

        #[cfg(feature = "metrics")]
        {
            metrics::gauge!("horde_users_active").set(population.active() as f64);
            metrics::gauge!("horde_users_starting").set(population.starting as f64);
            metrics::gauge!("horde_users_stopped").set(population.stopped as f64);
        }

        for sink in &self.sinks {
            sink.report(&stats, &population);
        }
        self.latest.store(Some(Arc::new(stats)));
    }
}
