use crate::aggregator::StatsAggregator;
use crate::error::{HordeError, SessionError};
use crate::executor::Executor;
use crate::http::HttpClient;
use crate::profile::UserClassProfile;
use crate::registry::TaskRegistry;
use crate::reporter::{ReportSink, Reporter};
use crate::session::Session;
use crate::user::{StateGauge, VirtualUser};
use arc_swap::ArcSwapOption;
use horde_core::{ConfigError, PopulationSnapshot, RunConfig, RunStatistics, StatsSnapshot};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Ramps user classes up to their target counts, keeps them running for the configured
/// duration and then drains them.
///
/// ```no_run
/// # use horde::prelude::*;
/// # use std::{sync::Arc, time::Duration};
/// # async fn example() -> Result<(), HordeError> {
/// let registry = TaskRegistry::new().with(
///     UserClassProfile::builder("reader")
///         .wait_between(Duration::from_secs(1), Duration::from_secs(3))
///         .task(TaskSpec::get("GET /jobs", "/jobs").weight(3))
///         .task(TaskSpec::get("GET /profiles", "/profiles"))
///         .build()?,
/// )?;
///
/// let config = RunConfig::new("http://localhost:3002", Duration::from_secs(60))
///     .user_class("reader", 20, Some(2.));
///
/// let stats = Scheduler::new(registry, Arc::new(ReqwestClient::new()))
///     .sink(ConsoleSink)
///     .run(config)
///     .await?;
/// std::process::exit(stats.exit_code());
/// # }
/// ```
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    client: Arc<dyn HttpClient>,
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl Scheduler {
    pub fn new(registry: TaskRegistry, client: Arc<dyn HttpClient>) -> Self {
        Self {
            registry: Arc::new(registry),
            client,
            sinks: vec![],
        }
    }

    pub fn sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Validates `config` and starts the run in the background.
    ///
    /// Must be called from within a Tokio runtime. Nothing is spawned when the
    /// configuration is rejected.
    pub fn start(&self, config: RunConfig) -> Result<RunHandle, ConfigError> {
        config.validate()?;

        let mut spawners = vec![];
        for (name, class) in &config.user_classes {
            let profile = self
                .registry
                .get(name)
                .ok_or_else(|| ConfigError::UnknownClass(name.clone()))?;
            let interval = config.spawn_interval(name)?;
            spawners.push(ClassSpawner {
                profile: profile.clone(),
                target: class.count,
                spawned: 0,
                interval,
            });
        }

        let stop = CancellationToken::new();
        let gauge = Arc::new(StateGauge::default());
        let stats = Arc::new(StatsAggregator::new());
        let latest = Arc::new(ArcSwapOption::empty());

        let driver = Driver {
            executor: Executor::new(
                self.client.clone(),
                &config.target_host,
                config.request_timeout,
            ),
            config,
            spawners,
            stats: stats.clone(),
            gauge: gauge.clone(),
            sinks: self.sinks.clone(),
            latest: latest.clone(),
        };
        let driver = tokio::spawn(driver.run(stop.clone()).in_current_span());

        Ok(RunHandle {
            stop,
            gauge,
            stats,
            latest,
            driver,
        })
    }

    /// [`Scheduler::start`] followed by [`RunHandle::wait`].
    pub async fn run(&self, config: RunConfig) -> Result<RunStatistics, HordeError> {
        self.start(config)?.wait().await
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

/// A run in progress.
#[derive(Debug)]
pub struct RunHandle {
    stop: CancellationToken,
    gauge: Arc<StateGauge>,
    stats: Arc<StatsAggregator>,
    latest: Arc<ArcSwapOption<StatsSnapshot>>,
    driver: JoinHandle<RunStatistics>,
}

impl RunHandle {
    /// Ends the run early. Users are drained exactly as at the end of the run duration.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    pub fn population(&self) -> PopulationSnapshot {
        self.gauge.snapshot()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The snapshot most recently handed to the report sinks.
    pub fn latest_report(&self) -> Option<Arc<StatsSnapshot>> {
        self.latest.load_full()
    }

    pub async fn wait(self) -> Result<RunStatistics, HordeError> {
        Ok(self.driver.await?)
    }
}

/// Cloneable trigger for [`RunHandle::stop`].
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Stops the run once `signal` completes.
pub fn stop_on<F>(handle: StopHandle, signal: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        handle.stop();
    })
}

/// Stops the run on the first Ctrl-C.
pub fn stop_on_ctrl_c(handle: StopHandle) -> JoinHandle<()> {
    stop_on(handle, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping run"),
            Err(err) => {
                error!("Unable to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        }
    })
}

struct ClassSpawner {
    profile: Arc<UserClassProfile>,
    target: usize,
    spawned: usize,
    interval: Duration,
}

impl ClassSpawner {
    /// `None` once the target is reached, or if the next spawn lies beyond what an
    /// [`Instant`] can represent.
    fn next_at(&self, start: Instant) -> Option<Instant> {
        if self.spawned >= self.target {
            return None;
        }
        let spawned = u32::try_from(self.spawned).ok()?;
        start.checked_add(self.interval.checked_mul(spawned)?)
    }
}

struct Driver {
    config: RunConfig,
    spawners: Vec<ClassSpawner>,
    executor: Executor,
    stats: Arc<StatsAggregator>,
    gauge: Arc<StateGauge>,
    sinks: Vec<Arc<dyn ReportSink>>,
    latest: Arc<ArcSwapOption<StatsSnapshot>>,
}

impl Driver {
    #[instrument(name = "run", skip_all, fields(host = %self.config.target_host, users = self.config.total_users()))]
    async fn run(mut self, stop: CancellationToken) -> RunStatistics {
        let mut spawners = std::mem::take(&mut self.spawners);
        let start = Instant::now();
        let deadline = start.checked_add(self.config.run_duration);
        info!(
            "Run started: {} users over {} classes for {}",
            self.config.total_users(),
            spawners.len(),
            humantime::format_duration(self.config.run_duration)
        );

        #[cfg(feature = "metrics")]
        metrics::gauge!("horde_users_target").set(self.config.total_users() as f64);

        let reporter_stop = CancellationToken::new();
        let reporter = tokio::spawn(
            Reporter::new(
                self.config.report_interval,
                self.stats.clone(),
                self.gauge.clone(),
                self.sinks.clone(),
                self.latest.clone(),
            )
            .run(reporter_stop.clone())
            .in_current_span(),
        );

        let users_stop = CancellationToken::new();
        let mut users: JoinSet<Result<(), SessionError>> = JoinSet::new();
        let mut next_id = 0u64;

        loop {
            let next_spawn = spawners.iter().filter_map(|s| s.next_at(start)).min();

            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("Stop requested after {:?}", start.elapsed());
                    break;
                }
                _ = wait_until(deadline) => {
                    info!("Run duration elapsed");
                    break;
                }
                _ = wait_until(next_spawn) => {
                    let now = Instant::now();
                    for spawner in spawners.iter_mut() {
                        while spawner.next_at(start).is_some_and(|at| at <= now) {
                            self.spawn(spawner, next_id, &users_stop, &mut users);
                            spawner.spawned += 1;
                            next_id += 1;
                        }
                    }
                }
                Some(res) = users.join_next(), if !users.is_empty() => {
                    self.settle(res);
                }
            }
        }

        self.ramp_down(users_stop, users).await;

        reporter_stop.cancel();
        if let Err(err) = reporter.await {
            error!("Reporter failed: {err}");
        }

        let stats = self.stats.snapshot();
        self.latest.store(Some(Arc::new(stats.clone())));
        let run = RunStatistics {
            stats,
            population: self.gauge.snapshot(),
            elapsed: start.elapsed(),
            max_failure_rate: self.config.max_failure_rate,
        };
        info!(
            "Run finished: {} requests, {:.2}% failed, {} forced stops, {} failed sessions",
            run.stats.total.count,
            run.failure_rate() * 100.,
            run.forced_stops(),
            run.failed_sessions()
        );

        for sink in &self.sinks {
            sink.finish(&run);
        }
        run
    }

    fn spawn(
        &self,
        spawner: &ClassSpawner,
        id: u64,
        users_stop: &CancellationToken,
        users: &mut JoinSet<Result<(), SessionError>>,
    ) {
        let rng = match self.config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(id)),
            None => SmallRng::from_entropy(),
        };
        let session = Session::spawned(
            id,
            spawner.profile.name(),
            BTreeMap::new(),
            rng,
            users_stop.child_token(),
        );
        let user = VirtualUser::new(
            session,
            spawner.profile.clone(),
            self.executor.clone(),
            self.stats.clone(),
            self.gauge.clone(),
        );
        users.spawn(user.run().in_current_span());
        debug!("Spawned user {id} ({})", spawner.profile.name());
    }

    /// Signals every user, waits out the grace period and aborts whoever is left.
    async fn ramp_down(
        &self,
        users_stop: CancellationToken,
        mut users: JoinSet<Result<(), SessionError>>,
    ) {
        users_stop.cancel();
        let grace = Instant::now().checked_add(self.config.grace_period);
        debug!("Draining {} users", users.len());

        loop {
            tokio::select! {
                res = users.join_next() => match res {
                    Some(res) => self.settle(res),
                    None => return,
                },
                _ = wait_until(grace) => break,
            }
        }

        warn!(
            "{} users still running after the grace period, aborting",
            users.len()
        );
        users.abort_all();
        while let Some(res) = users.join_next().await {
            self.settle(res);
        }
    }

    fn settle(&self, res: Result<Result<(), SessionError>, JoinError>) {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!("Session stopped: {err}");
                self.gauge.record_failed();
            }
            Err(err) if err.is_cancelled() => self.gauge.record_forced(),
            Err(err) => {
                error!("User task failed: {err}");
                self.gauge.record_failed();
            }
        }
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
