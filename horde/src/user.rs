use crate::aggregator::StatsAggregator;
use crate::error::SessionError;
use crate::executor::{guarded, Executor};
use crate::pacer::Pacer;
use crate::profile::UserClassProfile;
use crate::session::Session;
use horde_core::PopulationSnapshot;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::instrument;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a virtual user: `Starting -> Running <-> Pacing -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Starting,
    Running,
    Pacing,
    Stopping,
    Stopped,
}

/// Shared count of users per lifecycle state.
#[derive(Debug, Default)]
pub struct StateGauge {
    starting: AtomicUsize,
    running: AtomicUsize,
    pacing: AtomicUsize,
    stopping: AtomicUsize,
    stopped: AtomicUsize,
    forced: AtomicUsize,
    failed: AtomicUsize,
}

impl StateGauge {
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            starting: self.starting.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            pacing: self.pacing.load(Ordering::Relaxed),
            stopping: self.stopping.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_forced(&self) {
        self.forced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, state: UserState) -> &AtomicUsize {
        match state {
            UserState::Starting => &self.starting,
            UserState::Running => &self.running,
            UserState::Pacing => &self.pacing,
            UserState::Stopping => &self.stopping,
            UserState::Stopped => &self.stopped,
        }
    }
}

/// Keeps one user's contribution to the [`StateGauge`] current.
///
/// Dropping it before [`StateTracker::finish`] (error, abort) removes the user from its
/// last state; the scheduler accounts for it as failed or forced.
#[derive(Debug)]
pub(crate) struct StateTracker {
    gauge: Arc<StateGauge>,
    state: Option<UserState>,
}

impl StateTracker {
    pub fn new(gauge: Arc<StateGauge>) -> Self {
        gauge.counter(UserState::Starting).fetch_add(1, Ordering::Relaxed);
        Self {
            gauge,
            state: Some(UserState::Starting),
        }
    }

    pub fn state(&self) -> Option<UserState> {
        self.state
    }

    pub fn set(&mut self, next: UserState) {
        if let Some(prev) = self.state.replace(next) {
            self.gauge.counter(prev).fetch_sub(1, Ordering::Relaxed);
        }
        self.gauge.counter(next).fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(mut self) {
        self.set(UserState::Stopped);
        self.state = None;
    }
}

impl Drop for StateTracker {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.gauge.counter(state).fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// One simulated user: a session driven through its class's weighted tasks until stopped.
pub(crate) struct VirtualUser {
    session: Session,
    profile: Arc<UserClassProfile>,
    executor: Executor,
    stats: Arc<StatsAggregator>,
    tracker: StateTracker,
}

impl VirtualUser {
    pub fn new(
        session: Session,
        profile: Arc<UserClassProfile>,
        executor: Executor,
        stats: Arc<StatsAggregator>,
        gauge: Arc<StateGauge>,
    ) -> Self {
        Self {
            session,
            profile,
            executor,
            stats,
            tracker: StateTracker::new(gauge),
        }
    }

    /// Runs until the session's stop signal fires. Requests in flight are allowed to
    /// finish; only think time is interrupted.
    #[instrument(name = "user", skip_all, fields(id = self.session.id(), class = self.profile.name()))]
    pub async fn run(mut self) -> Result<(), SessionError> {
        let profile = self.profile.clone();
        let cancel = self.session.cancel_token().clone();

        if let Err(err) = guarded(&mut self.session, "on_start", |s| profile.bootstrap(s)) {
            return Err(match err {
                SessionError::Task {
                    user,
                    class,
                    source,
                    ..
                } => SessionError::Bootstrap {
                    user,
                    class,
                    source,
                },
                other => other,
            });
        }
        self.tracker.set(UserState::Running);
        trace!("User started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let task = profile.select(self.session.rng());
            trace!("Executing {}", task.name());
            if let Some(outcome) = self.executor.execute(task, &mut self.session).await? {
                self.stats.record(&outcome);
            }

            self.tracker.set(UserState::Pacing);
            let delay = profile.next_delay(self.session.rng());
            if !Pacer::pause(delay, &cancel).await {
                break;
            }
            self.tracker.set(UserState::Running);
        }

        self.tracker.set(UserState::Stopping);
        trace!("User stopping");
        self.tracker.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::http::HttpResponse;
    use crate::task::TaskSpec;
    use crate::testing::ScriptedClient;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn user(
        profile: UserClassProfile,
        client: Arc<ScriptedClient>,
    ) -> (VirtualUser, Arc<StatsAggregator>, Arc<StateGauge>, CancellationToken) {
        let stats = Arc::new(StatsAggregator::new());
        let gauge = Arc::new(StateGauge::default());
        let cancel = CancellationToken::new();
        let session = Session::spawned(
            1,
            profile.name(),
            BTreeMap::new(),
            SmallRng::seed_from_u64(1),
            cancel.clone(),
        );
        let executor = Executor::new(client, "http://api.test", Duration::from_secs(5));
        let user = VirtualUser::new(
            session,
            Arc::new(profile),
            executor,
            stats.clone(),
            gauge.clone(),
        );
        (user, stats, gauge, cancel)
    }

    #[test]
    fn tracker_moves_between_states() {
        let gauge = Arc::new(StateGauge::default());
        let mut tracker = StateTracker::new(gauge.clone());
        assert_eq!(gauge.snapshot().starting, 1);

        tracker.set(UserState::Running);
        tracker.set(UserState::Pacing);
        let snap = gauge.snapshot();
        assert_eq!((snap.starting, snap.running, snap.pacing), (0, 0, 1));

        tracker.finish();
        assert_eq!(gauge.snapshot().stopped, 1);
        assert_eq!(gauge.snapshot().active(), 0);

        let mut dropped = StateTracker::new(gauge.clone());
        dropped.set(UserState::Running);
        drop(dropped);
        assert_eq!(gauge.snapshot().total(), 1);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn runs_until_cancelled() {
        let profile = UserClassProfile::builder("reader")
            .constant_wait(Duration::from_secs(1))
            .task(TaskSpec::get("list", "/jobs"))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::ok(Duration::from_millis(100)));
        let (user, stats, gauge, cancel) = user(profile, client.clone());

        let handle = tokio::spawn(user.run());
        tokio::time::sleep(Duration::from_millis(5_550)).await;
        assert_eq!(gauge.snapshot().active(), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();

        // A cycle takes 1.1s: requests start at 0, 1.1, 2.2, 3.3, 4.4 and 5.5
        assert_eq!(client.sent(), 6);
        assert_eq!(stats.snapshot().total.count, 6);
        assert_eq!(gauge.snapshot().stopped, 1);
        assert_eq!(gauge.snapshot().total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_request_completes_on_stop() {
        let profile = UserClassProfile::builder("reader")
            .task(TaskSpec::get("slow", "/slow"))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::ok(Duration::from_secs(3)));
        let (user, stats, _, cancel) = user(profile, client.clone());

        let handle = tokio::spawn(user.run());
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(client.sent(), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.total.count, 1);
        assert_eq!(snap.total.success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_tasks_record_nothing() {
        let profile = UserClassProfile::builder("reader")
            .constant_wait(Duration::from_secs(1))
            .task(TaskSpec::new("detail", |session| {
                Ok(session
                    .get::<u64>("job")
                    .map(|id| crate::task::TaskRequest::get(&format!("/jobs/{id}"))))
            }))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::ok(Duration::ZERO));
        let (user, stats, _, cancel) = user(profile, client.clone());

        let handle = tokio::spawn(user.run());
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(client.sent(), 0);
        assert!(stats.snapshot().tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_response_keeps_user_running() {
        let profile = UserClassProfile::builder("reader")
            .constant_wait(Duration::from_secs(1))
            .task(TaskSpec::get("list", "/jobs").after(|session, res| {
                let ids: Vec<String> = res.json()?;
                session.insert("jobs", ids);
                Ok(())
            }))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::new(Duration::ZERO, |_| {
            Ok(HttpResponse::new(200, "<html>maintenance</html>"))
        }));
        let (user, stats, gauge, cancel) = user(profile, client.clone());

        let handle = tokio::spawn(user.run());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(client.sent(), 3);
        let list = stats.snapshot().tasks["list"].clone();
        assert_eq!(list.count, 3);
        assert_eq!(list.failure_count, 3);
        assert_eq!(gauge.snapshot().stopped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_action_stops_user() {
        let profile = UserClassProfile::builder("reader")
            .task(TaskSpec::new("broken", |_| {
                Err(ActionError::MissingData("token".into()))
            }))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::ok(Duration::ZERO));
        let (user, _, gauge, _) = user(profile, client);

        let err = user.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Task { ref task, .. } if task == "broken"));
        assert_eq!(gauge.snapshot().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_bootstrap_stops_user() {
        let profile = UserClassProfile::builder("reader")
            .on_start(|_| Err(ActionError::other("login failed")))
            .task(TaskSpec::get("list", "/jobs"))
            .build()
            .unwrap();
        let client = Arc::new(ScriptedClient::ok(Duration::ZERO));
        let (user, _, _, _) = user(profile, client.clone());

        let err = user.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Bootstrap { user: 1, .. }));
        assert_eq!(client.sent(), 0);
    }
}
