mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use horde::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn scheduler(profile: UserClassProfile) -> Scheduler {
        let registry = TaskRegistry::new().with(profile).unwrap();
        Scheduler::new(registry, Arc::new(ReqwestClient::new())).sink(LogSink)
    }

    #[tokio::test]
    async fn delay_latency_is_measured() {
        init().await;

        let profile = UserClassProfile::builder("delay")
            .wait_between(Duration::from_millis(50), Duration::from_millis(100))
            .task(TaskSpec::get("GET /delay/50", "/delay/ms/50"))
            .build()
            .unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(3))
            .user_class("delay", 10, Some(20.))
            .report_interval(Duration::from_secs(1));

        let run = scheduler(profile).run(config).await.unwrap();
        let stats = run.stats.task("GET /delay/50").unwrap();

        assert!(dbg!(stats.count) > 50);
        assert_eq!(stats.failure_count, 0);
        assert!(dbg!(stats.latency_p50) >= Duration::from_millis(50));
        assert!(stats.latency_p50 < Duration::from_millis(150));
        assert!(stats.latency_min >= Duration::from_millis(50));
        assert_eq!(run.population.stopped, 10);
    }

    #[tokio::test]
    async fn timeouts_are_failures() {
        init().await;

        let profile = UserClassProfile::builder("slow")
            .task(TaskSpec::get("GET /delay/500", "/delay/ms/500"))
            .build()
            .unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(2))
            .user_class("slow", 3, Some(10.))
            .request_timeout(Duration::from_millis(100))
            .max_failure_rate(0.5);

        let run = scheduler(profile).run(config).await.unwrap();
        let stats = run.stats.task("GET /delay/500").unwrap();

        assert!(stats.count > 0);
        assert_eq!(stats.failure_count, stats.count);
        assert_eq!(stats.failures.get("timeout"), Some(&stats.count));
        assert!(stats.latency_max < Duration::from_millis(300));
        assert!(!run.passed());
    }

    #[tokio::test]
    async fn status_classification() {
        init().await;

        let profile = UserClassProfile::builder("status")
            .wait_between(Duration::from_millis(10), Duration::from_millis(20))
            .task(TaskSpec::get("GET /status/404", "/status/404"))
            .task(
                TaskSpec::get("GET /status/409", "/status/409").classify(AcceptStatus::new(&[409])),
            )
            .task(TaskSpec::get("GET /status/302", "/status/302"))
            .build()
            .unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(2))
            .user_class("status", 4, Some(20.));

        let run = scheduler(profile).run(config).await.unwrap();

        let not_found = run.stats.task("GET /status/404").unwrap();
        assert_eq!(not_found.failure_count, not_found.count);
        assert_eq!(not_found.failures.get("HTTP 404"), Some(&not_found.count));

        let conflict = run.stats.task("GET /status/409").unwrap();
        assert_eq!(conflict.failure_count, 0);

        // Without a Location header the 302 comes back as-is
        let redirect = run.stats.task("GET /status/302").unwrap();
        assert_eq!(redirect.failure_count, 0);
    }

    #[tokio::test]
    async fn rate_limited_requests_fail() {
        init().await;

        let profile = UserClassProfile::builder("limited")
            .task(TaskSpec::get("GET /limited", "/limited/20/server/rate-test"))
            .build()
            .unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(3))
            .user_class("limited", 10, Some(50.));

        let run = scheduler(profile).run(config).await.unwrap();
        let stats = run.stats.task("GET /limited").unwrap();

        assert!(stats.success_count > 0);
        // Burst of 20 plus 20/s for the run and the drain
        assert!(dbg!(stats.success_count) <= 20 * 6);
        assert!(stats.failures.get("HTTP 429").is_some());
    }

    #[tokio::test]
    async fn stop_ends_run_early() {
        init().await;

        let profile = UserClassProfile::builder("waiting")
            .constant_wait(Duration::from_secs(30))
            .task(TaskSpec::get("GET /delay/1", "/delay/ms/1"))
            .build()
            .unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(120))
            .user_class("waiting", 5, Some(50.));

        let handle = scheduler(profile).start(config).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.population().pacing, 5);

        handle.stop();
        let run = handle.wait().await.unwrap();

        assert!(run.elapsed < Duration::from_secs(3));
        assert_eq!(run.population.stopped, 5);
        assert_eq!(run.forced_stops(), 0);
        assert_eq!(run.stats.total.count, 5);
    }

    #[tokio::test]
    async fn connection_errors_are_failures() {
        init().await;

        let profile = UserClassProfile::builder("nowhere")
            .constant_wait(Duration::from_millis(100))
            .task(TaskSpec::get("GET /", "/"))
            .build()
            .unwrap();
        // Nothing listens on the discard port
        let config = RunConfig::new("http://127.0.0.1:9", Duration::from_secs(1))
            .user_class("nowhere", 2, Some(10.));

        let run = scheduler(profile).run(config).await.unwrap();
        let stats = run.stats.task("GET /").unwrap();

        assert_eq!(stats.success_count, 0);
        assert!(stats.failures.keys().all(|r| r.starts_with("connection error")));
    }
}
