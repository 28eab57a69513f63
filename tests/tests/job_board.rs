mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use horde::prelude::*;
    use horde_demos::roles;
    use std::sync::Arc;
    use std::time::Duration;

    fn scheduler(api_key: &str) -> Scheduler {
        Scheduler::new(
            roles::registry(api_key).unwrap(),
            Arc::new(ReqwestClient::new()),
        )
        .sink(LogSink)
    }

    fn shipped_config() -> RunConfig {
        let yaml = include_str!("../../demos/jobboard.yaml");
        let mut config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        config.target_host = MOCK_HOST.to_string();
        config.run_duration = Duration::from_secs(6);
        config.ramp_duration = Some(Duration::from_secs(2));
        config.seed = Some(7);
        config
    }

    #[tokio::test]
    async fn all_roles_pass() {
        init().await;

        let run = scheduler("anon").run(shipped_config()).await.unwrap();

        assert_eq!(dbg!(run.stats.total.failure_count), 0);
        assert!(run.passed());
        assert_eq!(run.failed_sessions(), 0);
        assert_eq!(run.population.stopped, 40);

        for task in ["GET /jobs", "GET /candidates", "GET /notifications"] {
            assert!(run.stats.task(task).is_some_and(|s| s.count > 0), "{task}");
        }

        let json = serde_json::to_value(&run).unwrap();
        assert!(json["stats"]["tasks"].is_object());
    }

    #[tokio::test]
    async fn duplicate_signups_are_expected() {
        init().await;

        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(12))
            .user_class("auth", 20, Some(20.))
            .seed(11);
        let run = scheduler("anon").run(config).await.unwrap();

        let signups: u64 = ["POST /auth/signup", "POST /auth/signup-company"]
            .iter()
            .filter_map(|t| run.stats.task(t))
            .map(|s| s.count)
            .sum();
        assert!(signups >= 20);
        assert_eq!(run.stats.total.failure_count, 0);
    }

    #[tokio::test]
    async fn missing_api_key_fails_the_run() {
        init().await;

        let profile = UserClassProfile::builder("anonymous")
            .constant_wait(Duration::from_millis(100))
            .task(TaskSpec::get("GET /notifications", "/rest/v1/notifications"))
            .build()
            .unwrap();
        let registry = TaskRegistry::new().with(profile).unwrap();
        let config = RunConfig::new(MOCK_HOST, Duration::from_secs(2))
            .user_class("anonymous", 2, Some(10.))
            .max_failure_rate(0.01);

        let run = Scheduler::new(registry, Arc::new(ReqwestClient::new()))
            .run(config)
            .await
            .unwrap();

        let stats = run.stats.task("GET /notifications").unwrap();
        assert_eq!(stats.failures.get("HTTP 401"), Some(&stats.count));
        assert!(!run.passed());
        assert_eq!(run.exit_code(), 1);
    }
}
