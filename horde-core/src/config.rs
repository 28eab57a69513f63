use crate::{
    ConfigError, DEFAULT_GRACE_PERIOD, DEFAULT_REPORT_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SPAWN_RATE,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for a single load test run.
///
/// Durations are (de)serialized as seconds, fractions allowed:
///
/// ```yaml
/// target_host: https://api.example.com
/// run_duration: 60
/// ramp_duration: 10
/// user_classes:
///   candidate: { count: 20 }
///   company: { count: 5, spawn_rate: 0.5 }
/// ```
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub target_host: String,
    pub user_classes: BTreeMap<String, UserClassConfig>,

    /// Spreads each class's spawns over this window when the class does not set
    /// an explicit spawn rate.
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub ramp_duration: Option<Duration>,

    /// Total run time, measured from start (ramp-up included).
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub run_duration: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_grace_period")]
    pub grace_period: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_report_interval")]
    pub report_interval: Duration,

    /// Aggregate failure rate above which the run is considered failed.
    pub max_failure_rate: Option<f64>,

    /// Seeds every virtual user's RNG for reproducible task sequences.
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserClassConfig {
    pub count: usize,
    /// Users spawned per second.
    #[serde(default)]
    pub spawn_rate: Option<f64>,
}

impl RunConfig {
    pub fn new(target_host: &str, run_duration: Duration) -> Self {
        Self {
            target_host: target_host.to_string(),
            user_classes: BTreeMap::new(),
            ramp_duration: None,
            run_duration,
            grace_period: DEFAULT_GRACE_PERIOD,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            report_interval: DEFAULT_REPORT_INTERVAL,
            max_failure_rate: None,
            seed: None,
        }
    }

    pub fn user_class(mut self, name: &str, count: usize, spawn_rate: Option<f64>) -> Self {
        self.user_classes
            .insert(name.to_string(), UserClassConfig { count, spawn_rate });
        self
    }

    pub fn ramp_duration(mut self, ramp_duration: Duration) -> Self {
        self.ramp_duration = Some(ramp_duration);
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = report_interval;
        self
    }

    pub fn max_failure_rate(mut self, rate: f64) -> Self {
        self.max_failure_rate = Some(rate);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Total number of users across every class once ramp-up completes.
    pub fn total_users(&self) -> usize {
        self.user_classes.values().map(|c| c.count).sum()
    }

    /// Delay between two successive spawns of the named class.
    ///
    /// Fails for unknown classes and for rates so low that the delay does not fit in a
    /// [`Duration`].
    pub fn spawn_interval(&self, name: &str) -> Result<Duration, ConfigError> {
        let class = self
            .user_classes
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClass(name.to_string()))?;
        let rate = match (class.spawn_rate, self.ramp_duration) {
            (Some(rate), _) => rate,
            (None, Some(ramp)) if class.count > 0 => class.count as f64 / ramp.as_secs_f64(),
            _ => DEFAULT_SPAWN_RATE,
        };
        Duration::try_from_secs_f64(rate.recip()).map_err(|_| ConfigError::InvalidSpawnRate {
            class: name.to_string(),
            rate,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid_host = |reason: &str| ConfigError::InvalidTargetHost {
            host: self.target_host.clone(),
            reason: reason.to_string(),
        };
        let url = url::Url::parse(&self.target_host).map_err(|e| invalid_host(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_host("scheme must be http or https"));
        }

        if self.user_classes.is_empty() {
            return Err(ConfigError::NoUserClasses);
        }

        for (name, class) in &self.user_classes {
            if let Some(rate) = class.spawn_rate {
                if !rate.is_finite() || rate <= 0. {
                    return Err(ConfigError::InvalidSpawnRate {
                        class: name.clone(),
                        rate,
                    });
                }
            }
            self.spawn_interval(name)?;
        }

        if self.run_duration.is_zero() {
            return Err(ConfigError::ZeroDuration("run_duration"));
        }
        if self.ramp_duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDuration("ramp_duration"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("report_interval"));
        }

        if let Some(rate) = self.max_failure_rate {
            if !(0. ..=1.).contains(&rate) {
                return Err(ConfigError::InvalidFailureRate(rate));
            }
        }

        Ok(())
    }
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_report_interval() -> Duration {
    DEFAULT_REPORT_INTERVAL
}
