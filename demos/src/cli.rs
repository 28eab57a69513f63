use crate::roles::ROLES;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use horde::prelude::*;
use horde::UserClassConfig;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "http://localhost:3002";
pub const DEFAULT_USERS: usize = 10;
pub const DEFAULT_SPAWN_RATE: f64 = 2.;
pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Scenario {
    #[default]
    All,
    Candidate,
    Company,
    Auth,
    Notification,
}

impl Scenario {
    pub fn classes(self) -> Vec<&'static str> {
        match self {
            Scenario::All => ROLES.iter().map(|r| r.class).collect(),
            Scenario::Candidate => vec!["candidate"],
            Scenario::Company => vec!["company"],
            Scenario::Auth => vec!["auth"],
            Scenario::Notification => vec!["notification"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::All => "all",
            Scenario::Candidate => "candidate",
            Scenario::Company => "company",
            Scenario::Auth => "auth",
            Scenario::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Output {
    /// Periodic tables and a final summary on stdout
    #[default]
    Table,
    /// Progress in the log, final statistics as JSON on stdout
    Json,
}

/// Load test for the job board backend
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct JobBoardCli {
    /// Base URL of the backend [default: http://localhost:3002]
    #[arg(long, env = "JOBBOARD_HOST")]
    pub host: Option<String>,

    /// Anonymous API key sent as `apikey` and bearer token
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Total users, spread evenly over the scenario's roles
    #[arg(short, long)]
    pub users: Option<usize>,

    /// Users started per second, across all roles
    #[arg(short = 'r', long)]
    pub spawn_rate: Option<f64>,

    /// How long to run, e.g. `90s` or `5m`
    #[arg(short = 't', long, value_parser = humantime::parse_duration)]
    pub run_time: Option<Duration>,

    #[arg(short, long, value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,

    /// YAML run configuration; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Output::Table)]
    pub output: Output,

    /// Fail the run when more than this fraction of requests fail
    #[arg(long)]
    pub max_failure_rate: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl JobBoardCli {
    /// Layers the flags over the YAML file (if any) over the defaults.
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening config {}", path.display()))?;
                serde_yaml::from_reader(file)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => RunConfig::new(DEFAULT_HOST, DEFAULT_RUN_TIME),
        };

        if let Some(host) = &self.host {
            config.target_host = host.clone();
        }
        if let Some(run_time) = self.run_time {
            config.run_duration = run_time;
        }

        let classes = self.scenario.classes();
        if self.config.is_none() || self.users.is_some() {
            config.user_classes = spread(
                self.users.unwrap_or(DEFAULT_USERS),
                self.spawn_rate.unwrap_or(DEFAULT_SPAWN_RATE),
                &classes,
            );
        } else {
            config
                .user_classes
                .retain(|name, _| classes.contains(&name.as_str()));
            if let Some(rate) = self.spawn_rate {
                let total = config.total_users().max(1) as f64;
                for class in config.user_classes.values_mut() {
                    class.spawn_rate = Some(rate * class.count as f64 / total);
                }
            }
        }

        if let Some(rate) = self.max_failure_rate {
            config.max_failure_rate = Some(rate);
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Splits `users` over `classes`, earlier classes taking the remainder. Each class
/// spawns at its share of `spawn_rate`. Classes left without users are dropped.
pub fn spread(users: usize, spawn_rate: f64, classes: &[&str]) -> BTreeMap<String, UserClassConfig> {
    if classes.is_empty() || users == 0 {
        return BTreeMap::new();
    }

    let base = users / classes.len();
    let extra = users % classes.len();
    classes
        .iter()
        .enumerate()
        .map(|(i, class)| (*class, base + usize::from(i < extra)))
        .filter(|(_, count)| *count > 0)
        .map(|(class, count)| {
            let rate = spawn_rate * count as f64 / users as f64;
            (
                class.to_string(),
                UserClassConfig {
                    count,
                    spawn_rate: Some(rate),
                },
            )
        })
        .collect()
}

pub fn banner(config: &RunConfig, scenario: Scenario) -> String {
    let classes: Vec<_> = config
        .user_classes
        .iter()
        .map(|(name, class)| match class.spawn_rate {
            Some(rate) => format!("{name}={} ({rate:.2}/s)", class.count),
            None => format!("{name}={}", class.count),
        })
        .collect();

    format!(
        "Starting job board load test\n  target:   {}\n  scenario: {}\n  users:    {} [{}]\n  duration: {}",
        config.target_host,
        scenario.name(),
        config.total_users(),
        classes.join(", "),
        humantime::format_duration(config.run_duration),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> JobBoardCli {
        let mut argv = vec!["jobboard", "--api-key", "anon"];
        argv.extend_from_slice(args);
        JobBoardCli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn spread_evenly_with_remainder_first() {
        let classes = Scenario::All.classes();
        let users = spread(10, 2., &classes);

        let counts: Vec<_> = classes.iter().map(|c| users[*c].count).collect();
        assert_eq!(counts, vec![3, 3, 2, 2]);

        let rate: f64 = users.values().filter_map(|c| c.spawn_rate).sum();
        assert!((rate - 2.).abs() < 1e-9);
    }

    #[test]
    fn spread_drops_empty_classes() {
        let classes = spread(2, 1., &Scenario::All.classes());
        assert_eq!(classes.len(), 2);
        assert!(spread(0, 1., &["auth"]).is_empty());
    }

    #[test]
    fn defaults() {
        let config = cli(&[]).run_config().unwrap();
        assert_eq!(config.target_host, DEFAULT_HOST);
        assert_eq!(config.run_duration, DEFAULT_RUN_TIME);
        assert_eq!(config.total_users(), DEFAULT_USERS);
        assert_eq!(config.user_classes.len(), 4);
    }

    #[test]
    fn single_scenario() {
        let config = cli(&["-s", "auth", "-u", "5", "-r", "1", "-t", "2m"])
            .run_config()
            .unwrap();
        assert_eq!(config.user_classes.len(), 1);
        assert_eq!(config.user_classes["auth"].count, 5);
        assert_eq!(config.user_classes["auth"].spawn_rate, Some(1.));
        assert_eq!(config.run_duration, Duration::from_secs(120));
    }

    #[test]
    fn flags_override_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
target_host: "http://staging.local"
run_duration: 30
grace_period: 5
user_classes:
  candidate:
    count: 8
  company:
    count: 2
    spawn_rate: 1
max_failure_rate: 0.05
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = cli(&["-c", path, "-s", "candidate", "-t", "10s"])
            .run_config()
            .unwrap();
        assert_eq!(config.target_host, "http://staging.local");
        assert_eq!(config.run_duration, Duration::from_secs(10));
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.max_failure_rate, Some(0.05));
        assert_eq!(config.user_classes.len(), 1);
        assert_eq!(config.user_classes["candidate"].count, 8);
        assert_eq!(config.user_classes["candidate"].spawn_rate, None);

        let config = cli(&["-c", path, "--host", "http://other", "-r", "5"])
            .run_config()
            .unwrap();
        assert_eq!(config.target_host, "http://other");
        assert_eq!(config.user_classes["candidate"].spawn_rate, Some(4.));
        assert_eq!(config.user_classes["company"].spawn_rate, Some(1.));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(cli(&["--host", "ftp://nope"]).run_config().is_err());
        assert!(cli(&["-u", "0"]).run_config().is_err());
        assert!(cli(&["--max-failure-rate", "2"]).run_config().is_err());
        assert!(cli(&["-c", "/does/not/exist.yaml"]).run_config().is_err());
    }

    #[test]
    fn banner_lists_classes() {
        let config = cli(&["-s", "company", "-u", "4", "-r", "2"])
            .run_config()
            .unwrap();
        let banner = banner(&config, Scenario::Company);
        assert!(banner.contains("target:   http://localhost:3002"));
        assert!(banner.contains("scenario: company"));
        assert!(banner.contains("users:    4 [company=4 (2.00/s)]"));
        assert!(banner.contains("duration: 1m"));
    }
}
