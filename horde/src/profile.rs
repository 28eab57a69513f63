use crate::error::ActionError;
use crate::pacer::Pacer;
use crate::session::Session;
use crate::task::TaskSpec;
use horde_core::ConfigError;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Runs once when a user starts, before its first task.
pub type StartFn = dyn Fn(&mut Session) -> Result<(), ActionError> + Send + Sync;

/// Everything a user class needs: its tasks, their weights and the think time between them.
///
/// Built (and validated) through [`UserClassProfile::builder`]; immutable afterwards and
/// shared by every user of the class.
#[derive(Clone)]
pub struct UserClassProfile {
    name: String,
    pacer: Pacer,
    headers: BTreeMap<String, String>,
    on_start: Option<Arc<StartFn>>,
    tasks: Vec<TaskSpec>,
    weights: WeightTable,
}

impl UserClassProfile {
    pub fn builder(name: &str) -> ProfileBuilder {
        ProfileBuilder {
            name: name.to_string(),
            wait: (Duration::ZERO, Duration::ZERO),
            headers: BTreeMap::new(),
            on_start: None,
            tasks: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.total
    }

    /// Picks the next task, proportionally to weight. Never fails.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &TaskSpec {
        let draw = rng.gen_range(0..self.weights.total);
        &self.tasks[self.weights.index(draw)]
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        self.pacer.next_delay(rng)
    }

    /// Copies the default headers into the session and runs the `on_start` hook.
    pub(crate) fn bootstrap(&self, session: &mut Session) -> Result<(), ActionError> {
        for (name, value) in &self.headers {
            session.set_header(name, value.clone());
        }
        match &self.on_start {
            Some(on_start) => on_start(session),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for UserClassProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserClassProfile")
            .field("name", &self.name)
            .field("pacer", &self.pacer)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

pub struct ProfileBuilder {
    name: String,
    wait: (Duration, Duration),
    headers: BTreeMap<String, String>,
    on_start: Option<Arc<StartFn>>,
    tasks: Vec<TaskSpec>,
}

impl ProfileBuilder {
    /// Think time drawn uniformly from `[min, max]` after every task.
    pub fn wait_between(mut self, min: Duration, max: Duration) -> Self {
        self.wait = (min, max);
        self
    }

    pub fn constant_wait(self, wait: Duration) -> Self {
        self.wait_between(wait, wait)
    }

    /// Header copied into every new session of this class.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.headers.insert(name, value.to_string());
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Session) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn build(self) -> Result<UserClassProfile, ConfigError> {
        let pacer = Pacer::new(&self.name, self.wait.0, self.wait.1)?;
        let weights = WeightTable::new(&self.name, &self.tasks)?;
        Ok(UserClassProfile {
            name: self.name,
            pacer,
            headers: self.headers,
            on_start: self.on_start,
            tasks: self.tasks,
            weights,
        })
    }
}

/// Cumulative weights in registration order.
///
/// Task `i` owns the draws in `[cumulative[i - 1], cumulative[i])`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WeightTable {
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightTable {
    fn new(class: &str, tasks: &[TaskSpec]) -> Result<Self, ConfigError> {
        if tasks.is_empty() {
            return Err(ConfigError::NoTasks {
                class: class.to_string(),
            });
        }

        let mut total = 0u64;
        let mut cumulative = Vec::with_capacity(tasks.len());
        for task in tasks {
            if task.weight_value() == 0 {
                return Err(ConfigError::ZeroWeight {
                    class: class.to_string(),
                    task: task.name().to_string(),
                });
            }
            total += u64::from(task.weight_value());
            cumulative.push(total);
        }

        Ok(Self { cumulative, total })
    }

    fn index(&self, draw: u64) -> usize {
        self.cumulative.partition_point(|&c| c <= draw)
    }
}
