use crate::profile::UserClassProfile;
use crate::task::TaskSpec;
use horde_core::ConfigError;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Named user class profiles available to a run.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    classes: BTreeMap<String, Arc<UserClassProfile>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: UserClassProfile) -> Result<(), ConfigError> {
        let name = profile.name().to_string();
        if self.classes.contains_key(&name) {
            return Err(ConfigError::DuplicateClass(name));
        }

        debug!(
            "Registered user class {name} with {} tasks (total weight {})",
            profile.tasks().len(),
            profile.total_weight()
        );
        self.classes.insert(name, Arc::new(profile));
        Ok(())
    }

    /// Builder-style [`TaskRegistry::register`].
    pub fn with(mut self, profile: UserClassProfile) -> Result<Self, ConfigError> {
        self.register(profile)?;
        Ok(self)
    }

    pub fn get(&self, class: &str) -> Option<&Arc<UserClassProfile>> {
        self.classes.get(class)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn select<R: Rng + ?Sized>(&self, class: &str, rng: &mut R) -> Option<&TaskSpec> {
        self.classes.get(class).map(|p| p.select(rng))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
