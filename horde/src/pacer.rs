use horde_core::ConfigError;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Think time between a user's tasks, uniform over `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Pacer {
    pub fn new(class: &str, min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidWaitTime {
                class: class.to_string(),
                min,
                max,
            });
        }
        Ok(Self { min, max })
    }

    pub fn constant(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }

    /// Sleeps for `delay` unless the token fires first. Returns `false` if interrupted.
    ///
    /// A zero delay still yields to the scheduler, so a user whose cycles never reach
    /// the network cannot starve the rest of the runtime.
    pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::constant(Duration::ZERO)
    }
}
