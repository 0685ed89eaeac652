//! Driver configuration.

use std::time::Duration;

use chronosim_core::Environment;

use crate::error::ConfigError;

/// Lower bound of the publish delay, in milliseconds.
pub const MIN_DELAY_MS: u64 = 1000;

/// Upper bound of the publish delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = 3000;

/// Freshness attached to every published data packet.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(4000);

/// Retry budget passed to every fetch.
pub const DEFAULT_FETCH_RETRIES: u32 = 2;

/// Inclusive integer range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformRange {
    /// Smallest value that can be drawn.
    pub min: u64,
    /// Largest value that can be drawn.
    pub max: u64,
}

impl UniformRange {
    /// Create a range. Bounds are checked by [`DriverConfig::validate`].
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Draw one value from the range.
    pub fn sample<E: Environment>(&self, env: &E) -> u64 {
        env.random_range(self.min, self.max)
    }

    /// True if `value` lies inside the range.
    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Scenario driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Range the message budget is drawn from, once, at construction.
    pub messages: UniformRange,
    /// Range every timer delay is drawn from, in milliseconds.
    pub delay_ms: UniformRange,
    /// Freshness of published data.
    pub freshness: Duration,
    /// Retry budget for each fetch.
    pub fetch_retries: u32,
    /// Cap on fetches in flight. `None` issues every fetch immediately.
    pub max_outstanding_fetches: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            messages: UniformRange::new(1, 10),
            delay_ms: UniformRange::new(MIN_DELAY_MS, MAX_DELAY_MS),
            freshness: DEFAULT_FRESHNESS,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            max_outstanding_fetches: None,
        }
    }
}

impl DriverConfig {
    /// Config with the given message budget range and defaults elsewhere.
    pub fn with_messages(min: u64, max: u64) -> Self {
        Self { messages: UniformRange::new(min, max), ..Self::default() }
    }

    /// Check every range and limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let UniformRange { min, max } = self.messages;
        if min > max {
            return Err(ConfigError::InvalidMessageRange { min, max });
        }

        let UniformRange { min, max } = self.delay_ms;
        if min > max {
            return Err(ConfigError::InvalidDelayRange { min, max });
        }

        if self.max_outstanding_fetches == Some(0) {
            return Err(ConfigError::ZeroFetchLimit);
        }

        Ok(())
    }
}
