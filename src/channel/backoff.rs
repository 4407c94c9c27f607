use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the reconnect delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base × attempt`
    #[default]
    Linear,
    /// `base × 2^(attempt - 1)`
    Exponential,
}

/// Bounded reconnection policy for a live subscription.
///
/// Delays carry no jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Default: 2000ms
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single delay.
    /// Default: 30000ms
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Reconnect attempts before giving up; `0` disables reconnection.
    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub strategy: BackoffStrategy,
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
        }
    }
}

impl ReconnectPolicy {
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Delay before reconnect `attempt` (1-based), or `None` once the budget
    /// is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let millis = match self.strategy {
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1)),
        };
        Some(Duration::from_millis(millis.min(self.max_delay_ms)))
    }
}
