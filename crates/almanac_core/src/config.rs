//! Record store configuration.

use std::time::Duration;

/// Configuration for record stores and their bulk transactions.
#[derive(Debug, Clone)]
pub struct Config {
    /// Delay between a failed bulk commit and its single retry.
    pub retry_delay: Duration,

    /// Full scans over more records than this are logged as warnings.
    pub scan_warning_threshold: usize,

    /// Number of change events kept for polling.
    pub max_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(10),
            scan_warning_threshold: 1000,
            max_history: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bulk retry delay.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the full scan warning threshold.
    #[must_use]
    pub const fn scan_warning_threshold(mut self, records: usize) -> Self {
        self.scan_warning_threshold = records;
        self
    }

    /// Sets the change event history size.
    #[must_use]
    pub const fn max_history(mut self, events: usize) -> Self {
        self.max_history = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.scan_warning_threshold, 1000);
        assert_eq!(config.max_history, 10_000);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .retry_delay(Duration::ZERO)
            .scan_warning_threshold(5)
            .max_history(16);

        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.scan_warning_threshold, 5);
        assert_eq!(config.max_history, 16);
    }
}
