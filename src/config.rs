//! Configuration for [`TscClock`](crate::TscClock).

use std::time::Duration;

/// Configuration options for [`TscClock`](crate::TscClock).
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between background calibration samples.
    ///
    /// Shorter intervals converge faster at the cost of more wakeups.
    /// Must be positive. Default: 10 ms.
    pub sample_interval: Duration,

    /// Core the background sampler pins itself to before entering its loop.
    ///
    /// Pinning keeps counter readings free of cross-core counter-drift
    /// artifacts. `None` leaves the sampler unpinned. Default: None.
    pub pinned_core: Option<usize>,

    /// Warm-up before the one-shot [`init`](crate::TscClock::init) path takes
    /// its single counter/wall-clock pair.
    ///
    /// Longer warm-ups average out more scheduling noise. Must be positive.
    /// Default: 1 s.
    pub init_warmup: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(10),
            pinned_core: None,
            init_warmup: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the calibration sampling interval in milliseconds.
    pub fn sample_interval_ms(mut self, ms: u64) -> Self {
        assert!(ms > 0, "sample_interval_ms must be positive");
        self.sample_interval = Duration::from_millis(ms);
        self
    }

    /// Pin the background sampler to the given core.
    pub fn pinned_core(mut self, core: usize) -> Self {
        self.pinned_core = Some(core);
        self
    }

    /// Set the one-shot init warm-up duration.
    pub fn init_warmup(mut self, warmup: Duration) -> Self {
        assert!(!warmup.is_zero(), "init_warmup must be positive");
        self.init_warmup = warmup;
        self
    }

    /// Check that the configuration is usable.
    ///
    /// Returns an error message if it is not.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_interval.is_zero() {
            return Err("sample_interval must be positive".to_string());
        }
        if self.init_warmup.is_zero() {
            return Err("init_warmup must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sample_interval, Duration::from_millis(10));
        assert_eq!(config.pinned_core, None);
        assert_eq!(config.init_warmup, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new()
            .sample_interval_ms(25)
            .pinned_core(3)
            .init_warmup(Duration::from_millis(200));

        assert_eq!(config.sample_interval, Duration::from_millis(25));
        assert_eq!(config.pinned_core, Some(3));
        assert_eq!(config.init_warmup, Duration::from_millis(200));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = Config::default();
        config.sample_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    #[should_panic]
    fn test_builder_rejects_zero_interval() {
        Config::new().sample_interval_ms(0);
    }
}
