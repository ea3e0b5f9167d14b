//! MMR window growth policy
//!
//! An entry's acceptable skill gap starts at a base value and grows by a fixed
//! step every fixed interval of waiting, up to a cap.

use crate::config::MmrWindowConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct MmrWindowPolicy {
    config: MmrWindowConfig,
}

impl MmrWindowPolicy {
    pub fn new(config: MmrWindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MmrWindowConfig {
        &self.config
    }

    /// Window for an entry that has waited `wait`; negative waits count as zero
    pub fn window_for(&self, wait: chrono::Duration) -> f64 {
        let waited = wait.num_seconds().max(0) as u64;
        let steps = waited / self.config.step_interval_seconds;
        (self.config.base + steps as f64 * self.config.step).min(self.config.max)
    }

    /// Window for an entry that joined at `joined_at`
    pub fn window_since(&self, joined_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        self.window_for(now - joined_at)
    }
}

impl Default for MmrWindowPolicy {
    fn default() -> Self {
        Self {
            config: MmrWindowConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_window_steps() {
        let policy = MmrWindowPolicy::default();
        assert_eq!(policy.window_for(Duration::zero()), 200.0);
        assert_eq!(policy.window_for(Duration::seconds(9)), 200.0);
        assert_eq!(policy.window_for(Duration::seconds(10)), 250.0);
        assert_eq!(policy.window_for(Duration::seconds(45)), 400.0);
        assert_eq!(policy.window_for(Duration::seconds(3600)), 600.0);
    }

    #[test]
    fn test_negative_wait_is_base() {
        let policy = MmrWindowPolicy::default();
        assert_eq!(policy.window_for(Duration::seconds(-30)), 200.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MmrWindowConfig {
            base: 900.0,
            ..Default::default()
        };
        assert!(MmrWindowPolicy::new(config).is_err());
    }

    proptest! {
        #[test]
        fn window_is_monotonic_and_capped(a in 0i64..100_000, b in 0i64..100_000) {
            let policy = MmrWindowPolicy::default();
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            let w_short = policy.window_for(Duration::seconds(short));
            let w_long = policy.window_for(Duration::seconds(long));
            prop_assert!(w_short <= w_long);
            prop_assert!(w_long <= policy.config().max);
        }

        #[test]
        fn window_respects_any_valid_config(
            base in 0.0f64..500.0,
            extra in 0.0f64..500.0,
            step in 0.0f64..200.0,
            interval in 1u64..60,
            wait in 0i64..10_000,
        ) {
            let policy = MmrWindowPolicy::new(MmrWindowConfig {
                base,
                step,
                step_interval_seconds: interval,
                max: base + extra,
            }).unwrap();
            let window = policy.window_for(Duration::seconds(wait));
            prop_assert!(window >= base);
            prop_assert!(window <= base + extra);
        }
    }
}
