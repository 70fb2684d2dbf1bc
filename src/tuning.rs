//! Runtime tunables for the reaction pipeline.

use std::time::Duration;

use media_locator::LocatorOptions;
use nav_watcher::WatcherOptions;
use rate_applier::ApplierOptions;
use serde::Serialize;
use tubepace_core_types::ready_state;
use tubepace_scheduler::{RetryPolicy, SchedulerConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeTuning {
    #[serde(with = "human_duration")]
    pub debounce: Duration,
    #[serde(with = "human_duration")]
    pub cache_ttl: Duration,
    pub locator_attempts: u32,
    #[serde(with = "human_duration")]
    pub locator_step: Duration,
    #[serde(with = "human_duration")]
    pub settle_delay: Duration,
    pub rate_epsilon: f64,
    pub min_ready_state: u8,
    /// Zero disables location polling.
    #[serde(with = "human_duration")]
    pub poll_interval: Duration,
    /// How often the stored settings are re-read. Zero disables it.
    #[serde(with = "human_duration")]
    pub settings_poll: Duration,
}

impl Default for RuntimeTuning {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            cache_ttl: Duration::from_secs(3),
            locator_attempts: 10,
            locator_step: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
            rate_epsilon: 0.01,
            min_ready_state: ready_state::HAVE_METADATA,
            poll_interval: Duration::from_secs(1),
            settings_poll: Duration::from_secs(1),
        }
    }
}

impl RuntimeTuning {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: self.debounce,
        }
    }

    pub fn locator(&self) -> LocatorOptions {
        LocatorOptions {
            retry: RetryPolicy::linear(self.locator_attempts.max(1), self.locator_step),
            min_ready_state: self.min_ready_state,
        }
    }

    pub fn applier(&self) -> ApplierOptions {
        ApplierOptions {
            epsilon: self.rate_epsilon,
            settle_delay: self.settle_delay,
        }
    }

    pub fn watcher(&self) -> WatcherOptions {
        WatcherOptions {
            poll_interval: (!self.poll_interval.is_zero()).then_some(self.poll_interval),
        }
    }
}

mod human_duration {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_poll_interval_disables_polling() {
        let tuning = RuntimeTuning {
            poll_interval: Duration::ZERO,
            ..RuntimeTuning::default()
        };
        assert_eq!(tuning.watcher().poll_interval, None);
        assert_eq!(
            RuntimeTuning::default().watcher().poll_interval,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn locator_policy_counts_total_attempts() {
        let policy = RuntimeTuning::default().locator().retry;
        assert_eq!(policy.attempts(), 10);
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(600));
    }

    #[test]
    fn durations_render_in_human_form() {
        let rendered = serde_json::to_value(RuntimeTuning::default()).unwrap();
        assert_eq!(rendered["debounce"], "250ms");
        assert_eq!(rendered["cache_ttl"], "3s");
        assert_eq!(rendered["settings_poll"], "1s");
    }
}
