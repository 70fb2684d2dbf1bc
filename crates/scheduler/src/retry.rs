use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::SchedulerError;

/// Bounded retry with a linear delay between attempts.
///
/// `max_attempts` counts every attempt including the first. After attempt
/// `n` fails the next one waits `step * n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(10, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            step,
            initial_delay: Duration::ZERO,
        }
    }

    /// One attempt, made right away.
    pub fn single() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    /// One attempt, made after `delay`.
    pub fn once_after(delay: Duration) -> Self {
        Self {
            max_attempts: 1,
            step: Duration::ZERO,
            initial_delay: delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }

    /// Time spent sleeping if every attempt fails.
    pub fn total_delay(&self) -> Duration {
        (1..self.attempts()).fold(self.initial_delay, |acc, n| acc + self.delay_after(n))
    }
}

/// Run `attempt` until it yields a value or the policy is exhausted.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_until<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, SchedulerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    if !policy.initial_delay.is_zero() {
        sleep(policy.initial_delay).await;
    }
    let max = policy.attempts();
    for n in 1..=max {
        if let Some(value) = attempt(n).await {
            return Ok(value);
        }
        if n < max {
            sleep(policy.delay_after(n)).await;
        }
    }
    Err(SchedulerError::RetryExhausted { attempts: max })
}
