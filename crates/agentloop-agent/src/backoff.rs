use crate::config::RetryPolicy;
use agentloop_core::{AgentResult, Context};
use rand::Rng;
use std::time::Duration;

/// Jittered exponential backoff.
///
/// Attempt indices are 0-based: attempt 0 is the wait before the second try.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// `jitter` is clamped to `[0, 1]`.
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    /// Schedule built from a retry policy's millisecond settings and jitter.
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(
            Duration::from_millis(policy.backoff_base_ms),
            Duration::from_millis(policy.backoff_max_ms),
            policy.jitter,
        )
    }

    /// `min(max, base * 2^attempt)`, before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(1023)).unwrap_or(1023);
        let secs = self.base.as_secs_f64() * 2f64.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// Jittered delay for `attempt`, drawn from the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with(attempt, unit)
    }

    /// Jittered delay with an explicit sample `unit` in `[-1, 1]`.
    ///
    /// The result lies in `[d * (1 - jitter), d * (1 + jitter)]` where `d` is
    /// [`Backoff::base_delay`], and is never negative.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let factor = 1.0 + self.jitter * unit.clamp(-1.0, 1.0);
        Duration::from_secs_f64((base * factor).max(0.0))
    }

    /// Waits `duration`, returning the context's error as soon as it finishes.
    pub async fn wait(&self, ctx: &Context, duration: Duration) -> AgentResult<()> {
        ctx.sleep(duration).await
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}
