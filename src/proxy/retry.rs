//! Retry-wrapping behaviour.

use async_trait::async_trait;
use color_eyre::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::container::Behaviour;

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
  None,
  Constant(Duration),
  /// `step * n` before the n-th retry
  Linear(Duration),
  /// Doubles from `base`, never exceeding `max`
  Exponential { base: Duration, max: Duration },
  /// Explicit delays; the last one repeats
  Schedule(Vec<Duration>),
}

impl Backoff {
  /// Delay before retry number `retry` (1 = after the first failure).
  pub fn delay(&self, retry: u32) -> Duration {
    let retry = retry.max(1);
    match self {
      Backoff::None => Duration::ZERO,
      Backoff::Constant(d) => *d,
      Backoff::Linear(step) => step.saturating_mul(retry),
      Backoff::Exponential { base, max } => {
        let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
        base.saturating_mul(factor).min(*max)
      }
      Backoff::Schedule(delays) => delays
        .get(retry as usize - 1)
        .or(delays.last())
        .copied()
        .unwrap_or(Duration::ZERO),
    }
  }
}

/// Whole milliseconds, saturating for delays too long to count in a `u64`.
fn millis(delay: Duration) -> u64 {
  u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Bounded retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts including the first call. Zero behaves like one.
  pub max_attempts: u32,
  pub backoff: Backoff,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: Backoff::Exponential {
        base: Duration::from_millis(200),
        max: Duration::from_secs(2),
      },
    }
  }
}

/// Which methods a [`RetryProxy`] intercepts, and how.
///
/// Only list idempotent, read-like operations.
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
  methods: HashSet<String>,
  policy: RetryPolicy,
}

impl RetryOptions {
  pub fn new(policy: RetryPolicy) -> Self {
    Self {
      methods: HashSet::new(),
      policy,
    }
  }

  pub fn method(mut self, name: &str) -> Self {
    self.methods.insert(name.to_string());
    self
  }

  pub fn intercepts(&self, name: &str) -> bool {
    self.methods.contains(name)
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }
}

/// The only place the proxies wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
  async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
  async fn sleep(&self, duration: Duration) {
    tokio::time::sleep(duration).await;
  }
}

/// Records requested delays instead of waiting.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
  pub slept: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
  async fn sleep(&self, duration: Duration) {
    self.slept.lock().unwrap().push(duration);
  }
}

/// Re-invokes failed calls under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryProxy {
  sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryProxy {
  fn default() -> Self {
    Self::new(Arc::new(TokioSleeper))
  }
}

impl Behaviour for RetryProxy {
  type Options = RetryOptions;
}

impl RetryProxy {
  pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
    Self { sleeper }
  }

  /// Run `invoke`, retrying failures of intercepted methods. When every
  /// attempt fails the last error is returned as is.
  pub async fn call<T, F, Fut>(&self, options: &RetryOptions, method: &str, mut invoke: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if !options.intercepts(method) {
      return invoke().await;
    }

    let policy = options.policy();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match invoke().await {
        Ok(value) => return Ok(value),
        Err(e) if attempt >= max_attempts => return Err(e),
        Err(e) => {
          let delay = policy.backoff.delay(attempt);
          warn!(
            method,
            attempt,
            max_attempts,
            delay_ms = millis(delay),
            error = %e,
            "call failed, retrying"
          );
          drop(e);
          self.sleeper.sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}

impl std::fmt::Debug for RetryProxy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RetryProxy").finish_non_exhaustive()
  }
}
