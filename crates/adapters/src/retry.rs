use std::time::Duration;

use log::{debug, warn};

use crate::error::AdapterError;

const DIAGNOSTIC_CHARS: usize = 200;

/// Delay before attempt `attempt` (1-based, > 1) given the base delay.
pub type BackoffPolicy = fn(usize, Duration) -> Duration;

/// `attempt × base`: 2×, 3×, 4×… the base before the 2nd, 3rd, 4th attempt.
pub fn linear_backoff(attempt: usize, base: Duration) -> Duration {
    let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl RetryConfig {
    pub const fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: linear_backoff,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Bookkeeping for one logical call. Lives only as long as the retry loop.
#[derive(Debug)]
pub struct RetryState {
    pub attempt: usize,
    pub max_attempts: usize,
    pub last_error: Option<AdapterError>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            next_delay: None,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Records a failed attempt and works out the wait before the next one,
    /// if there is a next one.
    fn record_failure(&mut self, error: AdapterError, config: &RetryConfig) {
        self.next_delay = if self.has_attempts_left() {
            Some((config.backoff)(self.attempt + 1, config.base_delay))
        } else {
            None
        };
        self.last_error = Some(error);
    }

    fn into_error(self) -> AdapterError {
        let attempts = self.attempt;
        let error = self.last_error.unwrap_or(AdapterError::EmptyResponse);
        AdapterError::retry_exhausted(attempts, error)
    }
}

/// Calls `f` until it succeeds or `config.max_attempts` calls have failed,
/// handing each wait computed by `config.backoff` to `sleep`. Returns the value
/// with the attempt that produced it.
pub fn call_with_retry<F, S, T>(
    mut f: F,
    config: &RetryConfig,
    mut sleep: S,
) -> Result<(T, usize), AdapterError>
where
    F: FnMut() -> Result<T, AdapterError>,
    S: FnMut(Duration),
{
    let mut state = RetryState::new(config.max_attempts);

    while state.has_attempts_left() {
        if let Some(delay) = state.next_delay.take() {
            warn!(
                "等待 {} 秒后进行第 {}/{} 次尝试",
                delay.as_secs_f32(),
                state.attempt + 1,
                state.max_attempts
            );
            sleep(delay);
        }

        state.attempt += 1;
        debug!("第 {}/{} 次请求", state.attempt, state.max_attempts);
        match f() {
            Ok(value) => return Ok((value, state.attempt)),
            Err(err) => {
                warn!(
                    "第 {}/{} 次请求失败：{}",
                    state.attempt,
                    state.max_attempts,
                    err.diagnostic(DIAGNOSTIC_CHARS)
                );
                state.record_failure(err, config);
            }
        }
    }

    Err(state.into_error())
}
