//! Exponential backoff with jitter.
//!
//! Every retry loop in this crate -- producer delivery, fetch, consumer-group
//! (re)join -- goes through [`Backoff::retry_with_backoff`] rather than hand-rolling a
//! sleep loop, so the retry envelope (base delay, growth factor, cap, deadline) is
//! configured in exactly one place.

use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use tracing::info;

/// Shared configuration for a family of retry loops.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,
    pub deadline: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(500),
            base: 2.0,
            deadline: Some(Duration::from_secs(600)),
        }
    }
}

/// Error returned once a retry loop gives up, either because the last attempt's error
/// wasn't retriable or because the configured deadline elapsed.
#[derive(Debug, thiserror::Error)]
pub enum BackoffError<E> {
    #[error("deadline exceeded trying to retry request: {source}")]
    DeadlineExceeded {
        deadline: Duration,
        source: E,
    },
}

/// Drives one retry loop: each call to [`next`](Self::next) returns the delay to sleep
/// before the next attempt, growing the delay geometrically (with jitter) up to
/// `max_backoff`, and fails once `deadline` has elapsed.
#[derive(Debug)]
pub struct Backoff {
    init_backoff: Duration,
    max_backoff: Duration,
    base: f64,
    deadline: Option<Duration>,
    started_at: Option<std::time::Instant>,
    next_backoff_secs: f64,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            init_backoff: config.init_backoff,
            max_backoff: config.max_backoff,
            base: config.base,
            deadline: config.deadline,
            started_at: None,
            next_backoff_secs: config.init_backoff.as_secs_f64(),
        }
    }

    /// Returns the next backoff duration, or `None` if the configured deadline has
    /// elapsed.
    fn next(&mut self) -> Option<Duration> {
        let started_at = *self.started_at.get_or_insert_with(std::time::Instant::now);

        if let Some(deadline) = self.deadline {
            if started_at.elapsed() >= deadline {
                return None;
            }
        }

        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        let backoff_secs = self.next_backoff_secs * jitter;
        self.next_backoff_secs = (self.next_backoff_secs * self.base)
            .min(self.max_backoff.as_secs_f64())
            .max(self.init_backoff.as_secs_f64());

        Some(Duration::from_secs_f64(backoff_secs))
    }

    /// Repeatedly calls `f`, sleeping between attempts, until it reports
    /// [`ControlFlow::Break`] or the configured deadline elapses.
    ///
    /// `f` reports [`ControlFlow::Continue(e)`] to keep retrying with `e` as the error
    /// that would be surfaced if the deadline is hit on this attempt, or
    /// [`ControlFlow::Break(result)`] to stop immediately.
    pub async fn retry_with_backoff<F, Fut, T, E>(
        &mut self,
        request_name: &str,
        mut f: F,
    ) -> Result<T, BackoffError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ControlFlow<Result<T, E>, E>>,
    {
        loop {
            match f().await {
                ControlFlow::Break(result) => return result.map_err(|source| {
                    BackoffError::DeadlineExceeded {
                        deadline: self.deadline.unwrap_or_default(),
                        source,
                    }
                }),
                ControlFlow::Continue(error) => match self.next() {
                    Some(backoff) => {
                        info!(
                            request_name,
                            backoff_secs = backoff.as_secs_f64(),
                            "request failed, retrying after backoff",
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    None => {
                        return Err(BackoffError::DeadlineExceeded {
                            deadline: self.deadline.unwrap_or_default(),
                            source: error,
                        });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            base: 2.0,
            deadline: Some(Duration::from_secs(5)),
        };
        let mut backoff = Backoff::new(&config);

        let mut attempts = 0;
        let result: Result<i32, BackoffError<&str>> = backoff
            .retry_with_backoff("test", || {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        ControlFlow::Continue("not yet")
                    } else {
                        ControlFlow::Break(Ok(42))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let config = BackoffConfig {
            init_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            base: 2.0,
            deadline: Some(Duration::from_millis(10)),
        };
        let mut backoff = Backoff::new(&config);

        let result: Result<i32, BackoffError<&str>> = backoff
            .retry_with_backoff("test", || async move { ControlFlow::Continue("still failing") })
            .await;

        assert!(result.is_err());
    }
}
