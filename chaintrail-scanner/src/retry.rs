use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Worth trying again after the policy delay.
    Transient(E),
    /// Stop immediately and hand the error to the caller.
    Fatal(E),
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// Exhaustion is not an error: it yields `Ok(None)` so callers can treat
    /// unreachable data as absent.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<Option<T>, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(Some(value)),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(e)) => {
                    debug!(
                        "{} attempt {}/{} failed: {}",
                        label, attempt, self.max_attempts, e
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        warn!("Failed to fetch {} after {} attempts", label, self.max_attempts);
        Ok(None)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
