// resilience/mod.rs - Bounded retry for outbound calls
//
// Every failure is treated as transient and retried up to the policy's
// attempt budget with a fixed delay in between. Only the last failure is
// reported. The wait between attempts is bound to a cancellation token,
// normally the one owned by the request that started the call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::tenant::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Call failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("Call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResilientCaller {
    cancellation: CancellationToken,
}

impl ResilientCaller {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// Caller bound to the executing request's cancellation handle. Outside a
    /// request the caller is never cancelled.
    pub fn for_current_request() -> Self {
        match RequestContext::active() {
            Some(context) => Self::new(context.cancellation()),
            None => Self::default(),
        }
    }

    pub async fn call<T, E, F, Fut>(&self, policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            info!(attempt, max_attempts, "Attempting outbound call");

            let outcome = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    warn!(attempt, "Outbound call cancelled mid-attempt");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                outcome = operation() => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    error!(attempts = attempt, error = %e, "Outbound call failed after all attempts");
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Outbound call failed");
                }
            }

            info!(delay_ms = policy.delay().as_millis() as u64, next_attempt = attempt + 1, "Waiting before retry");
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    warn!(attempt, "Retry wait interrupted by cancellation");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(policy.delay()) => {}
            }
        }
    }
}
