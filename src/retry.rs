//! Reconnect and timeout helpers layered on top of the session manager.
//!
//! The manager never reconnects on its own. Callers that want bounded retries
//! with backoff wrap `connect` with [`connect_with_retry`], and callers that
//! want a deadline wrap any future with [`with_timeout`].

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::session::{ConnectionState, SessionError, SessionManager};
use crate::transport::Transport;

/// Policy controlling retry attempts and exponential backoff behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first attempt.
    pub max_attempts: usize,
    /// Delay used before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff delay growth.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each retry delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Reconnect defaults: 100ms doubling up to 2s, five attempts.
    pub fn reconnect() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            jitter: Duration::from_millis(50),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Computes the delay to apply after the given failed attempt.
    ///
    /// `attempt` is 1-based.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..attempt {
            delay = std::cmp::min(delay.saturating_mul(2), self.max_backoff);
        }
        delay + jitter_duration(self.jitter, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

/// Executes an async operation with retry behavior controlled by `policy`.
///
/// `op` receives the 1-based attempt number. `should_retry` decides whether
/// an error is worth another attempt.
pub async fn retry_async<T, E, Op, Fut, ShouldRetry>(
    policy: &RetryPolicy,
    mut op: Op,
    mut should_retry: ShouldRetry,
) -> Result<T, E>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: FnMut(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if attempt >= max_attempts || !should_retry(&error) {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        debug!(
            event = "retry_attempt_failed",
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

/// Connects `manager` and waits for the handshake, retrying failed handshakes.
///
/// Returns `Ok` once the session is open. Misuse errors from `connect`
/// (`InvalidEndpoint`, `AlreadyConnected`, `NoRuntime`) are not retried. A
/// session closed by the caller while connecting ends with `NotConnected`.
pub async fn connect_with_retry<T: Transport>(
    manager: &SessionManager<T>,
    endpoint: &str,
    policy: &RetryPolicy,
) -> Result<(), SessionError> {
    retry_async(
        policy,
        |attempt| async move {
            manager.connect(endpoint)?;
            match manager.wait_until_settled().await {
                ConnectionState::Open => {
                    info!(event = "session_connect_succeeded", endpoint, attempt);
                    Ok(())
                }
                ConnectionState::Failed => Err(SessionError::ConnectFailed(
                    manager
                        .last_error()
                        .unwrap_or_else(|| "handshake failed".to_string()),
                )),
                _ => Err(SessionError::NotConnected),
            }
        },
        |error| matches!(error, SessionError::ConnectFailed(_)),
    )
    .await
}

/// Applies a timeout to an async computation.
///
/// Pair with [`SessionManager::close`] on expiry for bounded-wait connects.
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    future: Fut,
) -> Result<T, tokio::time::error::Elapsed>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await
}

fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ ((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % (limit_nanos + 1))
}
