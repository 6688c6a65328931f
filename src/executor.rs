use crate::http::{ApiRequest, ApiResponse, Transport, TransportError};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

pub const JITTER_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub min_delay: Duration,
    /// Upper bound for any single wait, server-supplied or computed.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Executed {
    pub response: ApiResponse,
    pub attempts: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: u32 },
}

impl ExecutorError {
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::Timeout { attempts } | ExecutorError::Transport { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct ResilientExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ResilientExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Executed, ExecutorError> {
        self.execute_with(request, self.policy.max_retries).await
    }

    pub async fn execute_with(
        &self,
        request: &ApiRequest,
        max_retries: u32,
    ) -> Result<Executed, ExecutorError> {
        let max_attempts = max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(request).await {
                Ok(response) => {
                    if !is_retryable_status(response.status) || attempt >= max_attempts {
                        return Ok(Executed {
                            response,
                            attempts: attempt,
                        });
                    }
                    let retry_after = if response.status == 429 {
                        parse_retry_after(response.header("retry-after"), Utc::now())
                    } else {
                        None
                    };
                    let delay = backoff_delay(&self.policy, attempt, retry_after, jitter_factor());
                    warn!(
                        target = "crosslist.executor",
                        method = request.method.as_str(),
                        url = %request.url,
                        status = response.status,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "upstream_retry_scheduled"
                    );
                    crate::metrics::retry_scheduled(response.status);
                    sleep(delay).await;
                }
                Err(TransportError::Timeout) => {
                    if attempt >= max_attempts {
                        return Err(ExecutorError::Timeout { attempts: attempt });
                    }
                    let delay = backoff_delay(&self.policy, attempt, None, jitter_factor());
                    warn!(
                        target = "crosslist.executor",
                        method = request.method.as_str(),
                        url = %request.url,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "upstream_timeout_retry_scheduled"
                    );
                    crate::metrics::retry_scheduled(0);
                    sleep(delay).await;
                }
                Err(TransportError::Request(message)) => {
                    return Err(ExecutorError::Transport {
                        message,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Uniform factor in `[1 - JITTER_RATIO, 1 + JITTER_RATIO]`.
pub fn jitter_factor() -> f64 {
    rand::rng().random_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO))
}

/// Delay before the retry that follows `attempt` (1-based).
///
/// A server-supplied `Retry-After` wins over the exponential schedule. The
/// result stays within `policy.min_delay..=policy.max_delay`.
pub fn backoff_delay(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
    jitter: f64,
) -> Duration {
    let delay = match retry_after {
        Some(server) => server,
        None => {
            let exponent = attempt.saturating_sub(1).min(16);
            let base = policy.base_delay.as_secs_f64() * 2f64.powi(exponent as i32);
            Duration::try_from_secs_f64((base * jitter).max(0.0)).unwrap_or(policy.max_delay)
        }
    };
    delay.min(policy.max_delay).max(policy.min_delay)
}

/// Accepts delta-seconds (integer or fractional) or an HTTP date.
pub fn parse_retry_after(value: Option<&str>, now: DateTime<Utc>) -> Option<Duration> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok()
}
