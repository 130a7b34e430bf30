//! Retry with exponential backoff around any [`LlmClient`].

use std::time::Duration;

use async_trait::async_trait;

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolDefinition};

/// Backoff configuration for the model endpoint.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum backoff cap.
    pub max_delay: Duration,
    /// Multiplier per consecutive failure (typically 2.0).
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// How many times transient failures are retried, and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffConfig::default(),
        }
    }

    /// Backoff delay, stretched to the provider's `Retry-After` when that is longer.
    pub fn delay_for(&self, retry: u32, error: &LlmError) -> Duration {
        let delay = self.backoff.delay_for(retry);
        match error {
            LlmError::RateLimited {
                retry_after: Some(after),
            } => delay.max(*after),
            _ => delay,
        }
    }
}

/// Wraps a client so transient failures are retried before surfacing.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingClient<C> {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatResponse, LlmError> {
        let mut retry = 0;
        loop {
            match self.inner.chat_completion(model, messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry, &e);
                    tracing::warn!(
                        "Model call failed ({}), retry {}/{} in {:?}",
                        e,
                        retry + 1,
                        self.policy.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) if e.is_transient() && retry > 0 => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: retry + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error kind a fixed number of times, then answers.
    struct FlakyClient {
        failures: u32,
        fatal: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.fatal {
                    return Err(LlmError::Auth {
                        status: 401,
                        body: "no".into(),
                    });
                }
                return Err(LlmError::Server {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            Ok(ChatResponse::text("recovered"))
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
        }
    }

    fn flaky(failures: u32, fatal: bool) -> FlakyClient {
        FlakyClient {
            failures,
            fatal,
            calls: AtomicU32::new(0),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_wins_when_longer() {
        let policy = RetryPolicy::default();
        let err = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(9)),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(9));

        let short = LlmError::RateLimited {
            retry_after: Some(Duration::from_millis(100)),
        };
        assert_eq!(policy.delay_for(2, &short), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let client = RetryingClient::new(flaky(2, false), fast_policy(3));
        let response = client
            .chat_completion("m", &[ChatMessage::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("recovered"));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let client = RetryingClient::new(flaky(10, false), fast_policy(2));
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let client = RetryingClient::new(flaky(10, true), fast_policy(5));
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth { .. }));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_policy_returns_raw_error() {
        let client = RetryingClient::new(flaky(1, false), RetryPolicy::none());
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Server { status: 502, .. }));
    }
}
