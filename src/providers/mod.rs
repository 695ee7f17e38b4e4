/*!
 * LLM chat providers used by the translator.
 *
 * - Ollama: local LLM server
 * - Anthropic: Anthropic Messages API
 *
 * Both expose the same `ChatProvider` surface: one system prompt, one user
 * prompt, one text answer. Transient failures (network errors, 5xx, 429) are
 * retried with exponential backoff; everything else fails fast.
 */

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::errors::ProviderError;

pub mod anthropic;
pub mod ollama;

pub use anthropic::Anthropic;
pub use ollama::Ollama;

/// Common trait for all LLM providers
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    /// Short provider name for logs and reports
    fn name(&self) -> &str;

    /// Single-turn completion
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

// @struct: Retry budget for transient provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16)))
    }

    /// Run `operation` until it succeeds, fails permanently or the budget runs out
    pub async fn run<T, F, Fut>(&self, provider: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} request failed ({}), retry {}/{} in {}ms",
                        provider,
                        e,
                        attempt,
                        self.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Network trouble, rate limiting and server errors are worth another try
pub fn is_transient(error: &ProviderError) -> bool {
    match error {
        ProviderError::RequestFailed(_) | ProviderError::ConnectionError(_) => true,
        ProviderError::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
        ProviderError::ParseError(_) | ProviderError::AuthenticationError(_) => false,
    }
}

/// Map a non-success HTTP status onto a provider error
pub fn status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationError(body),
        code => ProviderError::ApiError {
            status_code: code,
            message: body,
        },
    }
}

/// Map a transport failure onto a provider error
pub fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_connect() || error.is_timeout() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_isTransient_shouldRetryServerErrorsOnly() {
        assert!(is_transient(&ProviderError::ApiError { status_code: 503, message: String::new() }));
        assert!(is_transient(&ProviderError::ApiError { status_code: 429, message: String::new() }));
        assert!(!is_transient(&ProviderError::ApiError { status_code: 400, message: String::new() }));
        assert!(!is_transient(&ProviderError::AuthenticationError("bad key".into())));
    }

    #[tokio::test]
    async fn test_retryPolicy_run_shouldStopAfterBudget() {
        let policy = RetryPolicy { max_retries: 2, backoff_base_ms: 1 };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::ConnectionError("refused".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retryPolicy_run_withPermanentError_shouldNotRetry() {
        let policy = RetryPolicy { max_retries: 5, backoff_base_ms: 1 };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::AuthenticationError("denied".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
