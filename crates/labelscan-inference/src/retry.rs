//! Shared retry/backoff discipline for remote calls.
//!
//! Two curves:
//! - a generic transient curve (linear backoff, scaled up on rate-limit
//!   signatures) used by the gate passes, and
//! - a dedicated rate-limit curve (capped exponential with jitter, raised
//!   attempt ceiling) used by the quota-sensitive extraction pass.
//!
//! Classification is by error text, since both providers surface quota and
//! availability problems as message strings rather than typed errors.

use labelscan_core::{defaults, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Signatures of transient failures worth retrying.
const TRANSIENT_SIGNATURES: [&str; 6] = [
    "429",
    "resource_exhausted",
    "503",
    "deadline",
    "timeout",
    "temporarily unavailable",
];

/// Signatures of rate-limit/quota exhaustion specifically.
const RATE_LIMIT_SIGNATURES: [&str; 2] = ["429", "resource_exhausted"];

/// True if the error text matches a rate-limit/resource-exhaustion signature.
pub fn is_rate_limit_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// True if the error text matches any transient signature. Auth failures and
/// malformed responses fall outside this set and fail immediately.
pub fn is_transient_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Backoff configuration shared by every pass.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry count for the generic curve (attempts = retries + 1).
    pub model_retries: u32,
    /// Linear backoff base in seconds.
    pub backoff_secs: f64,
    /// Attempt ceiling once a rate-limit signature is seen on the dedicated curve.
    pub rate_limit_max_attempts: u32,
    /// Exponential base for the dedicated rate-limit curve.
    pub rate_limit_base_secs: f64,
    /// Delay cap for the dedicated rate-limit curve.
    pub rate_limit_cap_secs: f64,
    /// Upper bound of the uniform jitter added to rate-limit delays.
    pub rate_limit_jitter_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            model_retries: defaults::MODEL_RETRIES,
            backoff_secs: defaults::RETRY_BACKOFF_SECS,
            rate_limit_max_attempts: defaults::RATE_LIMIT_MAX_ATTEMPTS,
            rate_limit_base_secs: defaults::RATE_LIMIT_BASE_SECS,
            rate_limit_cap_secs: defaults::RATE_LIMIT_CAP_SECS,
            rate_limit_jitter_secs: defaults::RATE_LIMIT_JITTER_SECS,
        }
    }
}

impl RetryPolicy {
    /// Delay for the generic curve: `base × (attempt+1)`, scaled by 2.5 when
    /// the triggering error carried a rate-limit signature.
    pub fn generic_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let mut secs = self.backoff_secs * (attempt + 1) as f64;
        if rate_limited {
            secs *= defaults::RATE_LIMIT_BACKOFF_FACTOR;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay for the dedicated rate-limit curve:
    /// `min(cap, base × 2^attempt)` plus uniform jitter.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let exp = self.rate_limit_base_secs * 2f64.powi(attempt.min(31) as i32);
        let jitter = rand::thread_rng().gen_range(0.0..self.rate_limit_jitter_secs);
        Duration::from_secs_f64(exp.min(self.rate_limit_cap_secs) + jitter)
    }

    /// Attempt budget for the generic curve.
    pub fn max_attempts(&self) -> u32 {
        self.model_retries.saturating_add(1).max(1)
    }
}

/// Run `op` under the generic transient curve. Non-transient errors fail
/// immediately without consuming the backoff budget.
pub async fn retry_generic<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                if attempt + 1 >= max_attempts || !is_transient_error(&message) {
                    return Err(err);
                }
                let delay = policy.generic_delay(attempt, is_rate_limit_error(&message));
                warn!(
                    attempt,
                    retry_delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient model call failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Run `op` under the dedicated rate-limit curve. A rate-limit signature
/// raises the attempt ceiling to `max(max_attempts, rate_limit_max_attempts)`
/// even if the generic budget would have stopped sooner.
pub async fn retry_rate_limited<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut max_attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                let rate_limited = is_rate_limit_error(&message);
                if rate_limited {
                    max_attempts = max_attempts.max(policy.rate_limit_max_attempts);
                }
                if attempt + 1 >= max_attempts || !is_transient_error(&message) {
                    return Err(err);
                }
                let delay = if rate_limited {
                    policy.rate_limit_delay(attempt)
                } else {
                    policy.generic_delay(attempt, true)
                };
                warn!(
                    attempt,
                    retry_delay_ms = delay.as_millis() as u64,
                    rate_limited,
                    error = %message,
                    "extraction call failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelscan_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_rate_limit_signature_classification() {
        assert!(is_rate_limit_error("openai_http_429: too many requests"));
        assert!(is_rate_limit_error("RESOURCE_EXHAUSTED: quota"));
        assert!(!is_rate_limit_error("gemini_http_503: unavailable"));
    }

    #[test]
    fn test_transient_signature_classification() {
        for msg in [
            "http 429",
            "resource_exhausted",
            "503 service",
            "deadline exceeded",
            "request timeout",
            "temporarily unavailable",
        ] {
            assert!(is_transient_error(msg), "{} should be transient", msg);
        }
        assert!(!is_transient_error("openai_http_401: invalid key"));
        assert!(!is_transient_error("JSON object not found"));
    }

    #[test]
    fn test_generic_delay_linear_and_scaled() {
        let p = policy();
        assert_eq!(p.generic_delay(0, false), Duration::from_secs_f64(0.8));
        assert_eq!(p.generic_delay(2, false), Duration::from_secs_f64(2.4));
        assert_eq!(p.generic_delay(0, true), Duration::from_secs_f64(2.0));
    }

    #[test]
    fn test_rate_limit_delay_capped_and_jittered() {
        let p = policy();
        for attempt in 0..8 {
            let pure = (p.rate_limit_base_secs * 2f64.powi(attempt)).min(p.rate_limit_cap_secs);
            let delay = p.rate_limit_delay(attempt as u32).as_secs_f64();
            assert!(delay >= pure, "attempt {}: {} < {}", attempt, delay, pure);
            assert!(delay < pure + p.rate_limit_jitter_secs);
        }
        // Cap binds from attempt 4 (2 * 2^4 = 32 > 30).
        assert!(p.rate_limit_delay(10).as_secs_f64() < 30.0 + 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_retry_exhausts_budget_on_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_generic(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Inference("timeout".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4); // retries=3, attempts=4
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_retry_fails_fast_on_non_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_generic(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Inference("openai_http_401: bad key".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_retry_recovers() {
        let calls = AtomicU32::new(0);
        let result = retry_generic(&policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Inference("503 unavailable".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retry_raises_ceiling_on_429() {
        let calls = AtomicU32::new(0);
        let p = policy();
        let result: Result<()> = retry_rate_limited(&p, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Inference("gemini_http_429: quota".to_string())) }
        })
        .await;
        assert!(result.is_err());
        // Ceiling raised from model_retries+1 = 4 to rate_limit_max_attempts = 6.
        assert_eq!(
            calls.load(Ordering::SeqCst),
            p.max_attempts().max(p.rate_limit_max_attempts)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retry_keeps_generic_budget_for_non_429() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_rate_limited(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Inference("deadline exceeded".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retry_fails_fast_on_malformed_response() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_rate_limited(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::Serialization(
                    "JSON object not found in model response".to_string(),
                ))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
