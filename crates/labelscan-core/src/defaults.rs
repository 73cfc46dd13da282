//! Centralized default constants for labelscan.
//!
//! **This module is the single source of truth** for all shared default
//! values. The analyzer, inference, and fetcher crates reference these
//! constants instead of defining their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// MODELS
// =============================================================================

/// Default vision/text model for the OpenAI caller (pass2b, pass4 structuring).
pub const OPENAI_MODEL: &str = "gpt-4.1-mini";

/// Default OpenAI model for the pass2a quality gate (cheaper, boolean-only output).
pub const PASS2A_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default Gemini model for pass2a when routed to Gemini.
pub const PASS2A_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default Gemini model for the pass3 extraction tracks.
pub const PASS3_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// OpenAI chat-completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Gemini generateContent endpoint base (model name and key appended).
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// =============================================================================
// TIMEOUTS AND RETRIES
// =============================================================================

/// Model inference request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Image download timeout in seconds (separate, smaller budget).
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 20;

/// Bounded retry count for image downloads.
pub const DOWNLOAD_RETRIES: u32 = 2;

/// Default retry count for model calls.
pub const MODEL_RETRIES: u32 = 3;

/// Linear backoff base in seconds, shared by download and generic model retries.
pub const RETRY_BACKOFF_SECS: f64 = 0.8;

/// Multiplier applied to the generic backoff when the error text carries a
/// rate-limit/resource-exhaustion signature.
pub const RATE_LIMIT_BACKOFF_FACTOR: f64 = 2.5;

/// Attempt ceiling for the dedicated rate-limit curve (pass3). Raised above
/// MODEL_RETRIES because 429s at the extraction stage are routine, not fatal.
pub const RATE_LIMIT_MAX_ATTEMPTS: u32 = 6;

/// Exponential base delay in seconds for the dedicated rate-limit curve.
pub const RATE_LIMIT_BASE_SECS: f64 = 2.0;

/// Delay cap in seconds for the dedicated rate-limit curve.
pub const RATE_LIMIT_CAP_SECS: f64 = 30.0;

/// Upper bound of the uniform jitter added to rate-limit delays, in seconds.
pub const RATE_LIMIT_JITTER_SECS: f64 = 0.8;

/// HTTP statuses worth retrying on image download.
pub const RETRYABLE_HTTP_STATUS: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

// =============================================================================
// IMAGES
// =============================================================================

/// Maximum accepted image size in bytes (8 MiB). Product-label photos above
/// this are almost always scans of entire pages, not single labels.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Download chunk size in bytes.
pub const DOWNLOAD_CHUNK_BYTES: usize = 65536;

/// Browser-like User-Agent sent on image downloads; several CDNs reject
/// default client UAs outright.
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Minimum digit count for an accepted report number.
pub const MIN_REPORT_DIGITS: usize = 10;

/// Maximum digit count for a finally accepted report number.
pub const MAX_REPORT_DIGITS: usize = 16;

/// Wider maximum used while correcting OCR concatenation against a target
/// hint, before final bounds are applied.
pub const INTERMEDIATE_MAX_REPORT_DIGITS: usize = 24;

/// Minimum character length for a plausible ingredients enumeration.
pub const MIN_INGREDIENTS_LEN: usize = 10;

/// Minimum character length for a plausible nutrition text.
pub const MIN_NUTRITION_LEN: usize = 8;

/// Fraction of masking symbols above which a field is treated as redacted.
pub const MASKING_SYMBOL_RATIO: f64 = 0.20;

/// Symbol-to-length ratio above which a field is treated as garbage.
pub const SYMBOL_RATIO_LIMIT: f64 = 0.45;

// =============================================================================
// QUALITY GATE
// =============================================================================

/// Total checks in the pass2 quality score denominator: 11 from the 2A
/// quality gate, 3 required-presence checks from 2B, plus the nutrition
/// presence check counted informationally.
pub const GATE_TOTAL_CHECKS: u32 = 15;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_PASS2A_GEMINI_API_KEY: &str = "PASS2A_GEMINI_API_KEY";
pub const ENV_PASS2A_PROVIDER: &str = "PASS2A_PROVIDER";
pub const ENV_PASS2A_OPENAI_MODEL: &str = "PASS2A_OPENAI_MODEL";
pub const ENV_PASS2A_GEMINI_MODEL: &str = "PASS2A_GEMINI_MODEL";
pub const ENV_PASS3_PROVIDER: &str = "PASS3_PROVIDER";
pub const ENV_PASS3_GEMINI_MODEL: &str = "PASS3_GEMINI_MODEL";
pub const ENV_ANALYZE_MODEL: &str = "ANALYZE_MODEL";
pub const ENV_STRICT_MODE: &str = "ANALYZE_STRICT_MODE";
pub const ENV_REQUEST_TIMEOUT: &str = "ANALYZE_REQUEST_TIMEOUT";
pub const ENV_DOWNLOAD_TIMEOUT: &str = "ANALYZE_DOWNLOAD_TIMEOUT";
pub const ENV_MAX_IMAGE_BYTES: &str = "ANALYZE_MAX_IMAGE_BYTES";
pub const ENV_PROMPT_FILE_PASS2A: &str = "ANALYZE_PROMPT_FILE_PASS2A";
pub const ENV_PROMPT_FILE_PASS2B: &str = "ANALYZE_PROMPT_FILE_PASS2B";
pub const ENV_PROMPT_FILE_PASS3_INGREDIENTS: &str = "ANALYZE_PROMPT_FILE_PASS3_INGREDIENTS";
pub const ENV_PROMPT_FILE_PASS3_NUTRITION: &str = "ANALYZE_PROMPT_FILE_PASS3_NUTRITION";
pub const ENV_PROMPT_FILE_PASS4: &str = "ANALYZE_PROMPT_FILE_PASS4";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_digit_bounds_ordered() {
        assert!(MIN_REPORT_DIGITS < MAX_REPORT_DIGITS);
        assert!(MAX_REPORT_DIGITS < INTERMEDIATE_MAX_REPORT_DIGITS);
    }

    #[test]
    fn test_retryable_statuses_sorted_and_known() {
        let mut sorted = RETRYABLE_HTTP_STATUS;
        sorted.sort_unstable();
        assert_eq!(sorted, RETRYABLE_HTTP_STATUS);
        assert!(RETRYABLE_HTTP_STATUS.contains(&429));
        assert!(RETRYABLE_HTTP_STATUS.contains(&503));
        assert!(!RETRYABLE_HTTP_STATUS.contains(&404));
    }

    #[test]
    fn test_rate_limit_curve_sane() {
        assert!(RATE_LIMIT_BASE_SECS < RATE_LIMIT_CAP_SECS);
        assert!(RATE_LIMIT_MAX_ATTEMPTS > MODEL_RETRIES);
    }
}
