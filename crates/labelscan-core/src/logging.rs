//! Structured logging field name constants for labelscan.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across the
//! pipeline.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events, analysis completions |
//! | DEBUG | Decision points, gate verdicts, prompt/config choices |
//! | TRACE | Per-chunk download progress, raw model text |

/// Subsystem originating the log event.
/// Values: "fetcher", "inference", "analyzer"
pub const SUBSYSTEM: &str = "subsystem";

/// Pipeline stage name.
/// Values: "pass1", "pass2a", "pass2b", "pass3_ingredients",
/// "pass3_nutrition", "pass4"
pub const STAGE: &str = "stage";

/// Image URL under analysis (truncated by callers where very long).
pub const IMAGE_URL: &str = "image_url";

/// Model name used for a remote call.
pub const MODEL: &str = "model";

/// Provider handling a remote call ("openai" or "gemini").
pub const PROVIDER: &str = "provider";

/// Zero-based retry attempt index.
pub const ATTEMPT: &str = "attempt";

/// Delay in milliseconds before the next retry attempt.
pub const RETRY_DELAY_MS: &str = "retry_delay_ms";

/// Byte length of a downloaded image.
pub const IMAGE_BYTES: &str = "image_bytes";

/// Byte length of a prompt or model response.
pub const RESPONSE_LEN: &str = "response_len";

/// Gate decision value ("READ" or "SKIP").
pub const DECISION: &str = "decision";

/// Number of failed gate checks.
pub const FAIL_COUNT: &str = "fail_count";
