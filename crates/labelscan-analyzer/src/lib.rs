//! # labelscan-analyzer
//!
//! The four-pass gate-and-extract pipeline for Korean food-label photos:
//!
//! 1. **Pass1** — local precheck (format, non-empty bytes, signature match)
//! 2. **Pass2** — two-stage model gate: 2A photo quality, 2B label content
//! 3. **Pass3** — extraction tracks for ingredients and (conditionally)
//!    nutrition facts
//! 4. **Pass4** — local normalization (report-number resolution, allergen
//!    split, plausibility and placeholder screening) plus one structuring
//!    call
//!
//! [`Analyzer`] wires the passes together; each pass is also exposed as its
//! own entry point for partial runs.

pub mod analyzer;
pub mod config;
pub mod pass1;
pub mod pass2;
pub mod pass3;
pub mod pass4;
pub mod prompts;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{Analyzer, StageCallers};
pub use config::AnalyzerConfig;
pub use pass1::{normalize_mime, run_precheck};
pub use pass2::{GateChecks, GateOutcome};
pub use pass3::ExtractOutcome;
pub use pass4::allergen::split_allergen_notice;
pub use pass4::placeholder::{placeholder_reason, FieldKind};
pub use pass4::report_no::resolve_report_no;
pub use pass4::ExtractionStatus;
pub use prompts::PromptSet;
