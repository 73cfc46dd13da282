//! Report-number normalization and disambiguation.
//!
//! The target hint is never an authority override: it only corrects the
//! common OCR failure where adjacent digit runs are concatenated, making the
//! true number a substring of the extraction.

use regex::Regex;
use std::sync::OnceLock;

/// Digits-only normalization, bounded by digit-count.
pub fn normalize_report_no(value: Option<&str>, min_digits: usize, max_digits: usize) -> Option<String> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < min_digits || digits.len() > max_digits {
        return None;
    }
    Some(digits)
}

fn digit_run_re(min_digits: usize, max_digits: usize) -> Option<Regex> {
    Regex::new(&format!(r"\b\d{{{},{}}}\b", min_digits, max_digits)).ok()
}

/// First bare digit run of plausible length in a full-text transcript.
pub fn extract_report_no_from_text(
    text: Option<&str>,
    min_digits: usize,
    max_digits: usize,
) -> Option<String> {
    let text = text?;
    let re = digit_run_re(min_digits, max_digits)?;
    re.find(text).map(|m| m.as_str().to_string())
}

fn corrected_by_target(report_no: &str, target: Option<&str>) -> Option<String> {
    let target = target?;
    if report_no != target && report_no.contains(target) {
        return Some(target.to_string());
    }
    None
}

/// Widened digit ceiling used while correcting OCR concatenation, before the
/// final bounds are applied.
const INTERMEDIATE_MAX_DIGITS: usize = labelscan_core::defaults::INTERMEDIATE_MAX_REPORT_DIGITS;

/// Resolve the final report number from the model's candidate, the full-text
/// transcript, and the optional target hint.
///
/// Containment correction runs twice: once against the model's candidate and
/// again after backfilling from the transcript, so a hint can repair either
/// source. Final acceptance applies the strict digit bounds.
pub fn resolve_report_no(
    model_report_no: Option<&str>,
    full_text: Option<&str>,
    target_report_no: Option<&str>,
    min_digits: usize,
    max_digits: usize,
) -> Option<String> {
    let target_norm = normalize_report_no(target_report_no, min_digits, INTERMEDIATE_MAX_DIGITS);
    let mut report_no = normalize_report_no(model_report_no, min_digits, INTERMEDIATE_MAX_DIGITS);

    if let Some(candidate) = &report_no {
        if let Some(corrected) = corrected_by_target(candidate, target_norm.as_deref()) {
            return Some(corrected);
        }
    }

    if report_no.is_none() {
        report_no = extract_report_no_from_text(full_text, min_digits, max_digits)
            .and_then(|found| normalize_report_no(Some(&found), min_digits, max_digits));
    }

    if let Some(candidate) = &report_no {
        if let Some(corrected) = corrected_by_target(candidate, target_norm.as_deref()) {
            return Some(corrected);
        }
    }

    normalize_report_no(report_no.as_deref(), min_digits, max_digits)
}
