//! Pass1 precheck: local format/integrity validation, no remote call.

use labelscan_core::{
    AnalysisRecord, Decision, ImageFormat, PrecheckInfo, ReportNumberValidation, Suitability,
};
use tracing::debug;

/// Normalize a declared MIME type (`image/jpg` becomes `image/jpeg`).
pub fn normalize_mime(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    if lowered == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        lowered
    }
}

/// Validate image bytes against their declared MIME type.
///
/// Checks, in order: the MIME is one of the four supported formats, the byte
/// buffer is non-empty, and the byte signature matches the declared type.
/// Failure produces a terminal SKIP record listing every failed check as a
/// `precheck:<reason>` code; success produces an immediate READ pass-through
/// record. This stage never invokes the model.
pub fn run_precheck(
    image_bytes: &[u8],
    mime_type: &str,
    image_url: Option<&str>,
    source_model: &str,
) -> AnalysisRecord {
    let normalized = normalize_mime(mime_type);
    let mut reasons: Vec<String> = Vec::new();

    let format = ImageFormat::from_mime(&normalized);
    if format.is_none() {
        let shown = if normalized.is_empty() { "unknown" } else { &normalized };
        reasons.push(format!("unsupported_image_format:{}", shown));
    }
    if image_bytes.is_empty() {
        reasons.push("empty_image_bytes".to_string());
    }
    if reasons.is_empty() {
        if let Some(format) = format {
            if !format.matches_signature(image_bytes) {
                reasons.push("mime_signature_mismatch".to_string());
            }
        }
    }

    if reasons.is_empty() {
        debug!(mime_type = %normalized, image_bytes = image_bytes.len(), "precheck passed");
        let mut record = AnalysisRecord::skip(source_model);
        record.quality_gate_pass = true;
        record.ai_decision = Decision::Read;
        record.ai_suitability = Suitability::Suitable;
        record.ai_decision_confidence = 100;
        record.ai_decision_reason = "precheck_ok".to_string();
        record.raw_model_text = Some("precheck_ok".to_string());
        record.precheck = Some(PrecheckInfo {
            precheck_pass: true,
            precheck_reason: "ok".to_string(),
            precheck_mime_type: normalized,
        });
        return record;
    }

    let mut reason = reasons.join(",");
    if let Some(url) = image_url {
        reason = format!("{} | url={}", reason, url);
    }
    debug!(mime_type = %normalized, reason = %reason, "precheck failed");

    let mut record = AnalysisRecord::skip(source_model);
    record.note = format!("precheck_skip: {}", reason);
    record.quality_fail_reasons = reasons.iter().map(|r| format!("precheck:{}", r)).collect();
    record.ai_decision_confidence = 100;
    record.ai_decision_reason = reason.clone();
    record.raw_model_text = Some(reason.clone());
    record.report_number_validation = ReportNumberValidation::skipped("precheck_failed");
    record.precheck = Some(PrecheckInfo {
        precheck_pass: false,
        precheck_reason: reason,
        precheck_mime_type: normalized,
    });
    record
}
