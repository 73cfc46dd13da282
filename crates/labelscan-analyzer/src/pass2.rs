//! Pass2 gate: 2A quality judgment, then 2B content presence.
//!
//! Two chained remote calls decide READ vs SKIP. 2B runs only when 2A found
//! zero quality failures. Every 2A flag the model omits is inferred from a
//! fixed fallback chain; the precedence below is load-bearing and must not
//! be reordered.

use labelscan_core::defaults::GATE_TOTAL_CHECKS;
use labelscan_core::{AnalysisRecord, CallFailure, Decision, QualityFlags, Suitability};
use labelscan_inference::{retry_generic, RetryPolicy, VisionCaller};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Raw 2A model verdict. Both positive and negative phrasings are accepted
/// so the fallback chain can invert whichever the model answered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pass2aVerdict {
    pub is_real_world_photo: Option<bool>,
    pub is_clear_text: Option<bool>,
    pub is_blurry_or_lowres: Option<bool>,
    pub is_full_frame: Option<bool>,
    pub is_cropped_or_partial: Option<bool>,
    pub is_flat_undistorted: Option<bool>,
    pub is_wrinkled_or_distorted: Option<bool>,
    pub has_single_product: Option<bool>,
    pub key_fields_fully_visible: Option<bool>,
    pub no_glare_on_key_fields: Option<bool>,
    pub has_glare_on_key_fields: Option<bool>,
    pub no_object_occlusion_on_key_fields: Option<bool>,
    pub has_object_occlusion_on_key_fields: Option<bool>,
    pub no_any_text_occlusion_on_key_fields: Option<bool>,
    pub no_glare_overlap_on_key_text: Option<bool>,
    pub glare_overlap_on_key_text: Option<bool>,
    pub no_occlusion_overlap_on_key_text: Option<bool>,
    pub occlusion_overlap_on_key_text: Option<bool>,
    pub no_white_circle_overlay_on_key_fields: Option<bool>,
    pub no_wrinkle_fold_occlusion_on_key_fields: Option<bool>,
    pub reason: Option<String>,
}

/// Raw 2B model verdict: presence of required label sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pass2bVerdict {
    pub has_ingredients_section: Option<bool>,
    pub has_report_number_label: Option<bool>,
    pub has_product_name: Option<bool>,
    pub has_nutrition_section: Option<bool>,
    pub reason: Option<String>,
}

/// Fully resolved 2A checks after fallback inference. All fields except the
/// informational `is_real_world_photo` participate in the fail-code list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateChecks {
    pub is_real_world_photo: Option<bool>,
    pub is_clear_text: bool,
    pub is_full_frame: bool,
    pub is_flat_undistorted: bool,
    pub has_single_product: bool,
    pub key_fields_fully_visible: bool,
    pub no_glare_on_key_fields: bool,
    pub no_object_occlusion_on_key_fields: bool,
    pub no_any_text_occlusion_on_key_fields: bool,
    pub no_glare_overlap_on_key_text: bool,
    pub no_occlusion_overlap_on_key_text: bool,
    pub no_white_circle_overlay_on_key_fields: bool,
    pub no_wrinkle_fold_occlusion_on_key_fields: bool,
}

impl Pass2aVerdict {
    /// Resolve every omitted flag through the fallback chain:
    /// - direct positive answer wins;
    /// - otherwise the negated counterpart flag, when answered;
    /// - otherwise a conservative inference from the related resolved check.
    pub fn resolve(&self) -> GateChecks {
        let is_clear_text = self
            .is_clear_text
            .unwrap_or_else(|| !self.is_blurry_or_lowres.unwrap_or(false));
        let is_full_frame = self
            .is_full_frame
            .unwrap_or_else(|| !self.is_cropped_or_partial.unwrap_or(false));
        let is_flat_undistorted = self
            .is_flat_undistorted
            .unwrap_or_else(|| !self.is_wrinkled_or_distorted.unwrap_or(false));
        let has_single_product = self.has_single_product.unwrap_or(false);
        let key_fields_fully_visible = self.key_fields_fully_visible.unwrap_or(is_full_frame);

        let no_glare_on_key_fields = self.no_glare_on_key_fields.unwrap_or_else(|| {
            match self.has_glare_on_key_fields {
                Some(has) => !has,
                None => is_clear_text,
            }
        });
        let no_object_occlusion_on_key_fields =
            self.no_object_occlusion_on_key_fields.unwrap_or_else(|| {
                match self.has_object_occlusion_on_key_fields {
                    Some(has) => !has,
                    None => key_fields_fully_visible,
                }
            });
        // Omitted: true only when every related occlusion flag held.
        let no_any_text_occlusion_on_key_fields = self
            .no_any_text_occlusion_on_key_fields
            .unwrap_or(no_object_occlusion_on_key_fields && key_fields_fully_visible);
        let no_glare_overlap_on_key_text = self.no_glare_overlap_on_key_text.unwrap_or_else(|| {
            match self.glare_overlap_on_key_text {
                Some(overlap) => !overlap,
                None => no_glare_on_key_fields,
            }
        });
        let no_occlusion_overlap_on_key_text =
            self.no_occlusion_overlap_on_key_text.unwrap_or_else(|| {
                match self.occlusion_overlap_on_key_text {
                    Some(overlap) => !overlap,
                    None => no_object_occlusion_on_key_fields,
                }
            });
        let no_white_circle_overlay_on_key_fields = self
            .no_white_circle_overlay_on_key_fields
            .unwrap_or(no_object_occlusion_on_key_fields);
        let no_wrinkle_fold_occlusion_on_key_fields = self
            .no_wrinkle_fold_occlusion_on_key_fields
            .unwrap_or(is_flat_undistorted && key_fields_fully_visible);

        GateChecks {
            is_real_world_photo: self.is_real_world_photo,
            is_clear_text,
            is_full_frame,
            is_flat_undistorted,
            has_single_product,
            key_fields_fully_visible,
            no_glare_on_key_fields,
            no_object_occlusion_on_key_fields,
            no_any_text_occlusion_on_key_fields,
            no_glare_overlap_on_key_text,
            no_occlusion_overlap_on_key_text,
            no_white_circle_overlay_on_key_fields,
            no_wrinkle_fold_occlusion_on_key_fields,
        }
    }
}

impl GateChecks {
    /// Reason codes for every failed check, in a fixed report order.
    pub fn fail_codes(&self) -> Vec<&'static str> {
        let mut codes = Vec::new();
        if !self.is_clear_text {
            codes.push("not_clear_text");
        }
        if !self.is_full_frame {
            codes.push("not_full_frame");
        }
        if !self.is_flat_undistorted {
            codes.push("not_flat_undistorted");
        }
        if !self.has_single_product {
            codes.push("not_single_product");
        }
        if !self.key_fields_fully_visible {
            codes.push("key_fields_not_fully_visible");
        }
        if !self.no_glare_on_key_fields {
            codes.push("glare_on_key_fields");
        }
        if !self.no_object_occlusion_on_key_fields {
            codes.push("object_occlusion_on_key_fields");
        }
        if !self.no_any_text_occlusion_on_key_fields {
            codes.push("any_text_occlusion_on_key_fields");
        }
        if !self.no_glare_overlap_on_key_text {
            codes.push("glare_overlap_on_key_text");
        }
        if !self.no_occlusion_overlap_on_key_text {
            codes.push("occlusion_overlap_on_key_text");
        }
        if !self.no_white_circle_overlay_on_key_fields {
            codes.push("white_circle_overlay_on_key_fields");
        }
        if !self.no_wrinkle_fold_occlusion_on_key_fields {
            codes.push("wrinkle_fold_occlusion_on_key_fields");
        }
        codes
    }

    pub fn all_passed(&self) -> bool {
        self.fail_codes().is_empty()
    }
}

/// Terminal result of the gate pass.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: Decision,
    pub suitability: Suitability,
    pub note: String,
    pub quality_score: u32,
    pub quality_fail_reasons: Vec<String>,
    pub checks: GateChecks,
    pub has_ingredients_section: bool,
    pub has_report_label: bool,
    pub has_product_name: bool,
    pub has_nutrition_section: bool,
    pub pass2a_ok: bool,
    pub pass2b_executed: bool,
    pub confidence: u32,
    pub decision_reason: String,
    /// Both raw model texts, concatenated under labeled section headers.
    pub raw_model_text: String,
    pub source_model_pass2a: String,
    pub source_model_pass2b: String,
}

impl GateOutcome {
    /// Fold the gate outcome into the uniform record shape, with every
    /// extraction-derived field empty.
    pub fn to_record(&self, source_model: &str) -> AnalysisRecord {
        let mut record = AnalysisRecord::skip(source_model);
        record.note = if self.note.is_empty() {
            "pass2(2a+2b)".to_string()
        } else {
            self.note.clone()
        };
        record.has_report_label = self.has_report_label;
        record.has_ingredients = self.has_ingredients_section;
        record.quality_gate_pass = self.decision.is_read();
        record.quality_score = self.quality_score;
        record.quality_fail_reasons = self.quality_fail_reasons.clone();
        record.quality_flags = QualityFlags {
            is_real_world_photo: self.checks.is_real_world_photo,
            is_blurry_or_lowres: Some(!self.checks.is_clear_text),
            is_wrinkled_or_distorted: Some(!self.checks.is_flat_undistorted),
            is_cropped_or_partial: Some(!self.checks.is_full_frame),
            ..QualityFlags::default()
        };
        record.ai_decision = self.decision;
        record.ai_suitability = self.suitability;
        record.ai_decision_confidence = self.confidence;
        record.ai_decision_reason = self.decision_reason.clone();
        record.raw_model_text = Some(self.raw_model_text.clone());
        record.raw_model_text_pass2 = Some(self.raw_model_text.clone());
        record
    }
}

fn parse_verdict<T: serde::de::DeserializeOwned>(
    parsed: &Value,
    raw_text: &str,
    model: &str,
) -> std::result::Result<T, CallFailure> {
    serde_json::from_value(parsed.clone()).map_err(|e| {
        CallFailure::new(format!("malformed gate verdict: {}", e), model)
            .with_raw_text(Some(raw_text.to_string()))
    })
}

/// Run the two-stage gate against already-fetched image bytes.
pub(crate) async fn run_gate(
    pass2a: &dyn VisionCaller,
    pass2b: &dyn VisionCaller,
    retry: &RetryPolicy,
    image: &[u8],
    mime_type: &str,
    prompt_pass2a: &str,
    prompt_pass2b: &str,
) -> std::result::Result<GateOutcome, CallFailure> {
    let reply_2a = retry_generic(retry, || pass2a.call(image, mime_type, prompt_pass2a))
        .await
        .map_err(|e| CallFailure::new(e.to_string(), pass2a.model_name()))?;
    let verdict_2a: Pass2aVerdict =
        parse_verdict(&reply_2a.parsed, &reply_2a.raw_text, pass2a.model_name())?;
    let checks = verdict_2a.resolve();

    let mut fail_checks: Vec<String> =
        checks.fail_codes().into_iter().map(str::to_string).collect();
    let pass2a_ok = fail_checks.is_empty();

    let mut verdict_2b = Pass2bVerdict::default();
    let mut raw_text_2b: Option<String> = None;
    if pass2a_ok {
        let reply_2b = retry_generic(retry, || pass2b.call(image, mime_type, prompt_pass2b))
            .await
            .map_err(|e| {
                CallFailure::new(e.to_string(), pass2b.model_name())
                    .with_raw_text(Some(reply_2a.raw_text.clone()))
            })?;
        verdict_2b =
            parse_verdict(&reply_2b.parsed, &reply_2b.raw_text, pass2b.model_name())?;
        raw_text_2b = Some(reply_2b.raw_text);
    } else {
        fail_checks.push("pass2b_skipped_by_pass2a_fail".to_string());
    }

    let has_ingredients = pass2a_ok && verdict_2b.has_ingredients_section.unwrap_or(false);
    let has_report_label = pass2a_ok && verdict_2b.has_report_number_label.unwrap_or(false);
    let has_product_name = pass2a_ok && verdict_2b.has_product_name.unwrap_or(false);
    let has_nutrition = pass2a_ok && verdict_2b.has_nutrition_section.unwrap_or(false);

    if pass2a_ok && !has_ingredients {
        fail_checks.push("missing_ingredients_section".to_string());
    }
    if pass2a_ok && !has_report_label {
        fail_checks.push("missing_report_label".to_string());
    }
    if pass2a_ok && !has_product_name {
        fail_checks.push("missing_product_name".to_string());
    }

    let decision = if fail_checks.is_empty() {
        Decision::Read
    } else {
        Decision::Skip
    };
    let suitability = if decision.is_read() {
        Suitability::Suitable
    } else {
        Suitability::Unsuitable
    };

    let counted_fails = fail_checks
        .iter()
        .filter(|c| c.as_str() != "pass2b_skipped_by_pass2a_fail")
        .count() as u32;
    let passed_checks = GATE_TOTAL_CHECKS.saturating_sub(counted_fails);
    let quality_score = (passed_checks * 100 / GATE_TOTAL_CHECKS).min(100);

    let reason_a = verdict_2a.reason.as_deref().unwrap_or("").trim().to_string();
    let reason_b = if pass2a_ok {
        verdict_2b.reason.as_deref().unwrap_or("").trim().to_string()
    } else {
        "pass2b_skipped_by_pass2a_fail".to_string()
    };
    let mut decision_reason = [reason_a, reason_b]
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    if !fail_checks.is_empty() {
        let rule_reason = fail_checks.join(",");
        decision_reason = if decision_reason.is_empty() {
            rule_reason
        } else {
            format!("{} | {}", rule_reason, decision_reason)
        };
    } else if decision_reason.is_empty() {
        decision_reason = "all_checks_passed".to_string();
    }

    let mut quality_fail_reasons = fail_checks;
    if !decision.is_read() {
        let skip_reason = if decision_reason.is_empty() {
            "pass2_skip"
        } else {
            decision_reason.as_str()
        };
        quality_fail_reasons.push(format!("ai_skip:{}", skip_reason));
    }

    let raw_model_text = format!(
        "[PASS2-A]\n{}\n\n[PASS2-B]\n{}",
        reply_2a.raw_text,
        raw_text_2b.as_deref().unwrap_or("(skipped_by_pass2a_fail)")
    )
    .trim()
    .to_string();

    info!(
        decision = %if decision.is_read() { "READ" } else { "SKIP" },
        quality_score,
        fail_count = quality_fail_reasons.len(),
        "pass2 gate decided"
    );

    Ok(GateOutcome {
        decision,
        suitability,
        note: decision_reason.clone(),
        quality_score,
        quality_fail_reasons,
        checks,
        has_ingredients_section: has_ingredients,
        has_report_label,
        has_product_name,
        has_nutrition_section: has_nutrition,
        pass2a_ok,
        pass2b_executed: pass2a_ok,
        confidence: 100,
        decision_reason,
        raw_model_text,
        source_model_pass2a: pass2a.model_name().to_string(),
        source_model_pass2b: pass2b.model_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCaller;
    use serde_json::json;

    fn all_true_2a() -> Value {
        json!({
            "is_real_world_photo": true,
            "is_clear_text": true,
            "is_full_frame": true,
            "is_flat_undistorted": true,
            "has_single_product": true,
            "key_fields_fully_visible": true,
            "no_glare_on_key_fields": true,
            "no_object_occlusion_on_key_fields": true,
            "no_any_text_occlusion_on_key_fields": true,
            "no_glare_overlap_on_key_text": true,
            "no_occlusion_overlap_on_key_text": true,
            "no_white_circle_overlay_on_key_fields": true,
            "no_wrinkle_fold_occlusion_on_key_fields": true,
            "reason": "clean"
        })
    }

    fn all_present_2b() -> Value {
        json!({
            "has_ingredients_section": true,
            "has_report_number_label": true,
            "has_product_name": true,
            "has_nutrition_section": true,
            "reason": "all sections present"
        })
    }

    fn verdict(value: Value) -> Pass2aVerdict {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fallback_clear_text_from_negated_flag() {
        let checks = verdict(json!({"is_blurry_or_lowres": true})).resolve();
        assert!(!checks.is_clear_text);
        let checks = verdict(json!({"is_blurry_or_lowres": false})).resolve();
        assert!(checks.is_clear_text);
    }

    #[test]
    fn test_fallback_glare_prefers_negated_counterpart_over_clear_text() {
        let checks = verdict(json!({"is_clear_text": true, "has_glare_on_key_fields": true}))
            .resolve();
        assert!(!checks.no_glare_on_key_fields);
        // Without the counterpart, falls back to is_clear_text.
        let checks = verdict(json!({"is_clear_text": true})).resolve();
        assert!(checks.no_glare_on_key_fields);
    }

    #[test]
    fn test_fallback_key_fields_from_full_frame() {
        let checks = verdict(json!({"is_full_frame": false})).resolve();
        assert!(!checks.key_fields_fully_visible);
        assert!(!checks.no_object_occlusion_on_key_fields);
    }

    #[test]
    fn test_fallback_text_occlusion_requires_both_parents() {
        let checks = verdict(json!({
            "key_fields_fully_visible": true,
            "no_object_occlusion_on_key_fields": false
        }))
        .resolve();
        assert!(!checks.no_any_text_occlusion_on_key_fields);
        assert!(!checks.no_white_circle_overlay_on_key_fields);
    }

    #[test]
    fn test_fallback_wrinkle_from_flat_and_visible() {
        let checks = verdict(json!({
            "is_flat_undistorted": true,
            "key_fields_fully_visible": false,
            "has_single_product": true
        }))
        .resolve();
        assert!(!checks.no_wrinkle_fold_occlusion_on_key_fields);
    }

    #[test]
    fn test_fail_codes_order_and_names() {
        let checks = verdict(json!({})).resolve();
        // Empty verdict: clear/frame/flat resolve true via negated-flag
        // fallback, single-product defaults false.
        assert_eq!(checks.fail_codes(), vec!["not_single_product"]);
    }

    #[tokio::test]
    async fn test_gate_reads_when_all_checks_pass() {
        let caller = ScriptedCaller::new("gate-model", vec![all_true_2a(), all_present_2b()]);
        let outcome = run_gate(
            &caller,
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "p2a",
            "p2b",
        )
        .await
        .unwrap();
        assert_eq!(outcome.decision, Decision::Read);
        assert_eq!(outcome.suitability, Suitability::Suitable);
        assert_eq!(outcome.quality_score, 100);
        assert!(outcome.quality_fail_reasons.is_empty());
        assert!(outcome.has_nutrition_section);
        assert!(outcome.pass2b_executed);
        assert_eq!(outcome.decision_reason, "clean | all sections present");
        assert!(outcome.raw_model_text.starts_with("[PASS2-A]"));
        assert!(outcome.raw_model_text.contains("[PASS2-B]"));
        assert_eq!(caller.calls(), 2);
    }

    #[tokio::test]
    async fn test_gate_skips_2b_when_2a_fails() {
        let mut bad_2a = all_true_2a();
        bad_2a["is_clear_text"] = json!(false);
        let caller = ScriptedCaller::new("gate-model", vec![bad_2a]);
        let outcome = run_gate(
            &caller,
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "p2a",
            "p2b",
        )
        .await
        .unwrap();
        assert_eq!(outcome.decision, Decision::Skip);
        assert!(!outcome.pass2b_executed);
        // Only one remote call: 2B never ran.
        assert_eq!(caller.calls(), 1);
        assert!(outcome
            .quality_fail_reasons
            .contains(&"pass2b_skipped_by_pass2a_fail".to_string()));
        assert!(outcome
            .quality_fail_reasons
            .iter()
            .any(|r| r.starts_with("ai_skip:")));
        // Only not_clear_text counts; the skip marker is excluded from the
        // denominator contribution.
        assert_eq!(outcome.quality_score, 14 * 100 / 15);
        assert!(outcome.raw_model_text.contains("(skipped_by_pass2a_fail)"));
    }

    #[tokio::test]
    async fn test_gate_skips_on_missing_required_sections() {
        let mut partial_2b = all_present_2b();
        partial_2b["has_ingredients_section"] = json!(false);
        partial_2b["has_nutrition_section"] = json!(false);
        let caller = ScriptedCaller::new("gate-model", vec![all_true_2a(), partial_2b]);
        let outcome = run_gate(
            &caller,
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "p2a",
            "p2b",
        )
        .await
        .unwrap();
        assert_eq!(outcome.decision, Decision::Skip);
        assert!(outcome
            .quality_fail_reasons
            .contains(&"missing_ingredients_section".to_string()));
        assert!(!outcome.has_nutrition_section);
        assert!(outcome.has_report_label);
        assert_eq!(outcome.quality_score, 14 * 100 / 15);
    }

    #[tokio::test]
    async fn test_gate_call_failure_surfaces_model_name() {
        let caller = ScriptedCaller::failing("gate-model", "openai_http_401: bad key");
        let failure = run_gate(
            &caller,
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "p2a",
            "p2b",
        )
        .await
        .unwrap_err();
        assert!(failure.error.contains("openai_http_401"));
        assert_eq!(failure.source_model, "gate-model");
    }

    #[test]
    fn test_gate_outcome_to_record() {
        let checks = verdict(all_true_2a()).resolve();
        let outcome = GateOutcome {
            decision: Decision::Read,
            suitability: Suitability::Suitable,
            note: "all_checks_passed".to_string(),
            quality_score: 100,
            quality_fail_reasons: vec![],
            checks,
            has_ingredients_section: true,
            has_report_label: true,
            has_product_name: true,
            has_nutrition_section: false,
            pass2a_ok: true,
            pass2b_executed: true,
            confidence: 100,
            decision_reason: "all_checks_passed".to_string(),
            raw_model_text: "[PASS2-A]\nx\n\n[PASS2-B]\ny".to_string(),
            source_model_pass2a: "a".to_string(),
            source_model_pass2b: "b".to_string(),
        };
        let record = outcome.to_record("gpt-4.1-mini");
        assert!(record.quality_gate_pass);
        assert!(record.has_ingredients);
        assert_eq!(record.quality_flags.is_blurry_or_lowres, Some(false));
        assert_eq!(record.raw_model_text_pass2, Some(outcome.raw_model_text));
        assert!(record.report_no.is_none());
    }
}
