//! Pass4 normalize & structure: local text cleaning, the report-number
//! acceptance gate, and the optional structuring call.

pub mod allergen;
pub mod placeholder;
pub mod report_no;

use crate::pass2::GateOutcome;
use crate::pass3::ExtractOutcome;
use crate::prompts::PromptSet;
use labelscan_core::{
    defaults, AnalysisRecord, CallFailure, Decision, IngredientItem, NutritionItem, QualityFlags,
    ReportNumberValidation, Suitability,
};
use labelscan_inference::VisionCaller;
use placeholder::FieldKind;
use serde_json::Value;
use tracing::{info, warn};

/// How pass3 ended, from pass4's point of view.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionStatus<'a> {
    /// Pass3 never ran (gate returned SKIP).
    Skipped,
    /// Pass3 exhausted its retries or hit a terminal call error.
    Failed(&'a CallFailure),
    Extracted(&'a ExtractOutcome),
}

pub(crate) struct NormalizeSettings<'a> {
    pub strict_mode: bool,
    pub min_report_digits: usize,
    pub max_report_digits: usize,
    /// Model name reported on the final record.
    pub source_model: &'a str,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Minimal plausibility check for an ingredients enumeration: long enough,
/// and either separator-delimited or keyword-bearing.
fn looks_like_ingredients_text(text: &str) -> bool {
    let value = text.trim();
    if value.chars().count() < defaults::MIN_INGREDIENTS_LEN {
        return false;
    }
    let has_separator = value.contains([',', '·', '/', '，']);
    let lower = value.to_lowercase();
    let has_keyword = ["원재료", "ingredients", "함량"]
        .iter()
        .any(|kw| lower.contains(kw));
    has_separator || has_keyword
}

fn looks_like_nutrition_text(text: &str) -> bool {
    let value = text.trim().to_lowercase();
    if value.chars().count() < defaults::MIN_NUTRITION_LEN {
        return false;
    }
    [
        "영양성분", "영양정보", "나트륨", "탄수화물", "단백질", "지방", "calories", "nutrition",
    ]
    .iter()
    .any(|kw| value.contains(kw))
}

fn opt_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => trimmed(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_ingredient_items(value: &Value) -> Vec<IngredientItem> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(parse_ingredient_item).collect())
        .unwrap_or_default()
}

fn parse_ingredient_item(item: &Value) -> Option<IngredientItem> {
    let obj = item.as_object()?;
    Some(IngredientItem {
        ingredient_name: obj.get("ingredient_name").and_then(opt_str),
        origin: obj.get("origin").and_then(opt_str),
        origin_detail: obj.get("origin_detail").and_then(opt_str),
        amount: obj.get("amount").and_then(opt_str),
        sub_ingredients: obj
            .get("sub_ingredients")
            .map(parse_ingredient_items)
            .unwrap_or_default(),
    })
}

fn parse_nutrition_items(value: &Value) -> Vec<NutritionItem> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            Some(NutritionItem {
                name: obj.get("name").and_then(opt_str),
                value: obj.get("value").and_then(opt_str),
                unit: obj.get("unit").and_then(opt_str),
                daily_value: obj.get("daily_value").and_then(opt_str),
            })
        })
        .collect()
}

fn skip_record(gate: &GateOutcome, settings: &NormalizeSettings<'_>) -> AnalysisRecord {
    let mut record = gate.to_record(settings.source_model);
    if record.note.is_empty() {
        record.note = "pass2_skip".to_string();
    }
    if record.ai_decision_reason.is_empty() {
        record.ai_decision_reason = "pass2_skip".to_string();
    }
    record.ingredient_items_reason = Some("pass2_skip".to_string());
    record.report_number_validation = ReportNumberValidation::skipped("pass2_skip");
    record
}

fn extraction_failure_record(
    gate: &GateOutcome,
    failure: &CallFailure,
    _settings: &NormalizeSettings<'_>,
) -> AnalysisRecord {
    let mut record = AnalysisRecord::from_call_failure(failure);
    record.raw_model_text_pass2 = Some(gate.raw_model_text.clone());
    record.raw_model_text_pass3 = failure.last_raw_text.clone();
    record.ingredient_items_reason = Some("pass3_error".to_string());
    record.report_number_validation =
        ReportNumberValidation::skipped(&format!("pass3_error:{}", failure.error));
    record
}

/// Normalize the extraction into the final record and, when the required
/// fields all survived cleaning, run the structuring call.
pub(crate) async fn run_normalize(
    structuring: &dyn VisionCaller,
    prompts: &PromptSet,
    settings: &NormalizeSettings<'_>,
    gate: &GateOutcome,
    extraction: ExtractionStatus<'_>,
    target_report_no: Option<&str>,
) -> AnalysisRecord {
    if !gate.decision.is_read() {
        return skip_record(gate, settings);
    }
    let extract = match extraction {
        ExtractionStatus::Skipped => {
            // READ gate but no extraction supplied; report it like a failed call.
            let failure = CallFailure::new("pass3_missing", settings.source_model);
            return extraction_failure_record(gate, &failure, settings);
        }
        ExtractionStatus::Failed(failure) => {
            return extraction_failure_record(gate, failure, settings);
        }
        ExtractionStatus::Extracted(extract) => extract,
    };

    let mut quality_fail_reasons = gate.quality_fail_reasons.clone();
    let mut decision_reason = gate.decision_reason.clone();
    let mut suitability = gate.suitability;

    let mut report_no = report_no::resolve_report_no(
        extract.report_no_raw.as_deref(),
        extract.full_text.as_deref(),
        target_report_no,
        settings.min_report_digits,
        settings.max_report_digits,
    );
    if let Some(digits) = &report_no {
        if placeholder::is_repeated_digit_run(digits) {
            quality_fail_reasons.push("report_number_repeated_digit".to_string());
            report_no = None;
        }
    }

    let raw_ingredients = trimmed(extract.ingredients_text.as_deref());
    let (mut ingredients_text, extracted_allergen) =
        allergen::split_allergen_notice(raw_ingredients.as_deref());
    let mut allergen_text = match (trimmed(extract.allergen_text.as_deref()), extracted_allergen) {
        (None, extracted) => extracted,
        (Some(reported), Some(extracted)) if !reported.contains(&extracted) => {
            Some(format!("{} | {}", reported, extracted))
        }
        (Some(reported), _) => Some(reported),
    };
    let mut product_name = trimmed(extract.product_name_in_image.as_deref());
    let mut nutrition_text = trimmed(extract.nutrition_text.as_deref());

    if !ingredients_text.as_deref().is_some_and(looks_like_ingredients_text) {
        ingredients_text = None;
    }
    if !nutrition_text.as_deref().is_some_and(looks_like_nutrition_text) {
        nutrition_text = None;
    }

    // Placeholder screening nulls a field and records why.
    for (field, kind) in [
        (&mut ingredients_text, FieldKind::Ingredients),
        (&mut product_name, FieldKind::ProductName),
        (&mut nutrition_text, FieldKind::Nutrition),
    ] {
        if let Some(text) = field.as_deref() {
            if let Some(reason) = placeholder::placeholder_reason(kind, text) {
                warn!(reason = %reason, "field rejected as placeholder text");
                quality_fail_reasons.push(reason);
                *field = None;
            }
        }
    }

    let mut ingredients_complete = extract.ingredients_complete && ingredients_text.is_some();
    let mut report_complete = extract.report_number_complete && report_no.is_some();
    let mut product_complete = extract.product_name_complete && product_name.is_some();
    let mut nutrition_complete = extract.nutrition_complete && nutrition_text.is_some();

    let mut quality_gate_pass = true;
    if report_no.is_none() {
        quality_gate_pass = false;
        suitability = Suitability::Unsuitable;
        decision_reason = if decision_reason.is_empty() {
            "missing_report_number".to_string()
        } else {
            format!("{} | missing_report_number", decision_reason)
        };
        quality_fail_reasons.push("missing_report_number".to_string());
    }

    if settings.strict_mode && !quality_gate_pass {
        // No partial record without its primary key.
        report_no = None;
        ingredients_text = None;
        allergen_text = None;
        product_name = None;
        nutrition_text = None;
        ingredients_complete = false;
        report_complete = false;
        product_complete = false;
        nutrition_complete = false;
    }

    let report_number_validation = match &report_no {
        None => ReportNumberValidation::skipped("missing_report_number"),
        Some(digits)
            if digits.len() >= settings.min_report_digits
                && digits.len() <= settings.max_report_digits =>
        {
            ReportNumberValidation {
                is_valid: true,
                normalized_report_number: Some(digits.clone()),
                reason: "valid_report_number_format".to_string(),
            }
        }
        Some(digits) => ReportNumberValidation {
            is_valid: false,
            normalized_report_number: Some(digits.clone()),
            reason: "invalid_report_number_format".to_string(),
        },
    };

    let mut ingredient_items: Vec<IngredientItem> = Vec::new();
    let mut nutrition_items: Vec<NutritionItem> = Vec::new();
    let mut raw_model_text_pass4: Option<String> = None;
    let mut structuring_error: Option<String> = None;
    let ingredient_items_reason;
    match (&report_no, &ingredients_text, &product_name) {
        (Some(_), Some(ingredients), Some(_)) => {
            let prompt = prompts.build_pass4(ingredients, nutrition_text.as_deref());
            match structuring.call_text(&prompt).await {
                Ok(reply) => {
                    ingredient_items = parse_ingredient_items(&reply.parsed["ingredients_items"]);
                    nutrition_items = parse_nutrition_items(&reply.parsed["nutrition_items"]);
                    ingredient_items_reason = opt_str(&reply.parsed["reason"])
                        .unwrap_or_else(|| "pass4_structured".to_string());
                    raw_model_text_pass4 = Some(reply.raw_text);
                }
                Err(e) => {
                    // Flat fields stay accepted; only the structured lists
                    // are lost.
                    warn!(error = %e, "structuring call failed");
                    structuring_error = Some(e.to_string());
                    ingredient_items_reason = format!("pass4_structuring_failed:{}", e);
                }
            }
        }
        _ => {
            ingredient_items_reason = "pass4_skipped_missing_required_fields".to_string();
        }
    }

    info!(
        quality_gate_pass,
        has_report_no = report_no.is_some(),
        structured_items = ingredient_items.len(),
        "pass4 normalization finished"
    );

    let mut record = AnalysisRecord::skip(settings.source_model);
    record.report_no = report_no;
    record.ingredients_text = ingredients_text;
    record.allergen_text = allergen_text;
    record.nutrition_text = nutrition_text;
    record.product_name_in_image = product_name;
    record.full_text = extract.full_text.clone();
    record.note = extract.note.clone();
    record.has_report_label = extract.has_report_label;
    record.has_ingredients = record.ingredients_text.is_some();
    record.quality_gate_pass = quality_gate_pass;
    record.quality_score = gate.quality_score;
    record.quality_fail_reasons = quality_fail_reasons;
    record.quality_flags = QualityFlags {
        is_real_world_photo: gate.checks.is_real_world_photo,
        is_blurry_or_lowres: Some(!gate.checks.is_clear_text),
        is_wrinkled_or_distorted: Some(!gate.checks.is_flat_undistorted),
        is_cropped_or_partial: Some(!gate.checks.is_full_frame),
        ingredients_complete,
        report_number_complete: report_complete,
        product_name_complete: product_complete,
        nutrition_complete,
    };
    record.ai_decision = if quality_gate_pass {
        Decision::Read
    } else {
        Decision::Skip
    };
    record.ai_suitability = suitability;
    record.ai_decision_confidence = gate.confidence;
    record.ai_decision_reason = decision_reason;
    record.raw_model_text = Some(extract.raw_model_text.clone());
    record.raw_model_text_pass2 = Some(gate.raw_model_text.clone());
    record.raw_model_text_pass3 = Some(extract.raw_model_text.clone());
    record.raw_model_text_pass4 = raw_model_text_pass4;
    record.ingredient_items = ingredient_items;
    record.ingredient_items_reason = Some(ingredient_items_reason);
    record.nutrition_items = nutrition_items;
    record.report_number_validation = report_number_validation;
    record.structuring_error = structuring_error;
    record
}
