//! Pass3 extract: ingredients track always, nutrition track when the gate
//! found a nutrition table.
//!
//! This is the highest-volume, most quota-sensitive stage, so both tracks
//! run under the dedicated rate-limit retry curve. An ingredients failure
//! fails the whole pass; a nutrition failure after a successful ingredients
//! read only downgrades the nutrition fields.

use labelscan_core::CallFailure;
use labelscan_inference::{retry_rate_limited, RetryPolicy, VisionCaller};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

/// Accepts a string or a bare number for fields the model sometimes emits
/// unquoted (report numbers in particular).
fn de_stringlike<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => {
            let trimmed = s.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Raw ingredients-track model output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct IngredientsReading {
    #[serde(deserialize_with = "de_stringlike")]
    product_report_number: Option<String>,
    ingredients_text: Option<String>,
    allergen_text: Option<String>,
    product_name_in_image: Option<String>,
    full_text: Option<String>,
    has_report_label: Option<bool>,
    ingredients_complete: Option<bool>,
    report_number_complete: Option<bool>,
    product_name_complete: Option<bool>,
    reason: Option<String>,
}

/// Raw nutrition-track model output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct NutritionReading {
    nutrition_text: Option<String>,
    nutrition_complete: Option<bool>,
    full_text: Option<String>,
    reason: Option<String>,
}

/// Terminal result of the extraction pass: raw field candidates plus
/// per-field completeness, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub note: String,
    pub report_no_raw: Option<String>,
    pub ingredients_text: Option<String>,
    pub allergen_text: Option<String>,
    pub nutrition_text: Option<String>,
    pub product_name_in_image: Option<String>,
    pub full_text: Option<String>,
    pub has_report_label: bool,
    pub ingredients_complete: bool,
    pub report_number_complete: bool,
    pub product_name_complete: bool,
    pub nutrition_complete: bool,
    /// Both raw track texts under labeled section headers; the nutrition
    /// section is an explicit skip or error marker when it did not run.
    pub raw_model_text: String,
    pub source_model: String,
}

fn parse_reading<T: serde::de::DeserializeOwned>(
    parsed: &Value,
    raw_text: &str,
    model: &str,
) -> std::result::Result<T, CallFailure> {
    serde_json::from_value(parsed.clone()).map_err(|e| {
        CallFailure::new(format!("malformed extraction output: {}", e), model)
            .with_raw_text(Some(raw_text.to_string()))
    })
}

/// Run the extraction tracks against already-fetched image bytes.
/// `prompt_nutrition` is `None` when the gate saw no nutrition section.
pub(crate) async fn run_extract(
    pass3: &dyn VisionCaller,
    retry: &RetryPolicy,
    image: &[u8],
    mime_type: &str,
    prompt_ingredients: &str,
    prompt_nutrition: Option<&str>,
) -> std::result::Result<ExtractOutcome, CallFailure> {
    let reply_ing = retry_rate_limited(retry, || pass3.call(image, mime_type, prompt_ingredients))
        .await
        .map_err(|e| CallFailure::new(e.to_string(), pass3.model_name()))?;
    let ing: IngredientsReading =
        parse_reading(&reply_ing.parsed, &reply_ing.raw_text, pass3.model_name())?;

    let mut nut = NutritionReading::default();
    let nutrition_section = match prompt_nutrition {
        None => "(skipped_by_pass2_no_nutrition)".to_string(),
        Some(prompt) => {
            match retry_rate_limited(retry, || pass3.call(image, mime_type, prompt)).await {
                Ok(reply) => {
                    match parse_reading::<NutritionReading>(
                        &reply.parsed,
                        &reply.raw_text,
                        pass3.model_name(),
                    ) {
                        Ok(parsed) => {
                            nut = parsed;
                            reply.raw_text
                        }
                        Err(failure) => {
                            warn!(error = %failure.error, "nutrition track unparseable, downgrading");
                            format!("(nutrition_error:{})", failure.error)
                        }
                    }
                }
                Err(e) => {
                    // Ingredients already succeeded; keep the pass alive.
                    warn!(error = %e, "nutrition track failed, downgrading");
                    format!("(nutrition_error:{})", e)
                }
            }
        }
    };

    let raw_model_text = format!(
        "[PASS3-INGREDIENTS]\n{}\n\n[PASS3-NUTRITION]\n{}",
        reply_ing.raw_text, nutrition_section
    )
    .trim()
    .to_string();

    let note = ing
        .reason
        .clone()
        .filter(|r| !r.trim().is_empty())
        .or_else(|| nut.reason.clone().filter(|r| !r.trim().is_empty()))
        .unwrap_or_else(|| "pass3".to_string());

    let nutrition_ran = prompt_nutrition.is_some();
    info!(
        has_report_candidate = ing.product_report_number.is_some(),
        nutrition_ran,
        "pass3 extraction finished"
    );

    Ok(ExtractOutcome {
        note,
        report_no_raw: ing.product_report_number,
        ingredients_text: ing.ingredients_text,
        allergen_text: ing.allergen_text,
        nutrition_text: if nutrition_ran { nut.nutrition_text } else { None },
        product_name_in_image: ing.product_name_in_image,
        full_text: ing.full_text.or(nut.full_text),
        has_report_label: ing.has_report_label.unwrap_or(false),
        ingredients_complete: ing.ingredients_complete.unwrap_or(false),
        report_number_complete: ing.report_number_complete.unwrap_or(false),
        product_name_complete: ing.product_name_complete.unwrap_or(false),
        nutrition_complete: nutrition_ran && nut.nutrition_complete.unwrap_or(false),
        raw_model_text,
        source_model: pass3.model_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCaller;
    use serde_json::json;

    fn ingredients_reply() -> Value {
        json!({
            "product_report_number": "1234567890123",
            "ingredients_text": "밀가루, 설탕, 대두 함유",
            "allergen_text": null,
            "product_name_in_image": "테스트 과자",
            "full_text": "제품명 테스트 과자 품목보고번호 1234567890123",
            "has_report_label": true,
            "ingredients_complete": true,
            "report_number_complete": true,
            "product_name_complete": true,
            "reason": "판독 완료"
        })
    }

    fn nutrition_reply() -> Value {
        json!({
            "nutrition_text": "나트륨 120mg, 탄수화물 23g, 단백질 4g",
            "nutrition_complete": true,
            "full_text": "영양성분표 포함 전체 텍스트",
            "reason": "영양성분 판독"
        })
    }

    #[tokio::test]
    async fn test_extract_both_tracks() {
        let caller = ScriptedCaller::new("gemini-2.0-flash", vec![ingredients_reply(), nutrition_reply()]);
        let outcome = run_extract(
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "ing-prompt",
            Some("nut-prompt"),
        )
        .await
        .unwrap();
        assert_eq!(outcome.report_no_raw.as_deref(), Some("1234567890123"));
        assert_eq!(
            outcome.nutrition_text.as_deref(),
            Some("나트륨 120mg, 탄수화물 23g, 단백질 4g")
        );
        assert!(outcome.nutrition_complete);
        assert_eq!(outcome.note, "판독 완료");
        assert!(outcome.raw_model_text.contains("[PASS3-INGREDIENTS]"));
        assert!(outcome.raw_model_text.contains("[PASS3-NUTRITION]"));
        assert_eq!(caller.calls(), 2);
    }

    #[tokio::test]
    async fn test_extract_skips_nutrition_when_gate_saw_none() {
        let caller = ScriptedCaller::new("m", vec![ingredients_reply()]);
        let outcome = run_extract(
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "ing-prompt",
            None,
        )
        .await
        .unwrap();
        assert!(outcome.nutrition_text.is_none());
        assert!(!outcome.nutrition_complete);
        assert!(outcome
            .raw_model_text
            .contains("(skipped_by_pass2_no_nutrition)"));
        assert_eq!(caller.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_downgrades_on_nutrition_failure() {
        // Single scripted reply: the nutrition call errors out.
        let caller = ScriptedCaller::new("m", vec![ingredients_reply()]);
        let outcome = run_extract(
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "ing-prompt",
            Some("nut-prompt"),
        )
        .await
        .unwrap();
        assert_eq!(outcome.report_no_raw.as_deref(), Some("1234567890123"));
        assert!(outcome.nutrition_text.is_none());
        assert!(!outcome.nutrition_complete);
        assert!(outcome.raw_model_text.contains("(nutrition_error:"));
    }

    #[tokio::test]
    async fn test_extract_fails_whole_pass_on_ingredients_failure() {
        let caller = ScriptedCaller::failing("m", "gemini_http_503: unavailable");
        let failure = run_extract(
            &caller,
            &RetryPolicy {
                model_retries: 0,
                ..RetryPolicy::default()
            },
            b"img",
            "image/png",
            "ing-prompt",
            Some("nut-prompt"),
        )
        .await
        .unwrap_err();
        assert!(failure.error.contains("503"));
        assert_eq!(failure.source_model, "m");
        // Nutrition was never attempted.
        assert_eq!(caller.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_retry_ceiling_on_rate_limit() {
        let caller = ScriptedCaller::failing("m", "openai_http_429: quota exceeded");
        let policy = RetryPolicy::default();
        let failure = run_extract(
            &caller,
            &policy,
            b"img",
            "image/png",
            "ing-prompt",
            None,
        )
        .await
        .unwrap_err();
        assert!(failure.error.contains("429"));
        assert_eq!(
            caller.calls() as u32,
            policy.max_attempts().max(policy.rate_limit_max_attempts)
        );
    }

    #[tokio::test]
    async fn test_extract_accepts_numeric_report_number() {
        let mut reply = ingredients_reply();
        reply["product_report_number"] = json!(1234567890123u64);
        let caller = ScriptedCaller::new("m", vec![reply]);
        let outcome = run_extract(
            &caller,
            &RetryPolicy::default(),
            b"img",
            "image/png",
            "p",
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome.report_no_raw.as_deref(), Some("1234567890123"));
    }
}
