//! Data model for label analysis results.
//!
//! Every type here is created fresh per `analyze` call and discarded at the
//! end of the call; the pipeline holds no cross-call mutable state.

use serde::{Deserialize, Serialize};

/// Binary gate outcome: whether extraction should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Decision {
    #[serde(rename = "READ")]
    Read,
    #[default]
    #[serde(rename = "SKIP")]
    Skip,
}

impl Decision {
    pub fn is_read(self) -> bool {
        matches!(self, Decision::Read)
    }
}

/// Suitability verdict, serialized in the label vocabulary the upstream
/// registry expects (적합 = accept, 부적합 = reject).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Suitability {
    #[serde(rename = "적합")]
    Suitable,
    #[default]
    #[serde(rename = "부적합")]
    Unsuitable,
}

/// Supported image formats for the vision pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Parse a MIME type, normalizing the common `image/jpg` misspelling.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Check the byte signature against this declared format.
    pub fn matches_signature(self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }
        match self {
            Self::Png => bytes.starts_with(b"\x89PNG"),
            Self::Jpeg => bytes.starts_with(&[0xFF, 0xD8]),
            Self::Gif => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
            Self::Webp => bytes.starts_with(b"RIFF") && contains_webp_tag(bytes),
        }
    }

    /// Sniff a format from magic bytes alone.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        [Self::Png, Self::Jpeg, Self::Gif, Self::Webp]
            .into_iter()
            .find(|f| f.matches_signature(bytes))
    }
}

fn contains_webp_tag(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(32)];
    head.windows(4).any(|w| w == b"WEBP")
}

/// Raw image bytes plus the resolved MIME type. Owned exclusively by the
/// call in progress; never persisted by the pipeline.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Per-field quality judgments carried on the final record. The four photo
/// flags stay `None` when the gate never ran (precheck failure, call error).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityFlags {
    pub is_real_world_photo: Option<bool>,
    pub is_blurry_or_lowres: Option<bool>,
    pub is_wrinkled_or_distorted: Option<bool>,
    pub is_cropped_or_partial: Option<bool>,
    pub ingredients_complete: bool,
    pub report_number_complete: bool,
    pub product_name_complete: bool,
    pub nutrition_complete: bool,
}

/// Local syntactic validation of the resolved report number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportNumberValidation {
    pub is_valid: bool,
    pub normalized_report_number: Option<String>,
    pub reason: String,
}

impl ReportNumberValidation {
    pub fn skipped(reason: &str) -> Self {
        Self {
            is_valid: false,
            normalized_report_number: None,
            reason: reason.to_string(),
        }
    }
}

/// One node of the structured ingredient tree produced by the pass4
/// structuring call. Compound ingredients nest their components in
/// `sub_ingredients`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IngredientItem {
    pub ingredient_name: Option<String>,
    pub origin: Option<String>,
    pub origin_detail: Option<String>,
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_ingredients: Vec<IngredientItem>,
}

/// One row of the structured nutrition list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NutritionItem {
    pub name: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub daily_value: Option<String>,
}

/// Pass1 diagnostics attached to records produced before any remote call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrecheckInfo {
    pub precheck_pass: bool,
    pub precheck_reason: String,
    pub precheck_mime_type: String,
}

/// Structured failure shape for a remote call that was attempted and lost:
/// auth error, malformed response, or retry exhaustion. Distinguishes
/// "extraction attempted and failed" from "nothing extracted".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallFailure {
    pub error: String,
    pub last_raw_text: Option<String>,
    pub source_model: String,
}

impl CallFailure {
    pub fn new(error: impl Into<String>, source_model: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            last_raw_text: None,
            source_model: source_model.into(),
        }
    }

    pub fn with_raw_text(mut self, raw: Option<String>) -> Self {
        self.last_raw_text = raw;
        self
    }
}

/// Final normalized record for one analyzed image. Also the shape returned
/// by the individual pass entry points for terminal outcomes, so callers
/// have exactly one result type to handle regardless of where the pipeline
/// stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    /// Resolved manufacturing report number, digits only.
    #[serde(rename = "itemMnftrRptNo")]
    pub report_no: Option<String>,
    pub ingredients_text: Option<String>,
    pub allergen_text: Option<String>,
    pub nutrition_text: Option<String>,
    pub product_name_in_image: Option<String>,
    pub full_text: Option<String>,
    pub note: String,
    pub has_report_label: bool,
    pub has_ingredients: bool,
    pub quality_gate_pass: bool,
    pub quality_score: u32,
    pub quality_fail_reasons: Vec<String>,
    pub quality_flags: QualityFlags,
    pub ai_decision: Decision,
    pub ai_suitability: Suitability,
    pub ai_decision_confidence: u32,
    pub ai_decision_reason: String,
    pub raw_model_text: Option<String>,
    pub raw_model_text_pass2: Option<String>,
    pub raw_model_text_pass3: Option<String>,
    pub raw_model_text_pass4: Option<String>,
    pub source_model: String,
    pub ingredient_items: Vec<IngredientItem>,
    pub ingredient_items_reason: Option<String>,
    pub nutrition_items: Vec<NutritionItem>,
    pub report_number_validation: ReportNumberValidation,
    /// Error text from the structuring call, when it failed after the flat
    /// fields were already accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structuring_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precheck: Option<PrecheckInfo>,
}

impl AnalysisRecord {
    /// Empty SKIP skeleton; passes fill in their reason fields.
    pub fn skip(source_model: impl Into<String>) -> Self {
        Self {
            report_no: None,
            ingredients_text: None,
            allergen_text: None,
            nutrition_text: None,
            product_name_in_image: None,
            full_text: None,
            note: String::new(),
            has_report_label: false,
            has_ingredients: false,
            quality_gate_pass: false,
            quality_score: 0,
            quality_fail_reasons: Vec::new(),
            quality_flags: QualityFlags::default(),
            ai_decision: Decision::Skip,
            ai_suitability: Suitability::Unsuitable,
            ai_decision_confidence: 0,
            ai_decision_reason: String::new(),
            raw_model_text: None,
            raw_model_text_pass2: None,
            raw_model_text_pass3: None,
            raw_model_text_pass4: None,
            source_model: source_model.into(),
            ingredient_items: Vec::new(),
            ingredient_items_reason: None,
            nutrition_items: Vec::new(),
            report_number_validation: ReportNumberValidation::skipped("not_evaluated"),
            structuring_error: None,
            precheck: None,
        }
    }

    /// Terminal error record for a failed remote call or download, carrying
    /// the failure text so callers can distinguish it from a gate SKIP.
    pub fn from_call_failure(failure: &CallFailure) -> Self {
        let err_text = format!(
            "analyze error: {} (hint: 429/quota, timeout, or transient service failure)",
            failure.error
        );
        let fallback_raw = failure
            .last_raw_text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| failure.error.clone());
        let mut record = Self::skip(failure.source_model.clone());
        record.note = err_text.clone();
        record.quality_fail_reasons = vec![format!("runtime_error:{}", failure.error)];
        record.ai_decision_confidence = 0;
        record.ai_decision_reason = err_text;
        record.raw_model_text = Some(fallback_raw);
        record.report_number_validation = ReportNumberValidation::skipped("runtime_error");
        record
    }
}
