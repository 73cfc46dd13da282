//! Prompt templates for the remote passes.
//!
//! Templates ship compiled into the crate and can be overridden per stage
//! with a file path from configuration. Placeholders (`__TARGET_ITEM_RPT_NO__`,
//! `__INGREDIENTS_TEXT__`, `__NUTRITION_TEXT__`) are substituted verbatim
//! right before sending; templates are otherwise immutable after load.

use crate::config::AnalyzerConfig;
use labelscan_core::Result;
use std::fs;
use std::path::Path;

const DEFAULT_PASS2A: &str = include_str!("../prompts/analyze_pass2a_prompt.txt");
const DEFAULT_PASS2B: &str = include_str!("../prompts/analyze_pass2b_prompt.txt");
const DEFAULT_PASS3_INGREDIENTS: &str =
    include_str!("../prompts/analyze_pass3_ingredients_prompt.txt");
const DEFAULT_PASS3_NUTRITION: &str = include_str!("../prompts/analyze_pass3_nutrition_prompt.txt");
const DEFAULT_PASS4: &str = include_str!("../prompts/analyze_pass4_prompt.txt");

const TARGET_PLACEHOLDER: &str = "__TARGET_ITEM_RPT_NO__";
const INGREDIENTS_PLACEHOLDER: &str = "__INGREDIENTS_TEXT__";
const NUTRITION_PLACEHOLDER: &str = "__NUTRITION_TEXT__";

/// Substituted value when the caller supplied no target report number.
const NO_TARGET: &str = "없음";

/// All five prompt templates, loaded once per analyzer.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pass2a: String,
    pass2b: String,
    pass3_ingredients: String,
    pass3_nutrition: String,
    pass4: String,
}

fn load_template(override_path: Option<&Path>, compiled: &str) -> Result<String> {
    match override_path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(compiled.to_string()),
    }
}

impl PromptSet {
    /// Load templates, honoring per-stage file overrides from configuration.
    pub fn load(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            pass2a: load_template(config.prompt_file_pass2a.as_deref(), DEFAULT_PASS2A)?,
            pass2b: load_template(config.prompt_file_pass2b.as_deref(), DEFAULT_PASS2B)?,
            pass3_ingredients: load_template(
                config.prompt_file_pass3_ingredients.as_deref(),
                DEFAULT_PASS3_INGREDIENTS,
            )?,
            pass3_nutrition: load_template(
                config.prompt_file_pass3_nutrition.as_deref(),
                DEFAULT_PASS3_NUTRITION,
            )?,
            pass4: load_template(config.prompt_file_pass4.as_deref(), DEFAULT_PASS4)?,
        })
    }

    fn substitute_target(template: &str, target_report_no: Option<&str>) -> String {
        let target = target_report_no
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NO_TARGET);
        template.replace(TARGET_PLACEHOLDER, target)
    }

    pub fn build_pass2a(&self, target_report_no: Option<&str>) -> String {
        Self::substitute_target(&self.pass2a, target_report_no)
    }

    pub fn build_pass2b(&self, target_report_no: Option<&str>) -> String {
        Self::substitute_target(&self.pass2b, target_report_no)
    }

    pub fn build_pass3_ingredients(&self, target_report_no: Option<&str>) -> String {
        Self::substitute_target(&self.pass3_ingredients, target_report_no)
    }

    pub fn build_pass3_nutrition(&self, target_report_no: Option<&str>) -> String {
        Self::substitute_target(&self.pass3_nutrition, target_report_no)
    }

    /// Structuring prompt; a missing nutrition text is written as `null` so
    /// the model leaves `nutrition_items` empty.
    pub fn build_pass4(&self, ingredients_text: &str, nutrition_text: Option<&str>) -> String {
        self.pass4
            .replace(INGREDIENTS_PLACEHOLDER, ingredients_text)
            .replace(NUTRITION_PLACEHOLDER, nutrition_text.unwrap_or("null"))
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            pass2a: DEFAULT_PASS2A.to_string(),
            pass2b: DEFAULT_PASS2B.to_string(),
            pass3_ingredients: DEFAULT_PASS3_INGREDIENTS.to_string(),
            pass3_nutrition: DEFAULT_PASS3_NUTRITION.to_string(),
            pass4: DEFAULT_PASS4.to_string(),
        }
    }
}
