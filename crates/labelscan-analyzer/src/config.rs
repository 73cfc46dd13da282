//! Analyzer configuration: provider routing, credentials, limits.
//!
//! Everything is plain data resolved once at startup. `from_env` reads the
//! documented environment variables and falls back to the defaults module;
//! `validate` catches missing credentials before the first remote call.

use labelscan_core::{defaults, Error, Result};
use labelscan_inference::Provider;
use std::env;
use std::path::PathBuf;

/// Full configuration for an [`crate::Analyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// OpenAI API key, required when any stage routes to OpenAI.
    pub openai_api_key: String,
    /// Gemini API key, required when any stage routes to Gemini.
    pub gemini_api_key: String,
    /// Dedicated Gemini key for the 2A gate; falls back to `gemini_api_key`.
    pub pass2a_gemini_api_key: String,

    /// Primary OpenAI model (2B content gate and pass4 structuring).
    pub model: String,
    /// Provider routing for the 2A quality gate.
    pub pass2a_provider: Provider,
    pub pass2a_openai_model: String,
    pub pass2a_gemini_model: String,
    /// Provider routing for the pass3 extraction tracks.
    pub pass3_provider: Provider,
    pub pass3_gemini_model: String,

    /// When set, a record without a valid report number publishes no other
    /// field either.
    pub strict_mode: bool,

    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub download_retries: u32,
    pub model_retries: u32,
    pub max_image_bytes: usize,

    pub min_report_digits: usize,
    pub max_report_digits: usize,

    /// Prompt template overrides; compiled-in templates are used when unset.
    pub prompt_file_pass2a: Option<PathBuf>,
    pub prompt_file_pass2b: Option<PathBuf>,
    pub prompt_file_pass3_ingredients: Option<PathBuf>,
    pub prompt_file_pass3_nutrition: Option<PathBuf>,
    pub prompt_file_pass4: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            pass2a_gemini_api_key: String::new(),
            model: defaults::OPENAI_MODEL.to_string(),
            pass2a_provider: Provider::OpenAi,
            pass2a_openai_model: defaults::PASS2A_OPENAI_MODEL.to_string(),
            pass2a_gemini_model: defaults::PASS2A_GEMINI_MODEL.to_string(),
            pass3_provider: Provider::Gemini,
            pass3_gemini_model: defaults::PASS3_GEMINI_MODEL.to_string(),
            strict_mode: true,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            download_timeout_secs: defaults::DOWNLOAD_TIMEOUT_SECS,
            download_retries: defaults::DOWNLOAD_RETRIES,
            model_retries: defaults::MODEL_RETRIES,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
            min_report_digits: defaults::MIN_REPORT_DIGITS,
            max_report_digits: defaults::MAX_REPORT_DIGITS,
            prompt_file_pass2a: None,
            prompt_file_pass2b: None,
            prompt_file_pass3_ingredients: None,
            prompt_file_pass3_nutrition: None,
            prompt_file_pass4: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", name, raw))),
    }
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|raw| {
        matches!(
            raw.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

impl AnalyzerConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = env_string(defaults::ENV_OPENAI_API_KEY) {
            config.openai_api_key = key;
        }
        // GOOGLE_API_KEY is accepted as an alias for the Gemini key.
        if let Some(key) = env_string(defaults::ENV_GEMINI_API_KEY)
            .or_else(|| env_string(defaults::ENV_GOOGLE_API_KEY))
        {
            config.gemini_api_key = key;
        }
        if let Some(key) = env_string(defaults::ENV_PASS2A_GEMINI_API_KEY) {
            config.pass2a_gemini_api_key = key;
        }

        if let Some(model) = env_string(defaults::ENV_ANALYZE_MODEL) {
            config.model = model;
        }
        if let Some(provider) = env_parse::<Provider>(defaults::ENV_PASS2A_PROVIDER)? {
            config.pass2a_provider = provider;
        }
        if let Some(model) = env_string(defaults::ENV_PASS2A_OPENAI_MODEL) {
            config.pass2a_openai_model = model;
        }
        if let Some(model) = env_string(defaults::ENV_PASS2A_GEMINI_MODEL) {
            config.pass2a_gemini_model = model;
        }
        if let Some(provider) = env_parse::<Provider>(defaults::ENV_PASS3_PROVIDER)? {
            config.pass3_provider = provider;
        }
        if let Some(model) = env_string(defaults::ENV_PASS3_GEMINI_MODEL) {
            config.pass3_gemini_model = model;
        }

        if let Some(strict) = env_bool(defaults::ENV_STRICT_MODE) {
            config.strict_mode = strict;
        }

        if let Some(secs) = env_parse::<u64>(defaults::ENV_REQUEST_TIMEOUT)? {
            config.request_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>(defaults::ENV_DOWNLOAD_TIMEOUT)? {
            config.download_timeout_secs = secs;
        }
        if let Some(bytes) = env_parse::<usize>(defaults::ENV_MAX_IMAGE_BYTES)? {
            config.max_image_bytes = bytes;
        }

        config.prompt_file_pass2a = env_string(defaults::ENV_PROMPT_FILE_PASS2A).map(PathBuf::from);
        config.prompt_file_pass2b = env_string(defaults::ENV_PROMPT_FILE_PASS2B).map(PathBuf::from);
        config.prompt_file_pass3_ingredients =
            env_string(defaults::ENV_PROMPT_FILE_PASS3_INGREDIENTS).map(PathBuf::from);
        config.prompt_file_pass3_nutrition =
            env_string(defaults::ENV_PROMPT_FILE_PASS3_NUTRITION).map(PathBuf::from);
        config.prompt_file_pass4 = env_string(defaults::ENV_PROMPT_FILE_PASS4).map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// The Gemini key the 2A gate should use.
    pub fn pass2a_gemini_key(&self) -> &str {
        if self.pass2a_gemini_api_key.is_empty() {
            &self.gemini_api_key
        } else {
            &self.pass2a_gemini_api_key
        }
    }

    fn uses_openai(&self) -> bool {
        // 2B and structuring always route to OpenAI.
        true
    }

    fn uses_gemini(&self) -> bool {
        self.pass2a_provider == Provider::Gemini || self.pass3_provider == Provider::Gemini
    }

    /// Check credential and bound consistency before building callers.
    pub fn validate(&self) -> Result<()> {
        if self.uses_openai() && self.openai_api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "openai_api_key_missing (set {})",
                defaults::ENV_OPENAI_API_KEY
            )));
        }
        if self.uses_gemini() && self.pass2a_gemini_key().trim().is_empty() && self.gemini_api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "gemini_api_key_missing (set {} or {})",
                defaults::ENV_GEMINI_API_KEY,
                defaults::ENV_GOOGLE_API_KEY
            )));
        }
        if self.min_report_digits == 0 || self.min_report_digits > self.max_report_digits {
            return Err(Error::Config(format!(
                "invalid report digit bounds: min={} max={}",
                self.min_report_digits, self.max_report_digits
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(Error::Config("max_image_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AnalyzerConfig {
        AnalyzerConfig {
            openai_api_key: "sk-test".to_string(),
            gemini_api_key: "g-test".to_string(),
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn test_default_config_validates_with_both_keys() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_openai_key_rejected() {
        let err = AnalyzerConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("openai_api_key_missing"));
    }

    #[test]
    fn test_gemini_routing_requires_gemini_key() {
        let mut config = base_config();
        config.gemini_api_key = String::new();
        // Pass3 routes to Gemini by default, so the key is required.
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gemini_api_key_missing"));

        // Routing everything to OpenAI lifts the requirement.
        config.pass3_provider = Provider::OpenAi;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pass2a_gemini_key_falls_back_to_shared_key() {
        let mut config = base_config();
        config.gemini_api_key = "shared".to_string();
        assert_eq!(config.pass2a_gemini_key(), "shared");
        config.pass2a_gemini_api_key = "dedicated".to_string();
        assert_eq!(config.pass2a_gemini_key(), "dedicated");
    }

    #[test]
    fn test_invalid_digit_bounds_rejected() {
        let mut config = base_config();
        config.min_report_digits = 20;
        config.max_report_digits = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("report digit bounds"));
    }
}
