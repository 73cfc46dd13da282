//! Pipeline orchestration: compose Pass1 through Pass4 behind the public
//! `analyze` entry points.
//!
//! The analyzer owns one HTTP client shared by every caller and the image
//! fetcher, the loaded prompt set, and the retry policy. Each `analyze` call
//! is otherwise independent; no state is carried between calls.

use crate::config::AnalyzerConfig;
use crate::pass1;
use crate::pass2::{self, GateOutcome};
use crate::pass3::{self, ExtractOutcome};
use crate::pass4::{self, ExtractionStatus, NormalizeSettings};
use crate::prompts::PromptSet;
use labelscan_core::{AnalysisRecord, CallFailure, Error, Result};
use labelscan_inference::{
    GeminiCaller, GeminiConfig, ImageFetcher, OpenAiCaller, OpenAiConfig, Provider, RetryPolicy,
    VisionCaller,
};
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

/// The remote caller behind each stage. Separate handles so the gate,
/// extraction, and structuring stages can route to different providers.
#[derive(Clone)]
pub struct StageCallers {
    pub pass2a: Arc<dyn VisionCaller>,
    pub pass2b: Arc<dyn VisionCaller>,
    pub pass3: Arc<dyn VisionCaller>,
    pub structuring: Arc<dyn VisionCaller>,
}

/// The four-pass gate-and-extract pipeline.
pub struct Analyzer {
    config: AnalyzerConfig,
    fetcher: ImageFetcher,
    callers: StageCallers,
    prompts: PromptSet,
    retry: RetryPolicy,
}

fn openai_caller(
    client: &Client,
    api_key: &str,
    model: &str,
    timeout_secs: u64,
) -> Arc<dyn VisionCaller> {
    let mut config = OpenAiConfig::new(api_key, model);
    config.timeout_secs = timeout_secs;
    Arc::new(OpenAiCaller::new(client.clone(), config))
}

fn gemini_caller(
    client: &Client,
    api_key: &str,
    model: &str,
    timeout_secs: u64,
) -> Result<Arc<dyn VisionCaller>> {
    let mut config = GeminiConfig::new(api_key, model);
    config.timeout_secs = timeout_secs;
    Ok(Arc::new(GeminiCaller::new(client.clone(), config)?))
}

impl Analyzer {
    /// Build the pipeline from configuration, wiring each stage to its
    /// configured provider.
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("http client init failed: {}", e)))?;

        let timeout = config.request_timeout_secs;
        let pass2a = match config.pass2a_provider {
            Provider::OpenAi => openai_caller(
                &client,
                &config.openai_api_key,
                &config.pass2a_openai_model,
                timeout,
            ),
            Provider::Gemini => gemini_caller(
                &client,
                config.pass2a_gemini_key(),
                &config.pass2a_gemini_model,
                timeout,
            )?,
        };
        let pass2b = openai_caller(&client, &config.openai_api_key, &config.model, timeout);
        let pass3 = match config.pass3_provider {
            Provider::OpenAi => {
                openai_caller(&client, &config.openai_api_key, &config.model, timeout)
            }
            Provider::Gemini => gemini_caller(
                &client,
                &config.gemini_api_key,
                &config.pass3_gemini_model,
                timeout,
            )?,
        };
        let structuring = openai_caller(&client, &config.openai_api_key, &config.model, timeout);

        let callers = StageCallers {
            pass2a,
            pass2b,
            pass3,
            structuring,
        };
        Self::with_callers(config, client, callers)
    }

    /// Build the pipeline with explicit stage callers. Used by tests and by
    /// embedders that bring their own caller implementations.
    pub fn with_callers(
        config: AnalyzerConfig,
        client: Client,
        callers: StageCallers,
    ) -> Result<Self> {
        let prompts = PromptSet::load(&config)?;
        let fetcher = ImageFetcher::new(client)
            .with_max_bytes(config.max_image_bytes)
            .with_timeout_secs(config.download_timeout_secs)
            .with_retries(config.download_retries);
        let retry = RetryPolicy {
            model_retries: config.model_retries,
            ..RetryPolicy::default()
        };
        Ok(Self {
            config,
            fetcher,
            callers,
            prompts,
            retry,
        })
    }

    fn normalize_settings(&self) -> NormalizeSettings<'_> {
        NormalizeSettings {
            strict_mode: self.config.strict_mode,
            min_report_digits: self.config.min_report_digits,
            max_report_digits: self.config.max_report_digits,
            source_model: &self.config.model,
        }
    }

    fn download_failure(&self, error: &Error) -> AnalysisRecord {
        AnalysisRecord::from_call_failure(&CallFailure::new(
            format!("image_download_failed: {}", error),
            &self.config.model,
        ))
    }

    /// Full pipeline: fetch, precheck, gate, extract, normalize.
    pub async fn analyze(
        &self,
        image_url: &str,
        target_report_no: Option<&str>,
    ) -> AnalysisRecord {
        let payload = match self.fetcher.fetch(image_url).await {
            Ok(payload) => payload,
            Err(e) => return self.download_failure(&e),
        };
        self.analyze_from_bytes(
            &payload.bytes,
            &payload.mime_type,
            Some(image_url),
            target_report_no,
        )
        .await
    }

    /// Full pipeline against bytes the caller already holds.
    pub async fn analyze_from_bytes(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        image_url: Option<&str>,
        target_report_no: Option<&str>,
    ) -> AnalysisRecord {
        let precheck = pass1::run_precheck(image_bytes, mime_type, image_url, &self.config.model);
        if !precheck
            .precheck
            .as_ref()
            .is_some_and(|info| info.precheck_pass)
        {
            return precheck;
        }
        let mime = pass1::normalize_mime(mime_type);

        let gate = match self
            .analyze_pass2_from_bytes(image_bytes, &mime, target_report_no)
            .await
        {
            Ok(gate) => gate,
            Err(failure) => return AnalysisRecord::from_call_failure(&failure),
        };

        let extraction = if gate.decision.is_read() {
            Some(
                self.analyze_pass3_from_bytes(
                    image_bytes,
                    &mime,
                    target_report_no,
                    gate.has_nutrition_section,
                )
                .await,
            )
        } else {
            None
        };
        let status = match &extraction {
            None => ExtractionStatus::Skipped,
            Some(Ok(extract)) => ExtractionStatus::Extracted(extract),
            Some(Err(failure)) => ExtractionStatus::Failed(failure),
        };

        self.analyze_pass4_normalize(&gate, status, target_report_no)
            .await
    }

    /// Pass1 only: fetch and locally validate the image.
    pub async fn analyze_pass1_precheck(&self, image_url: &str) -> AnalysisRecord {
        match self.fetcher.fetch(image_url).await {
            Ok(payload) => pass1::run_precheck(
                &payload.bytes,
                &payload.mime_type,
                Some(image_url),
                &self.config.model,
            ),
            Err(e) => self.download_failure(&e),
        }
    }

    pub fn analyze_pass1_precheck_from_bytes(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        image_url: Option<&str>,
    ) -> AnalysisRecord {
        pass1::run_precheck(image_bytes, mime_type, image_url, &self.config.model)
    }

    /// Pass1+Pass2: fetch, precheck, and gate, folded into the uniform
    /// record shape.
    pub async fn analyze_pass2(
        &self,
        image_url: &str,
        target_report_no: Option<&str>,
    ) -> AnalysisRecord {
        let payload = match self.fetcher.fetch(image_url).await {
            Ok(payload) => payload,
            Err(e) => return self.download_failure(&e),
        };
        let precheck = pass1::run_precheck(
            &payload.bytes,
            &payload.mime_type,
            Some(image_url),
            &self.config.model,
        );
        if !precheck
            .precheck
            .as_ref()
            .is_some_and(|info| info.precheck_pass)
        {
            return precheck;
        }
        let mime = pass1::normalize_mime(&payload.mime_type);
        match self
            .analyze_pass2_from_bytes(&payload.bytes, &mime, target_report_no)
            .await
        {
            Ok(gate) => gate.to_record(&self.config.model),
            Err(failure) => AnalysisRecord::from_call_failure(&failure),
        }
    }

    /// Pass2 gate against bytes that already passed precheck.
    pub async fn analyze_pass2_from_bytes(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        target_report_no: Option<&str>,
    ) -> std::result::Result<GateOutcome, CallFailure> {
        let prompt_2a = self.prompts.build_pass2a(target_report_no);
        let prompt_2b = self.prompts.build_pass2b(target_report_no);
        pass2::run_gate(
            self.callers.pass2a.as_ref(),
            self.callers.pass2b.as_ref(),
            &self.retry,
            image_bytes,
            mime_type,
            &prompt_2a,
            &prompt_2b,
        )
        .await
    }

    /// Pass1 through Pass3: stops with a call failure when the precheck or
    /// gate rejects the image. `include_nutrition` overrides the gate's
    /// nutrition-section flag when set.
    pub async fn analyze_pass3(
        &self,
        image_url: &str,
        target_report_no: Option<&str>,
        include_nutrition: Option<bool>,
    ) -> std::result::Result<ExtractOutcome, CallFailure> {
        let pass3_model = self.callers.pass3.model_name().to_string();
        let payload = self
            .fetcher
            .fetch(image_url)
            .await
            .map_err(|e| CallFailure::new(format!("image_download_failed: {}", e), &pass3_model))?;
        let precheck = pass1::run_precheck(
            &payload.bytes,
            &payload.mime_type,
            Some(image_url),
            &self.config.model,
        );
        if let Some(info) = &precheck.precheck {
            if !info.precheck_pass {
                return Err(CallFailure::new(
                    format!("precheck_failed: {}", info.precheck_reason),
                    &pass3_model,
                ));
            }
        }
        let mime = pass1::normalize_mime(&payload.mime_type);
        let gate = self
            .analyze_pass2_from_bytes(&payload.bytes, &mime, target_report_no)
            .await?;
        if !gate.decision.is_read() {
            return Err(CallFailure::new(
                format!("pass2_skip: {}", gate.decision_reason),
                &pass3_model,
            ));
        }
        self.analyze_pass3_from_bytes(
            &payload.bytes,
            &mime,
            target_report_no,
            include_nutrition.unwrap_or(gate.has_nutrition_section),
        )
        .await
    }

    /// Pass3 extraction against bytes that already passed the gate.
    pub async fn analyze_pass3_from_bytes(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        target_report_no: Option<&str>,
        include_nutrition: bool,
    ) -> std::result::Result<ExtractOutcome, CallFailure> {
        let prompt_ingredients = self.prompts.build_pass3_ingredients(target_report_no);
        let prompt_nutrition = include_nutrition
            .then(|| self.prompts.build_pass3_nutrition(target_report_no));
        pass3::run_extract(
            self.callers.pass3.as_ref(),
            &self.retry,
            image_bytes,
            mime_type,
            &prompt_ingredients,
            prompt_nutrition.as_deref(),
        )
        .await
    }

    /// Pass4: normalize gate+extraction results into the final record.
    pub async fn analyze_pass4_normalize(
        &self,
        gate: &GateOutcome,
        extraction: ExtractionStatus<'_>,
        target_report_no: Option<&str>,
    ) -> AnalysisRecord {
        let record = pass4::run_normalize(
            self.callers.structuring.as_ref(),
            &self.prompts,
            &self.normalize_settings(),
            gate,
            extraction,
            target_report_no,
        )
        .await;
        info!(
            quality_gate_pass = record.quality_gate_pass,
            quality_score = record.quality_score,
            "analysis finished"
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys() -> AnalyzerConfig {
        AnalyzerConfig {
            openai_api_key: "sk-test".to_string(),
            gemini_api_key: "g-test".to_string(),
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn test_new_wires_default_providers() {
        let analyzer = Analyzer::new(config_with_keys()).unwrap();
        assert_eq!(
            analyzer.callers.pass2a.model_name(),
            labelscan_core::defaults::PASS2A_OPENAI_MODEL
        );
        assert_eq!(
            analyzer.callers.pass2b.model_name(),
            labelscan_core::defaults::OPENAI_MODEL
        );
        // Pass3 routes to Gemini by default.
        assert_eq!(
            analyzer.callers.pass3.model_name(),
            labelscan_core::defaults::PASS3_GEMINI_MODEL
        );
    }

    #[test]
    fn test_new_routes_pass3_to_openai_when_configured() {
        let mut config = config_with_keys();
        config.pass3_provider = Provider::OpenAi;
        let analyzer = Analyzer::new(config).unwrap();
        assert_eq!(
            analyzer.callers.pass3.model_name(),
            labelscan_core::defaults::OPENAI_MODEL
        );
    }

    #[test]
    fn test_new_rejects_gemini_routing_without_key() {
        let mut config = config_with_keys();
        config.gemini_api_key = String::new();
        assert!(Analyzer::new(config).is_err());
    }

    #[test]
    fn test_retry_policy_inherits_model_retries() {
        let mut config = config_with_keys();
        config.model_retries = 7;
        let analyzer = Analyzer::new(config).unwrap();
        assert_eq!(analyzer.retry.model_retries, 7);
    }
}
