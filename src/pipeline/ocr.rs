//! OCR backend: local text detection, then a text model turns the detected
//! words into JSON.
//!
//! ```text
//! image ──▶ TextDetector (blocking pool) ──▶ full_text ──▶ LLM (JSON mode) ──▶ reply
//! ```
//!
//! Both stages keep their failures in-band. Stage 1 ([`detect`]) returns a
//! [`Detection`] whose `full_text` is an `OCR error: ...` sentinel; stage 2
//! ([`structure`]) returns an `{"error": "structuring failed: ..."}` JSON
//! text. [`OcrExtractor`] turns the stage-1 sentinel into
//! [`ExtractError::Detector`] so the batch records the file as failed rather
//! than sending the sentinel to the model.

use crate::config::{Backend, ExtractionConfig};
use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::pipeline::input::InputFile;
use crate::prompts::{structuring_prompt, STRUCTURING_SYSTEM_PROMPT};
use crate::provider::{resolve_provider, ModelRole};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Prefix of the stage-1 failure sentinel.
pub const OCR_ERROR_PREFIX: &str = "OCR error: ";

/// One recognised piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
    /// Corner points `[x, y]` in pixels, clockwise from top-left.
    pub bbox: [[i32; 2]; 4],
}

impl TextSpan {
    /// Span for an axis-aligned rectangle.
    pub fn from_rect(
        text: impl Into<String>,
        confidence: f32,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    ) -> Self {
        let (right, bottom) = (left.saturating_add(width), top.saturating_add(height));
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox: [[left, top], [right, top], [right, bottom], [left, bottom]],
        }
    }
}

/// Stage-1 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Span texts joined with single spaces, or the `OCR error: ...` sentinel.
    pub full_text: String,
    pub spans: Vec<TextSpan>,
    /// Detector failure detail; `None` on success.
    pub error: Option<String>,
}

impl Detection {
    fn failed(detail: String) -> Self {
        Self {
            full_text: format!("{OCR_ERROR_PREFIX}{detail}"),
            spans: Vec::new(),
            error: Some(detail),
        }
    }
}

/// A local text detector.
///
/// Implementations are blocking and are run on the blocking thread pool.
/// Spans are returned in reading order as the detector sees it.
pub trait TextDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, image: &[u8]) -> Result<Vec<TextSpan>, String>;
}

/// Stage 1: run the detector and join the span texts.
pub fn detect(detector: &dyn TextDetector, image: &[u8]) -> Detection {
    match detector.detect(image) {
        Ok(spans) => {
            let full_text = spans
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            debug!(
                "{}: {} spans, {} chars",
                detector.name(),
                spans.len(),
                full_text.len()
            );
            Detection {
                full_text,
                spans,
                error: None,
            }
        }
        Err(detail) => {
            warn!("{} failed: {}", detector.name(), detail);
            Detection::failed(detail)
        }
    }
}

/// Sampling parameters of the structuring call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructuringOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl StructuringOptions {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.structuring_temperature,
            max_tokens: config.structuring_max_tokens,
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..CompletionOptions::json_mode()
        }
    }
}

impl Default for StructuringOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

/// Stage 2: ask a text model to turn OCR text into JSON.
///
/// Never fails; a provider error becomes an `{"error": ...}` JSON text.
pub async fn structure(
    provider: &Arc<dyn LLMProvider>,
    full_text: &str,
    schema: Option<&str>,
    options: StructuringOptions,
) -> String {
    let messages = vec![
        ChatMessage::system(STRUCTURING_SYSTEM_PROMPT),
        ChatMessage::user(structuring_prompt(full_text, schema)),
    ];

    match provider
        .chat(&messages, Some(&options.completion_options()))
        .await
    {
        Ok(response) => {
            debug!(
                "Structuring: {} input tokens, {} output tokens",
                response.prompt_tokens, response.completion_tokens
            );
            response.content
        }
        Err(e) => {
            warn!("Structuring call failed: {}", e);
            serde_json::json!({ "error": format!("structuring failed: {e}") }).to_string()
        }
    }
}

/// Extractor that runs a local detector, then a structuring model.
#[derive(Clone)]
pub struct OcrExtractor {
    detector: Arc<dyn TextDetector>,
    provider: Arc<dyn LLMProvider>,
    options: StructuringOptions,
}

impl OcrExtractor {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        provider: Arc<dyn LLMProvider>,
        options: StructuringOptions,
    ) -> Self {
        Self {
            detector,
            provider,
            options,
        }
    }

    /// Build from config: injected detector or the configured one, plus the
    /// structuring provider.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let detector = match config.detector {
            Some(ref d) => Arc::clone(d),
            None => crate::pipeline::detectors::build_detector(&config.ocr)?,
        };
        let provider = resolve_provider(config, ModelRole::Structuring)?;
        Ok(Self::new(
            detector,
            provider,
            StructuringOptions::from_config(config),
        ))
    }

    /// Run stage 1 on the blocking pool.
    pub async fn run_detection(&self, image: &InputFile) -> Result<Detection, ExtractError> {
        let detector = Arc::clone(&self.detector);
        let bytes = image.bytes.clone();
        tokio::task::spawn_blocking(move || detect(detector.as_ref(), &bytes))
            .await
            .map_err(|e| ExtractError::Internal(format!("detector task panicked: {e}")))
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn backend(&self) -> Backend {
        Backend::Ocr
    }

    fn describe(&self) -> String {
        format!(
            "ocr {} + {}/{}",
            self.detector.name(),
            self.provider.name(),
            self.provider.model()
        )
    }

    async fn extract(&self, image: &InputFile, schema: Option<&str>) -> Result<String, ExtractError> {
        let start = Instant::now();
        let detection = self.run_detection(image).await?;
        if let Some(detail) = detection.error {
            return Err(ExtractError::Detector { detail });
        }
        info!(
            "{}: detected {} spans in {:?}",
            image.filename,
            detection.spans.len(),
            start.elapsed()
        );
        Ok(structure(&self.provider, &detection.full_text, schema, self.options).await)
    }
}
