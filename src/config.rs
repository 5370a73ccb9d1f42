//! Configuration types for image-to-JSON extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The same struct drives the CLI, the
//! HTTP API and library callers, so two runs can be compared by diffing their
//! `Debug` output (API keys and provider handles are redacted).

use crate::error::ExtractError;
use crate::pipeline::ocr::TextDetector;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use edgequake_img2json::{Backend, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .backend(Backend::Ocr)
///     .provider_name("groq")
///     .schema_dir("schemas")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Which adapter extracts each file. Default: [`Backend::Vision`].
    pub backend: Backend,

    /// Vision model identifier. If None, uses the provider's default
    /// vision model (see [`crate::provider::default_vision_model`]).
    pub model: Option<String>,

    /// Text model used by the OCR backend to structure detected text.
    /// If None, uses [`crate::provider::default_structuring_model`].
    pub ocr_model: Option<String>,

    /// LLM provider name (e.g. "openai", "groq", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// API key for the streaming transport and the credential check.
    /// If None, read from the provider's environment variable.
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint for the streaming transport.
    /// If None, derived from the provider name.
    pub api_base: Option<String>,

    /// Stream the vision reply as fragments and concatenate them.
    pub stream: bool,

    /// Sampling temperature for the vision call. Default: 1.0.
    pub temperature: f32,

    /// Maximum completion tokens for the vision call. Default: 1024.
    pub max_tokens: usize,

    /// Sampling temperature for the OCR structuring call. Default: 0.0.
    pub structuring_temperature: f32,

    /// Maximum completion tokens for the OCR structuring call. Default: 4096.
    pub structuring_max_tokens: usize,

    /// Local text detector settings for the OCR backend.
    pub ocr: OcrSettings,

    /// Pre-constructed text detector. Takes precedence over `ocr.detector`.
    pub detector: Option<Arc<dyn TextDetector>>,

    /// Target schema: a catalog name from `schema_dir` or a file path.
    /// None means free-form extraction.
    pub schema: Option<String>,

    /// Directory holding `*.json` schema files. Default: `schemas`.
    pub schema_dir: PathBuf,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Request timeout for the streaming transport. Default: None
    /// (reqwest's default, i.e. no timeout).
    pub api_timeout_secs: Option<u64>,

    /// Per-file progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            model: None,
            ocr_model: None,
            provider_name: None,
            provider: None,
            api_key: None,
            api_base: None,
            stream: false,
            temperature: 1.0,
            max_tokens: 1024,
            structuring_temperature: 0.0,
            structuring_max_tokens: 4096,
            ocr: OcrSettings::default(),
            detector: None,
            schema: None,
            schema_dir: PathBuf::from("schemas"),
            download_timeout_secs: 120,
            api_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("ocr_model", &self.ocr_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("stream", &self.stream)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("structuring_temperature", &self.structuring_temperature)
            .field("ocr", &self.ocr)
            .field("detector", &self.detector.as_ref().map(|d| d.name()))
            .field("schema", &self.schema)
            .field("schema_dir", &self.schema_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = Some(url.into());
        self
    }

    pub fn stream(mut self, v: bool) -> Self {
        self.config.stream = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn structuring_temperature(mut self, t: f32) -> Self {
        self.config.structuring_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn structuring_max_tokens(mut self, n: usize) -> Self {
        self.config.structuring_max_tokens = n;
        self
    }

    pub fn ocr(mut self, settings: OcrSettings) -> Self {
        self.config.ocr = settings;
        self
    }

    pub fn detector(mut self, detector: Arc<dyn TextDetector>) -> Self {
        self.config.detector = Some(detector);
        self
    }

    pub fn schema(mut self, name_or_path: impl Into<String>) -> Self {
        self.config.schema = Some(name_or_path.into());
        self
    }

    pub fn schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.schema_dir = dir.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_tokens == 0 || c.structuring_max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max tokens must be ≥ 1".into(),
            ));
        }
        if c.stream && c.backend == Backend::Ocr {
            return Err(ExtractError::InvalidConfig(
                "streaming applies to the vision backend only".into(),
            ));
        }
        if let Some(ref base) = c.api_base {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ExtractError::InvalidConfig(format!(
                    "api_base must be an http(s) URL, got '{base}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Extraction backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Send the image to a vision-capable model. (default)
    #[default]
    Vision,
    /// Run a local text detector, then structure the text with a text model.
    Ocr,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Vision => f.write_str("vision"),
            Backend::Ocr => f.write_str("ocr"),
        }
    }
}

/// Which local text detector the OCR backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// The `tesseract` command-line program. (default)
    #[default]
    Tesseract,
    /// The oar-ocr ONNX pipeline (requires the `oar` feature).
    Oar,
}

/// Settings for the local text detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    pub detector: DetectorKind,

    /// Tesseract language codes joined with `+`. Default: "eng".
    pub languages: String,

    /// Tesseract executable. Default: "tesseract" (looked up on PATH).
    pub tesseract_binary: PathBuf,

    /// oar-ocr text detection model (ONNX).
    pub det_model: Option<PathBuf>,

    /// oar-ocr text recognition model (ONNX).
    pub rec_model: Option<PathBuf>,

    /// oar-ocr character dictionary.
    pub dict_path: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            languages: "eng".to_string(),
            tesseract_binary: PathBuf::from("tesseract"),
            det_model: None,
            rec_model: None,
            dict_path: None,
        }
    }
}
