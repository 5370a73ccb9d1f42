//! Provider resolution and credential checks.
//!
//! Two calls need a model: the vision call and the OCR structuring call.
//! Both go through [`resolve_provider`], which walks the same fallback chain
//! from most-specific to least-specific:
//!
//! 1. **Pre-built provider** (`config.provider`), used as-is.
//! 2. **Named provider + model** (`config.provider_name`).
//! 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
//! 4. **OpenAI key present** (`OPENAI_API_KEY`).
//! 5. **Full auto-detection** via [`ProviderFactory::from_env`].
//!
//! [`ensure_credentials`] runs the same chain without building anything, so
//! the CLI and the HTTP server can refuse to start with a fix-it hint
//! instead of failing on the first file.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use edgequake_llm::{
    ConfigProviderType, LLMProvider, OpenAICompatibleProvider, OpenAIProvider, ProviderConfig,
    ProviderFactory,
};
use std::sync::Arc;
use tracing::debug;

/// Static facts about a provider this crate knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderEntry {
    /// Canonical lowercase name.
    pub name: &'static str,
    /// Environment variable holding the API key; `None` for local servers.
    pub credential_env: Option<&'static str>,
    /// Base URL of the provider's OpenAI-compatible chat endpoint, if any.
    pub api_base: Option<&'static str>,
}

const PROVIDERS: &[ProviderEntry] = &[
    ProviderEntry {
        name: "openai",
        credential_env: Some("OPENAI_API_KEY"),
        api_base: Some("https://api.openai.com/v1"),
    },
    ProviderEntry {
        name: "groq",
        credential_env: Some("GROQ_API_KEY"),
        api_base: Some("https://api.groq.com/openai/v1"),
    },
    ProviderEntry {
        name: "anthropic",
        credential_env: Some("ANTHROPIC_API_KEY"),
        api_base: None,
    },
    ProviderEntry {
        name: "gemini",
        credential_env: Some("GEMINI_API_KEY"),
        api_base: None,
    },
    ProviderEntry {
        name: "mistral",
        credential_env: Some("MISTRAL_API_KEY"),
        api_base: Some("https://api.mistral.ai/v1"),
    },
    ProviderEntry {
        name: "openrouter",
        credential_env: Some("OPENROUTER_API_KEY"),
        api_base: Some("https://openrouter.ai/api/v1"),
    },
    ProviderEntry {
        name: "xai",
        credential_env: Some("XAI_API_KEY"),
        api_base: Some("https://api.x.ai/v1"),
    },
    ProviderEntry {
        name: "ollama",
        credential_env: None,
        api_base: Some("http://localhost:11434/v1"),
    },
    ProviderEntry {
        name: "lmstudio",
        credential_env: None,
        api_base: Some("http://localhost:1234/v1"),
    },
    ProviderEntry {
        name: "mock",
        credential_env: None,
        api_base: None,
    },
];

/// Which of the two model calls a provider is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Image + instruction → JSON text.
    Vision,
    /// OCR text → JSON text (JSON response mode).
    Structuring,
}

/// Map aliases (`claude`, `google`, `grok`, `lm-studio`) to canonical names.
pub fn canonical_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "claude" => "anthropic".to_string(),
        "google" => "gemini".to_string(),
        "grok" => "xai".to_string(),
        "lm-studio" | "lm_studio" => "lmstudio".to_string(),
        _ => lower,
    }
}

/// Look up a provider by name or alias.
pub fn lookup(name: &str) -> Option<&'static ProviderEntry> {
    let name = canonical_name(name);
    PROVIDERS.iter().find(|p| p.name == name)
}

/// Names accepted by `--provider`, in display order.
pub fn known_provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}

/// Default vision-capable model for a provider.
pub fn default_vision_model(provider: &str) -> &'static str {
    match canonical_name(provider).as_str() {
        "groq" => "meta-llama/llama-4-scout-17b-16e-instruct",
        "anthropic" => "claude-3-5-sonnet-latest",
        "gemini" => "gemini-2.0-flash",
        "mistral" => "pixtral-12b-2409",
        "openrouter" => "openai/gpt-4.1-nano",
        "xai" => "grok-2-vision-1212",
        "ollama" => "llava",
        "lmstudio" => "local-model",
        "mock" => "mock-model",
        _ => "gpt-4.1-nano",
    }
}

/// Default text model for the OCR structuring call.
pub fn default_structuring_model(provider: &str) -> &'static str {
    match canonical_name(provider).as_str() {
        "groq" => "llama-3.1-8b-instant",
        "anthropic" => "claude-3-5-haiku-latest",
        "gemini" => "gemini-2.0-flash",
        "mistral" => "mistral-small-latest",
        "openrouter" => "openai/gpt-4.1-nano",
        "xai" => "grok-3-mini",
        "ollama" => "llama3.1",
        "lmstudio" => "local-model",
        "mock" => "mock-model",
        _ => "gpt-4.1-nano",
    }
}

fn default_model(provider: &str, role: ModelRole) -> &'static str {
    match role {
        ModelRole::Vision => default_vision_model(provider),
        ModelRole::Structuring => default_structuring_model(provider),
    }
}

fn configured_model(config: &ExtractionConfig, role: ModelRole) -> Option<&str> {
    match role {
        ModelRole::Vision => config.model.as_deref(),
        ModelRole::Structuring => config.ocr_model.as_deref(),
    }
}

/// Read a non-empty environment variable.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ── Credential check ─────────────────────────────────────────────────────

/// The provider name the chain will pick, without building it.
///
/// `None` means full auto-detection.
pub fn effective_provider_name(config: &ExtractionConfig) -> Option<String> {
    effective_provider_name_with(config, &env_var)
}

fn effective_provider_name_with(
    config: &ExtractionConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(ref provider) = config.provider {
        return Some(provider.name().to_string());
    }
    if let Some(ref name) = config.provider_name {
        return Some(canonical_name(name));
    }
    if let (Some(prov), Some(_)) = (env("EDGEQUAKE_LLM_PROVIDER"), env("EDGEQUAKE_MODEL")) {
        return Some(canonical_name(&prov));
    }
    if env("OPENAI_API_KEY").is_some() {
        return Some("openai".to_string());
    }
    None
}

/// Fail fast when the selected provider has no API key.
///
/// Local providers (`ollama`, `lmstudio`) and pre-built providers always
/// pass. An explicit `config.api_key` satisfies any hosted provider.
pub fn ensure_credentials(config: &ExtractionConfig) -> Result<(), ExtractError> {
    check_credentials(config, &env_var)
}

fn check_credentials(
    config: &ExtractionConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(), ExtractError> {
    if config.provider.is_some() {
        return Ok(());
    }
    let has_key = config
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());

    match effective_provider_name_with(config, env) {
        Some(name) => {
            let Some(entry) = lookup(&name) else {
                // Unknown names are fine against a custom endpoint.
                if config.api_base.is_some() {
                    return Ok(());
                }
                return Err(ExtractError::ProviderNotConfigured {
                    provider: name,
                    hint: format!(
                        "Known providers: {}",
                        known_provider_names().join(", ")
                    ),
                });
            };
            match entry.credential_env {
                None => Ok(()),
                Some(_) if has_key => Ok(()),
                Some(var) if env(var).is_some() => Ok(()),
                Some(var) => Err(ExtractError::MissingCredential {
                    provider: entry.name.to_string(),
                    hint: format!("Set {var} or pass --api-key."),
                }),
            }
        }
        None => {
            let any_key = PROVIDERS
                .iter()
                .filter_map(|p| p.credential_env)
                .any(|var| env(var).is_some());
            if any_key {
                Ok(())
            } else {
                let vars: Vec<&str> = PROVIDERS.iter().filter_map(|p| p.credential_env).collect();
                Err(ExtractError::MissingCredential {
                    provider: "auto".to_string(),
                    hint: format!(
                        "Set one of {} or choose a local provider with --provider ollama.",
                        vars.join(", ")
                    ),
                })
            }
        }
    }
}

// ── Provider construction ────────────────────────────────────────────────

/// Resolve the provider for one of the two model calls.
pub fn resolve_provider(
    config: &ExtractionConfig,
    role: ModelRole,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = configured_model(config, role).unwrap_or_else(|| default_model(name, role));
        return create_named_provider(name, model, config);
    }

    // 3) EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL, both set
    if let (Some(prov), Some(model)) = (env_var("EDGEQUAKE_LLM_PROVIDER"), env_var("EDGEQUAKE_MODEL")) {
        let model = configured_model(config, role).unwrap_or(model.as_str()).to_string();
        return create_named_provider(&prov, &model, config);
    }

    // 4) Prefer OpenAI when its key is present
    if env_var("OPENAI_API_KEY").is_some() {
        let model = configured_model(config, role).unwrap_or_else(|| default_model("openai", role));
        return create_named_provider("openai", model, config);
    }

    // 5) Full auto-detection
    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, GROQ_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
///
/// `groq` and any provider combined with `config.api_base` go through the
/// OpenAI-compatible client; `openai` with an explicit key skips the
/// environment; everything else goes through [`ProviderFactory`].
fn create_named_provider(
    name: &str,
    model: &str,
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    let name = canonical_name(name);
    debug!("Creating provider '{}' with model '{}'", name, model);

    if let Some(ref base) = config.api_base {
        let credential_env = lookup(&name).and_then(|e| e.credential_env);
        return openai_compatible(&name, base, credential_env, model);
    }

    match name.as_str() {
        "openai" if config.api_key.is_some() => {
            let key = config.api_key.clone().unwrap_or_default();
            Ok(Arc::new(OpenAIProvider::new(key).with_model(model)))
        }
        "groq" => openai_compatible(
            "groq",
            "https://api.groq.com/openai/v1",
            Some("GROQ_API_KEY"),
            model,
        ),
        _ => ProviderFactory::create_llm_provider(&name, model).map_err(|e| {
            ExtractError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        }),
    }
}

fn openai_compatible(
    name: &str,
    base_url: &str,
    credential_env: Option<&str>,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    let provider_config = ProviderConfig {
        name: name.to_string(),
        display_name: name.to_string(),
        provider_type: ConfigProviderType::OpenAICompatible,
        api_key_env: credential_env.map(str::to_string),
        base_url: Some(base_url.trim_end_matches('/').to_string()),
        default_llm_model: Some(model.to_string()),
        ..Default::default()
    };
    let provider = OpenAICompatibleProvider::from_config(provider_config)
        .map_err(|e| ExtractError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        })?
        .with_model(model);
    Ok(Arc::new(provider))
}
