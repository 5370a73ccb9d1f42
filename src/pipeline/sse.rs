//! OpenAI-compatible chat streaming over server-sent events.
//!
//! The provider abstraction answers a chat request with one complete
//! response. For streamed vision replies this module talks to any
//! `/chat/completions` endpoint that speaks the OpenAI wire format (OpenAI,
//! Groq, Mistral, OpenRouter, Ollama, LM Studio) and turns the event stream
//! into a [`FragmentStream`].
//!
//! ```text
//! POST {base}/chat/completions  {"stream": true, ...}
//!   data: {"choices":[{"delta":{"content":"{\"to"}}]}
//!   data: {"choices":[{"delta":{"content":"tal\": 1}"}}]}
//!   data: [DONE]
//! ```

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::provider::{self, default_vision_model, env_var};
use crate::stream::FragmentStream;
use edgequake_llm::ImageData;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const DONE_MARKER: &str = "[DONE]";

/// Sampling parameters of a streamed chat request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub top_p: f32,
}

/// HTTP client for one OpenAI-compatible endpoint and model.
#[derive(Clone)]
pub struct ChatStreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for ChatStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStreamClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

impl ChatStreamClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, ExtractError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        })
    }

    /// Derive endpoint, key and model from the extraction config.
    ///
    /// `config.api_base` wins over the provider's known endpoint; providers
    /// without an OpenAI-compatible endpoint (Anthropic, Gemini) need one.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let name =
            provider::effective_provider_name(config).unwrap_or_else(|| "openai".to_string());
        let entry = provider::lookup(&name);

        let base_url = match (&config.api_base, entry.and_then(|e| e.api_base)) {
            (Some(base), _) => base.clone(),
            (None, Some(base)) => base.to_string(),
            (None, None) => {
                return Err(ExtractError::InvalidConfig(format!(
                    "provider '{name}' has no OpenAI-compatible endpoint for streaming; \
                     pass --api-base or drop --stream"
                )))
            }
        };
        let api_key = config.api_key.clone().or_else(|| {
            entry
                .and_then(|e| e.credential_env)
                .and_then(env_var)
        });
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| default_vision_model(&name).to_string());

        Self::new(base_url, api_key, model, config.api_timeout_secs)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// JSON body of a streamed single-turn vision request.
    pub fn request_body(&self, prompt: &str, image: &ImageData, options: StreamOptions) -> Value {
        json!({
            "model": self.model,
            "stream": true,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_completion_tokens": options.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image.to_data_uri() } }
                ]
            }]
        })
    }

    /// Send a request body and stream back content fragments.
    ///
    /// Connection and HTTP-status failures are returned immediately; failures
    /// after the first byte arrive as an `Err` item on the stream.
    pub async fn stream_chat(&self, body: Value) -> Result<FragmentStream, ExtractError> {
        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ExtractError::Upstream {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::Upstream {
                message: format!("HTTP {status}: {}", error_message(&detail)),
            });
        }

        let (tx, rx) = mpsc::channel::<Result<String, ExtractError>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ExtractError::Upstream {
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                for payload in decoder.push(&chunk) {
                    if !forward(&tx, &payload).await {
                        return;
                    }
                }
            }
            for payload in decoder.finish() {
                if !forward(&tx, &payload).await {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Send one event payload downstream. Returns `false` when the stream is over.
async fn forward(tx: &mpsc::Sender<Result<String, ExtractError>>, payload: &str) -> bool {
    if payload.trim() == DONE_MARKER {
        return false;
    }
    match parse_delta(payload) {
        Ok(Some(text)) => tx.send(Ok(text)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            warn!("Stream error event: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Content text of one `chat.completion.chunk` event.
///
/// Role-only and empty deltas yield `None`. An `error` object in the event
/// becomes `ExtractError::Upstream`.
pub fn parse_delta(payload: &str) -> Result<Option<String>, ExtractError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| ExtractError::Upstream {
        message: format!("malformed stream event: {e}"),
    })?;
    if value.get("error").is_some() {
        return Err(ExtractError::Upstream {
            message: error_message(payload),
        });
    }
    let content = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(content)
}

/// Best-effort human message from an OpenAI-style error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Incremental server-sent-events decoder.
///
/// Bytes may split anywhere, including inside a multi-byte character, so
/// lines are buffered as bytes and decoded only once complete. Consecutive
/// `data:` lines of one event are joined with `\n`; comments and other
/// fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk; return the data payloads of every completed event.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &b in chunk {
            if b == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.handle_line(&line, &mut events);
            } else {
                self.line.push(b);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.handle_line(&line, &mut events);
        }
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
        events
    }

    fn handle_line(&mut self, raw: &[u8], events: &mut Vec<String>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.join("\n"));
                self.data.clear();
            }
            return;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            self.data.push(rest.to_string());
        } else {
            debug!("Ignoring SSE line: {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_events() {
        let mut d = SseDecoder::default();
        assert!(d.push(b"data: {\"a\"").is_empty());
        let events = d.push(b": 1}\n\ndata: [DONE]\n\n");
        assert_eq!(events, vec!["{\"a\": 1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn decoder_handles_crlf_and_comments() {
        let mut d = SseDecoder::default();
        let events = d.push(b": keep-alive\r\n\r\ndata: x\r\n\r\n");
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_split_across_chunks() {
        let text = "data: reçu\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut d = SseDecoder::default();
        assert!(d.push(&text[..split]).is_empty());
        assert_eq!(d.push(&text[split..]), vec!["reçu".to_string()]);
    }

    #[test]
    fn decoder_finish_flushes_unterminated_event() {
        let mut d = SseDecoder::default();
        assert!(d.push(b"data: tail").is_empty());
        assert_eq!(d.finish(), vec!["tail".to_string()]);
    }

    #[test]
    fn delta_content_extracted() {
        let p = r#"{"choices":[{"index":0,"delta":{"content":"{\"a\""}}]}"#;
        assert_eq!(parse_delta(p).unwrap().as_deref(), Some("{\"a\""));
    }

    #[test]
    fn role_only_delta_is_skipped() {
        let p = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(p).unwrap(), None);
    }

    #[test]
    fn error_event_is_upstream() {
        let p = r#"{"error":{"message":"rate limit reached","type":"tokens"}}"#;
        let err = parse_delta(p).unwrap_err();
        assert!(err.to_string().contains("rate limit reached"));
    }

    #[test]
    fn request_body_has_text_and_image_parts() {
        let client = ChatStreamClient::new("https://api.groq.com/openai/v1/", None, "m", None).unwrap();
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        let image = ImageData::new("QUJD", "image/png");
        let body = client.request_body(
            "extract",
            &image,
            StreamOptions {
                temperature: 1.0,
                max_tokens: 1024,
                top_p: 1.0,
            },
        );
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_completion_tokens"], 1024);
        assert_eq!(body["messages"][0]["content"][0]["text"], "extract");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn from_config_needs_endpoint_for_anthropic() {
        let config = ExtractionConfig::builder()
            .provider_name("anthropic")
            .build()
            .unwrap();
        assert!(matches!(
            ChatStreamClient::from_config(&config),
            Err(ExtractError::InvalidConfig(_))
        ));
    }

    #[test]
    fn from_config_uses_known_endpoint_and_default_model() {
        let config = ExtractionConfig::builder()
            .provider_name("groq")
            .api_key("gsk_test")
            .build()
            .unwrap();
        let client = ChatStreamClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(client.model(), "meta-llama/llama-4-scout-17b-16e-instruct");
        assert!(!format!("{client:?}").contains("gsk_test"));
    }
}
