//! Vision backend: one image + one instruction → the model's raw text.
//!
//! The request is a single user turn holding the instruction from
//! [`crate::prompts::vision_prompt`] and the image as an inline base64
//! attachment. The reply is returned untouched; fence stripping and JSON
//! parsing happen later in [`crate::pipeline::sanitize`].
//!
//! Two transports carry the same request:
//!
//! * **Single-shot** through the `edgequake_llm` provider ([`VisionExtractor::infer`]).
//! * **Streamed** over an OpenAI-compatible endpoint ([`infer_stream`]),
//!   drained into one string by [`crate::stream::drain_fragments`].
//!
//! Nothing is retried: a failed call is a failed file.

use crate::config::{Backend, ExtractionConfig};
use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::pipeline::encode::encode_image;
use crate::pipeline::input::InputFile;
use crate::pipeline::sse::{ChatStreamClient, StreamOptions};
use crate::prompts::vision_prompt;
use crate::provider::{resolve_provider, ModelRole};
use crate::stream::{drain_fragments, FragmentStream};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// How the vision request reaches the model.
#[derive(Clone)]
pub enum VisionTransport {
    /// One complete response through the provider abstraction.
    Provider(Arc<dyn LLMProvider>),
    /// Server-sent fragments over an OpenAI-compatible endpoint.
    Stream(ChatStreamClient),
}

/// Extractor that sends the whole image to a vision-capable model.
#[derive(Clone)]
pub struct VisionExtractor {
    transport: VisionTransport,
    temperature: f32,
    max_tokens: usize,
}

impl VisionExtractor {
    /// Single-shot extractor over an existing provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            transport: VisionTransport::Provider(provider),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Streaming extractor over an OpenAI-compatible endpoint.
    pub fn streaming(client: ChatStreamClient, config: &ExtractionConfig) -> Self {
        Self {
            transport: VisionTransport::Stream(client),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build from config: streaming when `config.stream`, else a resolved provider.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        if config.stream {
            Ok(Self::streaming(ChatStreamClient::from_config(config)?, config))
        } else {
            let provider = resolve_provider(config, ModelRole::Vision)?;
            Ok(Self::new(provider, config))
        }
    }

    pub fn transport(&self) -> &VisionTransport {
        &self.transport
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            top_p: Some(1.0),
            ..Default::default()
        }
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: 1.0,
        }
    }

    /// Single-shot call through `provider`. Returns the raw reply text.
    pub async fn infer(
        &self,
        provider: &Arc<dyn LLMProvider>,
        image: &InputFile,
        schema: Option<&str>,
    ) -> Result<String, ExtractError> {
        let start = Instant::now();
        let prompt = vision_prompt(schema);
        debug!("Vision prompt: {} chars", prompt.len());

        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![encode_image(image)],
        )];

        let response = provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ExtractError::Upstream {
                message: e.to_string(),
            })?;

        info!(
            "{}: {} input tokens, {} output tokens, {:?}",
            image.filename,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Streamed call: same request with `stream: true`, yielding fragments lazily.
pub async fn infer_stream(
    client: &ChatStreamClient,
    image: &InputFile,
    schema: Option<&str>,
    options: StreamOptions,
) -> Result<FragmentStream, ExtractError> {
    let prompt = vision_prompt(schema);
    let body = client.request_body(&prompt, &encode_image(image), options);
    debug!(
        "Streaming {} to {} ({})",
        image.filename,
        client.endpoint(),
        client.model()
    );
    client.stream_chat(body).await
}

#[async_trait]
impl Extractor for VisionExtractor {
    fn backend(&self) -> Backend {
        Backend::Vision
    }

    fn describe(&self) -> String {
        match &self.transport {
            VisionTransport::Provider(p) => format!("vision {}/{}", p.name(), p.model()),
            VisionTransport::Stream(c) => format!("vision stream {}", c.model()),
        }
    }

    async fn extract(&self, image: &InputFile, schema: Option<&str>) -> Result<String, ExtractError> {
        match &self.transport {
            VisionTransport::Provider(provider) => self.infer(provider, image, schema).await,
            VisionTransport::Stream(client) => {
                let start = Instant::now();
                let fragments = infer_stream(client, image, schema, self.stream_options()).await?;
                let text = drain_fragments(fragments).await?;
                info!("{}: streamed {} bytes in {:?}", image.filename, text.len(), start.elapsed());
                Ok(text)
            }
        }
    }
}


#[cfg(all(test, feature = "server"))]
mod stream_tests {
    use super::*;
    use crate::output::{ExtractedDocument, ExtractionResult};
    use crate::pipeline::input::fixtures;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
    use serde_json::{json, Value};

    fn event(delta: Value) -> String {
        format!("data: {}\n\n", json!({ "choices": [{ "delta": delta }] }))
    }

    async fn completions(Json(body): Json<Value>) -> axum::response::Response {
        if body["stream"] != true || body["messages"][0]["content"][1]["type"] != "image_url" {
            return (StatusCode::BAD_REQUEST, "expected a streamed vision request").into_response();
        }
        let events = [
            event(json!({ "role": "assistant" })),
            event(json!({ "content": "```json\n{\"a\"" })),
            event(json!({ "content": ": 1}\n```" })),
            "data: [DONE]\n\n".to_string(),
            event(json!({ "content": "after done" })),
        ]
        .concat();
        ([("content-type", "text/event-stream")], events).into_response()
    }

    async fn rejected() -> axum::response::Response {
        (
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        )
            .into_response()
    }

    async fn endpoint(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn streaming_extractor(base: String) -> VisionExtractor {
        let client =
            ChatStreamClient::new(base, Some("sk-test".into()), "test-model", Some(5)).unwrap();
        VisionExtractor::streaming(client, &ExtractionConfig::default())
    }

    #[tokio::test]
    async fn streamed_fragments_are_drained_and_parsed() {
        let base = endpoint(Router::new().route("/v1/chat/completions", post(completions))).await;
        let extractor = streaming_extractor(base);
        let image = InputFile::from_bytes("scan.png", fixtures::png()).unwrap();

        let raw = extractor.extract(&image, None).await.unwrap();
        assert_eq!(raw, "```json\n{\"a\": 1}\n```");

        let result = extractor.extract_document(&image, None).await.unwrap();
        let expected = ExtractedDocument::from_value(json!({ "a": 1 }));
        assert_eq!(result, ExtractionResult::Document(expected));
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let base = endpoint(Router::new().route("/v1/chat/completions", post(rejected))).await;
        let extractor = streaming_extractor(base);
        let image = InputFile::from_bytes("scan.png", fixtures::png()).unwrap();

        match extractor.extract(&image, None).await.unwrap_err() {
            ExtractError::Upstream { message } => {
                assert!(message.contains("401"), "{message}");
                assert!(message.contains("Incorrect API key provided"), "{message}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
