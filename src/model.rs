//! The model provider contract (spec §6: "Model contract").
//!
//! Generalizes the teacher crate's `client_wrapper::ClientWrapper` trait
//! (`send_message`/`send_message_stream`, provider-agnostic `Message`/
//! `ToolDefinition`/`TokenUsage`) from a flat chat-completions shape into the
//! `LLMRequest`/`LLMResponse` contract spec §6 requires. Concrete providers
//! (OpenAI, Claude, Gemini, Grok HTTP clients) are explicitly out of scope
//! (spec §1) — this module ships the trait and an in-memory `MockModel` used
//! by the test suite, the same role the teacher's `tests::MockClient` plays
//! in `tests/orchestration_tests.rs`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::content::{Content, Role};
use crate::error::Result;
use crate::tools::ToolMetadata;

/// Token accounting for one model round-trip. Carried over from the
/// teacher's `client_wrapper::TokenUsage`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Generation knobs forwarded to the provider. Every field is optional so a
/// request built without an explicit `GenerationConfig` falls back to
/// provider defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// When set, the model must emit a single structured response matching
    /// this JSON Schema instead of free text or tool calls (spec §4.2,
    /// "Output schema mode").
    pub response_schema: Option<serde_json::Value>,
    pub response_mime_type: Option<String>,
}

/// One LLM round-trip's worth of input, built by the turn loop from the
/// invocation's request processors (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct LLMRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolMetadata>,
    pub generation_config: GenerationConfig,
}

impl LLMRequest {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Why the model stopped generating. Kept as an open string (rather than a
/// closed enum) since providers mint their own finish-reason vocabularies;
/// the teacher's `MessageChunk::finish_reason` makes the same choice.
pub type FinishReason = Option<String>;

/// One LLM response — either a terminal aggregate or, while streaming, an
/// incremental chunk with `partial = true` (spec §6, §4.11).
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: Content,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub partial: bool,
    pub turn_complete: bool,
}

impl LLMResponse {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            content: Content::from_text(role, text),
            partial: false,
            turn_complete: true,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some() || self.error_message.is_some()
    }
}

/// A lazy sequence of [`LLMResponse`] chunks, as returned by
/// [`Model::generate_stream`]. Boxed to keep the trait object-safe across
/// heterogeneous provider implementations, mirroring the teacher's boxed
/// `MessageChunkStream` type alias.
pub type LLMResponseStream<'a> = BoxStream<'a, Result<LLMResponse>>;

/// Provider-agnostic contract every LLM backend implements (spec §6).
///
/// Implementations must be `Send + Sync` so a `Model` can be shared across
/// concurrently-running agent branches (spec §4.4.2).
#[async_trait]
pub trait Model: Send + Sync {
    /// Non-streaming round-trip: send `request`, await the complete response.
    async fn generate(&self, request: &LLMRequest) -> Result<LLMResponse>;

    /// Streaming round-trip. The default implementation falls back to
    /// [`Model::generate`] and yields its result as a single terminal chunk,
    /// the same fallback the teacher's `ClientWrapper::send_message_stream`
    /// default provides for providers without native streaming support.
    async fn generate_stream<'a>(&'a self, request: &'a LLMRequest) -> Result<LLMResponseStream<'a>> {
        let response = self.generate(request).await;
        Ok(Box::pin(futures::stream::once(async move { response })))
    }

    /// Identifier for the upstream model (e.g. `"gpt-4.1"`), used in logs.
    fn model_name(&self) -> &str;
}
