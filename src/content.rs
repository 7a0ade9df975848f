//! Message roles and structured content parts shared by [`crate::event::Event`]
//! and [`crate::model::LLMRequest`]/[`crate::model::LLMResponse`].
//!
//! Generalizes the teacher crate's flat `Message { role, content, tool_calls }`
//! (see `client_wrapper::Message`) into an ordered array of tagged parts, per
//! spec §3 and §6: "content parts are an ordered array tagged by part kind
//! (`text`, `functionCall`, `functionResponse`, `inlineData`,
//! `codeExecutionResult`)".

use serde::{Deserialize, Serialize};

/// Role of the speaker a [`Content`] is attributed to in an [`crate::model::LLMRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
    Tool,
}

/// A function call issued by the model, paired with a [`FunctionResponse`] by
/// `id` (spec §3, §8 property 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider- or runtime-assigned call id. Generated by the aggregator when
    /// the provider does not supply one (see `aggregator.rs`).
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// The result of executing a [`FunctionCall`], matched back to it by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

/// Inline binary payload (e.g. an image or file) attached to a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-less raw bytes. Transport-layer encoding is left to the session
    /// service's wire format, not this in-memory representation.
    pub data: Vec<u8>,
    /// Display name used when an artifact service persists this blob and the
    /// runner replaces it with a textual placeholder (spec §4.6 step 5).
    pub display_name: Option<String>,
}

/// The result of an in-process code execution part. Carried through for
/// parity with spec §6's wire format tag list; the core does not execute code
/// itself (no concrete tool implementations ship here, per §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    pub outcome: String,
    pub output: String,
}

/// One tagged fragment of a [`Content`] block.
///
/// Ordering within a `Content`'s `parts` vector is significant: spec §4.2
/// requires "Function-response parts are preserved adjacent to their calls
/// and never reordered."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "functionCall")]
    FunctionCall { function_call: FunctionCall },
    #[serde(rename = "functionResponse")]
    FunctionResponse {
        function_response: FunctionResponse,
    },
    #[serde(rename = "inlineData")]
    InlineData { inline_data: InlineData },
    #[serde(rename = "codeExecutionResult")]
    CodeExecutionResult {
        code_execution_result: CodeExecutionResult,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn function_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Part::FunctionCall {
            function_call: FunctionCall {
                id: id.into(),
                name: name.into(),
                args,
            },
        }
    }

    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Part::FunctionResponse {
            function_response: FunctionResponse {
                id: id.into(),
                name: name.into(),
                response,
            },
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Part::FunctionCall { function_call } => Some(function_call),
            _ => None,
        }
    }

    pub fn as_function_response(&self) -> Option<&FunctionResponse> {
        match self {
            Part::FunctionResponse { function_response } => Some(function_response),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A role-attributed, ordered collection of [`Part`]s.
///
/// `Content` is the unit exchanged in [`crate::model::LLMRequest::contents`]
/// and embedded in each [`crate::event::Event::content`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role),
            parts,
        }
    }

    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![Part::text(text)])
    }

    /// All function-call parts in this content block, in arrival order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts.iter().filter_map(Part::as_function_call).collect()
    }

    /// All function-response parts in this content block, in arrival order.
    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts
            .iter()
            .filter_map(Part::as_function_response)
            .collect()
    }

    /// Concatenation of every text part, in arrival order. Mirrors the
    /// teacher's streaming aggregator behavior of concatenating text deltas
    /// (see `llm_session.rs`'s `send_message_stream` consumers).
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::FunctionCall { .. }))
    }
}
