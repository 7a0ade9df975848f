//! Streaming response aggregator (spec §4.11): turns an unbounded stream of
//! model chunks into zero or more partial events plus one final non-partial,
//! turn-complete event.
//!
//! The teacher never aggregates at this granularity — `ClientWrapper::
//! send_message_stream` (see `client_wrapper.rs`) hands its caller a stream
//! of `MessageChunk`s and leaves concatenation to the caller, which
//! `Agent::generate_with_tokens` does ad hoc by pushing `chunk.delta` onto a
//! `String` as it iterates. This module generalizes that same
//! concatenate-as-you-go idea into a standalone, independently testable
//! aggregator that also merges function-call argument fragments by id,
//! which the teacher's chat-only streaming never needs to do.

use std::collections::HashMap;

use crate::content::{Content, FunctionCall, Part, Role};
use crate::model::{LLMResponse, TokenUsage};

/// Accumulates [`LLMResponse`] chunks into one final aggregate, merging text
/// in arrival order and function-call argument fragments by id (spec §4.11).
#[derive(Default)]
pub struct ResponseAggregator {
    text: String,
    calls: Vec<String>,
    call_names: HashMap<String, String>,
    call_arg_fragments: HashMap<String, String>,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the running aggregate. Chunks are expected in
    /// arrival order; this does not reorder.
    pub fn push(&mut self, chunk: &LLMResponse) {
        for part in &chunk.content.parts {
            match part {
                Part::Text { text } => self.text.push_str(text),
                Part::FunctionCall { function_call } => {
                    if !self.call_arg_fragments.contains_key(&function_call.id) {
                        self.calls.push(function_call.id.clone());
                    }
                    self.call_names
                        .insert(function_call.id.clone(), function_call.name.clone());
                    let fragment = self
                        .call_arg_fragments
                        .entry(function_call.id.clone())
                        .or_default();
                    fragment.push_str(&args_fragment(&function_call.args));
                }
                _ => {}
            }
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason.clone();
        }
    }

    /// Produce the final, non-partial, turn-complete aggregate event
    /// (spec §4.11: "the final aggregated event has
    /// `partial=false, turnComplete=true`").
    pub fn finish(self) -> LLMResponse {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(Part::text(self.text));
        }
        for id in self.calls {
            let name = self.call_names.get(&id).cloned().unwrap_or_default();
            let fragment = self.call_arg_fragments.get(&id).cloned().unwrap_or_default();
            let args = serde_json::from_str(&fragment).unwrap_or(serde_json::Value::Null);
            parts.push(Part::FunctionCall {
                function_call: FunctionCall { id, name, args },
            });
        }
        LLMResponse {
            content: Content::new(Role::Model, parts),
            finish_reason: self.finish_reason,
            usage: self.usage,
            error_code: None,
            error_message: None,
            partial: false,
            turn_complete: true,
        }
    }
}

/// A chunk's function-call args may already arrive as a parsed JSON value
/// (non-streaming providers) or as a string fragment of a larger JSON
/// document (native streaming providers that stream argument text). Either
/// way this yields the string fragment to concatenate.
fn args_fragment(args: &serde_json::Value) -> String {
    match args {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
