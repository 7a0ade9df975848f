//! Request processors: the pluggable steps that build an [`LLMRequest`] from
//! an agent's configuration and session history before each model call
//! (spec §4.2: "build LLMRequest ◄── apply request processors (inject
//! instructions, tools, contents, etc.)").
//!
//! Grounded on the teacher's `Agent::send`, which inline-builds its
//! tool-description string and appends it to the user message
//! (`agent.rs` lines ~891-921) before calling `session.send_message`. This
//! module lifts that inline string-building into a small ordered pipeline of
//! `RequestProcessor`s so an `LlmAgent` can compose system-instruction
//! injection, tool-declaration injection, and history inclusion
//! independently instead of one hardcoded sequence of string concatenation.

use async_trait::async_trait;

use crate::content::{Content, Role};
use crate::context::InvocationContext;
use crate::model::LLMRequest;
use crate::session::Session;
use crate::tools::ToolRegistry;

/// One step in building the per-turn [`LLMRequest`]. Processors run in
/// registration order, each free to read the accumulated session history and
/// mutate the request in place.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process(&self, invocation: &InvocationContext, session: &Session, request: &mut LLMRequest);
}

/// Sets `request.system_instruction` to a fixed string.
pub struct SystemInstructionProcessor {
    pub instruction: String,
}

#[async_trait]
impl RequestProcessor for SystemInstructionProcessor {
    async fn process(&self, _invocation: &InvocationContext, _session: &Session, request: &mut LLMRequest) {
        request.system_instruction = Some(self.instruction.clone());
    }
}

/// Populates `request.tools` from a registry's declarations, the
/// generalized form of the teacher's inline "You have access to the
/// following tools:" string (`agent.rs::send`). Declarations are passed as
/// structured [`crate::tools::ToolMetadata`] rather than embedded into the
/// prompt text, since spec §6 models tool declarations as a first-class
/// request field, not a prompt-engineering convention.
pub struct ToolDeclarationProcessor {
    pub registry: ToolRegistry,
}

#[async_trait]
impl RequestProcessor for ToolDeclarationProcessor {
    async fn process(&self, _invocation: &InvocationContext, _session: &Session, request: &mut LLMRequest) {
        request.tools = self.registry.iter().map(|tool| tool.declaration()).collect();
    }
}

/// Includes (or omits) prior session events verbatim in the request's
/// `contents`, per spec §4.2 "Content inclusion policy": "A configuration
/// flag chooses whether prior session events are included verbatim in the
/// LLM request or omitted (e.g. for stateless sub-tasks)." Function-response
/// parts stay adjacent to the calls they answer — event order in the
/// session already guarantees this, so this processor never reorders.
pub struct ContentInclusionProcessor {
    pub include_history: bool,
}

#[async_trait]
impl RequestProcessor for ContentInclusionProcessor {
    async fn process(&self, invocation: &InvocationContext, session: &Session, request: &mut LLMRequest) {
        if !self.include_history {
            if let Some(user_content) = &invocation.user_content {
                request.contents.push(user_content.clone());
            }
            return;
        }
        for event in session.events() {
            if let Some(content) = &event.content {
                request.contents.push(content.clone());
            }
        }
    }
}

/// Appends the current invocation's user content as the final turn, used
/// together with [`ContentInclusionProcessor`] when history is included
/// (the session snapshot taken at turn start may predate the just-appended
/// user event).
pub struct CurrentTurnProcessor;

#[async_trait]
impl RequestProcessor for CurrentTurnProcessor {
    async fn process(&self, invocation: &InvocationContext, session: &Session, request: &mut LLMRequest) {
        if let Some(user_content) = &invocation.user_content {
            let already_present = session
                .events()
                .iter()
                .any(|e| e.content.as_ref().map(|c| content_eq(c, user_content)).unwrap_or(false));
            if !already_present {
                request.contents.push(user_content.clone());
            }
        }
    }
}

fn content_eq(a: &Content, b: &Content) -> bool {
    a.role == b.role && a.text() == b.text() && a.parts.len() == b.parts.len()
}

/// Runs a fixed, ordered pipeline of processors to build one [`LLMRequest`].
pub struct RequestProcessorPipeline {
    processors: Vec<Box<dyn RequestProcessor>>,
}

impl RequestProcessorPipeline {
    pub fn new(processors: Vec<Box<dyn RequestProcessor>>) -> Self {
        Self { processors }
    }

    pub async fn build(&self, invocation: &InvocationContext, session: &Session) -> LLMRequest {
        let mut request = LLMRequest::new();
        for processor in &self.processors {
            processor.process(invocation, session, &mut request).await;
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;

    #[tokio::test]
    async fn system_instruction_processor_sets_instruction() {
        let processor = SystemInstructionProcessor { instruction: "be terse".into() };
        let mut request = LLMRequest::new();
        let session = Session::new(SessionKey::new("a", "u", "s"));
        let invocation = crate::context::InvocationContext::new(
            SessionKey::new("a", "u", "s"),
            std::sync::Arc::new(crate::session::InMemorySessionService::new()),
            "root",
            None,
            crate::context::RunConfig::default(),
        );
        processor.process(&invocation, &session, &mut request).await;
        assert_eq!(request.system_instruction.as_deref(), Some("be terse"));
    }

    #[tokio::test]
    async fn content_inclusion_processor_omits_history_when_disabled() {
        let processor = ContentInclusionProcessor { include_history: false };
        let mut request = LLMRequest::new();
        let session_key = SessionKey::new("a", "u", "s");
        let mut session = Session::new(session_key.clone());
        session.append_event(
            crate::event::Event::new("inv", crate::event::Author::User, chrono::Utc::now())
                .with_content(Content::from_text(Role::User, "old turn")),
        );
        let invocation = crate::context::InvocationContext::new(
            session_key,
            std::sync::Arc::new(crate::session::InMemorySessionService::new()),
            "root",
            Some(Content::from_text(Role::User, "new turn")),
            crate::context::RunConfig::default(),
        );
        processor.process(&invocation, &session, &mut request).await;
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].text(), "new turn");
    }
}
