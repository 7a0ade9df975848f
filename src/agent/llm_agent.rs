//! The LLM agent turn loop (spec §4.2) — the core of the core.
//!
//! Grounded on the teacher's `Agent::send`/`Agent::generate_with_tokens`
//! (`agent.rs`): both run a `loop { ... }` that calls the model, parses a
//! tool call out of the response, dispatches it through the registry, and
//! feeds the result back in, capped by a hardcoded `max_tool_iterations = 5`.
//! This module keeps that shape — model call, parse/dispatch, feed back,
//! bounded iteration — and replaces the teacher's single-tool-call-per-reply
//! JSON-in-text parsing with the structured multi-call function-calling
//! contract spec §4.2/§4.3 require, plus the hook short-circuit chain, the
//! built-in transfer tool, long-running suspension, and confirmation.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;

use crate::aggregator::ResponseAggregator;
use crate::content::{Content, Part, Role};
use crate::context::{InvocationContext, StreamingMode};
use crate::error::{AgentError, ErrorKind, Result};
use crate::event::{Author, Event, EventActions};
use crate::hooks::{
    run_after_model, run_before_model, run_on_model_error, run_after_tool, run_before_tool, run_on_tool_error,
    ModelHook, ToolHook,
};
use crate::model::{LLMRequest, LLMResponse, Model};
use crate::request_processor::RequestProcessorPipeline;
use crate::tools::confirmation::{decode_confirmation, ConfirmationRequest, CONFIRMATION_REQUEST};
use crate::tools::transfer::{target_agent_name, TRANSFER_TO_AGENT};
use crate::tools::{dispatch, ToolConfirmation, ToolContext, ToolMetadata, ToolRegistry};

use super::{transfer_rejected, wrap_with_agent_hooks, Agent, AgentMeta, EventStream, TransferPolicy};

/// An LLM-backed agent: one node in the tree that actually talks to a model
/// and dispatches tool calls (spec §4.2). Workflow agents (§4.4) compose
/// these and each other.
pub struct LlmAgent {
    meta: AgentMeta,
    model: Arc<dyn Model>,
    tool_registry: ToolRegistry,
    model_hooks: Vec<Arc<dyn ModelHook>>,
    tool_hooks: Vec<Arc<dyn ToolHook>>,
    request_processors: RequestProcessorPipeline,
    transfer_policy: TransferPolicy,
    /// When set, the agent operates in output-schema mode (spec §4.2
    /// "Output schema mode"): tool use and transfer are disallowed and the
    /// agent must produce one structured response matching this schema.
    output_schema: Option<serde_json::Value>,
}

impl LlmAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>, model: Arc<dyn Model>) -> LlmAgentBuilder {
        LlmAgentBuilder::new(name, description, model)
    }

    fn has_tools(&self) -> bool {
        !self.tool_registry.is_empty()
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn description(&self) -> &str {
        &self.meta.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.meta.sub_agents
    }

    fn transfer_policy(&self) -> TransferPolicy {
        self.transfer_policy
    }

    fn run<'a>(&'a self, invocation: InvocationContext) -> EventStream<'a> {
        let body = self.turn_loop(invocation.clone());
        wrap_with_agent_hooks(
            self.meta.name.clone(),
            self.meta.before_agent_hooks.clone(),
            self.meta.after_agent_hooks.clone(),
            invocation,
            body,
        )
    }
}

impl LlmAgent {
    fn turn_loop<'a>(&'a self, invocation: InvocationContext) -> impl futures::Stream<Item = Result<Event>> + Send + 'a {
        async_stream::try_stream! {
            let session = invocation.session().await?;
            let mut request = self.request_processors.build(&invocation, &session).await;

            if let Some(schema) = &self.output_schema {
                request.generation_config.response_schema = Some(schema.clone());
                request.tools.clear();
            } else {
                let has_parent = invocation
                    .tree
                    .as_ref()
                    .map(|t| t.parent_map.parent_of(self.name()).is_some())
                    .unwrap_or(false);
                let has_peers = invocation
                    .tree
                    .as_ref()
                    .and_then(|t| t.parent_map.parent_of(self.name()))
                    .and_then(|parent_name| t_peer_count(&invocation, parent_name, self.name()))
                    .unwrap_or(false);
                let offers_transfer = self.transfer_policy.offers_transfer(has_parent, has_peers, !self.sub_agents().is_empty());
                if offers_transfer && invocation.tree.is_some() {
                    request.tools.push(transfer_tool_declaration());
                }
            }

            if let Some(resumed) = try_resume_confirmation(self, &invocation, &session).await? {
                yield resumed;
            }

            let max_iterations = invocation.run_config.max_tool_iterations;
            let mut iteration = 0usize;

            loop {
                if invocation.is_cancelled() || invocation.is_invocation_ended() {
                    return;
                }

                let (partial_chunks, response) = self.call_model(&invocation, &mut request).await?;

                for chunk in &partial_chunks {
                    if chunk.content.parts.is_empty() {
                        continue;
                    }
                    let partial_event = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
                        .with_content(chunk.content.clone())
                        .with_partial(true);
                    yield partial_event;
                }

                let model_event = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
                    .with_content(response.content.clone());
                yield model_event;

                if !response.content.has_function_calls() {
                    return;
                }

                if self.output_schema.is_some() {
                    // Output-schema mode disallows tool use and transfer
                    // (spec §4.2); a model that emits a function-call anyway
                    // is treated as having produced its terminal answer.
                    return;
                }

                if iteration >= max_iterations {
                    let warning = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
                        .with_content(Content::from_text(Role::Model, "Maximum tool iterations reached."));
                    yield warning;
                    return;
                }
                iteration += 1;

                request.contents.push(response.content.clone());

                let mut response_parts = Vec::new();
                let mut long_running_ids = HashSet::new();
                let mut transfer_target: Option<String> = None;
                let mut suspended_on_confirmation = false;

                for call in response.content.function_calls() {
                    if call.name == TRANSFER_TO_AGENT {
                        match self.handle_transfer(&invocation, call).await {
                            Ok((event, target)) => {
                                yield event;
                                transfer_target = Some(target);
                            }
                            Err(error_response) => {
                                response_parts.push(error_response);
                            }
                        }
                        continue;
                    }

                    let tool = match self.tool_registry.get(&call.name) {
                        Some(tool) => tool,
                        None => {
                            response_parts.push(Part::function_response(
                                call.id.clone(),
                                call.name.clone(),
                                serde_json::json!({"error": format!("unknown tool '{}'", call.name)}),
                            ));
                            continue;
                        }
                    };

                    if tool.requires_confirmation(&call.args) {
                        let mut tool_ctx = ToolContext::new(&invocation, call.id.clone());
                        if tool_ctx.confirmation.is_none() {
                            let request_payload = ConfirmationRequest::new(call.id.clone(), call.name.clone(), call.args.clone());
                            let args = request_payload.into_args()?;
                            let confirm_event = Event::new(
                                invocation.invocation_id.clone(),
                                Author::Agent(self.name().to_string()),
                                chrono::Utc::now(),
                            )
                            .with_content(Content::new(
                                Role::Model,
                                vec![Part::function_call(uuid_for_confirmation(&call.id), CONFIRMATION_REQUEST, args)],
                            ))
                            .with_actions(EventActions::new().with_escalate());
                            yield confirm_event;
                            suspended_on_confirmation = true;
                            break;
                        }
                    }

                    let mut tool_ctx = ToolContext::new(&invocation, call.id.clone());
                    // Plugin-level before-tool callbacks run as the outer
                    // layer, ahead of this agent's own tool hooks (spec
                    // §4.7), mirroring the before-model/before-agent
                    // layering elsewhere in the turn loop.
                    let plugin_before = match &invocation.plugins {
                        Some(plugins) => plugins.before_tool(&tool_ctx, &call.name, &call.args).await,
                        None => None,
                    };
                    let before_result = match plugin_before {
                        Some(result) => Some(result),
                        None => run_before_tool(&self.tool_hooks, &tool_ctx, &call.name, &call.args).await,
                    };
                    let result = match before_result {
                        Some(result) => Ok(result),
                        None => dispatch(tool.as_ref(), &mut tool_ctx, call.args.clone()).await,
                    };

                    let result = match result {
                        Ok(value) => {
                            let value = run_after_tool(&self.tool_hooks, &tool_ctx, &call.name, &value).await.unwrap_or(value);
                            match &invocation.plugins {
                                Some(plugins) => plugins.after_tool(&tool_ctx, &call.name, &value).await.unwrap_or(value),
                                None => value,
                            }
                        }
                        Err(error) => {
                            let recovered = match run_on_tool_error(&self.tool_hooks, &tool_ctx, &call.name, &error).await {
                                Some(recovered) => Some(recovered),
                                None => match &invocation.plugins {
                                    Some(plugins) => plugins.on_tool_error(&tool_ctx, &call.name, &error).await,
                                    None => None,
                                },
                            };
                            match recovered {
                                Some(recovered) => recovered,
                                None => Err(error)?,
                            }
                        }
                    };

                    if tool.is_long_running() {
                        long_running_ids.insert(call.id.clone());
                    }

                    response_parts.push(Part::function_response(call.id.clone(), call.name.clone(), result));
                }

                if !response_parts.is_empty() {
                    let mut response_event = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
                        .with_content(Content::new(Role::Tool, response_parts.clone()));
                    if !long_running_ids.is_empty() {
                        response_event = response_event.with_long_running_tool_ids(long_running_ids.clone());
                    }
                    yield response_event;
                    request.contents.push(Content::new(Role::Tool, response_parts));
                }

                if suspended_on_confirmation {
                    return;
                }

                if let Some(target) = transfer_target {
                    let transfer_event = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
                        .with_actions(EventActions::new().with_transfer_to_agent(target));
                    yield transfer_event;
                    return;
                }

                if !long_running_ids.is_empty() {
                    return;
                }
            }
        }
    }

    /// Invoke the model, returning any intermediate chunks streamed along
    /// the way plus the final, non-partial aggregate (spec §4.11). Outside
    /// of `StreamingMode::None` the chunks are merged through a
    /// [`ResponseAggregator`] exactly as the teacher's `Agent::
    /// generate_with_tokens` concatenates `chunk.delta` onto a `String` as
    /// it iterates `send_message_stream`.
    async fn call_model(&self, invocation: &InvocationContext, request: &mut LLMRequest) -> Result<(Vec<LLMResponse>, LLMResponse)> {
        // Plugin-level before-model callbacks run as the outer layer, ahead
        // of this agent's own before-model hooks (spec §4.7), mirroring the
        // before-agent layering in `wrap_with_agent_hooks`.
        if let Some(plugins) = &invocation.plugins {
            if let Some(response) = plugins.before_model(invocation, request).await {
                let response = self.run_after_model_layers(invocation, response).await;
                return Ok((Vec::new(), response));
            }
        }

        if let Some(response) = run_before_model(&self.model_hooks, invocation, request).await {
            let response = self.run_after_model_layers(invocation, response).await;
            return Ok((Vec::new(), response));
        }

        if invocation.run_config.streaming_mode == StreamingMode::None {
            let response = match self.model.generate(request).await {
                Ok(response) => response,
                Err(error) => match self.run_on_model_error_layers(invocation, &error).await {
                    Some(recovered) => recovered,
                    None => return Err(error),
                },
            };
            let response = self.run_after_model_layers(invocation, response).await;
            return Ok((Vec::new(), response));
        }

        let stream = match self.model.generate_stream(request).await {
            Ok(stream) => stream,
            Err(error) => match self.run_on_model_error_layers(invocation, &error).await {
                Some(recovered) => {
                    let recovered = self.run_after_model_layers(invocation, recovered).await;
                    return Ok((Vec::new(), recovered));
                }
                None => return Err(error),
            },
        };

        futures::pin_mut!(stream);
        let mut aggregator = ResponseAggregator::new();
        let mut chunks = Vec::new();
        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(error) => match self.run_on_model_error_layers(invocation, &error).await {
                    Some(recovered) => recovered,
                    None => return Err(error),
                },
            };
            aggregator.push(&chunk);
            chunks.push(chunk);
        }

        let response = aggregator.finish();
        let response = self.run_after_model_layers(invocation, response).await;
        Ok((chunks, response))
    }

    /// Run this agent's after-model hooks (inner layer) then, if no hook
    /// replaced the response, the plugin manager's after-model callbacks
    /// (outer layer) — symmetric with the before-model layering above.
    async fn run_after_model_layers(&self, invocation: &InvocationContext, response: LLMResponse) -> LLMResponse {
        let response = run_after_model(&self.model_hooks, invocation, &response).await.unwrap_or(response);
        if let Some(plugins) = &invocation.plugins {
            return plugins.after_model(invocation, &response).await.unwrap_or(response);
        }
        response
    }

    /// Offer a model error to this agent's own on-error hooks first, then to
    /// the plugin manager's, matching the before/after layering (spec §4.7).
    async fn run_on_model_error_layers(&self, invocation: &InvocationContext, error: &AgentError) -> Option<LLMResponse> {
        if let Some(recovered) = run_on_model_error(&self.model_hooks, invocation, error).await {
            return Some(recovered);
        }
        if let Some(plugins) = &invocation.plugins {
            return plugins.on_model_error(invocation, error).await;
        }
        None
    }

    /// Validate and execute a `transfer_to_agent` call (spec §4.2
    /// "Transfer-to-agent"). On success, returns the synthetic
    /// function-response event plus the target's name for the turn loop to
    /// act on; on failure, returns a function-response `Part` carrying the
    /// rejection, left for the model to see and react to rather than ending
    /// the stream with a fatal error.
    async fn handle_transfer(
        &self,
        invocation: &InvocationContext,
        call: &crate::content::FunctionCall,
    ) -> std::result::Result<(Event, String), crate::content::Part> {
        let target = match target_agent_name(&call.args) {
            Ok(name) => name,
            Err(error) => {
                return Err(Part::function_response(call.id.clone(), call.name.clone(), serde_json::json!({"error": error.message()})));
            }
        };

        let allowed = invocation
            .tree
            .as_ref()
            .map(|tree| tree.can_transfer(self.name(), &target))
            .unwrap_or(false);

        if !allowed {
            let error = transfer_rejected(&target);
            return Err(Part::function_response(call.id.clone(), call.name.clone(), serde_json::json!({"error": error.message()})));
        }

        let event = Event::new(invocation.invocation_id.clone(), Author::Agent(self.name().to_string()), chrono::Utc::now())
            .with_content(Content::new(
                Role::Tool,
                vec![Part::function_response(call.id.clone(), call.name.clone(), serde_json::json!({"transferred_to": target}))],
            ));
        Ok((event, target))
    }
}

/// If the invocation's user content carries a function-response answering a
/// pending confirmation request, resolve it against session history,
/// dispatch the originally gated tool, and return a function-response event
/// keyed by the *original* call id so the model's earlier function-call
/// still has a matching answer (spec §4.3 "Confirmation").
async fn try_resume_confirmation(
    agent: &LlmAgent,
    invocation: &InvocationContext,
    session: &crate::session::Session,
) -> Result<Option<Event>> {
    let Some(user_content) = &invocation.user_content else { return Ok(None) };
    let Some(answer) = user_content
        .function_responses()
        .into_iter()
        .find(|r| r.name == CONFIRMATION_REQUEST)
    else {
        return Ok(None);
    };

    let confirmed = decode_confirmation(&answer.response)?;

    let original = session
        .events()
        .iter()
        .rev()
        .find_map(|event| {
            event
                .content
                .as_ref()
                .and_then(|c| c.function_calls().into_iter().find(|call| call.id == answer.id && call.name == CONFIRMATION_REQUEST))
        })
        .ok_or_else(|| AgentError::new(ErrorKind::FailedPrecondition, "no matching confirmation request found in session history"))?;

    let request: ConfirmationRequest = serde_json::from_value(original.args.clone())
        .map_err(|e| AgentError::internal(format!("malformed confirmation request payload: {e}")))?;

    let tool = agent
        .tool_registry
        .get(&request.tool_name)
        .ok_or_else(|| AgentError::not_found(format!("tool '{}' no longer registered", request.tool_name)))?;

    let mut ctx = ToolContext::new(invocation, request.original_function_call_id.clone())
        .with_confirmation(ToolConfirmation { confirmed });

    let result = if confirmed {
        dispatch(tool.as_ref(), &mut ctx, request.args.clone()).await?
    } else {
        serde_json::json!({"confirmed": false, "error": "user declined confirmation"})
    };

    let event = Event::new(invocation.invocation_id.clone(), Author::Agent(agent.name().to_string()), chrono::Utc::now())
        .with_content(Content::new(
            Role::Tool,
            vec![Part::function_response(request.original_function_call_id, request.tool_name, result)],
        ));
    Ok(Some(event))
}

fn transfer_tool_declaration() -> ToolMetadata {
    crate::tools::transfer::TransferToAgent.declaration()
}

fn uuid_for_confirmation(original_call_id: &str) -> String {
    format!("confirm-{original_call_id}")
}

/// Best-effort peer check: `true` if `parent_name` has more than one child,
/// meaning `agent_name` has at least one sibling. Kept as a free function
/// (rather than a `ParentMap` method) since it only needs the parent's
/// child count, not the parent map's own bookkeeping.
fn t_peer_count(invocation: &InvocationContext, parent_name: &str, agent_name: &str) -> Option<bool> {
    let tree = invocation.tree.as_ref()?;
    let parent = tree.get(parent_name)?;
    Some(parent.sub_agents().iter().any(|a| a.name() != agent_name))
}

/// Consuming builder for [`LlmAgent`], matching the teacher's
/// `with_*`-method builder idiom (`agent.rs`'s `Agent::with_event_handler`,
/// `with_tool_registry`, etc.).
pub struct LlmAgentBuilder {
    meta: AgentMeta,
    model: Arc<dyn Model>,
    tool_registry: ToolRegistry,
    model_hooks: Vec<Arc<dyn ModelHook>>,
    tool_hooks: Vec<Arc<dyn ToolHook>>,
    system_instruction: Option<String>,
    include_history: bool,
    transfer_policy: TransferPolicy,
    output_schema: Option<serde_json::Value>,
}

impl LlmAgentBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            meta: AgentMeta::new(name, description),
            model,
            tool_registry: ToolRegistry::new(),
            model_hooks: Vec::new(),
            tool_hooks: Vec::new(),
            system_instruction: None,
            include_history: true,
            transfer_policy: TransferPolicy::default(),
            output_schema: None,
        }
    }

    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.meta = self.meta.with_sub_agent(agent);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn crate::tools::Tool>) -> Self {
        self.tool_registry.register(tool);
        self
    }

    pub fn with_model_hook(mut self, hook: Arc<dyn ModelHook>) -> Self {
        self.model_hooks.push(hook);
        self
    }

    pub fn with_tool_hook(mut self, hook: Arc<dyn ToolHook>) -> Self {
        self.tool_hooks.push(hook);
        self
    }

    pub fn with_before_agent_hook(mut self, hook: Arc<dyn crate::hooks::AgentHook>) -> Self {
        self.meta = self.meta.with_before_agent_hook(hook);
        self
    }

    pub fn with_after_agent_hook(mut self, hook: Arc<dyn crate::hooks::AgentHook>) -> Self {
        self.meta = self.meta.with_after_agent_hook(hook);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_include_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    pub fn with_transfer_policy(mut self, policy: TransferPolicy) -> Self {
        self.transfer_policy = policy;
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> LlmAgent {
        let mut processors: Vec<Box<dyn crate::request_processor::RequestProcessor>> = Vec::new();
        if let Some(instruction) = self.system_instruction {
            processors.push(Box::new(crate::request_processor::SystemInstructionProcessor { instruction }));
        }
        processors.push(Box::new(crate::request_processor::ToolDeclarationProcessor { registry: self.tool_registry.clone() }));
        processors.push(Box::new(crate::request_processor::ContentInclusionProcessor { include_history: self.include_history }));
        processors.push(Box::new(crate::request_processor::CurrentTurnProcessor));

        LlmAgent {
            meta: self.meta,
            model: self.model,
            tool_registry: self.tool_registry,
            model_hooks: self.model_hooks,
            tool_hooks: self.tool_hooks,
            request_processors: RequestProcessorPipeline::new(processors),
            transfer_policy: self.transfer_policy,
            output_schema: self.output_schema,
        }
    }
}
