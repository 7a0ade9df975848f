//! The tool contract and dispatch guarantees (spec §4.3).
//!
//! Generalizes the teacher's `tool_protocol::{ToolMetadata, ToolParameter,
//! ToolParameterType, Tool}` (declaration/schema side) combined with
//! `Agent::send`'s inline dispatch loop (execution side, `agent.rs`) into one
//! `Tool` trait plus a free `dispatch` function that enforces the guarantees
//! spec §4.3 lists: schema validation before `Run`, non-mapping results
//! wrapped as `{result: ...}`, and panics caught and surfaced as `Internal`
//! rather than killing the process.
//!
//! The teacher's multi-protocol indirection (`ToolProtocol` trait routing a
//! call through MCP/local/custom backends) is dropped — concrete tool
//! transports are out of scope (spec §1) — in favor of tools implementing
//! `Tool` directly, the way the teacher's own `tools::calculator::Calculator`
//! is a concrete struct wrapped by a protocol adapter only to satisfy the
//! multi-protocol abstraction this crate doesn't need.

pub mod confirmation;
pub mod examples;
pub mod registry;
pub mod transfer;

pub use registry::ToolRegistry;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::context::InvocationContext;
use crate::error::{AgentError, ErrorKind, Result};

/// JSON Schema primitive types a [`ToolParameter`] can declare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// One declared input parameter, generalized from the teacher's
/// `tool_protocol::ToolParameter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub items: Option<Box<ToolParameterType>>,
    pub properties: Option<HashMap<String, ToolParameter>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            items: None,
            properties: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A tool's static declaration: name, description, and input schema (spec
/// §4.3, §6). Doubles as the function-calling schema sent to the model in
/// [`crate::model::LLMRequest::tools`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Render this declaration's parameters as a JSON Schema object, used
    /// both to present the tool to the model and to validate incoming args
    /// before `Run` (spec §4.3 dispatch guarantee).
    pub fn input_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut schema = serde_json::Map::new();
            schema.insert(
                "type".to_string(),
                serde_json::Value::String(match param.param_type {
                    ToolParameterType::String => "string",
                    ToolParameterType::Number => "number",
                    ToolParameterType::Integer => "integer",
                    ToolParameterType::Boolean => "boolean",
                    ToolParameterType::Array => "array",
                    ToolParameterType::Object => "object",
                }.to_string()),
            );
            if let Some(description) = &param.description {
                schema.insert("description".to_string(), serde_json::Value::String(description.clone()));
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(schema));
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": serde_json::Value::Object(properties),
            "required": required,
        })
    }
}

/// Approval attached to the context once a user turn supplies
/// `{confirmed: bool}` for a pending confirmation request (spec §4.3
/// "Confirmation").
#[derive(Debug, Clone, Copy)]
pub struct ToolConfirmation {
    pub confirmed: bool,
}

/// Per-call environment passed to [`Tool::run`]: the invoking agent's
/// invocation context, the function-call id being dispatched, and (if one
/// was supplied in this turn) the tool's confirmation decision.
pub struct ToolContext<'a> {
    pub invocation: &'a InvocationContext,
    pub function_call_id: String,
    pub confirmation: Option<ToolConfirmation>,
}

impl<'a> ToolContext<'a> {
    pub fn new(invocation: &'a InvocationContext, function_call_id: impl Into<String>) -> Self {
        Self {
            invocation,
            function_call_id: function_call_id.into(),
            confirmation: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: ToolConfirmation) -> Self {
        self.confirmation = Some(confirmation);
        self
    }
}

/// The tool contract every callable implements (spec §4.3).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn declaration(&self) -> ToolMetadata;

    /// `true` if completion of this tool may span multiple user turns (spec
    /// §4.3 "long-running tool"); its call id is recorded in
    /// `longRunningToolIDs` and the turn ends without waiting on a result.
    fn is_long_running(&self) -> bool {
        false
    }

    /// `true` if this specific call requires user approval before running.
    /// Checked dynamically (the default asks nothing beyond the static
    /// declaration) so a tool can gate only some argument combinations, the
    /// way Scenario C/D's before-tool callbacks gate only specific
    /// parameter values.
    fn requires_confirmation(&self, _args: &serde_json::Value) -> bool {
        false
    }

    async fn run(&self, ctx: &mut ToolContext<'_>, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Execute `tool` against `args`, enforcing every dispatch guarantee spec
/// §4.3 lists:
///
/// 1. Validate `args` against the declared input schema; a mismatch fails
///    with [`ErrorKind::InvalidArgument`] and never calls `Run`.
/// 2. Wrap a non-object result as `{"result": <value>}`.
/// 3. Catch a panic inside `Run` and surface it as [`ErrorKind::Internal`]
///    carrying the tool name, without propagating the panic out of the
///    calling task.
///
/// Confirmation gating (spec §4.3 "Confirmation") is handled by the caller
/// (the LLM agent turn loop, `agent::llm_agent`) before this function is
/// invoked, since it needs access to the enclosing event stream to emit the
/// synthetic confirmation-request event.
pub async fn dispatch(
    tool: &dyn Tool,
    ctx: &mut ToolContext<'_>,
    args: serde_json::Value,
) -> Result<serde_json::Value> {
    validate_args(tool, &args)?;

    let result = AssertUnwindSafe(tool.run(ctx, args)).catch_unwind().await;
    let output = match result {
        Ok(inner) => inner?,
        Err(panic) => {
            let message = panic_message(&panic);
            return Err(AgentError::tool_panic(tool.name(), &message));
        }
    };

    Ok(wrap_non_mapping(output))
}

fn validate_args(tool: &dyn Tool, args: &serde_json::Value) -> Result<()> {
    let schema = tool.declaration().input_schema();
    let compiled = jsonschema::validator_for(&schema).map_err(|e| {
        AgentError::internal(format!("tool '{}' declares an invalid schema: {e}", tool.name()))
    })?;
    if let Err(first_error) = compiled.validate(args) {
        return Err(AgentError::new(
            ErrorKind::InvalidArgument,
            format!("tool '{}' rejected arguments: {}", tool.name(), first_error),
        ));
    }
    Ok(())
}

fn wrap_non_mapping(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(_) => value,
        other => serde_json::json!({ "result": other }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked with a non-string payload".to_string()
    }
}
