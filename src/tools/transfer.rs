//! The built-in `transfer_to_agent` virtual tool (spec §4.2 "Transfer-to-agent").
//!
//! Unlike every other tool, this one is never dispatched through
//! [`super::dispatch`] — the turn loop recognizes its name, validates the
//! target against the transfer policy (`agent::transfer_policy`) itself, and
//! emits the function-call/function-response pair directly rather than
//! calling `run`. The `Tool` impl exists only so its declaration is included
//! in every `LlmAgent`'s tool list the same way any other tool's is.

use async_trait::async_trait;

use super::{Tool, ToolContext, ToolMetadata, ToolParameter, ToolParameterType};
use crate::error::{AgentError, Result};

/// Reserved tool name the turn loop intercepts before ordinary dispatch.
pub const TRANSFER_TO_AGENT: &str = "transfer_to_agent";

pub struct TransferToAgent;

#[async_trait]
impl Tool for TransferToAgent {
    fn name(&self) -> &str {
        TRANSFER_TO_AGENT
    }

    fn description(&self) -> &str {
        "Transfers the conversation to another agent in the tree by name."
    }

    fn declaration(&self) -> ToolMetadata {
        ToolMetadata::new(self.name(), self.description()).with_parameter(
            ToolParameter::new("agent_name", ToolParameterType::String)
                .with_description("the name of the agent to transfer control to")
                .required(),
        )
    }

    /// Never actually invoked: the turn loop intercepts `transfer_to_agent`
    /// calls before reaching ordinary dispatch (spec §4.2). Present so a
    /// caller that dispatches it anyway (e.g. a test harness) gets a clear
    /// error rather than silent no-op behavior.
    async fn run(&self, _ctx: &mut ToolContext<'_>, _args: serde_json::Value) -> Result<serde_json::Value> {
        Err(AgentError::internal(
            "transfer_to_agent must be intercepted by the turn loop, not dispatched",
        ))
    }
}

/// Extract the `agent_name` argument from a `transfer_to_agent` function
/// call's args, failing with `InvalidArgument` if it's missing or not a
/// string.
pub fn target_agent_name(args: &serde_json::Value) -> Result<String> {
    args.get("agent_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AgentError::invalid_argument("transfer_to_agent requires an 'agent_name' string argument"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_agent_name_reads_string_argument() {
        let args = serde_json::json!({"agent_name": "billing"});
        assert_eq!(target_agent_name(&args).unwrap(), "billing");
    }

    #[test]
    fn target_agent_name_rejects_missing_argument() {
        let err = target_agent_name(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
