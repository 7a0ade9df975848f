//! Before/After/OnError lifecycle hooks for model calls, tool calls, and
//! agent runs (spec §4.1, §4.2, §4.3).
//!
//! The teacher observes its turn loop through a single `EventHandler`
//! (`cloudllm::event`) with no-op default methods and no short-circuit
//! ability — it is purely a side channel for logging/metrics. Hooks here
//! follow that same async-trait-with-defaults shape but additionally return
//! `Option<...>`, since spec §4.1 requires the ability to short-circuit the
//! native action: "the first non-null result short-circuits." The ordering
//! discipline is spec's, not the teacher's:
//!
//! - Before-hooks run in declaration order; first `Some(_)` wins.
//! - After-hooks run in **reverse** declaration order; first `Some(_)` wins.
//! - OnError hooks run in declaration order, only after a native-action
//!   error (never a before-hook error), and may recover it into success.
//!
//! A hook that wants to contribute session state without replacing the
//! native result (e.g. it returns `None` to let the turn proceed) calls
//! [`InvocationContext::set_state`] directly; it rides along on whichever
//! non-partial event the agent emits next (see [`crate::agent::wrap_with_agent_hooks`]).

use async_trait::async_trait;

use crate::content::Content;
use crate::context::InvocationContext;
use crate::error::AgentError;
use crate::model::{LLMRequest, LLMResponse};
use crate::tools::ToolContext;

/// Observes and optionally short-circuits one LLM-agent turn's model call
/// (spec §4.2 steps "BeforeModel hooks" / "AfterModel hooks").
#[async_trait]
pub trait ModelHook: Send + Sync {
    /// Runs before `Model::generate`. Returning `Some(response)` skips the
    /// model call entirely and feeds `response` straight to the after-model
    /// hooks and response handling, the way a caching layer or a
    /// content-policy filter would.
    async fn before_model(&self, _invocation: &InvocationContext, _request: &mut LLMRequest) -> Option<LLMResponse> {
        None
    }

    /// Runs after `Model::generate` succeeds (or after `on_model_error`
    /// recovers a failure into a response). Returning `Some(response)`
    /// replaces the response seen by the remaining after-model hooks and by
    /// the turn loop's response handling.
    async fn after_model(&self, _invocation: &InvocationContext, _response: &LLMResponse) -> Option<LLMResponse> {
        None
    }

    /// Runs only when `Model::generate` itself returns `Err` (never when a
    /// before-model hook short-circuited). Returning `Some(response)`
    /// recovers the turn as if the model had produced `response`.
    async fn on_model_error(&self, _invocation: &InvocationContext, _error: &AgentError) -> Option<LLMResponse> {
        None
    }
}

/// Observes and optionally short-circuits one tool dispatch (spec §4.3).
#[async_trait]
pub trait ToolHook: Send + Sync {
    /// Runs before `Tool::run`. Returning `Some(result)` skips dispatch
    /// entirely — the value returned here becomes the function-response
    /// payload, the same way a tool-level confirmation gate in Scenario C/D
    /// replaces execution with a rejection payload.
    async fn before_tool(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _args: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        None
    }

    /// Runs after a successful (or error-recovered) dispatch. Returning
    /// `Some(result)` replaces the function-response payload seen by the
    /// remaining after-tool hooks and by the emitted event.
    async fn after_tool(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _result: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        None
    }

    /// Runs only when dispatch itself returns `Err` (schema-validation
    /// failure, caught panic, or the tool's own `Err`). Returning
    /// `Some(result)` recovers the call into a successful function-response.
    async fn on_tool_error(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _error: &AgentError,
    ) -> Option<serde_json::Value> {
        None
    }
}

/// Observes and optionally short-circuits a whole agent run (spec §4.1).
#[async_trait]
pub trait AgentHook: Send + Sync {
    /// Runs before an agent's `Run` produces its first event. Returning
    /// `Some(content)` short-circuits the body: `content` is emitted as a
    /// single event and the agent returns without invoking its body (spec
    /// §4.1 step 1).
    async fn before_agent(&self, _invocation: &InvocationContext) -> Option<Content> {
        None
    }

    /// Runs after an agent's body completes normally. Returning
    /// `Some(content)` appends one more event carrying `content` and stops
    /// the remaining after-agent hooks (spec §4.1 step 3).
    async fn after_agent(&self, _invocation: &InvocationContext) -> Option<Content> {
        None
    }
}

/// Run before-agent hooks in declaration order, returning the first
/// `Some(_)` (spec §4.1 step 1).
pub async fn run_before_agent(
    hooks: &[std::sync::Arc<dyn AgentHook>],
    invocation: &InvocationContext,
) -> Option<Content> {
    for hook in hooks {
        if let Some(content) = hook.before_agent(invocation).await {
            return Some(content);
        }
    }
    None
}

/// Run after-agent hooks in declaration order, returning the first
/// `Some(_)` (spec §4.1 step 3 — unlike model/tool after-hooks, agent
/// after-hooks are declared as running in forward order, not reversed).
pub async fn run_after_agent(
    hooks: &[std::sync::Arc<dyn AgentHook>],
    invocation: &InvocationContext,
) -> Option<Content> {
    for hook in hooks {
        if let Some(content) = hook.after_agent(invocation).await {
            return Some(content);
        }
    }
    None
}

/// Run a sequence of before-hooks in order, returning the first `Some(_)`.
pub async fn run_before_model(
    hooks: &[std::sync::Arc<dyn ModelHook>],
    invocation: &InvocationContext,
    request: &mut LLMRequest,
) -> Option<LLMResponse> {
    for hook in hooks {
        if let Some(response) = hook.before_model(invocation, request).await {
            return Some(response);
        }
    }
    None
}

/// Run a sequence of after-hooks in **reverse** declaration order, returning
/// the first `Some(_)` (spec §4.1 symmetry requirement).
pub async fn run_after_model(
    hooks: &[std::sync::Arc<dyn ModelHook>],
    invocation: &InvocationContext,
    response: &LLMResponse,
) -> Option<LLMResponse> {
    for hook in hooks.iter().rev() {
        if let Some(replaced) = hook.after_model(invocation, response).await {
            return Some(replaced);
        }
    }
    None
}

pub async fn run_on_model_error(
    hooks: &[std::sync::Arc<dyn ModelHook>],
    invocation: &InvocationContext,
    error: &AgentError,
) -> Option<LLMResponse> {
    for hook in hooks {
        if let Some(recovered) = hook.on_model_error(invocation, error).await {
            return Some(recovered);
        }
    }
    None
}

pub async fn run_before_tool(
    hooks: &[std::sync::Arc<dyn ToolHook>],
    ctx: &ToolContext<'_>,
    tool_name: &str,
    args: &serde_json::Value,
) -> Option<serde_json::Value> {
    for hook in hooks {
        if let Some(result) = hook.before_tool(ctx, tool_name, args).await {
            return Some(result);
        }
    }
    None
}

pub async fn run_after_tool(
    hooks: &[std::sync::Arc<dyn ToolHook>],
    ctx: &ToolContext<'_>,
    tool_name: &str,
    result: &serde_json::Value,
) -> Option<serde_json::Value> {
    for hook in hooks.iter().rev() {
        if let Some(replaced) = hook.after_tool(ctx, tool_name, result).await {
            return Some(replaced);
        }
    }
    None
}

pub async fn run_on_tool_error(
    hooks: &[std::sync::Arc<dyn ToolHook>],
    ctx: &ToolContext<'_>,
    tool_name: &str,
    error: &AgentError,
) -> Option<serde_json::Value> {
    for hook in hooks {
        if let Some(recovered) = hook.on_tool_error(ctx, tool_name, error).await {
            return Some(recovered);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionService, SessionKey};
    use crate::content::Role;
    use std::sync::Arc;

    struct FirstWins(serde_json::Value);
    struct NeverFires;

    #[async_trait]
    impl ToolHook for FirstWins {
        async fn before_tool(
            &self,
            _ctx: &ToolContext<'_>,
            _tool_name: &str,
            _args: &serde_json::Value,
        ) -> Option<serde_json::Value> {
            Some(self.0.clone())
        }
    }

    #[async_trait]
    impl ToolHook for NeverFires {
        async fn before_tool(
            &self,
            _ctx: &ToolContext<'_>,
            _tool_name: &str,
            _args: &serde_json::Value,
        ) -> Option<serde_json::Value> {
            panic!("should not run: an earlier hook already short-circuited");
        }
    }

    fn invocation() -> InvocationContext {
        InvocationContext::new(
            SessionKey::new("app", "u", "s"),
            Arc::new(InMemorySessionService::new()),
            "root",
            None,
            crate::context::RunConfig::default(),
        )
    }

    #[tokio::test]
    async fn first_before_tool_hook_short_circuits_the_rest() {
        let invocation = invocation();
        let ctx = ToolContext::new(&invocation, "call-1");
        let hooks: Vec<Arc<dyn ToolHook>> = vec![
            Arc::new(FirstWins(serde_json::json!({"short": true}))),
            Arc::new(NeverFires),
        ];
        let result = run_before_tool(&hooks, &ctx, "any_tool", &serde_json::json!({})).await;
        assert_eq!(result, Some(serde_json::json!({"short": true})));
    }

    struct TagModel(&'static str);

    #[async_trait]
    impl ModelHook for TagModel {
        async fn after_model(&self, _invocation: &InvocationContext, response: &LLMResponse) -> Option<LLMResponse> {
            let mut text = response.content.text();
            text.push_str(self.0);
            Some(LLMResponse::text(Role::Model, text))
        }
    }

    #[tokio::test]
    async fn after_model_hooks_run_in_reverse_declaration_order() {
        let invocation = invocation();
        let hooks: Vec<Arc<dyn ModelHook>> = vec![Arc::new(TagModel("-outer")), Arc::new(TagModel("-inner"))];
        let response = LLMResponse::text(Role::Model, "base");
        let result = run_after_model(&hooks, &invocation, &response).await.unwrap();
        assert_eq!(result.content.text(), "base-inner");
    }
}
