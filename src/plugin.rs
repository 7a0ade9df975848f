//! Plugin manager (spec §4.7): a fixed set of optional lifecycle callbacks,
//! fanned out to every registered plugin with the same before/after/on-error
//! ordering discipline as the per-agent hooks in [`crate::hooks`].
//!
//! Grounded on the teacher's `EventHandler` (`cloudllm::event`) — a single
//! `Arc<dyn EventHandler>` shared across the agent and observed on every
//! lifecycle point — generalized from one observer to an ordered list of
//! plugins, each able to short-circuit rather than merely observe, plus the
//! bounded-timeout `close` spec §4.7/§5 requires (the teacher has no
//! closing/shutdown notion since its `EventHandler` is a pure sink).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::content::Content;
use crate::context::InvocationContext;
use crate::error::AgentError;
use crate::event::Event;
use crate::model::{LLMRequest, LLMResponse};
use crate::tools::ToolContext;

/// One plugin's bundle of optional callbacks. Every method defaults to a
/// no-op / `None`, following the teacher's `EventHandler` default-method
/// convention — a plugin overrides only what it cares about.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Runs once per incoming user message, before the runner appends it.
    /// Returning `Some(content)` replaces the content the runner appends
    /// (e.g. a redaction plugin).
    async fn on_user_message(&self, _invocation: &InvocationContext, _content: &Content) -> Option<Content> {
        None
    }

    /// Runs before `Runner.Run` begins iterating the handling agent's event
    /// stream. Returning `Some(())` aborts the run before any agent event is
    /// produced.
    async fn before_run(&self, _invocation: &InvocationContext) -> Option<()> {
        None
    }

    /// Runs once the handling agent's event stream ends.
    async fn after_run(&self, _invocation: &InvocationContext) {}

    /// Runs for every non-partial event the runner commits. Pure observation
    /// — does not short-circuit, since by the time an event is ready to
    /// commit the side effect it represents has already happened.
    async fn on_event(&self, _invocation: &InvocationContext, _event: &Event) {}

    async fn before_agent(&self, _invocation: &InvocationContext) -> Option<()> {
        None
    }

    async fn after_agent(&self, _invocation: &InvocationContext) -> Option<()> {
        None
    }

    async fn before_model(&self, _invocation: &InvocationContext, _request: &mut LLMRequest) -> Option<LLMResponse> {
        None
    }

    async fn after_model(&self, _invocation: &InvocationContext, _response: &LLMResponse) -> Option<LLMResponse> {
        None
    }

    async fn on_model_error(&self, _invocation: &InvocationContext, _error: &AgentError) -> Option<LLMResponse> {
        None
    }

    async fn before_tool(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _args: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        None
    }

    async fn after_tool(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _result: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        None
    }

    async fn on_tool_error(
        &self,
        _ctx: &ToolContext<'_>,
        _tool_name: &str,
        _error: &AgentError,
    ) -> Option<serde_json::Value> {
        None
    }

    /// Runs once at process shutdown. The manager gives each plugin's
    /// `close` a bounded budget (spec §4.7, §5 "Plugin close") and abandons
    /// any call that exceeds it.
    async fn close(&self) {}
}

/// Orders a fixed list of plugins and fans every lifecycle point out to
/// them with spec §4.7's discipline: before/on-message/on-event callbacks in
/// registration order (first `Some(_)` wins), after callbacks in reverse
/// registration order (first `Some(_)` wins), on-error callbacks in
/// registration order (first `Some(_)` replaces the error).
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
    close_timeout: Duration,
}

impl PluginManager {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            plugins,
            close_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub async fn on_user_message(&self, invocation: &InvocationContext, content: &Content) -> Option<Content> {
        for plugin in &self.plugins {
            if let Some(replaced) = plugin.on_user_message(invocation, content).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn before_run(&self, invocation: &InvocationContext) -> Option<()> {
        for plugin in &self.plugins {
            if plugin.before_run(invocation).await.is_some() {
                return Some(());
            }
        }
        None
    }

    pub async fn after_run(&self, invocation: &InvocationContext) {
        for plugin in self.plugins.iter().rev() {
            plugin.after_run(invocation).await;
        }
    }

    pub async fn on_event(&self, invocation: &InvocationContext, event: &Event) {
        for plugin in &self.plugins {
            plugin.on_event(invocation, event).await;
        }
    }

    pub async fn before_agent(&self, invocation: &InvocationContext) -> Option<()> {
        for plugin in &self.plugins {
            if plugin.before_agent(invocation).await.is_some() {
                return Some(());
            }
        }
        None
    }

    pub async fn after_agent(&self, invocation: &InvocationContext) -> Option<()> {
        for plugin in self.plugins.iter().rev() {
            if plugin.after_agent(invocation).await.is_some() {
                return Some(());
            }
        }
        None
    }

    pub async fn before_model(&self, invocation: &InvocationContext, request: &mut LLMRequest) -> Option<LLMResponse> {
        for plugin in &self.plugins {
            if let Some(response) = plugin.before_model(invocation, request).await {
                return Some(response);
            }
        }
        None
    }

    pub async fn after_model(&self, invocation: &InvocationContext, response: &LLMResponse) -> Option<LLMResponse> {
        for plugin in self.plugins.iter().rev() {
            if let Some(replaced) = plugin.after_model(invocation, response).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn on_model_error(&self, invocation: &InvocationContext, error: &AgentError) -> Option<LLMResponse> {
        for plugin in &self.plugins {
            if let Some(recovered) = plugin.on_model_error(invocation, error).await {
                return Some(recovered);
            }
        }
        None
    }

    pub async fn before_tool(
        &self,
        ctx: &ToolContext<'_>,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.before_tool(ctx, tool_name, args).await {
                return Some(result);
            }
        }
        None
    }

    pub async fn after_tool(
        &self,
        ctx: &ToolContext<'_>,
        tool_name: &str,
        result: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        for plugin in self.plugins.iter().rev() {
            if let Some(replaced) = plugin.after_tool(ctx, tool_name, result).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn on_tool_error(
        &self,
        ctx: &ToolContext<'_>,
        tool_name: &str,
        error: &AgentError,
    ) -> Option<serde_json::Value> {
        for plugin in &self.plugins {
            if let Some(recovered) = plugin.on_tool_error(ctx, tool_name, error).await {
                return Some(recovered);
            }
        }
        None
    }

    /// Close every plugin, each bounded by `close_timeout`. A plugin whose
    /// `close` exceeds the budget is abandoned and logged; the remaining
    /// plugins still get their chance to close (spec §5: "process
    /// proceeds").
    pub async fn close_all(&self) {
        for plugin in &self.plugins {
            match tokio::time::timeout(self.close_timeout, plugin.close()).await {
                Ok(()) => {}
                Err(_) => warn!(
                    "plugin '{}' close exceeded {:?}, abandoning",
                    plugin.name(),
                    self.close_timeout
                ),
            }
        }
    }
}
