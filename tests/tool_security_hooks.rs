//! A before-tool hook that blocks specific argument combinations without
//! ever invoking the underlying tool (spec's tool-security and
//! validation-gate scenarios).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_orchestra::agent::LlmAgent;
use agent_orchestra::context::RunConfig;
use agent_orchestra::hooks::ToolHook;
use agent_orchestra::model::{LLMRequest, LLMResponse};
use agent_orchestra::session::{InMemorySessionService, SessionKey, SessionService};
use agent_orchestra::tools::examples::Calculator;
use agent_orchestra::tools::{Tool, ToolContext, ToolMetadata, ToolParameter, ToolParameterType};
use agent_orchestra::{Agent, Content, Part, Role, Runner};
use async_trait::async_trait;
use futures::StreamExt;

struct Weather {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for Weather {
    fn name(&self) -> &str {
        "get_weather"
    }
    fn description(&self) -> &str {
        "looks up the weather for a location"
    }
    fn declaration(&self) -> ToolMetadata {
        ToolMetadata::new(self.name(), self.description())
            .with_parameter(ToolParameter::new("location", ToolParameterType::String).required())
    }
    async fn run(&self, _ctx: &mut ToolContext<'_>, args: serde_json::Value) -> agent_orchestra::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"location": args["location"], "forecast": "sunny"}))
    }
}

/// Rejects `get_weather(location="secret")` without running the tool.
struct BlockSecretLocation;

#[async_trait]
impl ToolHook for BlockSecretLocation {
    async fn before_tool(&self, _ctx: &ToolContext<'_>, tool_name: &str, args: &serde_json::Value) -> Option<serde_json::Value> {
        if tool_name == "get_weather" && args.get("location").and_then(|v| v.as_str()) == Some("secret") {
            return Some(serde_json::json!({
                "error": "Access denied",
                "reason": "location is restricted",
                "requested_location": "secret",
            }));
        }
        None
    }
}

/// Rejects `calculate(operation="divide", y=0)` before the real calculator
/// ever evaluates the expression.
struct BlockDivisionByZero;

#[async_trait]
impl ToolHook for BlockDivisionByZero {
    async fn before_tool(&self, _ctx: &ToolContext<'_>, tool_name: &str, args: &serde_json::Value) -> Option<serde_json::Value> {
        if tool_name != "calculator" {
            return None;
        }
        let expression = args.get("expression").and_then(|v| v.as_str())?;
        if expression.trim_end().ends_with("/ 0") || expression.trim_end().ends_with("/0") {
            return Some(serde_json::json!({
                "error": "Division by zero",
                "operation": "divide",
                "expression": expression,
            }));
        }
        None
    }
}

struct ScriptedModel(std::sync::Mutex<Vec<LLMResponse>>);

#[async_trait]
impl agent_orchestra::Model for ScriptedModel {
    async fn generate(&self, _request: &LLMRequest) -> agent_orchestra::Result<LLMResponse> {
        let mut queue = self.0.lock().unwrap();
        Ok(if queue.is_empty() { LLMResponse::text(Role::Model, "done") } else { queue.remove(0) })
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

async fn run_single_turn(root: Arc<dyn Agent>, text: &str) -> agent_orchestra::Event {
    let session_service = Arc::new(InMemorySessionService::new());
    let key = SessionKey::new("app", "u", "s1");
    session_service.create(&key.app_name, &key.user_id, &key.session_id).await.unwrap();
    let runner = Runner::builder(root, session_service).build().unwrap();
    let mut stream = runner.run(key, Content::from_text(Role::User, text), RunConfig::default());
    let _model_event = stream.next().await.unwrap().unwrap();
    stream.next().await.unwrap().unwrap()
}

#[tokio::test]
async fn before_tool_hook_blocks_a_restricted_location_without_calling_the_tool() {
    let calls = Arc::new(AtomicUsize::new(0));
    let weather_call = LLMResponse {
        content: Content::new(Role::Model, vec![Part::function_call("call-1", "get_weather", serde_json::json!({"location": "secret"}))]),
        ..Default::default()
    };
    let model = Arc::new(ScriptedModel(std::sync::Mutex::new(vec![weather_call])));
    let root: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder("assistant", "answers weather questions", model)
            .with_tool(Arc::new(Weather { calls: calls.clone() }))
            .with_tool_hook(Arc::new(BlockSecretLocation))
            .build(),
    );

    let response_event = run_single_turn(root, "weather in the secret base?").await;
    let responses = response_event.content.unwrap().function_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].response,
        serde_json::json!({"error": "Access denied", "reason": "location is restricted", "requested_location": "secret"})
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0, "the real tool must never run once the hook blocks the call");
}

#[tokio::test]
async fn before_tool_hook_blocks_division_by_zero_without_calling_the_calculator() {
    let divide_call = LLMResponse {
        content: Content::new(Role::Model, vec![Part::function_call("call-1", "calculator", serde_json::json!({"expression": "5 / 0"}))]),
        ..Default::default()
    };
    let model = Arc::new(ScriptedModel(std::sync::Mutex::new(vec![divide_call])));
    let root: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder("assistant", "does math", model)
            .with_tool(Arc::new(Calculator::new()))
            .with_tool_hook(Arc::new(BlockDivisionByZero))
            .build(),
    );

    let response_event = run_single_turn(root, "what is 5 divided by 0?").await;
    let responses = response_event.content.unwrap().function_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].response,
        serde_json::json!({"error": "Division by zero", "operation": "divide", "expression": "5 / 0"})
    );
}
