//! Three-turn round trip through a long-running tool call, driven end to
//! end through the `Runner` (one `Runner::run` invocation per user turn,
//! sharing one session).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_orchestra::agent::LlmAgent;
use agent_orchestra::context::RunConfig;
use agent_orchestra::model::{LLMRequest, LLMResponse};
use agent_orchestra::session::{InMemorySessionService, SessionKey, SessionService};
use agent_orchestra::tools::{Tool, ToolContext, ToolMetadata};
use agent_orchestra::{Agent, Content, Part, Role, Runner};
use async_trait::async_trait;
use futures::StreamExt;

struct IncByOne {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for IncByOne {
    fn name(&self) -> &str {
        "incByOne"
    }

    fn description(&self) -> &str {
        "increments a counter, reporting a pending status while the increment settles"
    }

    fn declaration(&self) -> ToolMetadata {
        ToolMetadata::new(self.name(), self.description())
    }

    fn is_long_running(&self) -> bool {
        true
    }

    async fn run(&self, _ctx: &mut ToolContext<'_>, _args: serde_json::Value) -> agent_orchestra::Result<serde_json::Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"status": "pending"}))
    }
}

struct ScriptedModel(Mutex<Vec<LLMResponse>>);

#[async_trait]
impl agent_orchestra::Model for ScriptedModel {
    async fn generate(&self, _request: &LLMRequest) -> agent_orchestra::Result<LLMResponse> {
        let mut queue = self.0.lock().unwrap();
        Ok(if queue.is_empty() { LLMResponse::text(Role::Model, "no more scripted turns") } else { queue.remove(0) })
    }
    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn tool_handler_runs_exactly_once_across_three_turns() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let call_response = LLMResponse {
        content: Content::new(Role::Model, vec![Part::function_call("inc-1", "incByOne", serde_json::json!({}))]),
        ..Default::default()
    };
    let model = Arc::new(ScriptedModel(Mutex::new(vec![
        call_response,
        LLMResponse::text(Role::Model, "turn2 reply"),
        LLMResponse::text(Role::Model, "turn3 reply"),
    ])));

    let root: Arc<dyn Agent> = Arc::new(
        LlmAgent::builder("root", "counts things", model)
            .with_tool(Arc::new(IncByOne { invocations: invocations.clone() }))
            .build(),
    );

    let session_service = Arc::new(InMemorySessionService::new());
    let key = SessionKey::new("app", "u1", "s1");
    session_service.create(&key.app_name, &key.user_id, &key.session_id).await.unwrap();
    let runner = Runner::builder(root, session_service.clone()).build().unwrap();

    // Turn 1: the model issues the long-running call; the turn ends right
    // after the function-call/function-response pair (no further model
    // round-trip in this invocation).
    let mut stream = runner.run(key.clone(), Content::from_text(Role::User, "start counting"), RunConfig::default());
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    assert!(events.iter().any(|e| e.has_function_call()));
    assert!(events.iter().any(|e| e.long_running_tool_ids.contains("inc-1")));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // Turn 2: a function-response with the same call id reports progress.
    let still_waiting = Content::new(Role::User, vec![Part::function_response("inc-1", "incByOne", serde_json::json!({"status": "still waiting"}))]);
    let mut stream = runner.run(key.clone(), still_waiting, RunConfig::default());
    let mut texts = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event.unwrap();
        if let Some(content) = &event.content {
            if !content.text().is_empty() {
                texts.push(content.text());
            }
        }
    }
    assert_eq!(texts, vec!["turn2 reply".to_string()]);
    assert_eq!(invocations.load(Ordering::SeqCst), 1, "the tool handler must not run again while the caller is merely polling");

    // Turn 3: the final result arrives the same way.
    let done = Content::new(Role::User, vec![Part::function_response("inc-1", "incByOne", serde_json::json!({"result": 2}))]);
    let mut stream = runner.run(key.clone(), done, RunConfig::default());
    let mut texts = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event.unwrap();
        if let Some(content) = &event.content {
            if !content.text().is_empty() {
                texts.push(content.text());
            }
        }
    }
    assert_eq!(texts, vec!["turn3 reply".to_string()]);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let session = session_service.get(&key).await.unwrap();
    // 3 user events + (call, response) from turn 1 + 1 model reply each for
    // turns 2 and 3.
    assert_eq!(session.events().len(), 7);
}
