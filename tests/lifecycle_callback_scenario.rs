//! Scenario A (spec §8): a root agent with one hook at each of
//! before-agent, before-model, after-model, and after-agent, each staging
//! exactly one session-state key. After one run with user text "hi", the
//! committed session state must contain all four keys; each hook must see
//! only the keys staged by earlier hooks (the context view), never a key a
//! later hook will go on to stage.

use std::sync::{Arc, Mutex};

use agent_orchestra::agent::LlmAgent;
use agent_orchestra::context::{InvocationContext, RunConfig};
use agent_orchestra::hooks::{AgentHook, ModelHook};
use agent_orchestra::model::{LLMRequest, LLMResponse};
use agent_orchestra::session::{InMemorySessionService, SessionKey, SessionService};
use agent_orchestra::{Content, Model, Result, Role, Runner};
use async_trait::async_trait;
use futures::StreamExt;

/// Records, for one staged key, which other keys were already visible (in
/// the context's staged + committed view) at the moment this hook ran.
struct Recorder {
    observed_before_staging: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Self {
        Self { observed_before_staging: Mutex::new(Vec::new()) }
    }

    fn record_and_stage(&self, invocation: &InvocationContext, key: &str) {
        let mut seen: Vec<String> = invocation.staged_state().into_keys().collect();
        seen.sort();
        self.observed_before_staging.lock().unwrap().push(seen.join(","));
        invocation.set_state(key, serde_json::json!(true));
    }
}

struct BeforeAgentHook(Arc<Recorder>);
#[async_trait]
impl AgentHook for BeforeAgentHook {
    async fn before_agent(&self, invocation: &InvocationContext) -> Option<Content> {
        self.0.record_and_stage(invocation, "before_agent_ran");
        None
    }
}

struct AfterAgentHook(Arc<Recorder>);
#[async_trait]
impl AgentHook for AfterAgentHook {
    async fn after_agent(&self, invocation: &InvocationContext) -> Option<Content> {
        self.0.record_and_stage(invocation, "after_agent_ran");
        None
    }
}

struct ModelHooks(Arc<Recorder>);
#[async_trait]
impl ModelHook for ModelHooks {
    async fn before_model(&self, invocation: &InvocationContext, _request: &mut LLMRequest) -> Option<LLMResponse> {
        self.0.record_and_stage(invocation, "before_model_ran");
        None
    }

    async fn after_model(&self, invocation: &InvocationContext, response: &LLMResponse) -> Option<LLMResponse> {
        self.0.record_and_stage(invocation, "after_model_ran");
        Some(response.clone())
    }
}

struct NoopModel;
#[async_trait]
impl Model for NoopModel {
    async fn generate(&self, _request: &LLMRequest) -> Result<LLMResponse> {
        Ok(LLMResponse::text(Role::Model, "hi back"))
    }
    fn model_name(&self) -> &str {
        "noop"
    }
}

#[tokio::test]
async fn all_four_lifecycle_hooks_stage_exactly_one_key_each() {
    let recorder = Arc::new(Recorder::new());

    let root = LlmAgent::builder("root", "greets", Arc::new(NoopModel))
        .with_before_agent_hook(Arc::new(BeforeAgentHook(recorder.clone())))
        .with_after_agent_hook(Arc::new(AfterAgentHook(recorder.clone())))
        .with_model_hook(Arc::new(ModelHooks(recorder.clone())))
        .build();

    let session_service = Arc::new(InMemorySessionService::new());
    let key = SessionKey::new("app", "u1", "s1");
    session_service.create(&key.app_name, &key.user_id, &key.session_id).await.unwrap();
    let runner = Runner::builder(Arc::new(root), session_service.clone()).build().unwrap();

    let mut stream = runner.run(key.clone(), Content::from_text(Role::User, "hi"), RunConfig::default());
    while stream.next().await.transpose().unwrap().is_some() {}

    let session = session_service.get(&key).await.unwrap();
    for expected in ["before_agent_ran", "after_agent_ran", "before_model_ran", "after_model_ran"] {
        assert!(
            session.state().get(expected).is_some(),
            "expected committed session state to contain '{expected}', got {:?}",
            session.state().iter().collect::<Vec<_>>()
        );
    }

    // Each hook, at the moment it ran, must have seen exactly the keys
    // staged by strictly earlier hooks (order: before_agent, before_model,
    // after_model; after_agent runs once the body has already finished and
    // its event committed).
    let observed = recorder.observed_before_staging.lock().unwrap().clone();
    assert_eq!(observed[0], "", "before_agent hook must run before anything else is staged");
    assert_eq!(observed[1], "before_agent_ran", "before_model hook must see only before_agent's key");
    assert_eq!(
        observed[2], "before_agent_ran,before_model_ran",
        "after_model hook must see before_agent's and before_model's keys, not its own"
    );
    assert_eq!(
        observed[3], "",
        "after_agent hook runs after the model event (carrying the first three keys) has already committed, \
         so nothing remains staged at that point"
    );
}
