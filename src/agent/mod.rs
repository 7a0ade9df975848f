//! Agent base contract and the before/after-agent hook wrapper (spec §4.1).
//!
//! The teacher's `Agent` (`agent.rs`) is a single concrete struct with no
//! base/body split — `send()` both builds the request and runs the loop in
//! one method on one type. Spec §4.1 asks for something the teacher doesn't
//! have: several *kinds* of agent (LLM, sequential, parallel, loop) sharing
//! one contract and one hook-wrapping state machine. [`AgentMeta`] carries
//! the fields every concrete agent needs (name, description, sub-agents,
//! hooks) the way the teacher's `Agent` struct carries its own flat set of
//! fields, and [`wrap_with_agent_hooks`] factors the before/after-agent
//! state machine out so each concrete agent only has to supply its body.

pub mod llm_agent;
pub mod parent_map;
pub mod transfer_policy;
pub mod workflow;

pub use llm_agent::LlmAgent;
pub use parent_map::ParentMap;
pub use transfer_policy::TransferPolicy;
pub use workflow::{LoopAgent, ParallelAgent, SequentialAgent};

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::content::Content;
use crate::context::InvocationContext;
use crate::error::{AgentError, Result};
use crate::event::{Author, Event};
use crate::hooks::{run_after_agent, run_before_agent, AgentHook};

/// A lazy, single-consumer sequence of events produced by one agent's `Run`
/// (spec §4.1, §5 "the event stream is a lazy, single-consumer pull
/// sequence").
pub type EventStream<'a> = BoxStream<'a, Result<Event>>;

/// The contract every agent in the tree implements (spec §4.1).
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Ordered list of this agent's direct children. Empty for a leaf LLM
    /// agent; populated for workflow agents (spec §4.4).
    fn sub_agents(&self) -> &[Arc<dyn Agent>];

    /// Run this agent for one invocation, already wrapped by this agent's
    /// before/after-agent hooks (spec §4.1 state machine).
    fn run<'a>(&'a self, invocation: InvocationContext) -> EventStream<'a>;

    /// This agent's own transfer policy (spec §4.10). Workflow agents never
    /// refuse a transfer themselves, so the default is fully permissive;
    /// `LlmAgent` overrides it with its configured flags.
    fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy::default()
    }
}

/// The resolved agent tree for one runner: the root, a derived
/// [`ParentMap`], and a flat by-name index (spec §4.9). Built once per
/// `Runner` and shared (via `Arc`) through every [`InvocationContext`] so an
/// `LlmAgent` can validate and execute a transfer without needing its own
/// reference to the whole tree.
pub struct AgentTree {
    pub root: Arc<dyn Agent>,
    pub parent_map: ParentMap,
    by_name: HashMap<String, Arc<dyn Agent>>,
}

impl AgentTree {
    pub fn build(root: Arc<dyn Agent>) -> Result<Self> {
        let parent_map = ParentMap::build(&root)?;
        let mut by_name = HashMap::new();
        index(&root, &mut by_name);
        Ok(Self { root, parent_map, by_name })
    }

    pub fn get(&self, agent_name: &str) -> Option<Arc<dyn Agent>> {
        self.by_name.get(agent_name).cloned()
    }

    pub fn root_name(&self) -> &str {
        self.root.name()
    }

    /// Re-check whether `from_agent` may transfer to `target_agent` right
    /// now (spec §4.10 "Target validity is re-checked at transfer time").
    pub fn can_transfer(&self, from_agent: &str, target_agent: &str) -> bool {
        if self.get(target_agent).is_none() {
            return false;
        }
        transfer_policy::can_transfer(&self.parent_map, from_agent, target_agent, |name| {
            self.get(name).map(|agent| agent.transfer_policy())
        })
    }
}

fn index(agent: &Arc<dyn Agent>, by_name: &mut HashMap<String, Arc<dyn Agent>>) {
    by_name.insert(agent.name().to_string(), Arc::clone(agent));
    for child in agent.sub_agents() {
        index(child, by_name);
    }
}

/// Convenience used by [`llm_agent::LlmAgent`] to turn a missing/unreachable
/// transfer target into the dispatch-style error the turn loop feeds back to
/// the model as a function-response payload rather than a fatal stream error.
pub(crate) fn transfer_rejected(target: &str) -> AgentError {
    AgentError::permission_denied(format!("transfer to '{target}' is not permitted or the agent does not exist"))
}

/// Fields shared by every concrete agent kind, grounded on the common
/// metadata the teacher's `Agent` struct carries (`id`, `name`,
/// `description` in `agent.rs`) generalized with the sub-agent list and
/// hook lists spec §4.1/§4.4 require.
pub struct AgentMeta {
    pub name: String,
    pub description: String,
    pub sub_agents: Vec<Arc<dyn Agent>>,
    pub before_agent_hooks: Vec<Arc<dyn AgentHook>>,
    pub after_agent_hooks: Vec<Arc<dyn AgentHook>>,
}

impl AgentMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sub_agents: Vec::new(),
            before_agent_hooks: Vec::new(),
            after_agent_hooks: Vec::new(),
        }
    }

    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn with_before_agent_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.before_agent_hooks.push(hook);
        self
    }

    pub fn with_after_agent_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.after_agent_hooks.push(hook);
        self
    }
}

/// Wrap a concrete agent's body stream with the before/after-agent hook
/// state machine (spec §4.1 steps 1-3): a before-agent hook returning
/// `Some(content)` short-circuits the body entirely; otherwise the body runs
/// to completion and an after-agent hook may append one trailing event.
///
/// An error produced by the body (or surfaced from a hook) is forwarded
/// through the stream and ends it (spec §4.1: "An error from any hook
/// aborts the agent and propagates to the caller").
pub fn wrap_with_agent_hooks<'a, S>(
    agent_name: String,
    before_hooks: Vec<Arc<dyn AgentHook>>,
    after_hooks: Vec<Arc<dyn AgentHook>>,
    invocation: InvocationContext,
    body: S,
) -> EventStream<'a>
where
    S: Stream<Item = Result<Event>> + Send + 'a,
{
    Box::pin(async_stream::try_stream! {
        // Plugin-level before-agent callbacks run as the outer layer,
        // ahead of this agent's own before-agent hooks (spec §4.7): a
        // plugin gate short-circuits before any agent-specific hook or the
        // body itself ever runs, the same way `Runner::run`'s `beforeRun`
        // wraps the whole invocation.
        if let Some(plugins) = &invocation.plugins {
            if plugins.before_agent(&invocation).await.is_some() {
                return;
            }
        }

        if let Some(content) = run_before_agent(&before_hooks, &invocation).await {
            yield with_staged_state(&invocation, agent_event(&invocation, &agent_name, content));
            return;
        }

        futures::pin_mut!(body);
        while let Some(event) = body.next().await {
            yield with_staged_state(&invocation, event?);
        }

        let after_agent_content = run_after_agent(&after_hooks, &invocation).await;

        // Plugin-level after-agent callbacks run as the outer layer on the
        // way out, after this agent's own after-agent hooks have had their
        // turn, symmetric with the before side above (inner hooks settle
        // first, then the outer plugin layer).
        if let Some(plugins) = &invocation.plugins {
            plugins.after_agent(&invocation).await;
        }

        if let Some(content) = after_agent_content {
            yield with_staged_state(&invocation, agent_event(&invocation, &agent_name, content));
        } else if !invocation.staged_state().is_empty() {
            // An after-agent (or earlier) hook staged state but no hook
            // returned content to carry it on, and the body is done
            // producing events of its own. Spec §3 requires every mutation
            // to ride along with an appended event, so emit one bare,
            // content-less event purely to carry the remaining delta rather
            // than drop it (Scenario A).
            let bare = Event::new(invocation.invocation_id.clone(), Author::Agent(agent_name.clone()), chrono::Utc::now());
            yield with_staged_state(&invocation, bare);
        }
    })
}

fn agent_event(invocation: &InvocationContext, agent_name: &str, content: Content) -> Event {
    Event::new(invocation.invocation_id.clone(), Author::Agent(agent_name.to_string()), chrono::Utc::now())
        .with_content(content)
}

/// Attach any state keys staged via [`InvocationContext::set_state`] since
/// the last non-partial event onto `event`'s `actions.state_delta` (spec §3;
/// Scenario A). Partial events are left untouched and the staged keys
/// carried forward, since a partial event is never appended to the session
/// (spec §3 invariant) and a state delta attached to one would be silently
/// lost.
fn with_staged_state(invocation: &InvocationContext, mut event: Event) -> Event {
    if event.partial {
        return event;
    }
    for (key, value) in invocation.drain_state_delta() {
        event.actions.state_delta.entry(key).or_insert(value);
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Role;
    use crate::context::RunConfig;
    use crate::session::{InMemorySessionService, SessionKey};
    use async_trait::async_trait;

    struct ShortCircuit;

    #[async_trait]
    impl AgentHook for ShortCircuit {
        async fn before_agent(&self, _invocation: &InvocationContext) -> Option<Content> {
            Some(Content::from_text(Role::Model, "short-circuited"))
        }
    }

    fn invocation() -> InvocationContext {
        InvocationContext::new(
            SessionKey::new("app", "u", "s"),
            Arc::new(InMemorySessionService::new()),
            "root",
            None,
            RunConfig::default(),
        )
    }

    #[tokio::test]
    async fn before_agent_hook_short_circuits_the_body() {
        let body = futures::stream::once(async {
            panic!("body must not run when a before-agent hook short-circuits")
        });
        let hooks: Vec<Arc<dyn AgentHook>> = vec![Arc::new(ShortCircuit)];
        let mut stream = wrap_with_agent_hooks("root".into(), hooks, Vec::new(), invocation(), body);
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.content.unwrap().text(), "short-circuited");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn body_runs_when_no_before_hook_short_circuits() {
        let body = futures::stream::iter(vec![Ok(Event::new(
            "inv",
            Author::Agent("root".into()),
            chrono::Utc::now(),
        )
        .with_content(Content::from_text(Role::Model, "hi")))]);
        let mut stream = wrap_with_agent_hooks("root".into(), Vec::new(), Vec::new(), invocation(), body);
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.content.unwrap().text(), "hi");
    }

    struct AbortingPlugin;

    #[async_trait]
    impl crate::plugin::Plugin for AbortingPlugin {
        fn name(&self) -> &str {
            "aborting"
        }
        async fn before_agent(&self, _invocation: &InvocationContext) -> Option<()> {
            Some(())
        }
    }

    #[tokio::test]
    async fn plugin_before_agent_short_circuits_ahead_of_agent_hooks_and_the_body() {
        let body = futures::stream::once(async { panic!("body must not run when a plugin's before_agent hook short-circuits") });
        let hooks: Vec<Arc<dyn AgentHook>> = vec![Arc::new(ShortCircuit)];
        let plugins = Arc::new(crate::plugin::PluginManager::new(vec![Arc::new(AbortingPlugin)]));
        let invocation = invocation().with_plugins(plugins);
        let mut stream = wrap_with_agent_hooks("root".into(), hooks, Vec::new(), invocation, body);
        assert!(stream.next().await.is_none(), "a plugin abort must suppress even the agent's own before-agent hook content");
    }
}
