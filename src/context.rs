//! Per-invocation environment threaded down the agent tree (spec §4.5
//! "Invocation context").
//!
//! There is no teacher module with a direct analog — the teacher's `Agent`
//! owns its own session and is called directly by application code, with no
//! separate per-call environment object. This is new surface required by
//! the tree-of-agents model (spec §9: "per-invocation values ... are carried
//! through the invocation context. A language-neutral implementation should
//! prefer explicit propagation over implicit scoped storage"), built in the
//! teacher's idiom: a plain data struct plus small `with_*` builder methods,
//! the same shape as `Agent`'s own construction in `agent.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::AgentTree;
use crate::artifact::ArtifactService;
use crate::content::Content;
use crate::memory::MemoryService;
use crate::plugin::PluginManager;
use crate::session::{Session, SessionKey, SessionService};

/// How the model should be invoked for this run (spec §A.3). Only `None` is
/// exercised by the in-memory reference `Model`; the variants exist so a
/// streaming-capable provider crate can be plugged in without a breaking
/// change to `RunConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    #[default]
    None,
    Sse,
    Bidi,
}

/// Per-run configuration (spec §A.3), analogous to the constructor
/// parameters the teacher threads through `Orchestration::new(...).with_mode(...)`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub streaming_mode: StreamingMode,
    /// Ceiling on LLM-agent tool iterations per turn (spec §4.2). Defaults
    /// to 5, matching the teacher's hardcoded `max_tool_iterations` in
    /// `Agent::send`.
    pub max_tool_iterations: usize,
    /// When true, inline-data parts of the user's turn are saved via the
    /// artifact service and replaced with a textual placeholder before the
    /// runner appends the user event (spec §4.6 step 5).
    pub save_input_blobs_as_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            streaming_mode: StreamingMode::default(),
            max_tool_iterations: 5,
            save_input_blobs_as_artifacts: false,
        }
    }
}

/// The per-`Runner.Run` environment passed down the agent tree (spec §4.5).
///
/// Agents never mutate an `InvocationContext` in place; they derive a new
/// one (via [`InvocationContext::with_branch`] / [`InvocationContext::with_agent`])
/// when descending, e.g. into a parallel workflow's children (spec §4.4.2).
/// `end_invocation` and the cancellation token are the two exceptions: they
/// are shared (via `Arc`/`CancellationToken`'s own internal sharing) across
/// every derived context of one invocation, because "any agent or callback
/// can signal that no further agent work should occur in this invocation"
/// (spec §4.5) and cancellation must reach every descendant (spec §5).
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub session_key: SessionKey,
    pub session_service: Arc<dyn SessionService>,
    pub artifact_service: Option<Arc<dyn ArtifactService>>,
    pub memory_service: Option<Arc<dyn MemoryService>>,
    pub user_content: Option<Content>,
    /// Name of the agent this context currently addresses. The runner and
    /// workflow agents update this when descending the tree.
    pub agent_name: String,
    /// Dotted branch path (spec §4.4.2, Glossary). `None` at the root.
    pub branch: Option<String>,
    pub run_config: Arc<RunConfig>,
    /// The resolved agent tree for this runner, shared by every derived
    /// context, so an `LlmAgent` can validate and execute a transfer without
    /// carrying its own reference to sibling/parent agents.
    pub tree: Option<Arc<AgentTree>>,
    /// The runner's plugin manager, threaded down so the turn loop and the
    /// before/after-agent hook wrapper can fan out to plugin-level
    /// before/after/on-error callbacks alongside the per-agent hooks (spec
    /// §4.7). `None` for invocation contexts built outside a `Runner` (e.g.
    /// directly driving an agent in a test).
    pub plugins: Option<Arc<PluginManager>>,
    cancellation: CancellationToken,
    end_invocation: Arc<AtomicBool>,
    /// State-delta keys staged by before/after-agent and before/after-model
    /// hooks ahead of the next non-partial event (Scenario A: hooks set a
    /// key via `set_state` without owning an `Event` of their own; whichever
    /// non-partial event is emitted next carries the accumulated deltas, via
    /// [`crate::agent::wrap_with_agent_hooks`]'s forwarding loop). Shared
    /// across every derived context of one invocation, like `end_invocation`.
    pending_state: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl InvocationContext {
    pub fn new(
        session_key: SessionKey,
        session_service: Arc<dyn SessionService>,
        agent_name: impl Into<String>,
        user_content: Option<Content>,
        run_config: RunConfig,
    ) -> Self {
        Self {
            invocation_id: Uuid::new_v4().to_string(),
            session_key,
            session_service,
            artifact_service: None,
            memory_service: None,
            user_content,
            agent_name: agent_name.into(),
            branch: None,
            run_config: Arc::new(run_config),
            tree: None,
            plugins: None,
            cancellation: CancellationToken::new(),
            end_invocation: Arc::new(AtomicBool::new(false)),
            pending_state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_tree(mut self, tree: Arc<AgentTree>) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginManager>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_artifact_service(mut self, service: Arc<dyn ArtifactService>) -> Self {
        self.artifact_service = Some(service);
        self
    }

    pub fn with_memory_service(mut self, service: Arc<dyn MemoryService>) -> Self {
        self.memory_service = Some(service);
        self
    }

    /// Fetch the current durable session snapshot. Invocation contexts do
    /// not cache the session themselves (spec §4.5 "session snapshot" is
    /// taken fresh via the service, since concurrent parallel branches may
    /// be appending events at the same time).
    pub async fn session(&self) -> crate::error::Result<Session> {
        self.session_service.get(&self.session_key).await
    }

    /// Derive a child context addressing a different agent in the tree
    /// (sequential/loop descent — same branch, new current agent).
    pub fn with_agent(&self, agent_name: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.agent_name = agent_name.into();
        child
    }

    /// Derive a child context for one parallel sub-agent, extending the
    /// branch path `<parent>.<sub>` (spec §4.4.2).
    pub fn with_branch(&self, agent_name: impl Into<String>, sub_branch: &str) -> Self {
        let mut child = self.clone();
        let name = agent_name.into();
        child.branch = Some(match &self.branch {
            Some(parent) => format!("{parent}.{sub_branch}"),
            None => sub_branch.to_string(),
        });
        child.agent_name = name;
        child
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Signal that no further agent work should occur in this invocation
    /// (spec §4.5 `endInvocation()`). Readable/settable by any clone of this
    /// context, since the flag lives behind an `Arc`.
    pub fn end_invocation(&self) {
        self.end_invocation.store(true, Ordering::SeqCst);
    }

    pub fn is_invocation_ended(&self) -> bool {
        self.end_invocation.load(Ordering::SeqCst)
    }

    /// Stage a state-delta key from a hook (before/after-agent,
    /// before/after-model, before/after-tool) that does not itself own an
    /// `Event` to attach `actions.state_delta` to. Visible to later hooks in
    /// this invocation via [`Self::staged_state`] immediately; durably
    /// committed once the next non-partial event is emitted and appended.
    pub fn set_state(&self, key: impl Into<String>, value: serde_json::Value) {
        self.pending_state.lock().unwrap().insert(key.into(), value);
    }

    /// Keys staged via [`Self::set_state`] that have not yet been attached
    /// to an emitted event. A hook reads this (together with the session's
    /// already-committed state) to see exactly what earlier hooks in this
    /// invocation have set so far, without seeing what later hooks will set.
    pub fn staged_state(&self) -> HashMap<String, serde_json::Value> {
        self.pending_state.lock().unwrap().clone()
    }

    /// Take and clear every staged key (spec §3 "mutations flow through an
    /// `EventActions.stateDelta` applied when the producing event is
    /// committed"). Called once per non-partial event forwarded through
    /// [`crate::agent::wrap_with_agent_hooks`] so the delta rides along with
    /// whichever event happens to be emitted next.
    pub(crate) fn drain_state_delta(&self) -> HashMap<String, serde_json::Value> {
        std::mem::take(&mut *self.pending_state.lock().unwrap())
    }
}
