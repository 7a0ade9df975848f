//! Workflow agents: sequential, parallel, and bounded-loop composition of
//! sub-agents (spec §4.4).
//!
//! No teacher analog — `Orchestration` (`orchestration.rs`) is the closest
//! relative: it runs a flat `Vec<Agent>` through a fixed pass/debate/vote
//! protocol with its own bespoke control flow. None of that protocol
//! generalizes to "compose arbitrary sub-agents in sequence, in parallel, or
//! in a bounded loop," so this module is new surface, built in the same
//! consuming-builder idiom `orchestration.rs`'s `Orchestration::new(...)
//! .with_mode(...)` and `agent.rs`'s `Agent::with_event_handler(...)` use.

use std::sync::Arc;

use futures::stream::StreamExt;

use crate::context::InvocationContext;
use crate::error::Result;
use crate::event::Event;
use crate::hooks::AgentHook;

use super::{wrap_with_agent_hooks, Agent, AgentMeta, EventStream};

/// Run every sub-agent in `sub_agents` once, in order, forwarding each
/// event as it is produced. Stops early — without consuming remaining
/// sub-agents — on the first error (propagated via `?`) or the first event
/// whose `actions.escalate` is set (spec §4.4.1, §4.4.3).
///
/// Shared by [`SequentialAgent`] (one pass) and [`LoopAgent`] (N passes):
/// spec §4.4.3 notes `maxIterations = 1` on a loop "yields pure sequential
/// semantics," so a single pass through this helper *is* `SequentialAgent`'s
/// whole body. Takes ownership of `sub_agents`/`invocation` (rather than
/// borrowing `self`) so the resulting stream has no lifetime tied to the
/// calling agent.
fn run_one_pass(
    sub_agents: Vec<Arc<dyn Agent>>,
    invocation: InvocationContext,
) -> impl futures::Stream<Item = Result<Event>> + Send + 'static {
    async_stream::try_stream! {
        for sub_agent in sub_agents {
            if invocation.is_cancelled() || invocation.is_invocation_ended() {
                return;
            }
            let child = invocation.with_agent(sub_agent.name());
            let mut stream = sub_agent.run(child);
            while let Some(event) = stream.next().await {
                let event = event?;
                let escalate = event.actions.escalate;
                yield event;
                if escalate {
                    return;
                }
            }
        }
    }
}

/// Runs each sub-agent in order, forwarding every event to the output
/// stream (spec §4.4.1).
pub struct SequentialAgent {
    meta: AgentMeta,
}

impl SequentialAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> WorkflowAgentBuilder<Self> {
        WorkflowAgentBuilder::new(name, description, |meta| SequentialAgent { meta })
    }
}

impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn description(&self) -> &str {
        &self.meta.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.meta.sub_agents
    }

    fn run<'a>(&'a self, invocation: InvocationContext) -> EventStream<'a> {
        let body = run_one_pass(self.meta.sub_agents.clone(), invocation.clone());
        wrap_with_agent_hooks(
            self.meta.name.clone(),
            self.meta.before_agent_hooks.clone(),
            self.meta.after_agent_hooks.clone(),
            invocation,
            body,
        )
    }
}

/// Runs every sub-agent concurrently, each in its own dotted branch (spec
/// §4.4.2: `<parent>.<sub>`, extended from the parent's own branch if any),
/// merging their event streams in arrival order. Cancelling the caller
/// cancels every child (they share the invocation's cancellation token); the
/// first error cancels the remaining branches and is surfaced.
pub struct ParallelAgent {
    meta: AgentMeta,
}

impl ParallelAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> WorkflowAgentBuilder<Self> {
        WorkflowAgentBuilder::new(name, description, |meta| ParallelAgent { meta })
    }
}

fn run_in_parallel(
    sub_agents: Vec<Arc<dyn Agent>>,
    invocation: InvocationContext,
) -> impl futures::Stream<Item = Result<Event>> + Send + 'static {
    async_stream::try_stream! {
        let branches = sub_agents.iter().map(|sub_agent| {
            let child = invocation.with_branch(sub_agent.name(), sub_agent.name());
            sub_agent.run(child)
        });

        let mut merged = futures::stream::select_all(branches);
        while let Some(event) = merged.next().await {
            match event {
                Ok(event) => yield event,
                Err(error) => {
                    // First error cancels the remaining peers (spec
                    // §4.4.2): every branch shares this invocation's
                    // cancellation token, so marking it cancelled is
                    // enough for the other branches to observe it at
                    // their next suspension point (spec §5).
                    invocation.cancel();
                    Err(error)?;
                }
            }
        }
    }
}

impl Agent for ParallelAgent {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn description(&self) -> &str {
        &self.meta.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.meta.sub_agents
    }

    fn run<'a>(&'a self, invocation: InvocationContext) -> EventStream<'a> {
        let body = run_in_parallel(self.meta.sub_agents.clone(), invocation.clone());
        wrap_with_agent_hooks(
            self.meta.name.clone(),
            self.meta.before_agent_hooks.clone(),
            self.meta.after_agent_hooks.clone(),
            invocation,
            body,
        )
    }
}

/// Bounded iteration over its sub-agents (spec §4.4.3): each iteration runs
/// every sub-agent in order (one call to [`run_one_pass`]); the loop ends
/// when `max_iterations` is reached, a sub-agent error propagates, or any
/// emitted event carries `actions.escalate = true`.
pub struct LoopAgent {
    meta: AgentMeta,
    max_iterations: usize,
}

impl LoopAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>, max_iterations: usize) -> WorkflowAgentBuilder<Self> {
        WorkflowAgentBuilder::new(name, description, move |meta| LoopAgent { meta, max_iterations })
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

fn run_bounded_loop(
    sub_agents: Vec<Arc<dyn Agent>>,
    invocation: InvocationContext,
    max_iterations: usize,
) -> impl futures::Stream<Item = Result<Event>> + Send + 'static {
    async_stream::try_stream! {
        for _iteration in 0..max_iterations {
            if invocation.is_cancelled() || invocation.is_invocation_ended() {
                return;
            }
            let mut pass_escalated = false;
            let mut stream = Box::pin(run_one_pass(sub_agents.clone(), invocation.clone()));
            while let Some(event) = stream.next().await {
                let event = event?;
                if event.actions.escalate {
                    pass_escalated = true;
                }
                yield event;
            }
            if pass_escalated {
                return;
            }
        }
    }
}

impl Agent for LoopAgent {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn description(&self) -> &str {
        &self.meta.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.meta.sub_agents
    }

    fn run<'a>(&'a self, invocation: InvocationContext) -> EventStream<'a> {
        let body = run_bounded_loop(self.meta.sub_agents.clone(), invocation.clone(), self.max_iterations);
        wrap_with_agent_hooks(
            self.meta.name.clone(),
            self.meta.before_agent_hooks.clone(),
            self.meta.after_agent_hooks.clone(),
            invocation,
            body,
        )
    }
}

/// Shared builder for the three workflow agent kinds, matching the
/// teacher's consuming-builder idiom (`with_sub_agent`, `with_before_agent_hook`,
/// …) used throughout `agent.rs`/`orchestration.rs`.
pub struct WorkflowAgentBuilder<T> {
    meta: AgentMeta,
    construct: Box<dyn FnOnce(AgentMeta) -> T>,
}

impl<T> WorkflowAgentBuilder<T> {
    fn new(name: impl Into<String>, description: impl Into<String>, construct: impl FnOnce(AgentMeta) -> T + 'static) -> Self {
        Self {
            meta: AgentMeta::new(name, description),
            construct: Box::new(construct),
        }
    }

    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.meta = self.meta.with_sub_agent(agent);
        self
    }

    pub fn with_before_agent_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.meta = self.meta.with_before_agent_hook(hook);
        self
    }

    pub fn with_after_agent_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.meta = self.meta.with_after_agent_hook(hook);
        self
    }

    pub fn build(self) -> T {
        (self.construct)(self.meta)
    }
}
