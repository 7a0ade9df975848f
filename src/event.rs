//! The unit of observable progress: [`Event`] (spec §3 "Event") and the
//! side-effect intents it carries in [`EventActions`].
//!
//! Generalizes the teacher's observability-only `AgentEvent`/`OrchestrationEvent`
//! enums (`cloudllm::event`) into the durable, content-bearing log entry the
//! spec requires: every agent turn, tool call, tool response, and transfer is
//! one `Event`, appended to the session (unless `partial`) rather than merely
//! announced to a callback.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::Content;

/// Side-effect intents attached to an [`Event`], applied when the event is
/// committed to the session (spec §3 "Lifecycle").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActions {
    /// Pending mutations to session state, keyed by scoped key (spec §3
    /// "Session state"). Applied atomically with the event's append.
    pub state_delta: HashMap<String, serde_json::Value>,
    /// Versions of artifacts saved as a side effect of this event, keyed by
    /// artifact file name.
    pub artifact_delta: HashMap<String, i64>,
    /// When true, a downstream summarization pass (if any) should skip this
    /// event. Set on synthetic confirmation-request events (spec §4.3).
    pub skip_summarization: bool,
    /// When true, the enclosing workflow agent (sequential/loop) stops after
    /// this event (spec §4.4.1, §4.4.3).
    pub escalate: bool,
    /// Name of the agent control is transferring to, set on the synthetic
    /// transfer function-call/response pair (spec §4.2 "Transfer-to-agent").
    pub transfer_to_agent: Option<String>,
}

impl EventActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_delta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.state_delta.insert(key.into(), value);
        self
    }

    pub fn with_escalate(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn with_transfer_to_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.transfer_to_agent = Some(agent_name.into());
        self
    }
}

/// Author attribution for an `Event`: either the literal user, or the name of
/// the agent that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Agent(String),
}

impl Author {
    pub fn as_str(&self) -> &str {
        match self {
            Author::User => "user",
            Author::Agent(name) => name,
        }
    }

    pub fn agent_name(&self) -> Option<&str> {
        match self {
            Author::Agent(name) => Some(name),
            Author::User => None,
        }
    }
}

/// One unit of observable progress in an invocation (spec §3 "Event").
///
/// `partial = true` events are streamed to observers but must never be
/// appended to a session's durable log (spec §3 invariant, §8 property 5);
/// see [`crate::session::Session::append_event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    pub content: Option<Content>,
    pub partial: bool,
    pub turn_complete: bool,
    pub long_running_tool_ids: HashSet<String>,
    pub actions: EventActions,
    /// Dotted branch path scoping this event to a parallel sub-run (spec
    /// §4.4.2, §4.5). `None` outside of parallel workflows.
    pub branch: Option<String>,
}

impl Event {
    /// Construct a new non-partial, turn-complete event with otherwise empty
    /// actions. Callers mutate `actions`/`partial`/`long_running_tool_ids`
    /// afterwards as needed — this mirrors the teacher's consuming-builder
    /// style without requiring a full builder type for a plain data struct.
    pub fn new(invocation_id: impl Into<String>, author: Author, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author,
            timestamp,
            content: None,
            partial: false,
            turn_complete: true,
            long_running_tool_ids: HashSet::new(),
            actions: EventActions::new(),
            branch: None,
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_turn_complete(mut self, turn_complete: bool) -> Self {
        self.turn_complete = turn_complete;
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_long_running_tool_ids(mut self, ids: HashSet<String>) -> Self {
        self.long_running_tool_ids = ids;
        self
    }

    /// `true` if this event's content carries at least one function-call part.
    pub fn has_function_call(&self) -> bool {
        self.content
            .as_ref()
            .map(|c| c.has_function_calls())
            .unwrap_or(false)
    }

    /// `true` if this event's content carries at least one function-response
    /// part whose `id` matches `call_id`.
    pub fn responds_to_call(&self, call_id: &str) -> bool {
        self.content
            .as_ref()
            .map(|c| c.function_responses().iter().any(|r| r.id == call_id))
            .unwrap_or(false)
    }

    /// `true` if this event's content carries a function-call part named
    /// `call_id` (used by the call/response pairing check, spec §8 property 3).
    pub fn has_call_id(&self, call_id: &str) -> bool {
        self.content
            .as_ref()
            .map(|c| c.function_calls().iter().any(|c| c.id == call_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Part, Role};

    #[test]
    fn author_as_str_distinguishes_user_from_agent() {
        assert_eq!(Author::User.as_str(), "user");
        assert_eq!(Author::Agent("planner".into()).as_str(), "planner");
    }

    #[test]
    fn responds_to_call_matches_by_id() {
        let event = Event::new("inv-1", Author::Agent("root".into()), Utc::now()).with_content(
            Content::new(
                Role::User,
                vec![Part::function_response("call-1", "calc", serde_json::json!({"ok": true}))],
            ),
        );
        assert!(event.responds_to_call("call-1"));
        assert!(!event.responds_to_call("call-2"));
    }
}
