//! Session model: the append-only event log plus scoped mutable state that
//! binds one `(appName, userID, sessionID)` together (spec §3 "Session").
//!
//! Generalizes the teacher's `LLMSession` (per-agent rolling chat history,
//! see `llm_session.rs`) from a single provider-bound conversation buffer
//! into the durable, multi-agent session the spec requires: an append-only
//! `Vec<Event>` plus a flat state map with prefix-based scoping, owned by a
//! [`SessionService`] rather than by an individual agent.

mod in_memory;
mod state;

pub use in_memory::InMemorySessionService;
pub use state::{State, StateScope};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::Event;

/// `(appName, userID, sessionID)` — the compound key every session is
/// addressed by (spec §3 "a session belongs to exactly one `(appName,
/// userID)` pair").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// A durable conversation: identity, an append-only event log, and scoped
/// mutable state (spec §3).
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    state: State,
    events: Vec<Event>,
    last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            state: State::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.key.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.key.session_id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// All durable events in causal order (spec §3 "Event ordering reflects
    /// causal order"). Never contains a `partial = true` event (spec §8
    /// property 5).
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.last_update_time
    }

    /// Append a durable event, applying its `actions.state_delta` atomically
    /// with respect to the event becoming visible (spec §6 "`AppendEvent`
    /// must apply the event's state delta atomically with respect to the
    /// event's visibility").
    ///
    /// Callers must filter `partial` events out before calling this — the
    /// session itself refuses to store them, since the invariant in spec §3
    /// ("must not be appended to the session log") is load-bearing for
    /// property 5 and must hold even if a caller forgets to filter.
    pub(crate) fn append_event(&mut self, event: Event) {
        if event.partial {
            return;
        }
        for (key, value) in &event.actions.state_delta {
            self.state.set_raw(key, value.clone());
        }
        self.last_update_time = event.timestamp.max(self.last_update_time);
        self.events.push(event);
    }
}

/// The service interface a session store implements (spec §6 "Session
/// service"). The core depends only on this trait; [`InMemorySessionService`]
/// is the reference implementation used by tests and examples.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()>;

    async fn get(&self, key: &SessionKey) -> Result<Session>;

    /// Append `event` to the identified session, applying its state delta.
    /// `partial` events must be rejected (spec §3, §8 property 5): the
    /// runner never calls this for a partial event, but a conforming
    /// implementation should not durably store one even if asked.
    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()>;

    async fn delete(&self, key: &SessionKey) -> Result<()>;

    async fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionKey>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Author;

    #[test]
    fn append_event_rejects_partial_events() {
        let mut session = Session::new(SessionKey::new("app", "u1", "s1"));
        let event = Event::new("inv", Author::User, Utc::now()).with_partial(true);
        session.append_event(event);
        assert!(session.events().is_empty());
    }

    #[test]
    fn append_event_applies_state_delta_atomically_with_append() {
        let mut session = Session::new(SessionKey::new("app", "u1", "s1"));
        let actions = crate::event::EventActions::new()
            .with_state_delta("counter", serde_json::json!(1));
        let event = Event::new("inv", Author::User, Utc::now()).with_actions(actions);
        session.append_event(event);
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.state().get("counter"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn last_update_time_is_non_decreasing() {
        let mut session = Session::new(SessionKey::new("app", "u1", "s1"));
        let t0 = session.last_update_time();
        let e1 = Event::new("inv", Author::User, t0 + chrono::Duration::seconds(5));
        session.append_event(e1);
        assert!(session.last_update_time() >= t0);
        let t1 = session.last_update_time();
        let e2 = Event::new("inv", Author::User, t0);
        session.append_event(e2);
        assert!(session.last_update_time() >= t1);
    }
}
