//! Reference [`SessionService`] implementation: a process-local map guarded
//! by a `tokio::sync::RwLock`, following the same `Arc<RwLock<HashMap<..>>>`
//! shape the teacher uses for its `ToolRegistry` (`tool_protocol.rs`) and
//! `Agent::tool_registry`. Non-durable by design (spec §1 Non-goals: "No
//! persistence guarantees beyond 'the session service is called with every
//! durable event'").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Session, SessionKey, SessionService};
use crate::error::{AgentError, Result};
use crate::event::Event;

#[derive(Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let mut sessions = self.sessions.write().await;
        sessions.entry(key.clone()).or_insert_with(|| Session::new(key));
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .cloned()
            .ok_or_else(|| AgentError::not_found(format!("session {:?} not found", key)))
    }

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()> {
        if event.partial {
            // Partial events are observer-only (spec §3); silently dropped
            // rather than erroring, so a caller that forwards a raw model
            // chunk here by mistake doesn't bring down the turn.
            return Ok(());
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| AgentError::not_found(format!("session {:?} not found", key)))?;
        session.append_event(event);
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key);
        Ok(())
    }

    async fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionKey>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Author;
    use chrono::Utc;

    #[tokio::test]
    async fn scope_isolation_across_app_and_user_pairs() {
        let service = InMemorySessionService::new();
        service.create("app1", "u1", "s1").await.unwrap();
        service.create("app2", "u2", "s1").await.unwrap();

        let key1 = SessionKey::new("app1", "u1", "s1");
        let event = Event::new("inv", Author::User, Utc::now())
            .with_actions(crate::event::EventActions::new().with_state_delta("k", serde_json::json!("v1")));
        service.append_event(&key1, event).await.unwrap();

        let other_app_sessions = service.list("app2", "u2").await.unwrap();
        assert_eq!(other_app_sessions.len(), 1);
        let session2 = service.get(&other_app_sessions[0]).await.unwrap();
        assert!(session2.events().is_empty());
        assert!(session2.state().get("k").is_none());
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let service = InMemorySessionService::new();
        let err = service
            .get(&SessionKey::new("a", "u", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
