//! Memory service contract (spec §6 "Memory service"): add a completed
//! session's content to a searchable store, then search it back later.
//!
//! The teacher ships a much heavier-weight answer to "durable memory" — a
//! hash-chained, content-addressed store (`thought_chain.rs`, and the
//! `mentisdb`/`thoughtchain` workspace crate). That durability and
//! integrity-chaining machinery is out of scope here (spec §1: "Concrete
//! session / artifact / memory stores ... out of scope; an in-memory
//! implementation suffices for testing") and is dropped — see DESIGN.md.
//! What's kept is the shape the teacher's `ThoughtChain` entries have
//! (content + author + timestamp) and the scope-isolation discipline spec
//! §8 Scenario F requires.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::session::Session;

/// One retrievable memory entry.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub content: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Ingest every durable event's text content from `session` into the
    /// store, scoped to `session.app_name()`/`session.user_id()`.
    async fn add_session(&self, session: &Session) -> Result<()>;

    /// Scope-isolated search (spec §8 property 1, Scenario F): a query by
    /// `(app_name, user_id)` must never surface entries added under a
    /// different `(app_name, user_id)` pair.
    async fn search(&self, app_name: &str, user_id: &str, query: &str) -> Result<Vec<MemoryEntry>>;
}

type MemoryScopeKey = (String, String);

#[derive(Default)]
pub struct InMemoryMemoryService {
    entries: Arc<RwLock<HashMap<MemoryScopeKey, Vec<MemoryEntry>>>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session(&self, session: &Session) -> Result<()> {
        let key = (session.app_name().to_string(), session.user_id().to_string());
        let mut entries = self.entries.write().await;
        let bucket = entries.entry(key).or_insert_with(Vec::new);
        for event in session.events() {
            if let Some(content) = &event.content {
                let text = content.text();
                if !text.is_empty() {
                    bucket.push(MemoryEntry {
                        content: text,
                        author: event.author.as_str().to_string(),
                        timestamp: event.timestamp,
                    });
                }
            }
        }
        Ok(())
    }

    async fn search(&self, app_name: &str, user_id: &str, query: &str) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        let key = (app_name.to_string(), user_id.to_string());
        let query_lower = query.to_lowercase();
        Ok(entries
            .get(&key)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|e| e.content.to_lowercase().contains(&query_lower))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Role};
    use crate::event::{Author, Event};
    use crate::session::{Session, SessionKey};

    fn session_with_text(app: &str, user: &str, text: &str) -> Session {
        let mut session = Session::new(SessionKey::new(app, user, "s1"));
        let event = Event::new("inv", Author::User, Utc::now())
            .with_content(Content::from_text(Role::User, text));
        session.append_event(event);
        session
    }

    #[tokio::test]
    async fn search_is_isolated_per_user_scenario_f() {
        let service = InMemoryMemoryService::new();
        service
            .add_session(&session_with_text("app", "u1", "u1 likes rust"))
            .await
            .unwrap();
        service
            .add_session(&session_with_text("app", "u2", "u2 likes rust too"))
            .await
            .unwrap();

        let u1_results = service.search("app", "u1", "rust").await.unwrap();
        assert_eq!(u1_results.len(), 1);
        assert!(u1_results[0].content.contains("u1"));

        let u2_results = service.search("app", "u2", "rust").await.unwrap();
        assert_eq!(u2_results.len(), 1);
        assert!(u2_results[0].content.contains("u2"));
    }
}
