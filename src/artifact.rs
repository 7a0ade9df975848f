//! Artifact storage service contract (spec §6 "Artifact service").
//!
//! Generalizes the teacher's `resource_protocol::ResourceProtocol`
//! (`list_resources`/`read_resource`, app-provided contextual data) into a
//! versioned, write-capable store keyed by `(appName, userID, sessionID,
//! fileName)`, the way spec §6 specifies: `Save` returns a new version,
//! `Load` takes an optional version with `-1`/omitted meaning latest.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::content::Part;
use crate::error::{AgentError, Result};

/// `version = -1` (or simply omitting the parameter) means "latest", per
/// spec §6.
pub const LATEST_VERSION: i64 = -1;

#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Persist `part` under `file_name`, returning the new version number.
    /// Versions are per `(app_name, user_id, session_id, file_name)` and
    /// start at `0`.
    async fn save(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        part: Part,
    ) -> Result<i64>;

    /// Load a previously saved artifact. `version = None` or
    /// `Some(LATEST_VERSION)` loads the most recently saved version.
    async fn load(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        version: Option<i64>,
    ) -> Result<Part>;

    async fn list(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>>;
}

type ArtifactKey = (String, String, String, String);

/// Reference in-memory implementation, grounded on the same
/// `Arc<RwLock<HashMap<..>>>` shape the teacher's `ToolRegistry` and this
/// crate's `InMemorySessionService` use.
#[derive(Default)]
pub struct InMemoryArtifactService {
    versions: Arc<RwLock<HashMap<ArtifactKey, Vec<Part>>>>,
}

impl InMemoryArtifactService {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app_name: &str, user_id: &str, session_id: &str, file_name: &str) -> ArtifactKey {
        (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
            file_name.to_string(),
        )
    }
}

#[async_trait]
impl ArtifactService for InMemoryArtifactService {
    async fn save(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        part: Part,
    ) -> Result<i64> {
        let key = Self::key(app_name, user_id, session_id, file_name);
        let mut versions = self.versions.write().await;
        let entry = versions.entry(key).or_insert_with(Vec::new);
        entry.push(part);
        Ok((entry.len() - 1) as i64)
    }

    async fn load(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        file_name: &str,
        version: Option<i64>,
    ) -> Result<Part> {
        let key = Self::key(app_name, user_id, session_id, file_name);
        let versions = self.versions.read().await;
        let entry = versions
            .get(&key)
            .ok_or_else(|| AgentError::not_found(format!("artifact {} not found", file_name)))?;
        let index = match version {
            None | Some(LATEST_VERSION) => entry.len().checked_sub(1),
            Some(v) if v >= 0 => Some(v as usize),
            Some(_) => None,
        };
        index
            .and_then(|i| entry.get(i))
            .cloned()
            .ok_or_else(|| AgentError::not_found(format!("artifact {} version not found", file_name)))
    }

    async fn list(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>> {
        let versions = self.versions.read().await;
        Ok(versions
            .keys()
            .filter(|(a, u, s, _)| a == app_name && u == user_id && s == session_id)
            .map(|(_, _, _, f)| f.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InlineData;

    fn blob(n: u8) -> Part {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: "text/plain".into(),
                data: vec![n],
                display_name: None,
            },
        }
    }

    #[tokio::test]
    async fn save_versions_increment_and_latest_resolves_last() {
        let service = InMemoryArtifactService::new();
        let v0 = service.save("app", "u1", "s1", "notes.txt", blob(1)).await.unwrap();
        let v1 = service.save("app", "u1", "s1", "notes.txt", blob(2)).await.unwrap();
        assert_eq!(v0, 0);
        assert_eq!(v1, 1);

        let latest = service.load("app", "u1", "s1", "notes.txt", None).await.unwrap();
        match latest {
            Part::InlineData { inline_data } => assert_eq!(inline_data.data, vec![2]),
            _ => panic!("expected inline data"),
        }

        let first = service.load("app", "u1", "s1", "notes.txt", Some(0)).await.unwrap();
        match first {
            Part::InlineData { inline_data } => assert_eq!(inline_data.data, vec![1]),
            _ => panic!("expected inline data"),
        }
    }
}
