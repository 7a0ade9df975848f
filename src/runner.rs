//! The runner: the single entry point a host application calls (spec §4.6),
//! plus `findAgentToRun` agent routing (spec §4.8).
//!
//! No teacher analog — the teacher's `Agent::send`/`send_message_stream` is
//! called directly by the application with no separate dispatch layer, no
//! session lookup, and no agent-tree routing (there is only ever the one
//! agent the caller holds a reference to). This module is new surface
//! required by the tree-of-agents model, built in the teacher's style: a
//! plain struct constructed by a consuming builder (`RunnerBuilder`, mirroring
//! `Orchestration::new(...)`), with the state machine itself expressed as one
//! `async_stream::try_stream!` body, matching every other lazy event stream
//! in this crate.

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::agent::{Agent, AgentTree};
use crate::artifact::ArtifactService;
use crate::content::{Content, Part};
use crate::context::{InvocationContext, RunConfig};
use crate::error::{AgentError, Result};
use crate::event::{Author, Event};
use crate::memory::MemoryService;
use crate::plugin::{Plugin, PluginManager};
use crate::session::{Session, SessionKey, SessionService};

/// The single entry point a host application calls to drive one turn
/// through the agent tree (spec §4.6).
pub struct Runner {
    tree: Arc<AgentTree>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn ArtifactService>>,
    memory_service: Option<Arc<dyn MemoryService>>,
    plugins: Arc<PluginManager>,
}

impl Runner {
    pub fn builder(root: Arc<dyn Agent>, session_service: Arc<dyn SessionService>) -> RunnerBuilder {
        RunnerBuilder::new(root, session_service)
    }

    pub fn tree(&self) -> &Arc<AgentTree> {
        &self.tree
    }

    /// `Run(user, session, userContent, cfg) -> event stream` (spec §4.6).
    /// `session_key` carries the `(appName, userID, sessionID)` triple the
    /// spec calls `user`/`session` together; the session must already exist
    /// (created out of band via the session service), per step 1.
    pub fn run<'a>(&'a self, session_key: SessionKey, user_content: Content, run_config: RunConfig) -> crate::agent::EventStream<'a> {
        Box::pin(async_stream::try_stream! {
            // Step 1: fetch the session; NotFound propagates as-is.
            let session = match self.session_service.get(&session_key).await {
                Ok(session) => session,
                Err(error) => Err(error)?,
            };

            // Step 2: resolve the starting agent (§4.8).
            let starting_agent = self.find_agent_to_run(&session, &user_content);

            // Step 3: construct the invocation context.
            let mut invocation = InvocationContext::new(
                session_key.clone(),
                self.session_service.clone(),
                starting_agent,
                Some(user_content.clone()),
                run_config,
            )
            .with_tree(self.tree.clone())
            .with_plugins(self.plugins.clone());
            if let Some(artifact_service) = &self.artifact_service {
                invocation = invocation.with_artifact_service(artifact_service.clone());
            }
            if let Some(memory_service) = &self.memory_service {
                invocation = invocation.with_memory_service(memory_service.clone());
            }

            // Step 4: run the onUserMessage plugin hook, then append the
            // (possibly rewritten) user event.
            let content = self.plugins.on_user_message(&invocation, &user_content).await.unwrap_or(user_content);

            // Step 5: save inline-data parts as artifacts, if configured.
            let content = match self.save_input_blobs_as_artifacts(&invocation, content).await {
                Ok(content) => content,
                Err(error) => {
                    self.plugins.after_run(&invocation).await;
                    Err(error)?
                }
            };

            let user_event = Event::new(invocation.invocation_id.clone(), Author::User, chrono::Utc::now())
                .with_content(content);
            if let Err(error) = self.session_service.append_event(&session_key, user_event).await {
                self.plugins.after_run(&invocation).await;
                Err(error)?;
            }

            // Step 6: beforeRun, short-circuiting the whole run.
            if self.plugins.before_run(&invocation).await.is_some() {
                self.plugins.after_run(&invocation).await;
                return;
            }

            // Step 7: drive the agent tree, following transfers (spec §4.2
            // "the runner's next iteration for this invocation routes to the
            // target agent") until an agent ends its turn without handing
            // off, or the invocation is cancelled/ended.
            let mut current_agent_name = invocation.agent_name.clone();
            loop {
                if invocation.is_cancelled() || invocation.is_invocation_ended() {
                    break;
                }

                let agent = match self.tree.get(&current_agent_name) {
                    Some(agent) => agent,
                    None => {
                        self.plugins.after_run(&invocation).await;
                        Err(AgentError::not_found(format!("agent '{current_agent_name}' not found in tree")))?
                    }
                };

                let child_invocation = invocation.with_agent(current_agent_name.clone());
                let mut agent_stream = agent.run(child_invocation);
                let mut transfer_target: Option<String> = None;

                loop {
                    let next = agent_stream.next().await;
                    let event = match next {
                        Some(Ok(event)) => event,
                        Some(Err(error)) => {
                            self.plugins.after_run(&invocation).await;
                            Err(error)?
                        }
                        None => break,
                    };

                    self.plugins.on_event(&invocation, &event).await;
                    if event.actions.transfer_to_agent.is_some() {
                        transfer_target = event.actions.transfer_to_agent.clone();
                    }
                    if !event.partial {
                        if let Err(error) = self.session_service.append_event(&session_key, event.clone()).await {
                            self.plugins.after_run(&invocation).await;
                            Err(error)?;
                        }
                    }
                    yield event;
                }

                match transfer_target {
                    Some(target) => current_agent_name = target,
                    None => break,
                }
            }

            // Step 8: afterRun cleanup on normal stream end.
            self.plugins.after_run(&invocation).await;
        })
    }

    /// `Runner.findAgentToRun` (spec §4.8): resolve which agent should
    /// handle `user_content` given `session`'s event history.
    fn find_agent_to_run(&self, session: &Session, user_content: &Content) -> String {
        let function_responses = user_content.function_responses();
        for response in &function_responses {
            let matching_call = session.events().iter().rev().find(|event| event.has_call_id(&response.id));
            let Some(event) = matching_call else { continue };
            match event.author.agent_name() {
                Some(name) if self.tree.get(name).is_some() => return name.to_string(),
                Some(name) => log::warn!("function-response routing target '{name}' is no longer in the agent tree, falling back"),
                None => {}
            }
        }

        for event in session.events().iter().rev() {
            if event.author == Author::User {
                continue;
            }
            let Some(name) = event.author.agent_name() else { continue };
            if self.tree.get(name).is_none() {
                continue;
            }
            if self.is_transferable_to_root(name) {
                return name.to_string();
            }
        }

        self.tree.root_name().to_string()
    }

    /// `true` if every agent on `agent_name`'s path up to (but excluding)
    /// the root allows transferring to its own parent (spec §4.8 step 2:
    /// "transferable across the tree").
    fn is_transferable_to_root(&self, agent_name: &str) -> bool {
        for name in self.tree.parent_map.path_to_root(agent_name) {
            if name == self.tree.root_name() {
                continue;
            }
            if let Some(agent) = self.tree.get(name) {
                if agent.transfer_policy().disallow_transfer_to_parent {
                    return false;
                }
            }
        }
        true
    }

    /// Save each inline-data part of `content` via the artifact service and
    /// replace it with a textual placeholder (spec §4.6 step 5). A no-op
    /// when no artifact service is configured or `run_config.save_input_blobs_as_artifacts`
    /// is false.
    async fn save_input_blobs_as_artifacts(&self, invocation: &InvocationContext, content: Content) -> Result<Content> {
        if !invocation.run_config.save_input_blobs_as_artifacts {
            return Ok(content);
        }
        let Some(artifact_service) = &self.artifact_service else {
            return Ok(content);
        };

        let mut parts = Vec::with_capacity(content.parts.len());
        for part in content.parts {
            match part {
                Part::InlineData { inline_data } => {
                    let file_name = inline_data
                        .display_name
                        .clone()
                        .unwrap_or_else(|| format!("blob-{}", Uuid::new_v4()));
                    let version = artifact_service
                        .save(
                            &invocation.session_key.app_name,
                            &invocation.session_key.user_id,
                            &invocation.session_key.session_id,
                            &file_name,
                            Part::InlineData { inline_data },
                        )
                        .await?;
                    parts.push(Part::text(format!("[artifact: {file_name} v{version}]")));
                }
                other => parts.push(other),
            }
        }
        Ok(Content { role: content.role, parts })
    }
}

/// Consuming builder for [`Runner`], matching the teacher's `with_*`-method
/// builder idiom.
pub struct RunnerBuilder {
    root: Arc<dyn Agent>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn ArtifactService>>,
    memory_service: Option<Arc<dyn MemoryService>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl RunnerBuilder {
    pub fn new(root: Arc<dyn Agent>, session_service: Arc<dyn SessionService>) -> Self {
        Self {
            root,
            session_service,
            artifact_service: None,
            memory_service: None,
            plugins: Vec::new(),
        }
    }

    pub fn with_artifact_service(mut self, service: Arc<dyn ArtifactService>) -> Self {
        self.artifact_service = Some(service);
        self
    }

    pub fn with_memory_service(mut self, service: Arc<dyn MemoryService>) -> Self {
        self.memory_service = Some(service);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> Result<Runner> {
        let tree = Arc::new(AgentTree::build(self.root)?);
        Ok(Runner {
            tree,
            session_service: self.session_service,
            artifact_service: self.artifact_service,
            memory_service: self.memory_service,
            plugins: Arc::new(PluginManager::new(self.plugins)),
        })
    }
}
