//! Parent map construction and validation (spec §4.9).
//!
//! No teacher analog — `Orchestration` (`orchestration.rs`) holds a flat
//! `Vec<Agent>` with no tree structure at all, so there is nothing to derive
//! a parent index from. This is new surface required by the tree-of-agents
//! model; built in the teacher's validate-eagerly style (`Agent::new`
//! rejects malformed construction up front rather than failing later at
//! call time).

use std::collections::HashMap;
use std::sync::Arc;

use super::Agent;
use crate::error::{AgentError, Result};

/// Maps each agent's name to its parent's name. The root agent has no entry
/// (spec §4.9: "root maps to nothing").
#[derive(Debug, Clone, Default)]
pub struct ParentMap {
    parents: HashMap<String, String>,
}

impl ParentMap {
    /// Build a parent map by walking the tree rooted at `root`, enforcing
    /// spec §4.9's two invariants: every agent name in the tree is unique,
    /// and no agent appears under more than one parent.
    pub fn build(root: &Arc<dyn Agent>) -> Result<Self> {
        let mut parents = HashMap::new();
        let mut seen = HashMap::new();
        walk(root, None, &mut parents, &mut seen)?;
        Ok(Self { parents })
    }

    pub fn parent_of(&self, agent_name: &str) -> Option<&str> {
        self.parents.get(agent_name).map(|s| s.as_str())
    }

    /// Path from `agent_name` up to (and including) the root, innermost
    /// first. Used by the transfer policy's reachability check (spec §4.10).
    pub fn path_to_root<'a>(&'a self, agent_name: &'a str) -> Vec<&'a str> {
        let mut path = vec![agent_name];
        let mut current = agent_name;
        while let Some(parent) = self.parent_of(current) {
            path.push(parent);
            current = parent;
        }
        path
    }

    pub fn contains(&self, agent_name: &str) -> bool {
        self.parents.contains_key(agent_name) || self.parents.values().any(|p| p == agent_name)
    }
}

fn walk(
    agent: &Arc<dyn Agent>,
    parent_name: Option<&str>,
    parents: &mut HashMap<String, String>,
    seen: &mut HashMap<String, ()>,
) -> Result<()> {
    let name = agent.name().to_string();
    if seen.contains_key(&name) {
        return Err(AgentError::invalid_argument(format!(
            "agent name '{name}' is not unique within the tree"
        )));
    }
    seen.insert(name.clone(), ());
    if let Some(parent_name) = parent_name {
        parents.insert(name.clone(), parent_name.to_string());
    }
    for child in agent.sub_agents() {
        walk(child, Some(&name), parents, seen)?;
    }
    Ok(())
}
