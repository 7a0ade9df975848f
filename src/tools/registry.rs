//! Tool lookup by name, grounded on the teacher's `Agent::tool_registry`
//! (`HashMap<String, Arc<dyn ToolProtocol>>` in `tool_protocol.rs`), minus
//! the multi-protocol routing the teacher layers on top — every entry here
//! is a concrete [`Tool`] object.

use std::collections::HashMap;
use std::sync::Arc;

use super::Tool;

/// A flat name-to-tool map, owned by an `LlmAgent` and consulted once per
/// turn to build the model's tool declarations (spec §4.2 step 1) and once
/// per function call to resolve a dispatch target (spec §4.3).
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
