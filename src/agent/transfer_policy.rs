//! Transfer policy: which agents an `LlmAgent` may hand control to, and
//! whether a requested target is reachable (spec §4.10).
//!
//! New surface, same as [`super::parent_map`] — the teacher has no notion of
//! one agent handing off to another at all. `TransferPolicy` is deliberately
//! a plain data struct with `with_*` builder methods, matching the teacher's
//! consuming-builder idiom used throughout `agent.rs` (`with_event_handler`,
//! `with_tool_registry`, etc.).

use super::parent_map::ParentMap;

/// Per-agent transfer flags (spec §4.10: "Each LLM agent carries two flags:
/// `disallowTransferToParent` and `disallowTransferToPeers`").
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferPolicy {
    pub disallow_transfer_to_parent: bool,
    pub disallow_transfer_to_peers: bool,
}

impl TransferPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disallow_transfer_to_parent(mut self) -> Self {
        self.disallow_transfer_to_parent = true;
        self
    }

    pub fn disallow_transfer_to_peers(mut self) -> Self {
        self.disallow_transfer_to_peers = true;
        self
    }

    /// `true` if this agent allows at least one of transferring to its
    /// parent, to its peers, or to its sub-agents (spec §4.10). Transfer to
    /// a sub-agent is never gated by either flag, so an agent with children
    /// always offers the tool regardless of `has_peers`/`has_parent`.
    pub fn offers_transfer(&self, has_parent: bool, has_peers: bool, has_sub_agents: bool) -> bool {
        (has_parent && !self.disallow_transfer_to_parent)
            || (has_peers && !self.disallow_transfer_to_peers)
            || has_sub_agents
    }
}

/// Re-check whether `from_agent` may transfer to `target_agent` given the
/// tree's parent map and each ancestor's own transfer policy (spec §4.10:
/// "Target validity is re-checked at transfer time").
///
/// `policy_of` resolves an agent name to its `TransferPolicy`; agents with no
/// registered policy (e.g. workflow agents, which never refuse a transfer
/// themselves) are treated as fully permissive.
pub fn can_transfer(
    parent_map: &ParentMap,
    from_agent: &str,
    target_agent: &str,
    policy_of: impl Fn(&str) -> Option<TransferPolicy>,
) -> bool {
    if !parent_map.contains(target_agent) {
        return false;
    }
    if from_agent == target_agent {
        return true;
    }

    let is_descendant = parent_map
        .path_to_root(target_agent)
        .into_iter()
        .skip(1)
        .any(|ancestor| ancestor == from_agent);
    if is_descendant {
        return true;
    }

    let from_path = parent_map.path_to_root(from_agent);
    let target_path = parent_map.path_to_root(target_agent);
    if from_path.is_empty() || target_path.is_empty() {
        return false;
    }

    let is_parent = parent_map.parent_of(from_agent) == Some(target_agent);
    let is_peer = parent_map.parent_of(from_agent).is_some()
        && parent_map.parent_of(from_agent) == parent_map.parent_of(target_agent)
        && from_agent != target_agent;

    if !is_parent && !is_peer {
        // Not parent, not a direct peer, not a descendant: disallow. A
        // language-neutral core could widen this to "any ancestor" but spec
        // §4.2/§4.10 only describe parent/peer/sub-agent transfer targets.
        return false;
    }

    // Every agent on the path from the target back up to (but not
    // including) the nearest common point must allow the kind of transfer
    // being exercised (spec §4.8 step 2's "transferable across the tree").
    for ancestor in &from_path {
        if let Some(policy) = policy_of(ancestor) {
            if is_parent && policy.disallow_transfer_to_parent {
                return false;
            }
            if is_peer && policy.disallow_transfer_to_peers {
                return false;
            }
        }
    }
    true
}
