//! Scoped session state (spec §3 "Session state").
//!
//! A single flat map keyed by string, where a key's *prefix* determines its
//! durability scope: `app:` shared across users of an app, `user:` shared
//! across sessions of one user, `temp:` invocation-local and never
//! persisted, and no prefix meaning session-local.

use std::collections::HashMap;

pub const APP_PREFIX: &str = "app:";
pub const USER_PREFIX: &str = "user:";
pub const TEMP_PREFIX: &str = "temp:";

/// Which durability scope a state key belongs to, derived from its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateScope {
    App,
    User,
    Session,
    /// Exists only for the duration of one invocation; never persisted
    /// (spec §3). Stripped before a session is durably saved.
    Temp,
}

impl StateScope {
    pub fn of(key: &str) -> Self {
        if key.starts_with(APP_PREFIX) {
            StateScope::App
        } else if key.starts_with(USER_PREFIX) {
            StateScope::User
        } else if key.starts_with(TEMP_PREFIX) {
            StateScope::Temp
        } else {
            StateScope::Session
        }
    }
}

/// The state map itself. Stores raw `serde_json::Value`s so any
/// `Serialize`-able type can be round-tripped through it without the map
/// owning a type parameter.
#[derive(Debug, Clone, Default)]
pub struct State {
    values: HashMap<String, serde_json::Value>,
}

impl State {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set_raw(&mut self, key: &str, value: serde_json::Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All keys scoped to `app:`/`user:` with their prefix retained, used by
    /// a durable store to decide what survives across sessions.
    pub fn scoped(&self, scope: StateScope) -> HashMap<String, serde_json::Value> {
        self.values
            .iter()
            .filter(|(k, _)| StateScope::of(k) == scope)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop every `temp:`-scoped key. Called by the runner at the end of an
    /// invocation that is *not* suspended on a long-running tool — see the
    /// Open Question in spec §9 on `temp:` lifetime across suspensions,
    /// resolved in DESIGN.md.
    pub fn clear_temp(&mut self) {
        self.values
            .retain(|k, _| StateScope::of(k) != StateScope::Temp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_of_recognizes_all_four_prefixes() {
        assert_eq!(StateScope::of("app:theme"), StateScope::App);
        assert_eq!(StateScope::of("user:locale"), StateScope::User);
        assert_eq!(StateScope::of("temp:scratch"), StateScope::Temp);
        assert_eq!(StateScope::of("last_tool"), StateScope::Session);
    }

    #[test]
    fn clear_temp_only_removes_temp_scoped_keys() {
        let mut state = State::new();
        state.set_raw("temp:scratch", serde_json::json!(1));
        state.set_raw("app:theme", serde_json::json!("dark"));
        state.set_raw("last_tool", serde_json::json!("calc"));
        state.clear_temp();
        assert!(!state.contains_key("temp:scratch"));
        assert!(state.contains_key("app:theme"));
        assert!(state.contains_key("last_tool"));
    }
}
