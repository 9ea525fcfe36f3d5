//! Shared state blackboard
//!
//! A single key-value store shared by every agent and tool in an agency.
//! Handles are cheap clones of the same underlying map, so a value written
//! by one tool is immediately visible to every other participant.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cloneable handle to the agency-wide blackboard.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().unwrap().insert(key.into(), value);
    }

    /// Returns a clone of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().unwrap().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Copies the full map out, for inspection or persistence.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().unwrap().clone()
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let state = SharedState::new();
        assert!(state.is_empty());

        state.set("task", json!({"status": "open"}));
        assert_eq!(state.get("task"), Some(json!({"status": "open"})));
        assert!(state.contains_key("task"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_clones_share_storage() {
        let state = SharedState::new();
        let handle = state.clone();

        handle.set("shared", json!(42));
        assert_eq!(state.get("shared"), Some(json!(42)));
    }

    #[test]
    fn test_remove() {
        let state = SharedState::new();
        state.set("ephemeral", json!("gone soon"));

        let removed = state.remove("ephemeral");
        assert_eq!(removed, Some(json!("gone soon")));
        assert!(state.get("ephemeral").is_none());
    }

    #[test]
    fn test_snapshot() {
        let state = SharedState::new();
        state.set("a", json!(1));
        state.set("b", json!(2));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], json!(1));
    }
}
