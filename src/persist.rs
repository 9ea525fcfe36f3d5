//! Persistence callbacks
//!
//! The agency never touches disk itself. Callers that want settings or
//! thread ids to survive a restart hand in load/save callbacks, invoked
//! once during construction. Callback failures are fatal to construction,
//! surfaced as [`crate::error::AgencyError::Persistence`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

type LoadFn<T> = Arc<dyn Fn() -> Result<Option<T>> + Send + Sync>;
type SaveFn<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Load/save hooks for the agent settings payload, a JSON array of
/// `{name, id}` objects describing previously registered agents.
#[derive(Clone)]
pub struct SettingsCallbacks {
    load: LoadFn<Value>,
    save: SaveFn<Value>,
}

impl SettingsCallbacks {
    pub fn new<L, S>(load: L, save: S) -> Self
    where
        L: Fn() -> Result<Option<Value>> + Send + Sync + 'static,
        S: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            load: Arc::new(load),
            save: Arc::new(save),
        }
    }

    /// Callbacks backed by a shared in-memory slot, for tests and demos.
    pub fn in_memory(store: Arc<Mutex<Option<Value>>>) -> Self {
        let load_store = Arc::clone(&store);
        Self::new(
            move || Ok(load_store.lock().unwrap().clone()),
            move |value| {
                *store.lock().unwrap() = Some(value.clone());
                Ok(())
            },
        )
    }

    pub fn load(&self) -> Result<Option<Value>> {
        (self.load)()
    }

    pub fn save(&self, settings: &Value) -> Result<()> {
        (self.save)(settings)
    }
}

impl std::fmt::Debug for SettingsCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsCallbacks").finish()
    }
}

/// The persisted thread-id mapping: one main thread for the user-facing
/// entry point, plus a sender → recipient → id table for every other pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadIds {
    /// External id of the user ↔ entry-point thread.
    pub main_thread: Option<String>,
    /// External ids keyed by sender name, then recipient name. User-facing
    /// channels beyond the entry point use the sender key `"user"`.
    pub threads: HashMap<String, HashMap<String, String>>,
}

impl ThreadIds {
    pub fn main(&self) -> Option<&str> {
        self.main_thread.as_deref()
    }

    pub fn set_main(&mut self, id: impl Into<String>) {
        self.main_thread = Some(id.into());
    }

    pub fn get(&self, sender: &str, recipient: &str) -> Option<&str> {
        self.threads
            .get(sender)
            .and_then(|recipients| recipients.get(recipient))
            .map(String::as_str)
    }

    pub fn set(&mut self, sender: impl Into<String>, recipient: impl Into<String>, id: impl Into<String>) {
        self.threads
            .entry(sender.into())
            .or_default()
            .insert(recipient.into(), id.into());
    }

    /// Total number of stored ids, main thread included.
    pub fn len(&self) -> usize {
        let pairs: usize = self.threads.values().map(HashMap::len).sum();
        pairs + usize::from(self.main_thread.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load/save hooks for the thread-id mapping.
#[derive(Clone)]
pub struct ThreadCallbacks {
    load: LoadFn<ThreadIds>,
    save: SaveFn<ThreadIds>,
}

impl ThreadCallbacks {
    pub fn new<L, S>(load: L, save: S) -> Self
    where
        L: Fn() -> Result<Option<ThreadIds>> + Send + Sync + 'static,
        S: Fn(&ThreadIds) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            load: Arc::new(load),
            save: Arc::new(save),
        }
    }

    /// Callbacks backed by a shared in-memory slot, for tests and demos.
    pub fn in_memory(store: Arc<Mutex<Option<ThreadIds>>>) -> Self {
        let load_store = Arc::clone(&store);
        Self::new(
            move || Ok(load_store.lock().unwrap().clone()),
            move |ids| {
                *store.lock().unwrap() = Some(ids.clone());
                Ok(())
            },
        )
    }

    pub fn load(&self) -> Result<Option<ThreadIds>> {
        (self.load)()
    }

    pub fn save(&self, ids: &ThreadIds) -> Result<()> {
        (self.save)(ids)
    }
}

impl std::fmt::Debug for ThreadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadCallbacks").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgencyError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_thread_ids_mapping() {
        let mut ids = ThreadIds::default();
        assert!(ids.is_empty());

        ids.set_main("thread_main");
        ids.set("CEO", "Developer", "thread_1");
        ids.set("CEO", "Analyst", "thread_2");

        assert_eq!(ids.main(), Some("thread_main"));
        assert_eq!(ids.get("CEO", "Developer"), Some("thread_1"));
        assert_eq!(ids.get("CEO", "Analyst"), Some("thread_2"));
        assert_eq!(ids.get("Developer", "CEO"), None);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_thread_ids_serialization() {
        let mut ids = ThreadIds::default();
        ids.set_main("thread_main");
        ids.set("CEO", "Developer", "thread_1");

        let json = serde_json::to_value(&ids).unwrap();
        assert_eq!(json["main_thread"], "thread_main");
        assert_eq!(json["threads"]["CEO"]["Developer"], "thread_1");

        let restored: ThreadIds = serde_json::from_value(json).unwrap();
        assert_eq!(restored, ids);
    }

    #[test]
    fn test_in_memory_settings_round_trip() {
        let store = Arc::new(Mutex::new(None));
        let callbacks = SettingsCallbacks::in_memory(Arc::clone(&store));

        assert!(callbacks.load().unwrap().is_none());

        let settings = serde_json::json!([{"name": "CEO", "id": "asst_1"}]);
        callbacks.save(&settings).unwrap();
        assert_eq!(callbacks.load().unwrap(), Some(settings));
    }

    #[test]
    fn test_in_memory_thread_round_trip() {
        let store = Arc::new(Mutex::new(None));
        let callbacks = ThreadCallbacks::in_memory(Arc::clone(&store));

        let mut ids = ThreadIds::default();
        ids.set("CEO", "Developer", "thread_1");
        callbacks.save(&ids).unwrap();

        assert_eq!(callbacks.load().unwrap(), Some(ids));
    }

    #[test]
    fn test_failing_callback_surfaces_error() {
        let callbacks = SettingsCallbacks::new(
            || Err(AgencyError::Persistence("disk gone".to_string())),
            |_| Ok(()),
        );

        let err = callbacks.load().unwrap_err();
        assert!(matches!(err, AgencyError::Persistence(_)));
    }
}
