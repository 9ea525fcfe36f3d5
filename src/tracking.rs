//! # Chain Tracking
//!
//! Every completion, whether started by the user or by one agent messaging
//! another, is bracketed by a *chain* span: opened before the channel is
//! touched and closed with the final output or the error that ended the run.
//! Nested completions carry their parent's chain id, so the recorded spans
//! form a tree mirroring the conversation tree.
//!
//! Tracking is pure observability. It records what happened and logs it
//! through `tracing`; it never alters control flow.
//!
//! ### Example
//!
//! ```rust
//! use agency_rs::tracking::ChainTracker;
//!
//! let tracker = ChainTracker::new();
//!
//! let root = tracker.start_chain("Plan the release", "user -> CEO", None);
//! let child = tracker.start_chain("Cut the branch", "CEO -> Developer", Some(&root));
//!
//! tracker.end_chain("branch cut", &child);
//! tracker.end_chain("release planned", &root);
//!
//! let chains = tracker.chains();
//! assert_eq!(chains.len(), 2);
//! assert_eq!(chains[1].parent_id, Some(root));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A unique identifier for a chain span.
pub type ChainId = String;

/// Generates a new, unique chain ID using UUIDv4.
pub fn gen_chain_id() -> ChainId {
    Uuid::new_v4().to_string()
}

/// Lifecycle state of a chain span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Running,
    Completed,
    Failed,
}

/// A recorded completion span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    /// The unique identifier for this chain.
    pub id: ChainId,
    /// The id of the enclosing completion's chain, if this run was nested.
    pub parent_id: Option<ChainId>,
    /// Human-readable label, conventionally `"sender -> recipient"`.
    pub label: String,
    /// The message that started the run.
    pub input: String,
    pub status: ChainStatus,
    /// Final output text. `None` until the chain completes.
    pub output: Option<String>,
    /// Error message if the run failed.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Chain {
    pub fn new(input: impl Into<String>, label: impl Into<String>, parent_id: Option<ChainId>) -> Self {
        Self {
            id: gen_chain_id(),
            parent_id,
            label: label.into(),
            input: input.into(),
            status: ChainStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Marks the chain as completed with its final output.
    pub fn complete(&mut self, output: impl Into<String>) {
        self.status = ChainStatus::Completed;
        self.output = Some(output.into());
        self.ended_at = Some(Utc::now());
    }

    /// Marks the chain as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ChainStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }

    /// Duration of the chain in milliseconds, if it has ended.
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Records chain spans for every completion in an agency.
///
/// Handles are cheap clones sharing the same span store, so channels and
/// routing tools can all report into one tracker.
#[derive(Clone, Default)]
pub struct ChainTracker {
    chains: Arc<RwLock<Vec<Chain>>>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new chain span and returns its id.
    pub fn start_chain(&self, input: &str, label: &str, parent: Option<&ChainId>) -> ChainId {
        let chain = Chain::new(input, label, parent.cloned());
        let chain_id = chain.id.clone();

        match parent {
            Some(parent_id) => {
                debug!(chain_id = %chain_id, parent_id = %parent_id, label = %label, "Starting nested chain")
            }
            None => info!(chain_id = %chain_id, label = %label, "Starting chain"),
        }

        self.chains.write().unwrap().push(chain);
        chain_id
    }

    /// Closes a chain span as completed, recording its output.
    pub fn end_chain(&self, output: &str, chain_id: &ChainId) {
        let mut chains = self.chains.write().unwrap();
        match chains.iter_mut().find(|c| &c.id == chain_id) {
            Some(chain) => {
                chain.complete(output);
                if let Some(duration) = chain.duration_ms() {
                    debug!(chain_id = %chain_id, duration_ms = duration, "Chain completed");
                }
            }
            None => warn!(chain_id = %chain_id, "end_chain called for unknown chain"),
        }
    }

    /// Closes a chain span as failed, recording the error.
    pub fn track_error<E: std::fmt::Display>(&self, err: &E, chain_id: &ChainId) {
        let mut chains = self.chains.write().unwrap();
        match chains.iter_mut().find(|c| &c.id == chain_id) {
            Some(chain) => {
                error!(chain_id = %chain_id, error = %err, "Chain failed");
                chain.fail(err.to_string());
            }
            None => warn!(chain_id = %chain_id, "track_error called for unknown chain"),
        }
    }

    /// All recorded chains, in start order.
    pub fn chains(&self) -> Vec<Chain> {
        self.chains.read().unwrap().clone()
    }

    /// Looks up a single chain by id.
    pub fn get(&self, chain_id: &ChainId) -> Option<Chain> {
        self.chains
            .read()
            .unwrap()
            .iter()
            .find(|c| &c.id == chain_id)
            .cloned()
    }

    /// Direct children of the given chain.
    pub fn children_of(&self, chain_id: &ChainId) -> Vec<Chain> {
        self.chains
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.parent_id.as_ref() == Some(chain_id))
            .cloned()
            .collect()
    }

    /// Chains that are still running.
    pub fn running(&self) -> Vec<Chain> {
        self.chains
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.status == ChainStatus::Running)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ChainTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainTracker")
            .field("chains", &self.chains.read().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chain_id_generation() {
        let id1 = gen_chain_id();
        let id2 = gen_chain_id();

        assert_ne!(id1, id2);
        assert!(!id1.is_empty());
    }

    #[test]
    fn test_chain_lifecycle() {
        let mut chain = Chain::new("Hello", "user -> CEO", None);
        assert_eq!(chain.status, ChainStatus::Running);
        assert!(chain.ended_at.is_none());

        chain.complete("Done");
        assert_eq!(chain.status, ChainStatus::Completed);
        assert_eq!(chain.output, Some("Done".to_string()));
        assert!(chain.duration_ms().is_some());
    }

    #[test]
    fn test_chain_failure() {
        let mut chain = Chain::new("Hello", "user -> CEO", None);
        chain.fail("backend unavailable");

        assert_eq!(chain.status, ChainStatus::Failed);
        assert_eq!(chain.error, Some("backend unavailable".to_string()));
        assert!(chain.output.is_none());
    }

    #[test]
    fn test_tracker_records_tree() {
        let tracker = ChainTracker::new();

        let root = tracker.start_chain("Plan", "user -> CEO", None);
        let child_a = tracker.start_chain("Build", "CEO -> Developer", Some(&root));
        let child_b = tracker.start_chain("Review", "CEO -> Analyst", Some(&root));

        tracker.end_chain("built", &child_a);
        tracker.end_chain("reviewed", &child_b);
        tracker.end_chain("planned", &root);

        let children = tracker.children_of(&root);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].label, "CEO -> Developer");
        assert!(tracker.running().is_empty());
    }

    #[test]
    fn test_tracker_records_errors() {
        let tracker = ChainTracker::new();
        let id = tracker.start_chain("Plan", "user -> CEO", None);

        tracker.track_error(&"boom", &id);

        let chain = tracker.get(&id).unwrap();
        assert_eq!(chain.status, ChainStatus::Failed);
        assert_eq!(chain.error, Some("boom".to_string()));
    }

    #[test]
    fn test_unknown_chain_is_ignored() {
        let tracker = ChainTracker::new();
        tracker.end_chain("output", &"nope".to_string());
        tracker.track_error(&"boom", &"nope".to_string());
        assert!(tracker.chains().is_empty());
    }

    #[test]
    fn test_chain_serialization() {
        let chain = Chain::new("Hello", "user -> CEO", None);
        let serialized = serde_json::to_string(&chain).unwrap();
        let deserialized: Chain = serde_json::from_str(&serialized).unwrap();

        assert_eq!(chain.id, deserialized.id);
        assert_eq!(deserialized.status, ChainStatus::Running);
    }
}
