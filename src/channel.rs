//! Per-pair communication channels
//!
//! Every permitted (sender, recipient) pair owns exactly one [`Channel`],
//! created up front by the [`ChannelManager`]. A channel carries the pair's
//! external thread id, serializes concurrent completions on the pair, and
//! brackets every run with a chain span. The pending-dispatch slot backs the
//! asynchronous communication mode: `dispatch` launches a run on its own
//! task and `check_status` reports on it without re-sending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::backend::{AgencyBackend, CompletionRequest};
use crate::chart::ParsedChart;
use crate::config::CompletionOptions;
use crate::error::Result;
use crate::persist::{ThreadCallbacks, ThreadIds};
use crate::registry::AgentRegistry;
use crate::state::SharedState;
use crate::stream::CompletionStream;
use crate::tracking::{ChainId, ChainTracker};

/// State of a channel's asynchronously dispatched completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Nothing has been dispatched on this channel.
    NotDispatched,
    /// A dispatched completion is still running.
    InFlight,
    /// The last dispatched completion finished with this output.
    Completed { output: String },
    /// The last dispatched completion failed with this error.
    Failed { error: String },
}

/// A single (sender, recipient) communication channel.
///
/// `None` as the sender means the end user. The channel owns the pair's
/// external thread id and an execution gate: completions on one pair run
/// one at a time, each held until its stream reaches the terminal event.
pub struct Channel {
    sender: Option<String>,
    recipient: String,
    external_id: Mutex<Option<String>>,
    gate: Arc<AsyncMutex<()>>,
    pending: Mutex<DispatchStatus>,
    backend: Arc<dyn AgencyBackend>,
    registry: Arc<AgentRegistry>,
    tracker: ChainTracker,
    state: SharedState,
}

impl Channel {
    fn new(
        sender: Option<String>,
        recipient: String,
        backend: Arc<dyn AgencyBackend>,
        registry: Arc<AgentRegistry>,
        tracker: ChainTracker,
        state: SharedState,
    ) -> Self {
        Self {
            sender,
            recipient,
            external_id: Mutex::new(None),
            gate: Arc::new(AsyncMutex::new(())),
            pending: Mutex::new(DispatchStatus::NotDispatched),
            backend,
            registry,
            tracker,
            state,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn sender_label(&self) -> &str {
        self.sender.as_deref().unwrap_or("user")
    }

    /// Display label for the pair, `"sender -> recipient"`.
    pub fn label(&self) -> String {
        format!("{} -> {}", self.sender_label(), self.recipient)
    }

    /// The pair's external thread id, if one has been minted or adopted.
    pub fn external_id(&self) -> Option<String> {
        self.external_id.lock().unwrap().clone()
    }

    /// Adopts a previously persisted external id.
    pub fn adopt_external_id(&self, id: impl Into<String>) {
        *self.external_id.lock().unwrap() = Some(id.into());
    }

    /// Returns the pair's external id, asking the backend for a fresh one
    /// on first use.
    pub async fn ensure_external_id(&self) -> Result<String> {
        if let Some(id) = self.external_id() {
            return Ok(id);
        }
        let id = self
            .backend
            .create_thread(self.sender.as_deref(), &self.recipient)
            .await?;
        let mut slot = self.external_id.lock().unwrap();
        match &*slot {
            Some(existing) => Ok(existing.clone()),
            None => {
                debug!(channel = %self.label(), thread_id = %id, "Minted external thread id");
                *slot = Some(id.clone());
                Ok(id)
            }
        }
    }

    /// Runs one completion on this channel.
    ///
    /// Opens a chain span under `parent`, ensures the external id, and
    /// delegates to the backend. The span is closed by the returned stream's
    /// terminal event, on every exit path including abandonment by drop.
    /// Concurrent calls on the same channel queue behind each other; the
    /// gate is released at the running stream's terminal event.
    pub async fn get_completion(
        &self,
        message: &str,
        parent: Option<&ChainId>,
        options: &CompletionOptions,
        parallel_tools: bool,
    ) -> Result<CompletionStream> {
        let guard = Arc::clone(&self.gate).lock_owned().await;

        let chain_id = self.tracker.start_chain(message, &self.label(), parent);

        let thread_id = match self.ensure_external_id().await {
            Ok(id) => id,
            Err(err) => {
                self.tracker.track_error(&err, &chain_id);
                return Err(err);
            }
        };

        let recipient = match self.registry.get(&self.recipient) {
            Ok(agent) => agent,
            Err(err) => {
                self.tracker.track_error(&err, &chain_id);
                return Err(err);
            }
        };

        let mut request = CompletionRequest::new(message, recipient, thread_id, self.state.clone())
            .with_chain_id(chain_id.clone())
            .with_parallel_tools(parallel_tools);
        if let Some(sender) = &self.sender {
            request = request.with_sender(sender.clone());
        }
        if let Some(instructions) = &options.additional_instructions {
            request = request.with_additional_instructions(instructions.clone());
        }
        if let Some(tool_choice) = &options.tool_choice {
            request = request.with_tool_choice(tool_choice.clone());
        }
        if let Some(response_format) = &options.response_format {
            request = request.with_response_format(response_format.clone());
        }

        let mut stream = match self.backend.get_completion(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.tracker.track_error(&err, &chain_id);
                return Err(err);
            }
        };

        let tracker = self.tracker.clone();
        stream.on_terminal(move |result| {
            match result {
                Ok(output) => tracker.end_chain(output, &chain_id),
                Err(err) => tracker.track_error(err, &chain_id),
            }
            drop(guard);
        });

        Ok(stream)
    }

    /// Launches a completion on an independent task, recording its outcome
    /// in the pending slot. A new dispatch replaces the previous outcome.
    pub fn dispatch(
        self: &Arc<Self>,
        message: String,
        parent: Option<ChainId>,
        options: CompletionOptions,
        parallel_tools: bool,
    ) {
        *self.pending.lock().unwrap() = DispatchStatus::InFlight;
        debug!(channel = %self.label(), "Dispatched completion");

        let channel = Arc::clone(self);
        tokio::spawn(async move {
            let result = async {
                channel
                    .get_completion(&message, parent.as_ref(), &options, parallel_tools)
                    .await?
                    .collect_final()
                    .await
            }
            .await;

            let status = match result {
                Ok(output) => DispatchStatus::Completed { output },
                Err(err) => DispatchStatus::Failed {
                    error: err.to_string(),
                },
            };
            *channel.pending.lock().unwrap() = status;
        });
    }

    /// Reports on the channel's dispatched completion without re-sending.
    pub fn check_status(&self) -> DispatchStatus {
        self.pending.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("external_id", &self.external_id())
            .finish()
    }
}

/// Owns one [`Channel`] per permitted pair.
pub struct ChannelManager {
    channels: Mutex<HashMap<(Option<String>, String), Arc<Channel>>>,
    backend: Arc<dyn AgencyBackend>,
    registry: Arc<AgentRegistry>,
    tracker: ChainTracker,
    state: SharedState,
    ceo: String,
}

impl ChannelManager {
    /// Builds the per-pair table: one user-facing channel per standalone
    /// agent plus one channel per chart edge.
    pub fn new(
        chart: &ParsedChart,
        backend: Arc<dyn AgencyBackend>,
        registry: Arc<AgentRegistry>,
        tracker: ChainTracker,
        state: SharedState,
    ) -> Self {
        let manager = Self {
            channels: Mutex::new(HashMap::new()),
            backend,
            registry,
            tracker,
            state,
            ceo: chart.ceo.clone(),
        };

        for recipient in &chart.main_recipients {
            manager.get_or_create(None, recipient);
        }
        for edge in &chart.edges {
            manager.get_or_create(Some(&edge.sender), &edge.recipient);
        }

        info!(channels = manager.len(), "Created communication channels");
        manager
    }

    /// Returns the channel for the pair, creating it on first request. The
    /// same `Arc` is returned on every call.
    pub fn get_or_create(&self, sender: Option<&str>, recipient: &str) -> Arc<Channel> {
        let key = (sender.map(str::to_string), recipient.to_string());
        let mut channels = self.channels.lock().unwrap();
        Arc::clone(channels.entry(key).or_insert_with(|| {
            Arc::new(Channel::new(
                sender.map(str::to_string),
                recipient.to_string(),
                Arc::clone(&self.backend),
                Arc::clone(&self.registry),
                self.tracker.clone(),
                self.state.clone(),
            ))
        }))
    }

    /// All channels, in no particular order.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().unwrap().is_empty()
    }

    /// Loads the persisted thread mapping, adopts matching ids, eagerly
    /// mints ids for the rest, and saves the complete mapping back.
    pub async fn init_persisted(&self, callbacks: &ThreadCallbacks) -> Result<()> {
        let mut ids = callbacks.load()?.unwrap_or_default();

        for channel in self.channels() {
            let persisted = match channel.sender() {
                None if channel.recipient() == self.ceo => ids.main().map(str::to_string),
                None => ids.get("user", channel.recipient()).map(str::to_string),
                Some(sender) => ids.get(sender, channel.recipient()).map(str::to_string),
            };

            let id = match persisted {
                Some(id) => {
                    channel.adopt_external_id(&id);
                    id
                }
                None => channel.ensure_external_id().await?,
            };

            match channel.sender() {
                None if channel.recipient() == self.ceo => ids.set_main(id),
                None => ids.set("user", channel.recipient(), id),
                Some(sender) => ids.set(sender, channel.recipient(), id),
            }
        }

        callbacks.save(&ids)?;
        info!(threads = ids.len(), "Initialized persisted thread ids");
        Ok(())
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.len())
            .field("ceo", &self.ceo)
            .finish()
    }
}
