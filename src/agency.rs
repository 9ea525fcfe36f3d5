//! # Agency (orientation)
//!
//! The `Agency` ties everything together: the communication chart is parsed
//! into a registry and channel table, agency-level defaults and shared
//! instructions are folded into each agent, agents are registered with the
//! backend (or restored from persisted settings), and routing capabilities
//! are attached per the chart's edges. Once built, the agency exposes the
//! completion protocols: blocking, lazy stream, event-handler driven, and
//! structured-output parsing. All of them run over the same underlying
//! stream execution and all of them are bracketed by chain spans.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::AgencyBackend;
use crate::channel::ChannelManager;
use crate::chart::{OrgChart, ParsedChart};
use crate::config::{AgencyConfig, CommunicationMode, CompletionOptions};
use crate::error::{AgencyError, Result};
use crate::events::EventHandler;
use crate::persist::{SettingsCallbacks, ThreadCallbacks};
use crate::registry::AgentRegistry;
use crate::routing::attach_routing;
use crate::state::SharedState;
use crate::stream::CompletionStream;
use crate::tracking::ChainTracker;

const TEMP_ID_PREFIX: &str = "temp_id_";

/// Builder for an [`Agency`].
pub struct AgencyBuilder {
    chart: OrgChart,
    config: AgencyConfig,
    settings_callbacks: Option<SettingsCallbacks>,
    thread_callbacks: Option<ThreadCallbacks>,
}

impl AgencyBuilder {
    pub fn new(chart: OrgChart) -> Self {
        Self {
            chart,
            config: AgencyConfig::default(),
            settings_callbacks: None,
            thread_callbacks: None,
        }
    }

    pub fn with_config(mut self, config: AgencyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mode(mut self, mode: CommunicationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_shared_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.shared_instructions = Some(instructions.into());
        self
    }

    pub fn with_settings_callbacks(mut self, callbacks: SettingsCallbacks) -> Self {
        self.settings_callbacks = Some(callbacks);
        self
    }

    pub fn with_thread_callbacks(mut self, callbacks: ThreadCallbacks) -> Self {
        self.thread_callbacks = Some(callbacks);
        self
    }

    /// Constructs the agency: parses the chart, applies defaults, settles
    /// agent identities with the backend, wires channels and routing
    /// capabilities, and initializes persisted thread ids.
    pub async fn build(self, backend: Arc<dyn AgencyBackend>) -> Result<Agency> {
        let registry = Arc::new(AgentRegistry::new());
        let chart = self.chart.parse(&registry)?;

        apply_defaults(&registry, &self.config)?;
        settle_identities(
            &registry,
            backend.as_ref(),
            self.settings_callbacks.as_ref(),
        )
        .await?;

        let tracker = ChainTracker::new();
        let state = SharedState::new();
        let channels = Arc::new(ChannelManager::new(
            &chart,
            Arc::clone(&backend),
            Arc::clone(&registry),
            tracker.clone(),
            state.clone(),
        ));

        attach_routing(&registry, &chart, &channels, self.config.mode)?;

        if let Some(callbacks) = &self.thread_callbacks {
            channels.init_persisted(callbacks).await?;
        }

        info!(
            ceo = %chart.ceo,
            agents = registry.len(),
            mode = self.config.mode.label(),
            "Agency constructed"
        );

        Ok(Agency {
            registry,
            chart,
            channels,
            tracker,
            state,
            config: self.config,
        })
    }
}

/// Folds agency-level defaults and shared instructions into every agent.
/// Per-agent settings win over the defaults.
fn apply_defaults(registry: &AgentRegistry, config: &AgencyConfig) -> Result<()> {
    for name in registry.names() {
        registry.update(&name, |mut agent| {
            if agent.model.is_none() {
                agent.model = config.default_model.clone();
            }
            if agent.temperature.is_none() {
                agent.temperature = config.default_temperature;
            }
            if agent.top_p.is_none() {
                agent.top_p = config.default_top_p;
            }
            if agent.max_prompt_tokens.is_none() {
                agent.max_prompt_tokens = config.default_max_prompt_tokens;
            }
            if agent.max_completion_tokens.is_none() {
                agent.max_completion_tokens = config.default_max_completion_tokens;
            }
            if let Some(shared) = &config.shared_instructions {
                agent.instructions = format!("{shared}\n\n{}", agent.instructions);
            }
            agent
        })?;
    }
    Ok(())
}

/// Replaces temporary agent ids with backend-issued ones. Ids restored from
/// persisted settings, and ids set explicitly by the caller, skip backend
/// registration. The complete mapping is saved back when callbacks are set.
async fn settle_identities(
    registry: &AgentRegistry,
    backend: &dyn AgencyBackend,
    callbacks: Option<&SettingsCallbacks>,
) -> Result<()> {
    let mut persisted = std::collections::HashMap::new();
    if let Some(callbacks) = callbacks {
        if let Some(settings) = callbacks.load()? {
            let entries: Vec<Value> = serde_json::from_value(settings)?;
            for entry in entries {
                if let (Some(name), Some(id)) = (
                    entry.get("name").and_then(Value::as_str),
                    entry.get("id").and_then(Value::as_str),
                ) {
                    persisted.insert(name.to_string(), id.to_string());
                }
            }
        }
    }

    for name in registry.names() {
        let agent = registry.get(&name)?;
        let temporary = agent
            .id()
            .map(|id| id.starts_with(TEMP_ID_PREFIX))
            .unwrap_or(true);
        if !temporary {
            continue;
        }

        let id = match persisted.get(&name) {
            Some(id) => {
                debug!(agent = %name, id = %id, "Restored agent id from settings");
                id.clone()
            }
            None => {
                let id = backend.register_agent(&agent).await?;
                debug!(agent = %name, id = %id, "Registered agent with backend");
                id
            }
        };
        registry.assign_id(&name, id)?;
    }

    if let Some(callbacks) = callbacks {
        let settings: Vec<Value> = registry
            .agents()
            .iter()
            .map(|agent| json!({"name": agent.name(), "id": agent.id()}))
            .collect();
        callbacks.save(&Value::Array(settings))?;
    }

    Ok(())
}

/// A constructed agency, ready to serve completions.
pub struct Agency {
    registry: Arc<AgentRegistry>,
    chart: ParsedChart,
    channels: Arc<ChannelManager>,
    tracker: ChainTracker,
    state: SharedState,
    config: AgencyConfig,
}

impl Agency {
    pub fn builder(chart: OrgChart) -> AgencyBuilder {
        AgencyBuilder::new(chart)
    }

    /// Name of the entry-point agent.
    pub fn ceo(&self) -> &str {
        &self.chart.ceo
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn chart(&self) -> &ParsedChart {
        &self.chart
    }

    pub fn tracker(&self) -> &ChainTracker {
        &self.tracker
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn config(&self) -> &AgencyConfig {
        &self.config
    }

    fn resolve_recipient(&self, options: &CompletionOptions) -> Result<String> {
        match &options.recipient {
            None => Ok(self.chart.ceo.clone()),
            Some(name) if self.chart.is_main_recipient(name) => Ok(name.clone()),
            Some(name) => Err(AgencyError::InvalidArgument(format!(
                "recipient '{name}' is not user-facing (user-facing agents: {:?})",
                self.chart.main_recipients
            ))),
        }
    }

    /// Starts the underlying stream execution on the user-facing channel.
    async fn start(&self, message: &str, options: &CompletionOptions) -> Result<CompletionStream> {
        let recipient = self.resolve_recipient(options)?;
        let channel = self.channels.get_or_create(None, &recipient);
        channel
            .get_completion(
                message,
                None,
                options,
                self.config.mode == CommunicationMode::ParallelTools,
            )
            .await
    }

    /// Blocking protocol: drives the stream to exhaustion and returns the
    /// final text. With `options.verbose`, intermediate messages are logged.
    pub async fn get_completion(&self, message: &str, options: &CompletionOptions) -> Result<String> {
        let mut stream = self.start(message, options).await?;
        while let Some(message) = stream.next_message().await {
            if options.verbose {
                info!(
                    kind = message.kind.label(),
                    sender = message.sender_label(),
                    recipient = %message.recipient,
                    "{}",
                    message.content
                );
            }
        }
        stream.final_output()
    }

    /// Lazy protocol: returns the stream for consumer-paced iteration. The
    /// final text becomes available once the stream is exhausted. `verbose`
    /// belongs to the blocking protocols and fails fast here.
    pub async fn get_completion_messages(
        &self,
        message: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionStream> {
        if options.verbose {
            return Err(AgencyError::InvalidArgument(
                "verbose output is only available on blocking protocols".to_string(),
            ));
        }
        self.start(message, options).await
    }

    /// Event-handler protocol: one fresh `H` per request observes every
    /// intermediate message, any error, and the end of all streams.
    pub async fn get_completion_events<H>(
        &self,
        message: &str,
        options: &CompletionOptions,
    ) -> Result<String>
    where
        H: EventHandler + Default,
    {
        let mut handler = H::default();
        let mut stream = match self.start(message, options).await {
            Ok(stream) => stream,
            Err(err) => {
                handler.on_error(&err).await;
                handler.on_all_streams_end().await;
                return Err(err);
            }
        };

        while let Some(message) = stream.next_message().await {
            handler.on_message(message).await;
        }

        let result = stream.final_output();
        if let Err(err) = &result {
            handler.on_error(err).await;
        }
        handler.on_all_streams_end().await;
        result
    }

    /// Structured-output protocol: blocking completion followed by a parse
    /// into `T`. A refusal payload maps to [`AgencyError::Refusal`], any
    /// other parse failure to [`AgencyError::ParseResponse`].
    pub async fn get_completion_parse<T>(
        &self,
        message: &str,
        options: &CompletionOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let output = self.get_completion(message, options).await?;

        let value: Value = serde_json::from_str(&output)
            .map_err(|err| AgencyError::ParseResponse(format!("not valid JSON: {err}")))?;
        if let Some(refusal) = value.get("refusal").and_then(Value::as_str) {
            return Err(AgencyError::Refusal(refusal.to_string()));
        }
        serde_json::from_value(value).map_err(|err| AgencyError::ParseResponse(err.to_string()))
    }
}

impl std::fmt::Debug for Agency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agency")
            .field("ceo", &self.chart.ceo)
            .field("agents", &self.registry.names())
            .field("mode", &self.config.mode)
            .finish()
    }
}
