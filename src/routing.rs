//! Message-routing capabilities
//!
//! During construction every agent with outgoing edges is handed a
//! `send_message` tool whose recipient parameter is a closed enumeration of
//! exactly the agents it may address. Routing tools are ordinary [`Tool`]s;
//! invoking one starts a nested completion on the pair's channel and
//! forwards the nested run's messages into the enclosing stream. In the
//! parallel-agents mode the nested run is dispatched onto its own task and
//! a companion `check_status` tool polls for the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::channel::ChannelManager;
use crate::chart::ParsedChart;
use crate::config::{CommunicationMode, CompletionOptions};
use crate::error::{AgencyError, Result};
use crate::registry::AgentRegistry;
use crate::tool::{Tool, ToolContext, ToolResult};

pub const SEND_MESSAGE_TOOL: &str = "send_message";
pub const CHECK_STATUS_TOOL: &str = "check_status";

/// One allowed recipient of a routing tool, with the description surfaced
/// to the sending agent.
#[derive(Debug, Clone)]
pub struct RecipientInfo {
    pub name: String,
    pub description: Option<String>,
}

fn recipient_schema(recipients: &[RecipientInfo]) -> Value {
    let names: Vec<&str> = recipients.iter().map(|r| r.name.as_str()).collect();
    let lines: Vec<String> = recipients
        .iter()
        .map(|r| match &r.description {
            Some(description) => format!("{}: {}", r.name, description),
            None => r.name.clone(),
        })
        .collect();
    json!({
        "type": "string",
        "enum": names,
        "description": format!("Recipient agent. {}", lines.join(" ")),
    })
}

fn validate_recipient(
    sender: &str,
    recipient: &str,
    recipients: &[RecipientInfo],
) -> std::result::Result<(), AgencyError> {
    if recipients.iter().any(|r| r.name == recipient) {
        return Ok(());
    }
    Err(AgencyError::InvalidRecipient {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        valid: recipients.iter().map(|r| r.name.clone()).collect(),
    })
}

#[derive(Debug, Deserialize)]
struct SendMessageArgs {
    recipient: String,
    message: String,
    additional_instructions: Option<String>,
}

/// The `send_message` capability for one sending agent.
pub struct SendMessageTool {
    sender: String,
    recipients: Vec<RecipientInfo>,
    description: String,
    channels: Arc<ChannelManager>,
    mode: CommunicationMode,
}

impl SendMessageTool {
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<RecipientInfo>,
        channels: Arc<ChannelManager>,
        mode: CommunicationMode,
    ) -> Self {
        let description = match mode {
            CommunicationMode::ParallelAgents => {
                "Send a message to another agent. The recipient starts working \
                 immediately; use check_status to collect the reply."
                    .to_string()
            }
            _ => "Send a message to another agent and wait for its reply.".to_string(),
        };
        Self {
            sender: sender.into(),
            recipients,
            description,
            channels,
            mode,
        }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        SEND_MESSAGE_TOOL
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recipient": recipient_schema(&self.recipients),
                "message": {
                    "type": "string",
                    "description": "The message to deliver.",
                },
                "additional_instructions": {
                    "type": "string",
                    "description": "Extra instructions for the recipient, applied to this run only.",
                },
            },
            "required": ["recipient", "message"],
        })
    }

    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let args: SendMessageArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(err) => return Ok(ToolResult::error(format!("Invalid arguments: {err}"))),
        };

        if let Err(err) = validate_recipient(&self.sender, &args.recipient, &self.recipients) {
            return Ok(ToolResult::error(err.to_string()));
        }

        debug!(
            sender = %self.sender,
            recipient = %args.recipient,
            mode = self.mode.label(),
            "Routing message"
        );

        let channel = self.channels.get_or_create(Some(&self.sender), &args.recipient);
        let mut options = CompletionOptions::default();
        if let Some(instructions) = args.additional_instructions {
            options = options.with_additional_instructions(instructions);
        }

        if self.mode == CommunicationMode::ParallelAgents {
            channel.dispatch(args.message, ctx.chain_id.clone(), options, false);
            return Ok(ToolResult::success(Value::String(format!(
                "Dispatched to {}. Use check_status to retrieve the reply.",
                args.recipient
            ))));
        }

        let parallel_tools = self.mode == CommunicationMode::ParallelTools;
        let mut stream = channel
            .get_completion(&args.message, ctx.chain_id.as_ref(), &options, parallel_tools)
            .await?;

        while let Some(message) = stream.next_message().await {
            ctx.forward_message(message).await;
        }

        match stream.final_output() {
            Ok(output) => Ok(ToolResult::success(Value::String(output))),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for SendMessageTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendMessageTool")
            .field("sender", &self.sender)
            .field(
                "recipients",
                &self.recipients.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CheckStatusArgs {
    recipient: String,
}

/// The `check_status` capability, polling a dispatched completion.
pub struct CheckStatusTool {
    sender: String,
    recipients: Vec<RecipientInfo>,
    channels: Arc<ChannelManager>,
}

impl CheckStatusTool {
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<RecipientInfo>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            channels,
        }
    }
}

#[async_trait]
impl Tool for CheckStatusTool {
    fn name(&self) -> &str {
        CHECK_STATUS_TOOL
    }

    fn description(&self) -> &str {
        "Check on a message previously sent to another agent."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recipient": recipient_schema(&self.recipients),
            },
            "required": ["recipient"],
        })
    }

    async fn execute(&self, arguments: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let args: CheckStatusArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(err) => return Ok(ToolResult::error(format!("Invalid arguments: {err}"))),
        };

        if let Err(err) = validate_recipient(&self.sender, &args.recipient, &self.recipients) {
            return Ok(ToolResult::error(err.to_string()));
        }

        let channel = self.channels.get_or_create(Some(&self.sender), &args.recipient);
        Ok(ToolResult::success(serde_json::to_value(
            channel.check_status(),
        )?))
    }
}

impl std::fmt::Debug for CheckStatusTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckStatusTool")
            .field("sender", &self.sender)
            .field(
                "recipients",
                &self.recipients.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Attaches routing capabilities to every agent with outgoing edges.
pub fn attach_routing(
    registry: &AgentRegistry,
    chart: &ParsedChart,
    channels: &Arc<ChannelManager>,
    mode: CommunicationMode,
) -> Result<()> {
    for sender in chart.senders() {
        let mut recipients = Vec::new();
        for name in chart.recipients_of(&sender) {
            let agent = registry.get(&name)?;
            recipients.push(RecipientInfo {
                name,
                description: agent.description().map(str::to_string),
            });
        }

        let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(SendMessageTool::new(
            sender.clone(),
            recipients.clone(),
            Arc::clone(channels),
            mode,
        ))];
        if mode == CommunicationMode::ParallelAgents {
            tools.push(Arc::new(CheckStatusTool::new(
                sender.clone(),
                recipients.clone(),
                Arc::clone(channels),
            )));
        }

        info!(
            sender = %sender,
            recipients = recipients.len(),
            tools = tools.len(),
            "Attached routing capabilities"
        );
        registry.attach_tools(&sender, tools)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::backend::{AgencyBackend, CompletionRequest};
    use crate::channel::DispatchStatus;
    use crate::chart::{ChartNode, OrgChart};
    use crate::messages::MessageOutput;
    use crate::state::SharedState;
    use crate::stream::CompletionStream;
    use crate::tracking::ChainTracker;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoBackend {
        threads_created: AtomicUsize,
    }

    impl EchoBackend {
        fn new() -> Self {
            Self {
                threads_created: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AgencyBackend for EchoBackend {
        async fn register_agent(&self, agent: &Agent) -> Result<String> {
            Ok(format!("asst_{}", agent.name()))
        }

        async fn create_thread(&self, _sender: Option<&str>, _recipient: &str) -> Result<String> {
            let n = self.threads_created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("thread_{n}"))
        }

        async fn get_completion(&self, request: CompletionRequest) -> Result<CompletionStream> {
            let (tx, stream) = CompletionStream::channel();
            let recipient = request.recipient.name().to_string();
            let sender = request.sender.clone().unwrap_or_else(|| "user".to_string());
            let message = request.message.clone();
            tokio::spawn(async move {
                tx.send_message(MessageOutput::text(
                    &recipient,
                    &sender,
                    format!("working on {message}"),
                ))
                .await;
                tx.finish(Ok(format!("echo: {message}"))).await;
            });
            Ok(stream)
        }
    }

    struct Fixture {
        registry: Arc<AgentRegistry>,
        chart: ParsedChart,
        channels: Arc<ChannelManager>,
        backend: Arc<EchoBackend>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(EchoBackend::new());
        let registry = Arc::new(AgentRegistry::new());
        let ceo = Agent::simple("CEO", "Coordinate");
        let dev = Agent::simple("Developer", "Implement").with_description("Writes code.");
        let analyst = Agent::simple("Analyst", "Analyze");
        let chart = OrgChart::new(vec![
            ChartNode::Single(ceo.clone()),
            ChartNode::pair(ceo.clone(), dev),
            ChartNode::pair(ceo, analyst),
        ]);
        let parsed = chart.parse(&registry).unwrap();
        let channels = Arc::new(ChannelManager::new(
            &parsed,
            backend.clone() as Arc<dyn AgencyBackend>,
            Arc::clone(&registry),
            ChainTracker::new(),
            SharedState::new(),
        ));
        Fixture {
            registry,
            chart: parsed,
            channels,
            backend,
        }
    }

    fn recipients(fixture: &Fixture) -> Vec<RecipientInfo> {
        fixture
            .chart
            .recipients_of("CEO")
            .into_iter()
            .map(|name| {
                let description = fixture
                    .registry
                    .get(&name)
                    .unwrap()
                    .description()
                    .map(str::to_string);
                RecipientInfo { name, description }
            })
            .collect()
    }

    #[test]
    fn test_schema_is_closed_enum() {
        let f = fixture();
        let tool = SendMessageTool::new(
            "CEO",
            recipients(&f),
            Arc::clone(&f.channels),
            CommunicationMode::Sequential,
        );

        let schema = tool.parameters_schema();
        assert_eq!(
            schema["properties"]["recipient"]["enum"],
            json!(["Developer", "Analyst"])
        );
        let description = schema["properties"]["recipient"]["description"]
            .as_str()
            .unwrap();
        assert!(description.contains("Developer: Writes code."));
        assert!(description.contains("Analyst"));
        assert_eq!(schema["required"], json!(["recipient", "message"]));
    }

    #[tokio::test]
    async fn test_send_message_returns_reply_and_forwards() {
        let f = fixture();
        let tool = SendMessageTool::new(
            "CEO",
            recipients(&f),
            Arc::clone(&f.channels),
            CommunicationMode::Sequential,
        );

        let (forward, mut enclosing) = CompletionStream::channel();
        let ctx = ToolContext::new(None, Some(forward.clone()), SharedState::new());

        let result = tool
            .execute(
                json!({"recipient": "Developer", "message": "build the feature"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!result.is_error());
        assert_eq!(
            result.output,
            Value::String("echo: build the feature".to_string())
        );

        let forwarded = enclosing.next_message().await.unwrap();
        assert_eq!(forwarded.content, "working on build the feature");
        forward.finish(Ok("enclosing done".to_string())).await;
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_recoverable() {
        let f = fixture();
        let tool = SendMessageTool::new(
            "CEO",
            recipients(&f),
            Arc::clone(&f.channels),
            CommunicationMode::Sequential,
        );

        let ctx = ToolContext::detached(SharedState::new());
        let result = tool
            .execute(json!({"recipient": "Stranger", "message": "hi"}), &ctx)
            .await
            .unwrap();

        assert!(result.is_error());
        let error = result.error.unwrap();
        assert!(error.contains("Stranger"));
        assert!(error.contains("Developer"));
        // No channel was touched.
        assert_eq!(f.backend.threads_created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_recoverable() {
        let f = fixture();
        let tool = SendMessageTool::new(
            "CEO",
            recipients(&f),
            Arc::clone(&f.channels),
            CommunicationMode::Sequential,
        );

        let ctx = ToolContext::detached(SharedState::new());
        let result = tool.execute(json!({"message": "hi"}), &ctx).await.unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_parallel_agents_dispatch_and_poll() {
        let f = fixture();
        let send = SendMessageTool::new(
            "CEO",
            recipients(&f),
            Arc::clone(&f.channels),
            CommunicationMode::ParallelAgents,
        );
        let check = CheckStatusTool::new("CEO", recipients(&f), Arc::clone(&f.channels));

        let ctx = ToolContext::detached(SharedState::new());
        let ack = send
            .execute(json!({"recipient": "Developer", "message": "go"}), &ctx)
            .await
            .unwrap();
        assert!(!ack.is_error());
        assert!(ack.output.as_str().unwrap().contains("check_status"));

        let status = loop {
            let result = check
                .execute(json!({"recipient": "Developer"}), &ctx)
                .await
                .unwrap();
            let status: DispatchStatus = serde_json::from_value(result.output).unwrap();
            if status != DispatchStatus::InFlight {
                break status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        };

        assert_eq!(
            status,
            DispatchStatus::Completed {
                output: "echo: go".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_check_status_before_dispatch() {
        let f = fixture();
        let check = CheckStatusTool::new("CEO", recipients(&f), Arc::clone(&f.channels));

        let ctx = ToolContext::detached(SharedState::new());
        let result = check
            .execute(json!({"recipient": "Developer"}), &ctx)
            .await
            .unwrap();
        let status: DispatchStatus = serde_json::from_value(result.output).unwrap();
        assert_eq!(status, DispatchStatus::NotDispatched);
    }

    #[test]
    fn test_attach_routing_sequential() {
        let f = fixture();
        attach_routing(
            &f.registry,
            &f.chart,
            &f.channels,
            CommunicationMode::Sequential,
        )
        .unwrap();

        let ceo = f.registry.get("CEO").unwrap();
        assert!(ceo.tool(SEND_MESSAGE_TOOL).is_some());
        assert!(ceo.tool(CHECK_STATUS_TOOL).is_none());

        let dev = f.registry.get("Developer").unwrap();
        assert!(!dev.has_tools());
    }

    #[test]
    fn test_attach_routing_parallel_agents() {
        let f = fixture();
        attach_routing(
            &f.registry,
            &f.chart,
            &f.channels,
            CommunicationMode::ParallelAgents,
        )
        .unwrap();

        let ceo = f.registry.get("CEO").unwrap();
        assert!(ceo.tool(SEND_MESSAGE_TOOL).is_some());
        assert!(ceo.tool(CHECK_STATUS_TOOL).is_some());
    }
}
