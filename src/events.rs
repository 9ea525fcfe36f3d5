//! Event handlers for streamed completions
//!
//! An [`EventHandler`] observes one completion from the outside: each
//! intermediate message, each error, and the moment the last stream ends.
//! Handlers are plain observers; they cannot alter the run.

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::AgencyError;
use crate::messages::MessageOutput;

/// Observer for the lifecycle of a streamed completion.
///
/// All methods default to no-ops, so implementors override only what they
/// care about. A fresh handler is constructed per run via `Default`.
#[async_trait]
pub trait EventHandler: Send {
    /// Called for every intermediate message, including messages forwarded
    /// from nested agent-to-agent runs.
    async fn on_message(&mut self, message: MessageOutput) {
        let _ = message;
    }

    /// Called when the run ends in an error, before `on_all_streams_end`.
    async fn on_error(&mut self, error: &AgencyError) {
        let _ = error;
    }

    /// Called exactly once, after the final stream has been exhausted.
    async fn on_all_streams_end(&mut self) {}
}

/// An [`EventHandler`] that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn on_message(&mut self, message: MessageOutput) {
        info!(
            kind = message.kind.label(),
            sender = message.sender_label(),
            recipient = %message.recipient,
            "{}",
            message.content
        );
    }

    async fn on_error(&mut self, err: &AgencyError) {
        error!(error = %err, "Completion failed");
    }

    async fn on_all_streams_end(&mut self) {
        info!("All completion streams ended");
    }
}
