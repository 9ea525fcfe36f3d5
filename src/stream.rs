//! Lazily-consumed completion streams
//!
//! A completion produces a sequence of intermediate [`MessageOutput`]s and
//! exactly one terminal result: the final response text or the error that
//! ended the run. [`CompletionStream`] is the consumer half; the producer
//! half is a [`StreamSender`] held by the backend driving the run.
//!
//! The underlying channel is bounded at capacity 1, so the producer suspends
//! after every item until the consumer polls again. That backpressure is the
//! cooperative scheduling of the baseline communication mode: nothing runs
//! ahead of the consumer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{AgencyError, Result};
use crate::messages::MessageOutput;

enum StreamEvent {
    Message(MessageOutput),
    Final(Result<String>),
}

type Finalizer = Box<dyn FnOnce(&Result<String>) + Send>;

/// Producer half of a completion stream.
///
/// Backends emit intermediate messages through this handle and must finish
/// with exactly one terminal result. Clones share the same stream, which is
/// how nested completions forward their messages into the enclosing run.
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamSender {
    /// Emits an intermediate message. Returns `false` if the consumer is gone.
    pub async fn send_message(&self, message: MessageOutput) -> bool {
        self.tx.send(StreamEvent::Message(message)).await.is_ok()
    }

    /// Delivers the terminal result. Send failures mean the consumer dropped
    /// the stream, which the stream's own finalizers already account for.
    pub async fn finish(&self, result: Result<String>) {
        let _ = self.tx.send(StreamEvent::Final(result)).await;
    }
}

impl std::fmt::Debug for StreamSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSender").finish()
    }
}

/// Consumer half of a completion stream.
///
/// Yields intermediate messages via [`next_message`](Self::next_message) (or
/// the `futures::Stream` impl) and holds back the terminal result until the
/// stream is exhausted. Requesting [`final_output`](Self::final_output)
/// early returns [`AgencyError::StreamPending`].
pub struct CompletionStream {
    rx: mpsc::Receiver<StreamEvent>,
    final_output: Option<Result<String>>,
    exhausted: bool,
    finalizers: Vec<Finalizer>,
}

impl CompletionStream {
    /// Creates a linked producer/consumer pair.
    pub fn channel() -> (StreamSender, CompletionStream) {
        let (tx, rx) = mpsc::channel(1);
        (
            StreamSender { tx },
            CompletionStream {
                rx,
                final_output: None,
                exhausted: false,
                finalizers: Vec::new(),
            },
        )
    }

    /// Registers a hook invoked exactly once when the stream reaches its
    /// terminal event, including abandonment by drop.
    pub fn on_terminal(&mut self, f: impl FnOnce(&Result<String>) + Send + 'static) {
        self.finalizers.push(Box::new(f));
    }

    fn record_terminal(&mut self, result: Result<String>) {
        self.exhausted = true;
        for finalizer in self.finalizers.drain(..) {
            finalizer(&result);
        }
        debug!(ok = result.is_ok(), "Completion stream reached terminal event");
        self.final_output = Some(result);
    }

    /// Returns the next intermediate message, or `None` once the stream has
    /// reached its terminal event.
    pub async fn next_message(&mut self) -> Option<MessageOutput> {
        if self.exhausted {
            return None;
        }
        match self.rx.recv().await {
            Some(StreamEvent::Message(message)) => Some(message),
            Some(StreamEvent::Final(result)) => {
                self.record_terminal(result);
                None
            }
            None => {
                self.record_terminal(Err(AgencyError::Backend(
                    "completion stream closed without a terminal event".to_string(),
                )));
                None
            }
        }
    }

    /// Whether the terminal event has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Takes the terminal result. Fails with [`AgencyError::StreamPending`]
    /// until the stream is exhausted; yields the result only once.
    pub fn final_output(&mut self) -> Result<String> {
        if !self.exhausted {
            return Err(AgencyError::StreamPending);
        }
        self.final_output
            .take()
            .unwrap_or(Err(AgencyError::StreamPending))
    }

    /// Drains all remaining messages and returns the terminal result.
    pub async fn collect_final(mut self) -> Result<String> {
        while self.next_message().await.is_some() {}
        self.final_output()
    }
}

impl Stream for CompletionStream {
    type Item = MessageOutput;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exhausted {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Message(message))) => Poll::Ready(Some(message)),
            Poll::Ready(Some(StreamEvent::Final(result))) => {
                this.record_terminal(result);
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.record_terminal(Err(AgencyError::Backend(
                    "completion stream closed without a terminal event".to_string(),
                )));
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        // A consumer that walks away mid-run still owes the finalizers a
        // terminal event; the run is recorded as abandoned, not left open.
        if !self.exhausted && !self.finalizers.is_empty() {
            let result = Err(AgencyError::StreamAbandoned);
            for finalizer in self.finalizers.drain(..) {
                finalizer(&result);
            }
        }
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("exhausted", &self.exhausted)
            .field("finalizers", &self.finalizers.len())
            .finish()
    }
}
