use tokio::sync::{mpsc, oneshot, watch};

use crate::errors::SessionError;

/// Typed events published by a session, in the order they were produced.
///
/// A session publishes any number of increments followed by exactly one of
/// `Completed`/`Failed`, then closes its channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental reasoning fragment.
    Reasoning { seq: u64, text: String },
    /// Incremental final-answer fragment.
    Content { seq: u64, text: String },
    /// Terminal success carrying the accumulated answer text.
    Completed { text: String },
    /// Terminal failure.
    Failed { error: SessionError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Everything a session accumulated, returned by [`ChatStream::finish`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeOutput {
    /// Final answer text; the same text carried by `Completed`.
    pub content: String,
    /// Reasoning text. Informational only.
    pub reasoning: String,
}

/// Requests cancellation of an in-flight session.
#[derive(Clone)]
pub struct AbortHandle {
    pub(crate) tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Best-effort: becomes visible as `Failed(SessionError::Cancelled)`
    /// unless the session already reached its terminal event.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Consumer side of one session.
pub struct ChatStream {
    pub(crate) session_id: uuid::Uuid,
    pub(crate) rx: mpsc::Receiver<StreamEvent>,
    pub(crate) final_rx: oneshot::Receiver<Result<ExchangeOutput, SessionError>>,
    pub(crate) abort_handle: AbortHandle,
    pub(crate) saw_terminal: bool,
}

impl ChatStream {
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the terminal event has
    /// been observed or the channel closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.saw_terminal {
            return None;
        }
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the session's result.
    pub async fn finish(mut self) -> Result<ExchangeOutput, SessionError> {
        while self.next_event().await.is_some() {}
        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::protocol(format!(
                "session {} ended without a final result",
                self.session_id
            ))),
        }
    }
}
