use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::config::SettingsSnapshot;
use crate::delta::{DeltaRecord, parse_frame};
use crate::errors::SessionError;
use crate::frame::{Frame, frame_stream};
use crate::message::{ChatCompletionRequest, ChatMessage};
use crate::stream::{AbortHandle, ChatStream, ExchangeOutput, StreamEvent};
use crate::transport::ChatTransport;

const DEFAULT_BUFFER_CAPACITY: usize = 128;
const PAYLOAD_PREVIEW_CHARS: usize = 120;

/// Lifecycle of one exchange. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Validating,
    Opening,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Opening)
                | (Validating, Failed)
                | (Opening, Streaming)
                | (Opening, Failed)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }
}

/// One request/response exchange.
///
/// `start` consumes the session, so an instance can only ever drive a single
/// exchange. The settings snapshot is taken by value at construction.
pub struct StreamSession {
    session_id: uuid::Uuid,
    transport: Arc<dyn ChatTransport>,
    snapshot: SettingsSnapshot,
    messages: Vec<ChatMessage>,
    buffer_capacity: usize,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        snapshot: SettingsSnapshot,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            transport,
            snapshot,
            messages,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Sets the bounded event buffer between the session task and the consumer.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Spawns the session on its own task and returns the consumer handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> ChatStream {
        let (tx, rx) = mpsc::channel(self.buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let session_id = self.session_id;

        tokio::spawn(self.run(tx, final_tx, abort_rx));

        ChatStream {
            session_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        }
    }

    async fn run(
        self,
        tx: mpsc::Sender<StreamEvent>,
        final_tx: oneshot::Sender<Result<ExchangeOutput, SessionError>>,
        mut abort_rx: watch::Receiver<bool>,
    ) {
        let StreamSession {
            session_id,
            transport,
            snapshot,
            messages,
            ..
        } = self;

        let mut exchange = Exchange::new(session_id, tx, snapshot.settings.show_reasoning);
        let driven = exchange
            .drive(transport.as_ref(), &snapshot, messages, &mut abort_rx)
            .await;

        let (event, result) = match driven {
            Ok(()) => {
                exchange.transition(SessionState::Completed);
                debug!(
                    %session_id,
                    content_len = exchange.content.len(),
                    reasoning_len = exchange.reasoning.len(),
                    increments = exchange.seq,
                    "chat stream completed"
                );
                let output = ExchangeOutput {
                    content: std::mem::take(&mut exchange.content),
                    reasoning: std::mem::take(&mut exchange.reasoning),
                };
                (
                    StreamEvent::Completed {
                        text: output.content.clone(),
                    },
                    Ok(output),
                )
            }
            Err(error) => {
                exchange.transition(SessionState::Failed);
                warn!(%session_id, %error, increments = exchange.seq, "chat stream failed");
                (
                    StreamEvent::Failed {
                        error: error.clone(),
                    },
                    Err(error),
                )
            }
        };

        if exchange.tx.send(event).await.is_err() {
            debug!(%session_id, "consumer dropped before terminal event");
        }
        let _ = final_tx.send(result);
    }
}

/// State owned by the session task for the duration of one exchange.
struct Exchange {
    session_id: uuid::Uuid,
    state: SessionState,
    tx: mpsc::Sender<StreamEvent>,
    show_reasoning: bool,
    seq: u64,
    content: String,
    reasoning: String,
}

impl Exchange {
    fn new(session_id: uuid::Uuid, tx: mpsc::Sender<StreamEvent>, show_reasoning: bool) -> Self {
        Self {
            session_id,
            state: SessionState::Idle,
            tx,
            show_reasoning,
            seq: 0,
            content: String::new(),
            reasoning: String::new(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(session_id = %self.session_id, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    async fn drive(
        &mut self,
        transport: &dyn ChatTransport,
        snapshot: &SettingsSnapshot,
        messages: Vec<ChatMessage>,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        self.transition(SessionState::Validating);
        if snapshot.credential.is_blank() {
            return Err(SessionError::config(
                "API key is not set; configure it in settings",
            ));
        }

        self.transition(SessionState::Opening);
        let request = ChatCompletionRequest::streaming(&snapshot.settings, messages);
        let bytes = tokio::select! {
            biased;
            _ = cancelled(abort_rx) => return Err(SessionError::Cancelled),
            opened = transport.open(&request, &snapshot.credential) => opened?,
        };

        self.transition(SessionState::Streaming);
        let mut frames = pin!(frame_stream(bytes));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(abort_rx) => return Err(SessionError::Cancelled),
                next = frames.next() => next,
            };
            match next {
                None | Some(Ok(Frame::Done)) => return Ok(()),
                Some(Err(error)) => return Err(error),
                Some(Ok(Frame::Data(payload))) => self.apply(&payload).await?,
            }
        }
    }

    /// Handles one data frame. Malformed frames are logged and skipped.
    async fn apply(&mut self, payload: &str) -> Result<(), SessionError> {
        match parse_frame(payload) {
            Err(error) => {
                warn!(
                    session_id = %self.session_id,
                    %error,
                    payload = %preview(payload),
                    "skipping malformed stream frame"
                );
                Ok(())
            }
            Ok(DeltaRecord::Upstream { message }) => Err(SessionError::Upstream { message }),
            Ok(DeltaRecord::Fragments { reasoning, content }) => {
                if let Some(text) = reasoning {
                    self.reasoning.push_str(&text);
                    if self.show_reasoning {
                        let seq = self.next_seq();
                        self.publish(StreamEvent::Reasoning { seq, text }).await?;
                    }
                }
                if let Some(text) = content {
                    self.content.push_str(&text);
                    let seq = self.next_seq();
                    self.publish(StreamEvent::Content { seq, text }).await?;
                }
                Ok(())
            }
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq = self.seq.saturating_add(1);
        seq
    }

    async fn publish(&self, event: StreamEvent) -> Result<(), SessionError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SessionError::protocol("consumer dropped the event stream"))
    }
}

/// Resolves once an abort was requested. Pends forever if every abort
/// handle is gone.
async fn cancelled(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow_and_update() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn preview(payload: &str) -> &str {
    match payload.char_indices().nth(PAYLOAD_PREVIEW_CHARS) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}
