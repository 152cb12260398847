//! Hand-off of session events to the consumer's execution context.
//!
//! A [`DispatchSink`] turns [`StreamEvent`]s into callback invocations and
//! schedules each one, in order, through a [`Dispatcher`]. The dispatcher
//! decides *where* callbacks run: inline, on a UI loop drained through a
//! [`DispatchQueue`], or on any scheduler the host provides as a closure.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::SessionError;
use crate::stream::{ChatStream, StreamEvent};

/// Unit of work posted to the consumer context.
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules delivery on the consumer's execution context.
///
/// Implementations must run tasks in the order they were dispatched.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: DispatchTask);
}

impl<F> Dispatcher for F
where
    F: Fn(DispatchTask) + Send + Sync,
{
    fn dispatch(&self, task: DispatchTask) {
        self(task)
    }
}

/// Runs every task immediately on the dispatching thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: DispatchTask) {
        task()
    }
}

/// Posts tasks to a FIFO queue drained by a [`DispatchQueue`].
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, task: DispatchTask) {
        if self.tx.send(task).is_err() {
            warn!("dispatch queue is closed; dropping task");
        }
    }
}

/// Consumer end of a [`QueueDispatcher`]; the UI-loop analogue.
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<DispatchTask>,
}

/// Creates a connected dispatcher/queue pair.
pub fn dispatch_queue() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

impl DispatchQueue {
    /// Runs tasks until every dispatcher clone has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
    }

    /// Waits for and runs a single task. Returns `false` once the queue is closed.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs the tasks already queued without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

type IncrementFn = Box<dyn FnMut(String) + Send>;
type TerminalFn = Box<dyn FnOnce(String) + Send>;

/// Consumer callback slots.
///
/// The reasoning slot is optional; without it reasoning increments are dropped.
/// `on_complete` and `on_error` are mutually exclusive and fire at most once.
pub struct StreamCallbacks {
    on_content: IncrementFn,
    on_reasoning: Option<IncrementFn>,
    on_complete: Option<TerminalFn>,
    on_error: Option<TerminalFn>,
}

impl StreamCallbacks {
    pub fn new(
        on_content: impl FnMut(String) + Send + 'static,
        on_complete: impl FnOnce(String) + Send + 'static,
        on_error: impl FnOnce(String) + Send + 'static,
    ) -> Self {
        Self {
            on_content: Box::new(on_content),
            on_reasoning: None,
            on_complete: Some(Box::new(on_complete)),
            on_error: Some(Box::new(on_error)),
        }
    }

    /// Installs the reasoning slot.
    pub fn on_reasoning(mut self, on_reasoning: impl FnMut(String) + Send + 'static) -> Self {
        self.on_reasoning = Some(Box::new(on_reasoning));
        self
    }

    fn complete(&mut self, text: String) {
        self.on_error = None;
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(text);
        }
    }

    fn fail(&mut self, reason: String) {
        self.on_complete = None;
        if let Some(on_error) = self.on_error.take() {
            on_error(reason);
        }
    }
}

/// Ordering and hand-off layer between a session and its consumer.
pub struct DispatchSink<D> {
    callbacks: Arc<Mutex<StreamCallbacks>>,
    has_reasoning: bool,
    dispatcher: D,
    terminated: bool,
}

impl<D: Dispatcher> DispatchSink<D> {
    pub fn new(callbacks: StreamCallbacks, dispatcher: D) -> Self {
        Self {
            has_reasoning: callbacks.on_reasoning.is_some(),
            callbacks: Arc::new(Mutex::new(callbacks)),
            dispatcher,
            terminated: false,
        }
    }

    /// Whether the terminal callback has been scheduled.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Schedules the callback for one event.
    ///
    /// Returns `false` when the event is dropped: anything after the terminal
    /// event, or reasoning without a reasoning slot.
    pub fn deliver(&mut self, event: StreamEvent) -> bool {
        if self.terminated {
            debug!(?event, "dropping event delivered after terminal");
            return false;
        }
        match event {
            StreamEvent::Reasoning { text, .. } => {
                if !self.has_reasoning {
                    return false;
                }
                self.post(move |callbacks| {
                    if let Some(on_reasoning) = callbacks.on_reasoning.as_mut() {
                        on_reasoning(text);
                    }
                });
            }
            StreamEvent::Content { text, .. } => {
                self.post(move |callbacks| (callbacks.on_content)(text));
            }
            StreamEvent::Completed { text } => {
                self.terminated = true;
                self.post(move |callbacks| callbacks.complete(text));
            }
            StreamEvent::Failed { error } => {
                self.terminated = true;
                let reason = error.to_string();
                self.post(move |callbacks| callbacks.fail(reason));
            }
        }
        true
    }

    /// Delivers every event of `stream`, guaranteeing one terminal callback.
    pub async fn drive(mut self, mut stream: ChatStream) {
        while let Some(event) = stream.next_event().await {
            self.deliver(event);
        }
        if !self.terminated {
            self.deliver(StreamEvent::Failed {
                error: SessionError::protocol("event stream closed without a terminal event"),
            });
        }
    }

    fn post(&self, f: impl FnOnce(&mut StreamCallbacks) + Send + 'static) {
        let callbacks = Arc::clone(&self.callbacks);
        self.dispatcher.dispatch(Box::new(move || {
            let mut guard = match callbacks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Seen {
        Content(String),
        Reasoning(String),
        Complete(String),
        Error(String),
    }

    fn recording(with_reasoning: bool) -> (StreamCallbacks, Arc<Mutex<Vec<Seen>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (c, done, err) = (log.clone(), log.clone(), log.clone());
        let mut callbacks = StreamCallbacks::new(
            move |t| c.lock().expect("lock").push(Seen::Content(t)),
            move |t| done.lock().expect("lock").push(Seen::Complete(t)),
            move |t| err.lock().expect("lock").push(Seen::Error(t)),
        );
        if with_reasoning {
            let r = log.clone();
            callbacks = callbacks.on_reasoning(move |t| r.lock().expect("lock").push(Seen::Reasoning(t)));
        }
        (callbacks, log)
    }

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content {
            seq: 0,
            text: text.into(),
        }
    }

    #[test]
    fn inline_delivery_preserves_order_and_single_terminal() {
        let (callbacks, log) = recording(true);
        let mut sink = DispatchSink::new(callbacks, InlineDispatcher);
        sink.deliver(StreamEvent::Reasoning {
            seq: 0,
            text: "r".into(),
        });
        sink.deliver(content("a"));
        assert!(sink.deliver(StreamEvent::Completed { text: "a".into() }));
        assert!(sink.is_terminated());
        assert!(!sink.deliver(content("late")));
        assert!(!sink.deliver(StreamEvent::Failed {
            error: SessionError::Cancelled
        }));

        assert_eq!(
            *log.lock().expect("lock"),
            vec![
                Seen::Reasoning("r".into()),
                Seen::Content("a".into()),
                Seen::Complete("a".into()),
            ]
        );
    }

    #[test]
    fn reasoning_dropped_without_slot() {
        let (callbacks, log) = recording(false);
        let mut sink = DispatchSink::new(callbacks, InlineDispatcher);
        assert!(!sink.deliver(StreamEvent::Reasoning {
            seq: 0,
            text: "r".into(),
        }));
        sink.deliver(StreamEvent::Failed {
            error: SessionError::Upstream {
                message: "rate limited".into(),
            },
        });
        assert_eq!(
            *log.lock().expect("lock"),
            vec![Seen::Error("rate limited".into())]
        );
    }

    #[test]
    fn queue_defers_until_drained() {
        let (callbacks, log) = recording(false);
        let (dispatcher, mut queue) = dispatch_queue();
        let mut sink = DispatchSink::new(callbacks, dispatcher);
        sink.deliver(content("x"));
        sink.deliver(content("y"));
        sink.deliver(StreamEvent::Completed { text: "xy".into() });
        assert!(log.lock().expect("lock").is_empty());

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(
            *log.lock().expect("lock"),
            vec![
                Seen::Content("x".into()),
                Seen::Content("y".into()),
                Seen::Complete("xy".into()),
            ]
        );
    }

    #[tokio::test]
    async fn drive_synthesizes_failure_when_stream_closes_early() {
        let (tx, rx) = mpsc::channel(4);
        let (final_tx, final_rx) = tokio::sync::oneshot::channel();
        let (abort_tx, _abort_rx) = tokio::sync::watch::channel(false);
        let stream = ChatStream {
            session_id: uuid::Uuid::new_v4(),
            rx,
            final_rx,
            abort_handle: crate::stream::AbortHandle { tx: abort_tx },
            saw_terminal: false,
        };
        tx.send(content("partial")).await.expect("send");
        drop(tx);
        drop(final_tx);

        let (callbacks, log) = recording(false);
        DispatchSink::new(callbacks, InlineDispatcher).drive(stream).await;

        let seen = log.lock().expect("lock").clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Seen::Content("partial".into()));
        assert!(matches!(&seen[1], Seen::Error(reason) if reason.contains("without a terminal event")));
    }

    #[test]
    fn closure_dispatcher_is_accepted() {
        let posted = Arc::new(Mutex::new(0usize));
        let counter = posted.clone();
        let dispatcher = move |task: DispatchTask| {
            *counter.lock().expect("lock") += 1;
            task();
        };
        let (callbacks, log) = recording(false);
        let mut sink = DispatchSink::new(callbacks, dispatcher);
        sink.deliver(content("a"));
        assert_eq!(*posted.lock().expect("lock"), 1);
        assert_eq!(log.lock().expect("lock").len(), 1);
    }
}
