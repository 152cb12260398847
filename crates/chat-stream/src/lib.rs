//! Streaming chat-completion client with separate reasoning and answer channels.
//!
//! One [`StreamSession`] drives one exchange: it checks the credential in the settings
//! snapshot, opens the `data:` event stream, splits every frame into reasoning
//! and content fragments, and publishes them in arrival order followed by
//! exactly one terminal event. A [`DispatchSink`] hands those events to
//! consumer callbacks on whatever context a [`Dispatcher`] schedules onto.
//!
//! # Typed event stream
//!
//! ```no_run
//! use chat_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ChatClient::new(ClientConfig::default())?;
//! let snapshot = SettingsSnapshot::new("sk-...", ModelSettings::default());
//!
//! let mut stream = client.start_stream(vec![ChatMessage::user("Say hello")], snapshot);
//! while let Some(event) = stream.next_event().await {
//!     match event {
//!         StreamEvent::Reasoning { text, .. } => eprint!("{text}"),
//!         StreamEvent::Content { text, .. } => print!("{text}"),
//!         StreamEvent::Completed { .. } => println!(),
//!         StreamEvent::Failed { error } => eprintln!("failed: {error}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Callbacks on a consumer loop
//!
//! ```no_run
//! use chat_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ChatClient::from_env()?;
//! let (dispatcher, queue) = dispatch_queue();
//! let callbacks = StreamCallbacks::new(
//!     |text| print!("{text}"),
//!     |_full| println!(),
//!     |reason| eprintln!("error: {reason}"),
//! )
//! .on_reasoning(|text| eprint!("{text}"));
//!
//! client.send(
//!     vec![ChatMessage::user("Say hello")],
//!     SettingsSnapshot::from_env(),
//!     callbacks,
//!     dispatcher,
//! );
//! queue.run().await;
//! # Ok(())
//! # }
//! ```

/// Client entry point.
pub mod client;
/// Endpoint, credential and model settings.
pub mod config;
/// Frame payload parsing.
pub mod delta;
/// Delivery of events to consumer callbacks.
pub mod dispatch;
/// Error types.
pub mod errors;
/// Line-oriented frame decoding.
pub mod frame;
/// Request messages and conversation records.
pub mod message;
/// Tracing subscriber bootstrap.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Per-exchange session and its state machine.
pub mod session;
/// Typed session events and the consumer handle.
pub mod stream;
/// Transport seam and the HTTPS implementation.
pub mod transport;

pub use client::ChatClient;
pub use config::{ClientConfig, Credential, ModelSettings, SettingsSnapshot};
pub use delta::{DeltaRecord, parse_frame};
pub use dispatch::{
    DispatchQueue, DispatchSink, DispatchTask, Dispatcher, InlineDispatcher, QueueDispatcher,
    StreamCallbacks, dispatch_queue,
};
pub use errors::{ClientError, FrameError, SessionError};
pub use frame::{Frame, FrameDecoder, frame_stream};
pub use message::{ChatCompletionRequest, ChatMessage, HistoryEntry, Role, history_to_messages};
pub use observability::init_observability;
pub use session::{SessionState, StreamSession};
pub use stream::{AbortHandle, ChatStream, ExchangeOutput, StreamEvent};
pub use transport::{ByteStream, ChatTransport, HttpTransport};
