//! Common imports for typical client usage.
pub use crate::{
    ChatClient, ChatMessage, ChatStream, ClientConfig, ClientError, Credential, DispatchQueue,
    Dispatcher, HistoryEntry, InlineDispatcher, ModelSettings, Role, SessionError,
    SettingsSnapshot, StreamCallbacks, StreamEvent, dispatch_queue,
};
