use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ClientConfig, Credential, ModelSettings, SettingsSnapshot};
use crate::dispatch::{DispatchSink, Dispatcher, StreamCallbacks};
use crate::errors::ClientError;
use crate::message::{ChatMessage, HistoryEntry, history_to_messages};
use crate::session::StreamSession;
use crate::stream::ChatStream;
use crate::transport::{ChatTransport, HttpTransport};

const CONNECTION_PROBE: &str = "Hello";

/// Entry point for starting chat-completion exchanges.
///
/// Cheap to clone; every exchange gets its own [`StreamSession`].
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    config: ClientConfig,
}

impl ChatClient {
    /// Creates a client using the HTTPS transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.clone())?;
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Creates a client from [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    /// Creates a client over a caller-provided transport.
    pub fn with_transport(transport: Arc<dyn ChatTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds (without starting) a session for one exchange.
    pub fn session(&self, messages: Vec<ChatMessage>, snapshot: SettingsSnapshot) -> StreamSession {
        StreamSession::new(self.transport.clone(), snapshot, messages)
            .buffer_capacity(self.config.stream_buffer_capacity)
    }

    /// Starts an exchange and returns the typed event stream.
    pub fn start_stream(&self, messages: Vec<ChatMessage>, snapshot: SettingsSnapshot) -> ChatStream {
        self.session(messages, snapshot).start()
    }

    /// Starts an exchange whose events are delivered to `callbacks` through
    /// `dispatcher`. The returned handle resolves after the terminal callback
    /// has been dispatched.
    pub fn send<D>(
        &self,
        messages: Vec<ChatMessage>,
        snapshot: SettingsSnapshot,
        callbacks: StreamCallbacks,
        dispatcher: D,
    ) -> JoinHandle<()>
    where
        D: Dispatcher + 'static,
    {
        let stream = self.start_stream(messages, snapshot);
        let sink = DispatchSink::new(callbacks, dispatcher);
        tokio::spawn(sink.drive(stream))
    }

    /// Like [`ChatClient::send`], starting from conversation records.
    pub fn send_history<D>(
        &self,
        history: &[HistoryEntry],
        snapshot: SettingsSnapshot,
        callbacks: StreamCallbacks,
        dispatcher: D,
    ) -> JoinHandle<()>
    where
        D: Dispatcher + 'static,
    {
        self.send(history_to_messages(history), snapshot, callbacks, dispatcher)
    }

    /// Sends a one-line probe and reports whether the exchange completed.
    pub async fn check_connection(&self, credential: Credential, settings: ModelSettings) -> bool {
        let snapshot = SettingsSnapshot::new(credential, settings.show_reasoning(false));
        let result = self
            .start_stream(vec![ChatMessage::user(CONNECTION_PROBE)], snapshot)
            .finish()
            .await;
        match result {
            Ok(_) => {
                info!(base_url = %self.config.base_url, "connection check succeeded");
                true
            }
            Err(error) => {
                warn!(base_url = %self.config.base_url, %error, "connection check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SessionError;
    use crate::dispatch::InlineDispatcher;
    use crate::message::ChatCompletionRequest;
    use crate::transport::ByteStream;
    use std::sync::Mutex;

    struct ScriptedTransport {
        body: &'static str,
        seen: Mutex<Vec<ChatCompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(
            &self,
            request: &ChatCompletionRequest,
            _credential: &Credential,
        ) -> Result<ByteStream, SessionError> {
            self.seen.lock().expect("lock").push(request.clone());
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                bytes::Bytes::from_static(self.body.as_bytes()),
            )])))
        }
    }

    fn scripted_client(body: &'static str) -> (ChatClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport {
            body,
            seen: Mutex::new(Vec::new()),
        });
        (
            ChatClient::with_transport(transport.clone(), ClientConfig::default()),
            transport,
        )
    }

    #[tokio::test]
    async fn send_history_delivers_callbacks_in_order() {
        let (client, transport) = scripted_client(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hm\",\"content\":\"Hi\"}}]}\ndata: [DONE]\n",
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let (c, r, done, err) = (log.clone(), log.clone(), log.clone(), log.clone());
        let callbacks = StreamCallbacks::new(
            move |t| c.lock().expect("lock").push(format!("content:{t}")),
            move |t| done.lock().expect("lock").push(format!("complete:{t}")),
            move |t| err.lock().expect("lock").push(format!("error:{t}")),
        )
        .on_reasoning(move |t| r.lock().expect("lock").push(format!("reasoning:{t}")));

        let history = vec![
            HistoryEntry::user("hello"),
            HistoryEntry::assistant("hi", Some("thought".into())),
            HistoryEntry::user("again"),
        ];
        client
            .send_history(
                &history,
                SettingsSnapshot::new("sk-1234567890", ModelSettings::default()),
                callbacks,
                InlineDispatcher,
            )
            .await
            .expect("join");

        assert_eq!(
            *log.lock().expect("lock"),
            vec!["reasoning:hm", "content:Hi", "complete:Hi"]
        );
        let seen = transport.seen.lock().expect("lock");
        assert_eq!(seen[0].messages.len(), 3);
        assert_eq!(seen[0].messages[1], ChatMessage::assistant("hi"));
    }

    #[tokio::test]
    async fn check_connection_reports_outcome() {
        let (client, transport) = scripted_client("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n");
        assert!(
            client
                .check_connection(Credential::new("sk-1234567890"), ModelSettings::default())
                .await
        );
        assert_eq!(
            transport.seen.lock().expect("lock")[0].messages,
            vec![ChatMessage::user(CONNECTION_PROBE)]
        );

        let (client, _) = scripted_client("data: {\"error\":{\"message\":\"invalid key\"}}\n");
        assert!(
            !client
                .check_connection(Credential::new("sk-1234567890"), ModelSettings::default())
                .await
        );
        assert!(
            !client
                .check_connection(Credential::default(), ModelSettings::default())
                .await
        );
    }
}
