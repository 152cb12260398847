use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, HeaderValue};
use tracing::debug;

use crate::config::{ClientConfig, Credential};
use crate::errors::{ClientError, SessionError};
use crate::message::ChatCompletionRequest;

/// Raw response body as delivered by a transport.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, SessionError>> + Send + 'static>>;

const EVENT_STREAM: &str = "text/event-stream";
const MAX_ERROR_BODY: usize = 512;
const MAX_ERROR_BODY_BYTES: usize = MAX_ERROR_BODY * 4;
const UNREADABLE_BODY: &str = "<unreadable body>";

/// Opens the response stream for one exchange.
///
/// One call per session. Implementations must not retry.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(
        &self,
        request: &ChatCompletionRequest,
        credential: &Credential,
    ) -> Result<ByteStream, SessionError>;
}

/// HTTPS transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn open(
        &self,
        request: &ChatCompletionRequest,
        credential: &Credential,
    ) -> Result<ByteStream, SessionError> {
        let url = self.config.chat_completions_url();
        debug!(%url, model = %request.model, messages = request.messages.len(), "opening chat-completion stream");

        let deadline = tokio::time::Instant::now() + self.config.open_timeout;
        let send = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(request)
            .send();

        let response = match tokio::time::timeout_at(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(SessionError::transport(format!("request failed: {e}"))),
            Err(_) => {
                return Err(SessionError::transport(format!(
                    "no response within {:?}",
                    self.config.open_timeout
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response, deadline).await;
            return Err(SessionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| SessionError::transport(format!("stream read failed: {e}")))
        })))
    }
}

/// Reads at most `MAX_ERROR_BODY_BYTES` of an error response before `deadline`.
///
/// Whatever arrived before a stall, read error or the deadline is kept.
async fn read_error_body(response: reqwest::Response, deadline: tokio::time::Instant) -> String {
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while body.len() < MAX_ERROR_BODY_BYTES {
        match tokio::time::timeout_at(deadline, chunks.next()).await {
            Ok(Some(Ok(chunk))) => body.extend_from_slice(&chunk),
            Ok(Some(Err(e))) => {
                debug!(error = %e, "error body read failed");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(read = body.len(), "error body read hit the open deadline");
                break;
            }
        }
    }
    body.truncate(MAX_ERROR_BODY_BYTES);
    let text = String::from_utf8_lossy(&body);
    let text = text.trim();
    if text.is_empty() {
        return UNREADABLE_BODY.to_string();
    }
    truncate(text, MAX_ERROR_BODY)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
