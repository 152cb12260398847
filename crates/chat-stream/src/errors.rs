/// Terminal failure carried by `StreamEvent::Failed`.
///
/// The `Display` form is the reason handed to the consumer's error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Missing credential, detected before any network activity.
    #[error("configuration error: {0}")]
    Config(String),
    /// Connect, write or read failure (including the open timeout).
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success status.
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The upstream service reported an error object inside a frame.
    #[error("{message}")]
    Upstream { message: String },
    /// The caller aborted the exchange.
    #[error("session cancelled")]
    Cancelled,
    /// Internal invariant misuse (consumer gone, task ended without result).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status for `Status` failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors returned while constructing a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single frame that could not be parsed. Never fatal for a session.
#[derive(Debug, thiserror::Error)]
#[error("malformed frame: {source}")]
pub struct FrameError {
    #[from]
    source: serde_json::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_displays_bare_message() {
        let err = SessionError::Upstream {
            message: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn status_error_embeds_code() {
        let err = SessionError::Status {
            status: 401,
            body: "unauthorized".into(),
        };
        assert!(err.to_string().contains("401"));
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(SessionError::Cancelled.status_code(), None);
    }
}
