//! Parsing of a single frame payload into reasoning/content fragments.

use serde::Deserialize;

use crate::errors::FrameError;

const GENERIC_UPSTREAM_ERROR: &str = "upstream service reported an error";

/// Classified content of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaRecord {
    /// Zero, one or both channel fragments. Both `None` means a no-op frame.
    Fragments {
        reasoning: Option<String>,
        content: Option<String>,
    },
    /// The upstream embedded an error object; fatal for the session.
    Upstream { message: String },
}

impl DeltaRecord {
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            Self::Fragments {
                reasoning: None,
                content: None
            }
        )
    }
}

#[derive(Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl ErrorBody {
    /// The message as text; non-string JSON values are rendered as JSON.
    fn text(self) -> Option<String> {
        match self.message? {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(text),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Parses one frame payload.
///
/// Only the first choice is read. A `null` field is treated as absent.
pub fn parse_frame(payload: &str) -> Result<DeltaRecord, FrameError> {
    let envelope: ChunkEnvelope = serde_json::from_str(payload)?;

    if let Some(error) = envelope.error {
        let message = error
            .text()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_UPSTREAM_ERROR.to_string());
        return Ok(DeltaRecord::Upstream { message });
    }

    let delta = envelope
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.delta);

    Ok(match delta {
        Some(delta) => DeltaRecord::Fragments {
            reasoning: delta.reasoning_content,
            content: delta.content,
        },
        None => DeltaRecord::Fragments {
            reasoning: None,
            content: None,
        },
    })
}
