use crate::config::ModelSettings;

/// Author of a message in the request history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message sent upstream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A conversation record as kept by the conversation manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub content: String,
    /// Reasoning shown alongside an assistant reply. Never sent back upstream.
    pub reasoning: Option<String>,
    pub is_user: bool,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            is_user: true,
        }
    }

    pub fn assistant(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            content: content.into(),
            reasoning,
            is_user: false,
        }
    }

    pub fn has_reasoning(&self) -> bool {
        self.reasoning
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

/// Maps conversation records to the ordered request message list.
pub fn history_to_messages(history: &[HistoryEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|entry| {
            let role = if entry.is_user {
                Role::User
            } else {
                Role::Assistant
            };
            ChatMessage::new(role, entry.content.clone())
        })
        .collect()
}

/// Outbound request body. Field order matches the wire format.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl ChatCompletionRequest {
    /// Builds a streaming request from a settings snapshot.
    pub fn streaming(settings: &ModelSettings, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            stream: true,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_wire_order() {
        let request = ChatCompletionRequest::streaming(
            &ModelSettings::default(),
            vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
        );
        let json = serde_json::to_string(&request).expect("serialize");
        assert_eq!(
            json,
            r#"{"model":"deepseek-chat","max_tokens":2048,"temperature":0.7,"stream":true,"messages":[{"role":"system","content":"be brief"},{"role":"user","content":"hi"}]}"#
        );
    }

    #[test]
    fn history_maps_roles_and_drops_reasoning() {
        let history = vec![
            HistoryEntry::user("question"),
            HistoryEntry::assistant("answer", Some("thinking".into())),
            HistoryEntry::user("follow up"),
        ];
        let messages = history_to_messages(&history);
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("question"),
                ChatMessage::assistant("answer"),
                ChatMessage::user("follow up"),
            ]
        );
        assert!(history[1].has_reasoning());
        assert!(!history[0].has_reasoning());
    }
}
