use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Transport-level configuration shared by every session of a client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat-completion endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Upper bound on the time until response headers arrive, and for an error
    /// status also on reading its body.
    ///
    /// Idle time between frames while streaming is not bounded here.
    pub open_timeout: Duration,
    /// Bounded event buffer between the session task and its consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(30),
            open_timeout: Duration::from_secs(120),
            stream_buffer_capacity: 128,
        }
    }
}

impl ClientConfig {
    /// Reads `DEEPSEEK_BASE_URL` on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base_url) = env_string("DEEPSEEK_BASE_URL") {
            config.base_url = base_url;
        }
        config
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the open (time-to-headers) timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Overrides the event buffer size.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!(
            "{}{CHAT_COMPLETIONS_PATH}",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Bearer credential. `Debug` never prints the key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key with surrounding whitespace removed, as sent on the wire.
    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().is_empty()
    }

    /// Advisory format check: `sk-` prefix and longer than 10 characters.
    ///
    /// Only a blank credential blocks a send; this is for settings screens.
    pub fn looks_valid(&self) -> bool {
        let key = self.expose();
        key.starts_with("sk-") && key.chars().count() > 10
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Model configuration captured once per session.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Whether reasoning increments are forwarded to the consumer.
    pub show_reasoning: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            show_reasoning: true,
        }
    }
}

impl ModelSettings {
    /// Reads `DEEPSEEK_MODEL`, `DEEPSEEK_TEMPERATURE`, `DEEPSEEK_MAX_TOKENS` and
    /// `DEEPSEEK_SHOW_REASONING`; unset or unparseable values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env_string("DEEPSEEK_MODEL").unwrap_or(defaults.model),
            temperature: env_parsed("DEEPSEEK_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: env_parsed("DEEPSEEK_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            show_reasoning: env_bool("DEEPSEEK_SHOW_REASONING").unwrap_or(defaults.show_reasoning),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn show_reasoning(mut self, show: bool) -> Self {
        self.show_reasoning = show;
        self
    }

    /// Advisory range check for settings screens and the CLI.
    ///
    /// Sessions never call this; out-of-range values are sent as-is and the
    /// endpoint decides.
    pub fn check(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model is empty".to_string());
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens is 0".to_string());
        }
        Ok(())
    }
}

/// Read-only view of the settings store taken when a session starts.
///
/// Later changes to the store never reach an in-flight session.
#[derive(Clone, Debug, Default)]
pub struct SettingsSnapshot {
    pub credential: Credential,
    pub settings: ModelSettings,
}

impl SettingsSnapshot {
    pub fn new(credential: impl Into<Credential>, settings: ModelSettings) -> Self {
        Self {
            credential: credential.into(),
            settings,
        }
    }

    /// Builds a snapshot from `DEEPSEEK_API_KEY` and [`ModelSettings::from_env`].
    pub fn from_env() -> Self {
        Self {
            credential: Credential::new(env_string("DEEPSEEK_API_KEY").unwrap_or_default()),
            settings: ModelSettings::from_env(),
        }
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    let parsed = parse_bool(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparseable boolean setting");
    }
    parsed
}
