//! Streams one chat completion to the terminal.
//!
//! Reasoning fragments go to stderr, dimmed and prefixed; answer fragments go
//! to stdout as they arrive.

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chat_stream::prelude::*;
use chat_stream::init_observability;
use clap::Parser;
use tracing::warn;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "chat-stream")]
#[command(about = "Stream a chat completion with separate reasoning and answer output")]
struct Cli {
    /// Prompt to send as the user message
    #[arg(value_name = "PROMPT")]
    prompt: String,

    /// Optional system message sent before the prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Model identifier (overrides DEEPSEEK_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature, 0.0 to 2.0 (overrides DEEPSEEK_TEMPERATURE)
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Maximum tokens to generate (overrides DEEPSEEK_MAX_TOKENS)
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Do not print reasoning fragments
    #[arg(long)]
    hide_reasoning: bool,

    /// API base URL (overrides DEEPSEEK_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
}

impl Cli {
    fn snapshot(&self) -> SettingsSnapshot {
        let mut snapshot = SettingsSnapshot::from_env();
        let mut settings = snapshot.settings;
        if let Some(model) = &self.model {
            settings = settings.model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            settings = settings.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            settings = settings.max_tokens(max_tokens);
        }
        if self.hide_reasoning {
            settings = settings.show_reasoning(false);
        }
        snapshot.settings = settings;
        snapshot
    }

    fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = self.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(self.prompt.clone()));
        messages
    }
}

fn load_dotenv() {
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    init_observability("warn");
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.base_url(base_url.clone());
    }
    let client = match ChatClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let snapshot = cli.snapshot();
    if !snapshot.credential.is_blank() && !snapshot.credential.looks_valid() {
        warn!("API key does not look like a valid key (expected an `sk-` prefix)");
    }
    if let Err(issue) = snapshot.settings.check() {
        warn!(%issue, "sending settings the endpoint may reject");
    }

    let failed = Arc::new(AtomicBool::new(false));
    let in_reasoning = Arc::new(AtomicBool::new(false));
    let callbacks = {
        let (failed, on_content, on_reasoning) =
            (failed.clone(), in_reasoning.clone(), in_reasoning.clone());
        StreamCallbacks::new(
            move |text| {
                if on_content.swap(false, Ordering::Relaxed) {
                    eprintln!("{RESET}");
                }
                print!("{text}");
                let _ = std::io::stdout().flush();
            },
            |_full| println!(),
            move |reason| {
                failed.store(true, Ordering::Relaxed);
                eprintln!("{RESET}\nerror: {reason}");
            },
        )
        .on_reasoning(move |text| {
            if !on_reasoning.swap(true, Ordering::Relaxed) {
                eprint!("{DIM}[reasoning] ");
            }
            eprint!("{text}");
            let _ = std::io::stderr().flush();
        })
    };

    let (dispatcher, queue) = dispatch_queue();
    let pump = client.send(cli.messages(), snapshot, callbacks, dispatcher);
    queue.run().await;
    if let Err(e) = pump.await {
        eprintln!("error: stream task failed: {e}");
        return ExitCode::FAILURE;
    }

    if failed.load(Ordering::Relaxed) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "chat-stream",
            "--system",
            "Be brief.",
            "--model",
            "deepseek-reasoner",
            "--temperature",
            "1.2",
            "--max-tokens",
            "512",
            "--hide-reasoning",
            "Hello",
        ]);
        let snapshot = cli.snapshot();
        assert_eq!(snapshot.settings.model, "deepseek-reasoner");
        assert_eq!(snapshot.settings.temperature, 1.2);
        assert_eq!(snapshot.settings.max_tokens, 512);
        assert!(!snapshot.settings.show_reasoning);
        assert_eq!(
            cli.messages(),
            vec![ChatMessage::system("Be brief."), ChatMessage::user("Hello")]
        );
    }

    #[test]
    fn blank_system_message_is_omitted() {
        let cli = Cli::parse_from(["chat-stream", "--system", "  ", "Hi"]);
        assert_eq!(cli.messages(), vec![ChatMessage::user("Hi")]);
    }
}
