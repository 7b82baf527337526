//! MedAssist CLI
//!
//! Sends one question to the configured chat endpoint and prints the answer
//! as it streams in.

mod history;
mod logging;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use medassist_chat_stream::{
    backend_from_config, AssemblerEvent, ChannelObserver, ChatStreamConfig, StaticAuthenticator,
    StreamStatus, StreamingTranscriptAssembler,
};
use medassist_core_types::Message;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "medassist-cli", version, about = "Ask the MedAssist assistant a question")]
struct Cli {
    /// Config file (defaults to <config dir>/medassist/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the streaming endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Conversation history file, read before the turn and rewritten after it
    #[arg(long)]
    history: Option<PathBuf>,

    /// System prompt used when the conversation is empty
    #[arg(long)]
    system: Option<String>,

    /// Cancel the turn after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// The question to ask
    #[arg(required = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut config = ChatStreamConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint_url = endpoint;
    }

    let auth = StaticAuthenticator::from_config(&config)
        .context("set MEDASSIST_API_TOKEN or api_token in the config file")?;
    let backend = backend_from_config(&config, Arc::new(auth))?;

    let mut prior = match &cli.history {
        Some(path) => history::load_history(path)?,
        None => Vec::new(),
    };
    if prior.is_empty() {
        if let Some(system) = cli.system {
            prior.push(Message::system(system));
        }
    }
    debug!("Starting chat turn: prior_messages={}", prior.len());

    let (observer, mut rx) = ChannelObserver::new();
    let handle = StreamingTranscriptAssembler::from_config(&config).start(
        prior,
        cli.prompt.join(" "),
        backend,
        observer,
    );
    if let Some(secs) = cli.timeout {
        handle.cancel_after(Duration::from_secs(secs));
    }

    let mut printer = DeltaPrinter::default();
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                if let Some(text) = printer.render(&event) {
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
                if terminal {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling the chat turn");
                handle.cancel();
            }
        }
    }

    let outcome = handle.wait().await?;
    if let Some(path) = &cli.history {
        history::save_history(path, &outcome.transcript)?;
    }

    match outcome.status {
        StreamStatus::Completed => Ok(()),
        StreamStatus::Failed(err) => Err(anyhow::Error::new(err).context("chat turn failed")),
    }
}

/// Turns transcript snapshots into the text not yet written to the terminal.
#[derive(Debug, Default)]
struct DeltaPrinter {
    printed: usize,
}

impl DeltaPrinter {
    fn render(&mut self, event: &AssemblerEvent) -> Option<String> {
        match event {
            AssemblerEvent::Update(snapshot) => {
                let content = snapshot.last_assistant_content()?;
                let fresh = content.get(self.printed..)?.to_string();
                self.printed = content.len();
                Some(fresh)
            }
            AssemblerEvent::Completed(_) => Some("\n".to_string()),
            AssemblerEvent::Failed { error, snapshot } => {
                if error.is_cancelled() {
                    return Some("\n[cancelled]\n".to_string());
                }
                let notice = snapshot.last_assistant_content().unwrap_or_default();
                let separator = if self.printed > 0 { "\n" } else { "" };
                Some(format!("{}{}\n", separator, notice))
            }
        }
    }
}
