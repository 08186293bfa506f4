pub mod chat;
pub mod config;
pub mod run;
pub mod sessions;

use std::io::Write;

use clap::{Parser, Subcommand};

use crate::runtime::{SessionEvent, TurnEvent};

/// wayfarer: a travel assistant that plans with tools.
#[derive(Debug, Parser)]
#[command(name = "wayfarer", version, about)]
pub struct Cli {
    /// Emit structured JSON logs (and OTLP spans when configured) instead
    /// of compact warnings.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat (default when no subcommand is given).
    Chat {
        /// Session id (a fresh one is generated when omitted).
        #[arg(long)]
        session: Option<String>,
        /// Model override (e.g. "openai/gpt-4o").
        #[arg(long)]
        model: Option<String>,
    },
    /// Send a single message and print the response.
    Run {
        /// The message to send. Omit to ask a new session for a greeting.
        message: Option<String>,
        /// Session id (defaults to "cli-run").
        #[arg(long, default_value = "cli-run")]
        session: String,
        /// Model override (e.g. "openai/gpt-4o").
        #[arg(long)]
        model: Option<String>,
        /// Generate a session title from the message first.
        #[arg(long)]
        title: bool,
        /// Output all events as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Session catalogue utilities.
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// List an owner's sessions, newest first.
    List {
        /// Owner (defaults to `sessions.default_owner`).
        #[arg(long)]
        owner: Option<String>,
        /// Include temporary sessions.
        #[arg(long)]
        all: bool,
        /// Only sessions with this saved flag.
        #[arg(long)]
        saved: Option<bool>,
        #[arg(long)]
        json: bool,
    },
    /// Promote a temporary session to saved.
    Save { id: String },
    /// Flip a session's saved flag.
    Toggle { id: String },
    /// Set a session's title and/or tagline.
    Rename {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        tagline: Option<String>,
    },
    /// Print a session's stored messages.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `WF_CONFIG` (or `config.toml` by default).
/// Returns the parsed config and the path that was used; a missing file
/// yields the defaults.
pub fn load_config() -> anyhow::Result<(wf_domain::config::Config, String)> {
    let config_path = std::env::var("WF_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        wf_domain::config::Config::default()
    };

    Ok((config, config_path))
}

// ── Event rendering shared by `run` and `chat` ────────────────────────

/// Print one event for a human. Returns false if the event reports a failure.
pub(crate) fn render_event(ev: &SessionEvent) -> bool {
    match &ev.event {
        TurnEvent::TextDelta { text } => {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
        TurnEvent::ToolCall { tool_name, .. } => {
            eprintln!("\x1B[2m[tool: {tool_name}]\x1B[0m");
        }
        TurnEvent::ToolResult {
            tool_name,
            is_error: true,
            content,
            ..
        } => {
            eprintln!("\x1B[2m[tool {tool_name} failed: {content}]\x1B[0m");
        }
        TurnEvent::TitleUpdated { title, tagline } => {
            eprintln!("\x1B[2m[{title} | {tagline}]\x1B[0m");
        }
        TurnEvent::EndOfTurn { .. } => println!(),
        TurnEvent::Stopped => eprintln!("(turn stopped)"),
        TurnEvent::Error { message } => {
            eprintln!("\x1B[31merror: {message}\x1B[0m");
            return false;
        }
        TurnEvent::ToolResult { .. } | TurnEvent::Usage { .. } => {}
    }
    true
}
