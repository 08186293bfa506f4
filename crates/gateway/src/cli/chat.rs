//! `wayfarer chat`: interactive REPL command.
//!
//! Opens a readline loop that sends each line as a turn and streams the
//! response back. A brand-new session starts with the assistant's greeting;
//! the first message of an untitled session also generates its title.
//! Ctrl+C while a response is streaming stops the turn.

use std::sync::Arc;

use wf_domain::config::Config;

use crate::bootstrap;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ReplState {
    session_id: String,
    model: Option<String>,
}

pub async fn chat(
    config: Arc<Config>,
    session: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config.clone())?;

    let history_path = config.sessions.state_path.join("chat_history.txt");
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    let mut repl = ReplState {
        session_id: session.unwrap_or_else(new_session_id),
        model,
    };

    eprintln!("wayfarer interactive chat");
    eprintln!(
        "Session: {}  |  Type /help for commands, Ctrl+D to exit",
        repl.session_id
    );
    eprintln!();

    greet_if_new(&state, &repl).await;

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(&state, trimmed, &mut repl).await {
                        break;
                    }
                    continue;
                }

                // ── User message → turn ───────────────────────────
                let update_title = state
                    .sessions
                    .get(&repl.session_id)
                    .map(|s| s.title.is_none())
                    .unwrap_or(true);
                let input = TurnInput {
                    session_id: repl.session_id.clone(),
                    owner: None,
                    user_text: Some(trimmed.to_owned()),
                    model: repl.model.clone(),
                    update_title,
                };
                stream_turn(&state, input).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    state.sessions.flush().ok();

    eprintln!("Goodbye!");
    Ok(())
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Ask an empty session for its opening greeting.
async fn greet_if_new(state: &AppState, repl: &ReplState) {
    use wf_sessions::MessageStore;

    match state.transcripts.list_by_session(&repl.session_id).await {
        Ok(history) if history.is_empty() => {
            let mut input = TurnInput::greeting(repl.session_id.clone());
            input.model = repl.model.clone();
            stream_turn(state, input).await;
        }
        Ok(history) => eprintln!("(resuming {} stored messages)", history.len()),
        Err(e) => eprintln!("\x1B[31merror reading history: {e}\x1B[0m"),
    }
}

/// Run a turn, printing its events; Ctrl+C stops it.
async fn stream_turn(state: &AppState, input: TurnInput) {
    let session_id = input.session_id.clone();
    let mut rx = run_turn(state.clone(), input);
    eprint!("\x1B[1mwayfarer>\x1B[0m ");

    loop {
        tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => {
                    super::render_event(&ev);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if !state.cancel_map.cancel(&session_id) {
                    eprintln!("(no turn running)");
                }
            }
        }
    }
    println!();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(state: &AppState, input: &str, repl: &mut ReplState) -> bool {
    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match cmd {
        "/exit" | "/quit" => return true,

        "/session" => match arg {
            Some(id) => {
                repl.session_id = id.to_owned();
                eprintln!("Session switched to: {id}");
                greet_if_new(state, repl).await;
            }
            None => {
                eprintln!("Current session: {}", repl.session_id);
                eprintln!("Usage: /session <id>");
            }
        },

        "/new" => {
            repl.session_id = new_session_id();
            eprintln!("New session: {}", repl.session_id);
            greet_if_new(state, repl).await;
        }

        "/model" => match arg {
            Some(name) => {
                repl.model = Some(name.to_owned());
                eprintln!("Model set to: {name}");
            }
            None => {
                eprintln!("Current model: {}", repl.model.as_deref().unwrap_or("(default)"));
                eprintln!("Usage: /model <name>");
            }
        },

        "/save" => match state.sessions.promote(&repl.session_id) {
            Ok(_) => eprintln!("Session saved."),
            Err(e) => eprintln!("\x1B[31m{e}\x1B[0m"),
        },

        "/title" => match arg {
            Some(title) => match state.sessions.rename(&repl.session_id, Some(title), None) {
                Ok(_) => eprintln!("Title set to: {title}"),
                Err(e) => eprintln!("\x1B[31m{e}\x1B[0m"),
            },
            None => eprintln!("Usage: /title <text>"),
        },

        "/clear" => {
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session <id>    Switch to a session");
            eprintln!("  /new             Start a fresh session");
            eprintln!("  /model <name>    Set the model (e.g. openai/gpt-4o)");
            eprintln!("  /save            Keep this session (promote to saved)");
            eprintln!("  /title <text>    Rename this session");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}
