//! `wayfarer run`: one-shot execution command.
//!
//! Sends a single message, streams the response to stdout, and exits.
//! Useful for scripting, piping, and quick CLI interactions.

use std::sync::Arc;

use wf_domain::config::Config;

use crate::bootstrap;
use crate::runtime::{run_turn, SessionEvent, TurnInput};

pub struct RunArgs {
    pub message: Option<String>,
    pub session: String,
    pub model: Option<String>,
    pub title: bool,
    pub json: bool,
}

/// Execute a single turn and print the response. Returns false if the
/// turn failed.
pub async fn run(config: Arc<Config>, args: RunArgs) -> anyhow::Result<bool> {
    let state = bootstrap::build_app_state(config)?;

    let input = TurnInput {
        session_id: args.session,
        owner: None,
        user_text: args.message,
        model: args.model,
        update_title: args.title,
    };

    let mut rx = run_turn(state.clone(), input);

    let mut ok = true;
    let mut collected: Vec<SessionEvent> = Vec::new();
    while let Some(event) = rx.recv().await {
        if args.json {
            if matches!(event.event, crate::runtime::TurnEvent::Error { .. }) {
                ok = false;
            }
            collected.push(event);
        } else {
            ok &= super::render_event(&event);
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&collected)
            .map_err(|e| anyhow::anyhow!("serializing events: {e}"))?;
        println!("{json}");
    }

    if let Err(e) = state.sessions.flush() {
        tracing::warn!(error = %e, "session store flush on exit failed");
    }

    Ok(ok)
}
