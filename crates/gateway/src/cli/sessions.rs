//! `wayfarer sessions`: session catalogue utilities.
//!
//! These only touch the on-disk stores; no model provider is needed.

use std::sync::Arc;

use anyhow::Context;

use wf_domain::config::Config;
use wf_domain::session::{ListOptions, Session};
use wf_sessions::{MessageStore, SessionStore, TranscriptStore};

use super::SessionsCommand;

pub async fn run(config: Arc<Config>, cmd: SessionsCommand) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.sessions.state_path).context("opening session store")?;

    match cmd {
        SessionsCommand::List {
            owner,
            all,
            saved,
            json,
        } => {
            let owner = owner.unwrap_or_else(|| config.sessions.default_owner.clone());
            let sessions = store.list(
                &owner,
                ListOptions {
                    include_temporary: all,
                    saved,
                },
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                eprintln!("No sessions for {owner}.");
            } else {
                for s in &sessions {
                    println!("{}", format_row(s));
                }
            }
        }
        SessionsCommand::Save { id } => {
            let s = store.promote(&id)?;
            println!("Saved {}", s.id);
        }
        SessionsCommand::Toggle { id } => {
            let s = store.toggle_saved(&id)?;
            println!("{} is now {}", s.id, if s.saved { "saved" } else { "temporary" });
        }
        SessionsCommand::Rename { id, title, tagline } => {
            let s = store.rename(&id, title.as_deref(), tagline.as_deref())?;
            println!("{}", format_row(&s));
        }
        SessionsCommand::Show { id, json } => {
            store.get(&id)?;
            let transcripts = TranscriptStore::new(&config.sessions.transcripts_dir())
                .context("opening transcript store")?;
            let messages = transcripts.list_by_session(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for m in &messages {
                    let mut line = format!("{:>4} {:<9} {}", m.seq, m.role.as_str(), m.content);
                    for call in &m.tool_calls {
                        line.push_str(&format!("\n     -> {} {} {}", call.call_id, call.tool_name, call.arguments));
                    }
                    if let Some(call_id) = &m.tool_call_id {
                        line.push_str(&format!("  (answers {call_id})"));
                    }
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

fn format_row(s: &Session) -> String {
    format!(
        "{}  {}  {:<9}  {}{}",
        s.updated_at.format("%Y-%m-%d %H:%M"),
        s.id,
        if s.saved { "saved" } else { "temporary" },
        s.title.as_deref().unwrap_or("(untitled)"),
        s.tagline
            .as_deref()
            .map(|t| format!(" | {t}"))
            .unwrap_or_default(),
    )
}
