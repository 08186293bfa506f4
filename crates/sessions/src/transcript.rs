//! Append-only per-session message log.
//!
//! Each session gets a `<sessionId>.jsonl` file; every message is one JSON
//! line carrying a per-session sequence number. The log is the only source
//! of truth for conversation history: the turn loop rebuilds its context
//! from it on every turn.
//!
//! Includes an in-memory write-through cache so reads never hit disk after
//! the first load, and blocking file I/O runs on `spawn_blocking`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use wf_domain::error::{Error, Result};
use wf_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use wf_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored form
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub seq: u64,
    pub timestamp: String,
    pub role: Role,
    pub content: String,
    /// Assistant only: the calls it requested, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool only: the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl StoredMessage {
    fn from_message(seq: u64, msg: &Message) -> Self {
        let mut stored = Self {
            seq,
            timestamp: Utc::now().to_rfc3339(),
            role: msg.role,
            content: msg.content.extract_all_text(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        };
        match msg.role {
            Role::Assistant => stored.tool_calls = msg.tool_calls(),
            Role::Tool => {
                if let MessageContent::Parts(parts) = &msg.content {
                    for part in parts {
                        if let ContentPart::ToolResult { tool_use_id, content, is_error } = part {
                            stored.tool_call_id = Some(tool_use_id.clone());
                            stored.content = content.clone();
                            stored.is_error = *is_error;
                        }
                    }
                }
            }
            Role::System | Role::User => {}
        }
        stored
    }

    /// Rebuild the role-specific message shape. Tool messages without a call
    /// reference cannot be replayed and yield `None`.
    pub fn to_message(&self) -> Option<Message> {
        match self.role {
            Role::System => Some(Message::system(&self.content)),
            Role::User => Some(Message::user(&self.content)),
            Role::Assistant if self.tool_calls.is_empty() => Some(Message::assistant(&self.content)),
            Role::Assistant => Some(Message::assistant_with_tool_calls(&self.content, &self.tool_calls)),
            Role::Tool => {
                let id = self.tool_call_id.as_ref()?;
                Some(Message::tool_result(id, &self.content, self.is_error))
            }
        }
    }
}

/// Rebuild a conversation context from stored messages, skipping anything
/// that cannot be replayed.
pub fn to_context(stored: &[StoredMessage]) -> Vec<Message> {
    stored
        .iter()
        .filter_map(|m| {
            let msg = m.to_message();
            if msg.is_none() {
                tracing::warn!(seq = m.seq, "skipping tool message without call reference");
            }
            msg
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable append/read contract for conversation history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message, assigning the next sequence number.
    async fn append(&self, session_id: &str, message: &Message) -> Result<StoredMessage>;

    /// All messages of a session in sequence order.
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<StoredMessage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session ids become file names, so anything that could leave the
/// transcript directory is refused.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(Error::InvalidInput("session id is empty".into()));
    }
    if session_id.contains(['/', '\\', '\0']) || session_id.contains("..") {
        return Err(Error::InvalidInput(format!(
            "session id {session_id:?} contains a path separator or '..'"
        )));
    }
    Ok(())
}

/// JSONL-backed [`MessageStore`] with a write-through cache.
pub struct TranscriptStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<StoredMessage>>>,
    /// One append lock per session keeps sequence numbers dense without
    /// making sessions wait on each other.
    append_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TranscriptStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
            append_locks: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.base_dir.join(format!("{session_id}.jsonl")))
    }

    fn append_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.append_locks
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .clone()
    }

    /// Next sequence number from the cache, if the session is loaded.
    fn cached_next_seq(&self, session_id: &str) -> Option<u64> {
        self.cache
            .read()
            .get(session_id)
            .map(|lines| lines.last().map(|m| m.seq + 1).unwrap_or(0))
    }

    async fn next_seq(&self, session_id: &str) -> Result<u64> {
        if let Some(seq) = self.cached_next_seq(session_id) {
            return Ok(seq);
        }
        self.load(session_id).await?;
        Ok(self.cached_next_seq(session_id).unwrap_or(0))
    }

    async fn load(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let path = self.path_for(session_id)?;
        if let Some(lines) = self.cache.read().get(session_id) {
            return Ok(lines.clone());
        }

        let sid = session_id.to_owned();
        let lines = tokio::task::spawn_blocking(move || read_jsonl_file(&path, &sid))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        self.cache
            .write()
            .entry(session_id.to_owned())
            .or_insert_with(|| lines.clone());
        Ok(lines)
    }
}

#[async_trait]
impl MessageStore for TranscriptStore {
    async fn append(&self, session_id: &str, message: &Message) -> Result<StoredMessage> {
        let path = self.path_for(session_id)?;
        let lock = self.append_lock(session_id);
        let _guard = lock.lock().await;

        let seq = self.next_seq(session_id).await?;
        let stored = StoredMessage::from_message(seq, message);

        let mut buf = serde_json::to_string(&stored)
            .map_err(|e| Error::Other(format!("serializing transcript line: {e}")))?;
        buf.push('\n');

        // Disk first; the cache only changes once the write succeeded.
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(buf.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        self.cache
            .write()
            .entry(session_id.to_owned())
            .or_default()
            .push(stored.clone());

        TraceEvent::TranscriptAppend {
            session_id: session_id.to_owned(),
            seq,
            role: stored.role.as_str().to_owned(),
        }
        .emit();

        Ok(stored)
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.load(session_id).await
    }
}

/// Read and parse a JSONL transcript file, skipping malformed lines.
fn read_jsonl_file(path: &Path, session_id: &str) -> Result<Vec<StoredMessage>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut lines = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredMessage>(line) {
            Ok(m) => lines.push(m),
            Err(e) => {
                tracing::warn!(
                    session_id = session_id,
                    error = %e,
                    "skipping malformed transcript line"
                );
            }
        }
    }
    lines.sort_by_key(|m| m.seq);
    Ok(lines)
}
