use std::sync::Arc;

use wf_domain::config::Config;
use wf_providers::ProviderRegistry;
use wf_sessions::{SessionStore, TranscriptStore};
use wf_tools::ToolDispatcher;

use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::Orchestrator;

/// Shared application state handed to every command and turn.
///
/// Fields are grouped by concern:
/// - **Core services**: config, LLM providers, tool dispatch
/// - **Session management**: session catalogue, transcripts, locks
/// - **Runtime**: the turn orchestrator and cancellation
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub tools: ToolDispatcher,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub transcripts: Arc<TranscriptStore>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub orchestrator: Arc<Orchestrator>,
    pub cancel_map: Arc<CancelMap>,
}
