//! AppState construction shared by every CLI command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use wf_domain::config::{Config, ConfigSeverity};
use wf_providers::ProviderRegistry;
use wf_sessions::{MessageStore, SessionStore, TranscriptStore};
use wf_tools::http::HttpCapability;
use wf_tools::{CapabilityRegistry, ToolDispatcher};

use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::Orchestrator;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── LLM providers ────────────────────────────────────────────────
    let llm = ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?;
    if llm.is_empty() {
        tracing::info!("no LLM providers initialized; configure API keys to enable turns");
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }

    // ── Capabilities ─────────────────────────────────────────────────
    let mut capabilities = CapabilityRegistry::new().with_catalog(config.tools.advertise_catalog);
    for endpoint in &config.tools.endpoints {
        let capability = HttpCapability::from_config(endpoint, config.tools.timeout_ms)
            .with_context(|| format!("initializing tool endpoint {}", endpoint.name))?;
        capabilities = capabilities.register(Arc::new(capability));
    }
    tracing::info!(
        registered = capabilities.len(),
        advertised = capabilities.definitions().len(),
        "capability registry ready"
    );

    let state = assemble(config, llm, capabilities)?;
    spawn_housekeeping(&state);
    Ok(state)
}

/// How often idle per-session locks are forgotten.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically prune session locks no turn holds or waits on. Needs a
/// running tokio runtime; without one nothing is spawned.
pub fn spawn_housekeeping(state: &AppState) -> Option<tokio::task::JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let session_locks = state.session_locks.clone();
    Some(handle.spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;
            session_locks.prune_idle();
            tracing::debug!(sessions = session_locks.session_count(), "pruned idle session locks");
        }
    }))
}

/// Wire stores, dispatcher and orchestrator around already-built providers
/// and capabilities.
pub fn assemble(
    config: Arc<Config>,
    llm: ProviderRegistry,
    capabilities: CapabilityRegistry,
) -> anyhow::Result<AppState> {
    let llm = Arc::new(llm);

    // ── Session management ───────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.sessions.state_path).context("initializing session store")?,
    );
    let transcripts = Arc::new(
        TranscriptStore::new(&config.sessions.transcripts_dir())
            .context("initializing transcript store")?,
    );
    tracing::info!(
        path = %config.sessions.state_path.display(),
        sessions = sessions.len(),
        "session management ready"
    );

    // ── Tool dispatch ────────────────────────────────────────────────
    let tools = ToolDispatcher::new(
        Arc::new(capabilities),
        Duration::from_millis(config.tools.timeout_ms),
    );

    // ── Orchestrator ─────────────────────────────────────────────────
    let store: Arc<dyn MessageStore> = transcripts.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        store,
        sessions.clone(),
        llm.clone(),
        tools.clone(),
    ));

    Ok(AppState {
        config,
        llm,
        tools,
        sessions,
        transcripts,
        session_locks: Arc::new(SessionLockMap::new()),
        orchestrator,
        cancel_map: Arc::new(CancelMap::new()),
    })
}
