use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prompt seeded into a brand-new session when no prompt file is available.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful travel assistant.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum model calls in one turn before it fails.
    #[serde(default = "d_25")]
    pub max_tool_loops: usize,
    /// Bound on establishing the model stream (ms).
    #[serde(default = "d_30000")]
    pub model_timeout_ms: u64,
    /// Bound on the gap between two stream fragments (ms).
    #[serde(default = "d_60000")]
    pub stream_idle_timeout_ms: u64,
    /// File holding the initial system instructions.
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Capacity of the per-turn event channel.
    #[serde(default = "d_256")]
    pub event_buffer: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_loops: 25,
            model_timeout_ms: 30_000,
            stream_idle_timeout_ms: 60_000,
            system_prompt_path: None,
            temperature: None,
            max_tokens: None,
            event_buffer: 256,
        }
    }
}

impl TurnConfig {
    /// Read the system prompt file, falling back to [`DEFAULT_SYSTEM_PROMPT`]
    /// when unset, unreadable, or blank.
    pub fn load_system_prompt(&self) -> String {
        let Some(path) = &self.system_prompt_path else {
            return DEFAULT_SYSTEM_PROMPT.to_owned();
        };
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => DEFAULT_SYSTEM_PROMPT.to_owned(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "system prompt unreadable, using default");
                DEFAULT_SYSTEM_PROMPT.to_owned()
            }
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_25() -> usize {
    25
}
fn d_30000() -> u64 {
    30_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_256() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prompt_file_falls_back() {
        let cfg = TurnConfig {
            system_prompt_path: Some(PathBuf::from("/definitely/not/here.txt")),
            ..TurnConfig::default()
        };
        assert_eq!(cfg.load_system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn unset_prompt_uses_default() {
        assert_eq!(TurnConfig::default().load_system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
