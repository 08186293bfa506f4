use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions & transcripts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where session metadata and message logs live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Root directory. `sessions.json` and `transcripts/` are created under it.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// Owner recorded on sessions created from the CLI.
    #[serde(default = "d_owner")]
    pub default_owner: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            default_owner: d_owner(),
        }
    }
}

impl SessionsConfig {
    pub fn transcripts_dir(&self) -> PathBuf {
        self.state_path.join("transcripts")
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_owner() -> String {
    "local".into()
}
