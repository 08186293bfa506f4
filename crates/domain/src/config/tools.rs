use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Upper bound on a single capability call (ms).
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    /// Start a call as soon as its arguments are complete, while the model
    /// is still streaming. When false, calls start after the stream ends.
    #[serde(default = "d_true")]
    pub dispatch_while_streaming: bool,
    /// Advertise the built-in travel catalogue to the model.
    #[serde(default = "d_true")]
    pub advertise_catalog: bool,
    /// Capability providers reached over HTTP, one per tool name.
    #[serde(default)]
    pub endpoints: Vec<ToolEndpointConfig>,
}

/// An external capability provider: the tool's arguments are POSTed as JSON
/// to `url` and the response body is the tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEndpointConfig {
    pub name: String,
    pub url: String,
    /// Overrides the catalogue description, or describes a tool the
    /// catalogue does not know.
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the catalogue parameter schema.
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            dispatch_while_streaming: true,
            advertise_catalog: true,
            endpoints: Vec::new(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30000() -> u64 {
    30_000
}
fn d_true() -> bool {
    true
}
