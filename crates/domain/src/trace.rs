use serde::Serialize;

/// Structured trace events emitted across the wayfarer crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    SessionSaved {
        session_id: String,
        saved: bool,
    },
    TranscriptAppend {
        session_id: String,
        seq: u64,
        role: String,
    },
    ToolDispatched {
        session_id: String,
        call_id: String,
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
    },
    ToolCallDropped {
        session_id: String,
        call_id: String,
        reason: String,
    },
    TurnFinished {
        session_id: String,
        model_calls: usize,
        tool_calls: usize,
        outcome: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "wf_event");
    }
}
