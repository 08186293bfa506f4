use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Fragments emitted while one model call streams (provider-agnostic).
///
/// Adapters translate their wire format into these; tool-call fragments are
/// always keyed by the call id, never by a positional index.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// An identifying chunk for a tool call. The name may arrive on a later
    /// identifying chunk for the same id.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted {
        call_id: String,
        tool_name: Option<String>,
    },

    /// A partial argument string belonging to one call id.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

impl StreamEvent {
    /// Whether this fragment belongs to a tool call.
    pub fn is_tool_fragment(&self) -> bool {
        matches!(
            self,
            StreamEvent::ToolCallStarted { .. } | StreamEvent::ToolCallDelta { .. }
        )
    }
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
