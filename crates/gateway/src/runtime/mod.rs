//! Core runtime: the orchestrator that ties session history, model
//! streaming, tool dispatch, and persistence into one deterministic loop.
//!
//! Entry points: [`Orchestrator::start_or_continue_turn`] runs one turn to
//! completion against a caller-supplied event sink; [`run_turn`] spawns it
//! under the session lock and hands back the event receiver.

pub mod aggregator;
pub mod cancel;
pub mod session_lock;
pub mod title;
pub mod turn;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use wf_domain::stream::Usage;

pub use turn::{run_turn, Orchestrator};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent: what the client sees
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental text from the assistant.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    /// A tool call became complete and was handed to the dispatcher.
    #[serde(rename = "tool_call")]
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },

    /// Tool execution result.
    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    #[serde(rename = "title_updated")]
    TitleUpdated { title: String, tagline: String },

    /// The turn finished; `content` is the final assistant text.
    #[serde(rename = "end_of_turn")]
    EndOfTurn { content: String },

    /// The turn was stopped by a cancellation request.
    #[serde(rename = "stopped")]
    Stopped,

    #[serde(rename = "error")]
    Error { message: String },

    /// Token usage summed over every model call of the turn.
    #[serde(rename = "usage")]
    Usage {
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
    },
}

impl TurnEvent {
    pub fn usage(usage: &Usage) -> Self {
        TurnEvent::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }

    /// Whether nothing follows this event in the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnEvent::EndOfTurn { .. } | TurnEvent::Stopped | TurnEvent::Error { .. }
        )
    }
}

/// A [`TurnEvent`] addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub event: TurnEvent,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub session_id: String,
    /// Owner recorded when the session is first created. `None` uses
    /// `sessions.default_owner`.
    pub owner: Option<String>,
    /// `None` on a brand-new session asks the model for an opening greeting.
    pub user_text: Option<String>,
    /// Model override (e.g. "openai/gpt-4o"). `None` = provider default.
    pub model: Option<String>,
    /// Generate and store a session title from `user_text` first.
    pub update_title: bool,
}

impl TurnInput {
    pub fn message(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn greeting(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        /// Final assistant text.
        content: String,
        model_calls: usize,
        tool_calls: usize,
        usage: Usage,
    },
    Cancelled,
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Completed { .. } => "completed",
            TurnOutcome::Cancelled => "cancelled",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnPhase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    LoadingHistory,
    SeedingSystem,
    AwaitingModel,
    Streaming,
    DispatchingTools,
    Finalizing,
    Done,
    Error,
    Cancelled,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::LoadingHistory => "loading_history",
            TurnPhase::SeedingSystem => "seeding_system",
            TurnPhase::AwaitingModel => "awaiting_model",
            TurnPhase::Streaming => "streaming",
            TurnPhase::DispatchingTools => "dispatching_tools",
            TurnPhase::Finalizing => "finalizing",
            TurnPhase::Done => "done",
            TurnPhase::Error => "error",
            TurnPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Error | TurnPhase::Cancelled)
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
