//! Streaming delta aggregation for one model call.
//!
//! Folds the fragments of a single streaming response into display text and
//! complete tool calls. Tool-call argument strings are buffered per call id
//! and re-parsed after every fragment; a call becomes ready the moment its
//! buffer parses as a JSON object or array, regardless of how the provider
//! split the string or interleaved it with other calls.

use std::collections::HashMap;

use serde_json::Value;

use wf_domain::stream::{StreamEvent, Usage};
use wf_domain::tool::ToolCall;

/// What the orchestrator should do with one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Fed {
    /// Forward this text to the client.
    Text(String),
    /// A tool call just became complete.
    Ready(ToolCall),
    /// The model call finished.
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    /// The provider reported an in-band failure.
    Failed(String),
    /// Buffered or suppressed; nothing to forward.
    Nothing,
}

#[derive(Debug, Default)]
struct PendingCall {
    tool_name: Option<String>,
    buffer: String,
    /// Arguments parsed but the name has not been seen yet.
    parsed: Option<Value>,
    emitted: bool,
}

/// The settled result of one model call.
#[derive(Debug, Default)]
pub struct Aggregated {
    /// Text forwarded before the first tool fragment.
    pub text: String,
    /// Completed calls in readiness order.
    pub tool_calls: Vec<ToolCall>,
    /// Call ids whose arguments never completed.
    pub dropped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DeltaAggregator {
    calls: HashMap<String, PendingCall>,
    /// Call ids in first-seen order, for deterministic drop reporting.
    seen: Vec<String>,
    ready: Vec<ToolCall>,
    text: String,
    tool_mode: bool,
    suppressed_chars: usize,
}

/// An argument buffer is complete once it parses as a JSON object or array.
fn parse_complete(buffer: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(buffer) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

impl DeltaAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) -> Fed {
        if event.is_tool_fragment() {
            self.tool_mode = true;
        }
        match event {
            StreamEvent::Token { text } => {
                if self.tool_mode {
                    self.suppressed_chars += text.len();
                    return Fed::Nothing;
                }
                if text.is_empty() {
                    return Fed::Nothing;
                }
                self.text.push_str(&text);
                Fed::Text(text)
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                self.on_started(call_id, tool_name)
            }
            StreamEvent::ToolCallDelta { call_id, delta } => self.on_delta(call_id, &delta),
            StreamEvent::Done {
                usage,
                finish_reason,
            } => Fed::Done {
                usage,
                finish_reason,
            },
            StreamEvent::Error { message } => Fed::Failed(message),
        }
    }

    fn entry(&mut self, call_id: &str) -> &mut PendingCall {
        if !self.calls.contains_key(call_id) {
            self.seen.push(call_id.to_owned());
        }
        self.calls.entry(call_id.to_owned()).or_default()
    }

    fn on_started(&mut self, call_id: String, tool_name: Option<String>) -> Fed {
        let pending = self.entry(&call_id);
        if let Some(name) = tool_name.filter(|n| !n.is_empty()) {
            match &pending.tool_name {
                None => pending.tool_name = Some(name),
                Some(existing) if *existing != name => {
                    tracing::warn!(
                        call_id = %call_id,
                        first = %existing,
                        ignored = %name,
                        "conflicting tool name for call id"
                    );
                }
                Some(_) => {}
            }
        }
        self.try_emit(&call_id)
    }

    fn on_delta(&mut self, call_id: String, delta: &str) -> Fed {
        let pending = self.entry(&call_id);
        pending.buffer.push_str(delta);

        let Some(args) = parse_complete(&pending.buffer) else {
            return Fed::Nothing;
        };
        pending.buffer.clear();

        if pending.emitted || pending.parsed.is_some() {
            tracing::warn!(call_id = %call_id, "second completion for call id discarded");
            return Fed::Nothing;
        }
        pending.parsed = Some(args);
        self.try_emit(&call_id)
    }

    fn try_emit(&mut self, call_id: &str) -> Fed {
        let Some(pending) = self.calls.get_mut(call_id) else {
            return Fed::Nothing;
        };
        if pending.emitted || pending.parsed.is_none() {
            return Fed::Nothing;
        }
        let Some(tool_name) = pending.tool_name.clone() else {
            return Fed::Nothing;
        };
        let Some(arguments) = pending.parsed.take() else {
            return Fed::Nothing;
        };
        let call = ToolCall {
            call_id: call_id.to_owned(),
            tool_name,
            arguments,
        };
        pending.emitted = true;
        self.ready.push(call.clone());
        Fed::Ready(call)
    }

    /// Settle the call: everything ready so far, and the ids that never
    /// produced a complete call.
    pub fn finish(self) -> Aggregated {
        if self.suppressed_chars > 0 {
            tracing::debug!(
                chars = self.suppressed_chars,
                "text suppressed after tool-call fragments"
            );
        }
        let mut dropped = Vec::new();
        for id in &self.seen {
            let Some(pending) = self.calls.get(id) else {
                continue;
            };
            if pending.emitted {
                continue;
            }
            let reason = if pending.parsed.is_some() {
                "arguments complete but no tool name"
            } else {
                "arguments never completed"
            };
            tracing::warn!(
                call_id = %id,
                tool = pending.tool_name.as_deref().unwrap_or("?"),
                buffered = pending.buffer.len(),
                reason,
                "dropping incomplete tool call"
            );
            dropped.push(id.clone());
        }
        Aggregated {
            text: self.text,
            tool_calls: self.ready,
            dropped,
        }
    }
}
