//! Tool dispatcher.
//!
//! Runs one completed tool call against its capability and always returns a
//! [`ToolInvocationResult`]: unknown names, provider errors, panics, and
//! timeouts all become structured error results instead of propagating.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::Instrument;

use wf_domain::tool::{ToolCall, ToolInvocationResult};
use wf_domain::trace::TraceEvent;

use crate::registry::CapabilityRegistry;

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Invoke one call and wait for its result.
    pub async fn invoke(&self, session_id: &str, call: &ToolCall) -> ToolInvocationResult {
        let started = Instant::now();

        let result = match self.registry.resolve(&call.tool_name) {
            None => {
                tracing::warn!(tool = %call.tool_name, call_id = %call.call_id, "unknown tool");
                ToolInvocationResult::failure(call, format!("unimplemented tool: {}", call.tool_name))
            }
            Some(capability) => {
                // The provider runs in its own task so a panic is caught as a
                // JoinError rather than unwinding through the turn.
                let args = call.arguments.clone();
                let mut task = tokio::spawn(async move { capability.call(args).await });

                match tokio::time::timeout(self.timeout, &mut task).await {
                    Ok(Ok(Ok(payload))) => ToolInvocationResult::success(call, &payload),
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(tool = %call.tool_name, error = %e, "tool failed");
                        ToolInvocationResult::failure(call, format!("{e:#}"))
                    }
                    Ok(Err(join_err)) => {
                        tracing::error!(tool = %call.tool_name, error = %join_err, "tool task panicked");
                        ToolInvocationResult::failure(call, format!("tool crashed: {join_err}"))
                    }
                    Err(_) => {
                        task.abort();
                        tracing::warn!(
                            tool = %call.tool_name,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "tool timed out"
                        );
                        ToolInvocationResult::failure(
                            call,
                            format!("tool timed out after {}ms", self.timeout.as_millis()),
                        )
                    }
                }
            }
        };

        TraceEvent::ToolDispatched {
            session_id: session_id.to_owned(),
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            is_error: result.is_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        result
    }

    /// Start a call in the background, e.g. while the model is still
    /// streaming. Aborting the handle cancels the call.
    pub fn spawn(&self, session_id: &str, call: ToolCall) -> JoinHandle<ToolInvocationResult> {
        let dispatcher = self.clone();
        let session_id = session_id.to_owned();
        let span = tracing::info_span!(
            "tool.call",
            tool_name = %call.tool_name,
            call_id = %call.call_id,
        );
        tokio::spawn(
            async move { dispatcher.invoke(&session_id, &call).await }.instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Capability;
    use anyhow::{anyhow, Result};
    use serde_json::{json, Value};
    use wf_domain::tool::ToolDefinition;

    struct Scripted {
        name: &'static str,
        behaviour: fn(Value) -> Result<Value>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Capability for Scripted {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.into(),
                description: String::new(),
                parameters: json!({"type": "object"}),
            }
        }
        async fn call(&self, args: Value) -> Result<Value> {
            tokio::time::sleep(self.delay).await;
            (self.behaviour)(args)
        }
    }

    fn dispatcher(cap: Scripted, timeout_ms: u64) -> ToolDispatcher {
        let reg = CapabilityRegistry::new().register(Arc::new(cap));
        ToolDispatcher::new(Arc::new(reg), Duration::from_millis(timeout_ms))
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            call_id: "c1".into(),
            tool_name: name.into(),
            arguments: json!({"city": "Bali"}),
        }
    }

    fn error_body(r: &ToolInvocationResult) -> Value {
        assert!(r.is_error);
        serde_json::from_str(&r.content).unwrap()
    }

    #[tokio::test]
    async fn success_serializes_payload() {
        let d = dispatcher(
            Scripted { name: "find_hotels", behaviour: |a| Ok(json!({"city": a["city"]})), delay: Duration::ZERO },
            1_000,
        );
        let r = d.invoke("s", &call("find_hotels")).await;
        assert!(!r.is_error);
        assert_eq!(r.content, r#"{"city":"Bali"}"#);
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_error() {
        let d = dispatcher(
            Scripted { name: "find_hotels", behaviour: |_| Ok(Value::Null), delay: Duration::ZERO },
            1_000,
        );
        let body = error_body(&d.invoke("s", &call("book_spaceship")).await);
        assert_eq!(body["tool_call_id"], "c1");
        assert!(body["error"].as_str().unwrap().contains("unimplemented tool"));
    }

    #[tokio::test]
    async fn provider_error_is_captured() {
        let d = dispatcher(
            Scripted { name: "get_weather", behaviour: |_| Err(anyhow!("upstream 503")), delay: Duration::ZERO },
            1_000,
        );
        let body = error_body(&d.invoke("s", &call("get_weather")).await);
        assert!(body["error"].as_str().unwrap().contains("upstream 503"));
        assert_eq!(body["tool"], "get_weather");
    }

    #[tokio::test]
    async fn provider_panic_is_captured() {
        let d = dispatcher(
            Scripted { name: "get_weather", behaviour: |_| panic!("boom"), delay: Duration::ZERO },
            1_000,
        );
        let body = error_body(&d.invoke("s", &call("get_weather")).await);
        assert!(body["error"].as_str().unwrap().contains("crashed"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let d = dispatcher(
            Scripted { name: "search_flights", behaviour: |_| Ok(Value::Null), delay: Duration::from_secs(5) },
            20,
        );
        let body = error_body(&d.invoke("s", &call("search_flights")).await);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn spawned_call_resolves() {
        let d = dispatcher(
            Scripted { name: "get_weather", behaviour: |_| Ok(json!("sunny")), delay: Duration::from_millis(5) },
            1_000,
        );
        let r = d.spawn("s", call("get_weather")).await.unwrap();
        assert_eq!(r.content, "sunny");
    }
}
