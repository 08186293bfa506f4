//! The turn loop.
//!
//! One turn: load or seed history, append the user message, then call the
//! model until it answers without tool calls. Each model call streams
//! through a [`DeltaAggregator`]; tool calls are dispatched as soon as their
//! arguments are complete and their results are persisted in readiness order
//! before the next model call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use wf_domain::config::Config;
use wf_domain::error::{Error, Result};
use wf_domain::stream::Usage;
use wf_domain::tool::{Message, ToolCall, ToolDefinition, ToolInvocationResult};
use wf_domain::trace::TraceEvent;
use wf_providers::{ChatRequest, LlmProvider, ProviderRegistry};
use wf_sessions::{to_context, validate_session_id, MessageStore, SessionStore};
use wf_tools::ToolDispatcher;

use super::aggregator::{Aggregated, DeltaAggregator, Fed};
use super::cancel::CancelToken;
use super::title::{generate_title, SessionTitle};
use super::{SessionEvent, TurnEvent, TurnInput, TurnOutcome, TurnPhase};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn: spawn under the session lock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run a turn in the background and return its event receiver.
///
/// Turns on the same session queue behind each other; the running turn can
/// be stopped through `state.cancel_map`.
pub fn run_turn(state: AppState, input: TurnInput) -> mpsc::Receiver<SessionEvent> {
    let (tx, rx) = mpsc::channel(state.config.turn.event_buffer.max(1));

    tokio::spawn(async move {
        let session_id = input.session_id.clone();

        let permit = match state.session_locks.acquire(&session_id).await {
            Ok(permit) => permit,
            Err(e) => {
                let _ = tx
                    .send(SessionEvent {
                        session_id,
                        event: TurnEvent::Error {
                            message: e.to_string(),
                        },
                    })
                    .await;
                return;
            }
        };

        let cancel = state.cancel_map.register(&session_id);
        if let Err(e) = state
            .orchestrator
            .start_or_continue_turn(input, &tx, &cancel)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "turn failed");
        }
        state.cancel_map.remove(&session_id);
        drop(permit);
        // Receivers see the channel close only once the session is free.
        drop(tx);
    });

    rx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    store: Arc<dyn MessageStore>,
    sessions: Arc<SessionStore>,
    llm: Arc<ProviderRegistry>,
    dispatcher: ToolDispatcher,
    system_prompt: String,
    default_owner: String,
    max_tool_loops: usize,
    model_timeout: Duration,
    idle_timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    dispatch_while_streaming: bool,
}

/// Counters carried across the model calls of one turn.
#[derive(Debug, Default)]
struct TurnStats {
    model_calls: usize,
    tool_calls: usize,
    usage: Usage,
}

/// Best-effort event delivery: a closed receiver never fails the turn.
struct EventSink<'a> {
    tx: &'a mpsc::Sender<SessionEvent>,
    session_id: &'a str,
}

impl EventSink<'_> {
    async fn send(&self, event: TurnEvent) {
        let ev = SessionEvent {
            session_id: self.session_id.to_owned(),
            event,
        };
        if self.tx.send(ev).await.is_err() {
            tracing::debug!(session_id = %self.session_id, "event receiver closed");
        }
    }
}

struct PhaseTracker<'a> {
    session_id: &'a str,
    phase: TurnPhase,
}

impl PhaseTracker<'_> {
    fn advance(&mut self, next: TurnPhase) {
        tracing::debug!(
            session_id = %self.session_id,
            from = %self.phase,
            to = %next,
            "turn phase"
        );
        self.phase = next;
    }
}

/// Dispatches started while the model was still streaming, by call id.
/// Whatever is left when this drops is aborted.
#[derive(Default)]
struct InFlight {
    handles: HashMap<String, JoinHandle<ToolInvocationResult>>,
}

impl InFlight {
    fn insert(&mut self, call_id: String, handle: JoinHandle<ToolInvocationResult>) {
        self.handles.insert(call_id, handle);
    }

    fn take(&mut self, call_id: &str) -> Option<JoinHandle<ToolInvocationResult>> {
        self.handles.remove(call_id)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for (call_id, handle) in self.handles.drain() {
            if !handle.is_finished() {
                tracing::debug!(call_id = %call_id, "aborting tool call");
            }
            handle.abort();
        }
    }
}

/// One settled model call.
struct ModelReply {
    aggregated: Aggregated,
    in_flight: InFlight,
    usage: Option<Usage>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        store: Arc<dyn MessageStore>,
        sessions: Arc<SessionStore>,
        llm: Arc<ProviderRegistry>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        Self {
            store,
            sessions,
            llm,
            dispatcher,
            system_prompt: config.turn.load_system_prompt(),
            default_owner: config.sessions.default_owner.clone(),
            max_tool_loops: config.turn.max_tool_loops,
            model_timeout: Duration::from_millis(config.turn.model_timeout_ms),
            idle_timeout: Duration::from_millis(config.turn.stream_idle_timeout_ms),
            temperature: config.turn.temperature,
            max_tokens: config.turn.max_tokens,
            dispatch_while_streaming: config.tools.dispatch_while_streaming,
        }
    }

    /// Run one turn to completion, streaming events into `tx`.
    ///
    /// Failures are also sent as [`TurnEvent::Error`]; cancellation is
    /// reported as [`TurnEvent::Stopped`] and [`TurnOutcome::Cancelled`].
    pub async fn start_or_continue_turn(
        &self,
        input: TurnInput,
        tx: &mpsc::Sender<SessionEvent>,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome> {
        let span = tracing::info_span!(
            "turn",
            session_id = %input.session_id,
            initialize_only = input.user_text.is_none(),
        );
        self.turn_inner(input, tx, cancel).instrument(span).await
    }

    async fn turn_inner(
        &self,
        input: TurnInput,
        tx: &mpsc::Sender<SessionEvent>,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome> {
        let session_id = input.session_id.as_str();
        let sink = EventSink { tx, session_id };
        let mut phase = PhaseTracker {
            session_id,
            phase: TurnPhase::LoadingHistory,
        };
        let mut stats = TurnStats::default();

        let result = self
            .drive(&input, &sink, cancel, &mut phase, &mut stats)
            .await;

        let outcome = match &result {
            Ok(TurnOutcome::Cancelled) => {
                phase.advance(TurnPhase::Cancelled);
                sink.send(TurnEvent::Stopped).await;
                "cancelled"
            }
            Ok(TurnOutcome::Completed { .. }) => "completed",
            Err(e) => {
                phase.advance(TurnPhase::Error);
                sink.send(TurnEvent::Error {
                    message: e.to_string(),
                })
                .await;
                "error"
            }
        };

        TraceEvent::TurnFinished {
            session_id: session_id.to_owned(),
            model_calls: stats.model_calls,
            tool_calls: stats.tool_calls,
            outcome: outcome.to_owned(),
        }
        .emit();

        result
    }

    async fn drive(
        &self,
        input: &TurnInput,
        sink: &EventSink<'_>,
        cancel: &CancelToken,
        phase: &mut PhaseTracker<'_>,
        stats: &mut TurnStats,
    ) -> Result<TurnOutcome> {
        let session_id = input.session_id.as_str();
        validate_session_id(session_id)?;
        if let Some(text) = &input.user_text {
            if text.trim().is_empty() {
                return Err(Error::InvalidInput("user message is empty".into()));
            }
        }

        // ── Load history ─────────────────────────────────────────────
        let stored = self.store.list_by_session(session_id).await?;
        let initialize_only = input.user_text.is_none();
        if initialize_only && !stored.is_empty() {
            return Err(Error::InvalidInput(
                "a message is required to continue an existing conversation".into(),
            ));
        }

        let (provider, model) = self
            .llm
            .resolve(input.model.as_deref())
            .ok_or_else(|| Error::Config("no LLM provider configured".into()))?;

        let owner = input.owner.as_deref().unwrap_or(&self.default_owner);
        self.sessions.resolve_or_create(session_id, owner)?;

        let mut context = if stored.is_empty() {
            phase.advance(TurnPhase::SeedingSystem);
            let system = Message::system(self.system_prompt.as_str());
            self.store.append(session_id, &system).await?;
            vec![system]
        } else {
            to_context(&stored)
        };

        if cancel.is_cancelled() {
            return Ok(TurnOutcome::Cancelled);
        }

        // ── Title ────────────────────────────────────────────────────
        if let (true, Some(text)) = (input.update_title, &input.user_text) {
            let title = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
                res = tokio::time::timeout(
                    self.model_timeout,
                    generate_title(provider.as_ref(), model.clone(), text),
                ) => res.unwrap_or_else(|_| {
                    tracing::warn!(
                        timeout_ms = self.model_timeout.as_millis() as u64,
                        "title generation timed out, using fallback"
                    );
                    SessionTitle::fallback()
                }),
            };
            if let Err(e) = self.sessions.rename(
                session_id,
                Some(title.title.as_str()),
                Some(title.tagline.as_str()),
            ) {
                tracing::warn!(error = %e, "storing session title failed");
            }
            sink.send(TurnEvent::TitleUpdated {
                title: title.title,
                tagline: title.tagline,
            })
            .await;
        }

        // ── User message ─────────────────────────────────────────────
        if let Some(text) = &input.user_text {
            let user = Message::user(text.as_str());
            self.store.append(session_id, &user).await?;
            context.push(user);
        }

        let tools: Vec<ToolDefinition> = if initialize_only {
            Vec::new()
        } else {
            self.dispatcher.registry().definitions()
        };

        // ── Model / tool loop ────────────────────────────────────────
        for loop_idx in 0..self.max_tool_loops {
            if cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled);
            }
            phase.advance(TurnPhase::AwaitingModel);
            stats.model_calls += 1;

            let req = ChatRequest {
                messages: context.clone(),
                tools: tools.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                model: model.clone(),
            };

            let llm_span = tracing::info_span!(
                "llm.call",
                "otel.kind" = "CLIENT",
                provider = %provider.provider_id(),
                loop_idx,
                input_tokens = tracing::field::Empty,
                output_tokens = tracing::field::Empty,
            );
            let reply = self
                .stream_model_call(provider.as_ref(), req, initialize_only, sink, cancel, phase)
                .instrument(llm_span)
                .await?;
            let Some(ModelReply {
                aggregated,
                mut in_flight,
                usage,
            }) = reply
            else {
                return Ok(TurnOutcome::Cancelled);
            };
            if let Some(u) = &usage {
                stats.usage.add(u);
            }

            for call_id in &aggregated.dropped {
                TraceEvent::ToolCallDropped {
                    session_id: session_id.to_owned(),
                    call_id: call_id.clone(),
                    reason: "arguments never completed".into(),
                }
                .emit();
            }

            // ── Final answer ─────────────────────────────────────────
            if initialize_only || aggregated.tool_calls.is_empty() {
                if !aggregated.tool_calls.is_empty() {
                    tracing::debug!(
                        count = aggregated.tool_calls.len(),
                        "ignoring tool calls in opening greeting"
                    );
                }
                phase.advance(TurnPhase::Finalizing);
                let content = aggregated.text;
                self.store
                    .append(session_id, &Message::assistant(content.as_str()))
                    .await?;
                if let Err(e) = self.sessions.touch(session_id) {
                    tracing::warn!(error = %e, "touching session failed");
                }
                if stats.usage != Usage::default() {
                    sink.send(TurnEvent::usage(&stats.usage)).await;
                }
                sink.send(TurnEvent::EndOfTurn {
                    content: content.clone(),
                })
                .await;
                phase.advance(TurnPhase::Done);
                return Ok(TurnOutcome::Completed {
                    content,
                    model_calls: stats.model_calls,
                    tool_calls: stats.tool_calls,
                    usage: stats.usage,
                });
            }

            // ── Tool round ───────────────────────────────────────────
            phase.advance(TurnPhase::DispatchingTools);
            let assistant =
                Message::assistant_with_tool_calls(&aggregated.text, &aggregated.tool_calls);
            self.store.append(session_id, &assistant).await?;
            context.push(assistant);

            let mut cancelled = false;
            for call in &aggregated.tool_calls {
                let result = if cancelled {
                    ToolInvocationResult::failure(call, "turn cancelled")
                } else {
                    let handle = in_flight
                        .take(&call.call_id)
                        .unwrap_or_else(|| self.dispatcher.spawn(session_id, call.clone()));
                    match await_dispatch(call, handle, cancel).await {
                        Some(result) => result,
                        None => {
                            cancelled = true;
                            ToolInvocationResult::failure(call, "turn cancelled")
                        }
                    }
                };
                stats.tool_calls += 1;

                // Results of a stopped turn are still persisted so every
                // declared call keeps its answer.
                let message = result.clone().into_message();
                self.store.append(session_id, &message).await?;
                context.push(message);

                if !cancelled {
                    sink.send(TurnEvent::ToolResult {
                        call_id: result.call_id,
                        tool_name: result.tool_name,
                        content: result.content,
                        is_error: result.is_error,
                    })
                    .await;
                }
            }
            if cancelled {
                return Ok(TurnOutcome::Cancelled);
            }
        }

        tracing::warn!(
            max_tool_loops = self.max_tool_loops,
            "tool loop limit reached"
        );
        Err(Error::ToolLoopLimit(self.max_tool_loops))
    }

    /// Stream one model call through a fresh aggregator. `Ok(None)` means
    /// the turn was cancelled mid-call.
    async fn stream_model_call(
        &self,
        provider: &dyn LlmProvider,
        req: ChatRequest,
        initialize_only: bool,
        sink: &EventSink<'_>,
        cancel: &CancelToken,
        phase: &mut PhaseTracker<'_>,
    ) -> Result<Option<ModelReply>> {
        let started = Instant::now();
        let requested_model = req.model.clone().unwrap_or_else(|| "default".into());

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            res = tokio::time::timeout(self.model_timeout, provider.chat_stream(req)) => match res {
                Ok(stream) => stream?,
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "model did not respond within {}ms",
                        self.model_timeout.as_millis()
                    )))
                }
            },
        };

        phase.advance(TurnPhase::Streaming);
        let mut aggregator = DeltaAggregator::new();
        let mut in_flight = InFlight::default();
        let mut usage = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = tokio::time::timeout(self.idle_timeout, stream.next()) => next,
            };
            let event = match next {
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "model stream idle for {}ms",
                        self.idle_timeout.as_millis()
                    )))
                }
                Ok(None) => break,
                Ok(Some(event)) => event?,
            };

            match aggregator.push(event) {
                Fed::Text(text) => sink.send(TurnEvent::TextDelta { text }).await,
                Fed::Ready(call) => {
                    if initialize_only {
                        continue;
                    }
                    tracing::debug!(
                        call_id = %call.call_id,
                        tool = %call.tool_name,
                        "tool call ready"
                    );
                    sink.send(TurnEvent::ToolCall {
                        call_id: call.call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;
                    if self.dispatch_while_streaming {
                        let call_id = call.call_id.clone();
                        in_flight.insert(call_id, self.dispatcher.spawn(sink.session_id, call));
                    }
                }
                Fed::Done {
                    usage: u,
                    finish_reason,
                } => {
                    tracing::debug!(finish_reason = ?finish_reason, "model stream done");
                    usage = u;
                    break;
                }
                Fed::Failed(message) => {
                    return Err(Error::Provider {
                        provider: provider.provider_id().to_owned(),
                        message,
                    })
                }
                Fed::Nothing => {}
            }
        }

        let current = tracing::Span::current();
        if let Some(u) = &usage {
            current.record("input_tokens", u.prompt_tokens);
            current.record("output_tokens", u.completion_tokens);
        }
        TraceEvent::LlmRequest {
            provider: provider.provider_id().to_owned(),
            model: requested_model,
            streaming: true,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(Some(ModelReply {
            aggregated: aggregator.finish(),
            in_flight,
            usage,
        }))
    }
}

/// Wait for one dispatch. `None` means the turn was cancelled first; the
/// call is aborted.
async fn await_dispatch(
    call: &ToolCall,
    mut handle: JoinHandle<ToolInvocationResult>,
    cancel: &CancelToken,
) -> Option<ToolInvocationResult> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            handle.abort();
            None
        }
        joined = &mut handle => Some(match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(call_id = %call.call_id, error = %e, "tool task failed");
                ToolInvocationResult::failure(call, format!("tool task failed: {e}"))
            }
        }),
    }
}
