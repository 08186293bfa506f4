//! End-to-end turn loop tests against a scripted in-process model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use wf_domain::config::{Config, DEFAULT_SYSTEM_PROMPT};
use wf_domain::error::{Error, Result};
use wf_domain::stream::{BoxStream, StreamEvent, Usage};
use wf_domain::tool::{Role, ToolDefinition};
use wf_gateway::bootstrap;
use wf_gateway::runtime::cancel::CancelToken;
use wf_gateway::runtime::{run_turn, TurnEvent, TurnInput, TurnOutcome};
use wf_gateway::state::AppState;
use wf_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry};
use wf_sessions::{to_context, MessageStore, StoredMessage};
use wf_tools::{Capability, CapabilityRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Step {
    Ev(StreamEvent),
    Sleep(Duration),
    Fail(&'static str),
}

/// Replays one script per model call and records every request.
struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// When set, title requests never answer.
    stall_titles: AtomicBool,
}

impl ScriptedProvider {
    fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            stall_titles: AtomicBool::new(false),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
        if self.stall_titles.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(ChatResponse {
            content: "\"Bali Getaway\"".into(),
            tool_calls: Vec::new(),
            usage: None,
            model: "scripted".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.requests.lock().push(req);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("script exhausted".into()))?;
        let stream = async_stream::stream! {
            for step in script {
                match step {
                    Step::Ev(ev) => yield Ok(ev),
                    Step::Sleep(d) => tokio::time::sleep(d).await,
                    Step::Fail(msg) => yield Err(Error::Http(msg.into())),
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

fn text(s: &str) -> Step {
    Step::Ev(StreamEvent::Token { text: s.into() })
}

fn start(id: &str, name: &str) -> Step {
    Step::Ev(StreamEvent::ToolCallStarted {
        call_id: id.into(),
        tool_name: Some(name.into()),
    })
}

fn args(id: &str, delta: &str) -> Step {
    Step::Ev(StreamEvent::ToolCallDelta {
        call_id: id.into(),
        delta: delta.into(),
    })
}

fn done() -> Step {
    Step::Ev(StreamEvent::Done {
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        finish_reason: Some("stop".into()),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Fixed {
    name: &'static str,
    reply: Value,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl Fixed {
    fn new(name: &'static str, reply: Value) -> Self {
        Self {
            name,
            reply,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn definition_for(name: &str) -> ToolDefinition {
    wf_tools::catalog::definition(name).unwrap_or(ToolDefinition {
        name: name.into(),
        description: String::new(),
        parameters: json!({"type": "object"}),
    })
}

#[async_trait::async_trait]
impl Capability for Fixed {
    fn definition(&self) -> ToolDefinition {
        definition_for(self.name)
    }

    async fn call(&self, _args: Value) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

struct Failing(&'static str);

#[async_trait::async_trait]
impl Capability for Failing {
    fn definition(&self) -> ToolDefinition {
        definition_for(self.0)
    }

    async fn call(&self, _args: Value) -> anyhow::Result<Value> {
        Err(anyhow!("hotel API down"))
    }
}

fn dynamic<C: Capability + 'static>(capability: &Arc<C>) -> Arc<dyn Capability> {
    capability.clone()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    _dir: tempfile::TempDir,
    state: AppState,
    provider: Arc<ScriptedProvider>,
}

fn harness_with(
    scripts: Vec<Vec<Step>>,
    capabilities: Vec<Arc<dyn Capability>>,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.sessions.state_path = dir.path().to_path_buf();
    tweak(&mut config);

    let provider = Arc::new(ScriptedProvider::new(scripts));
    let llm = ProviderRegistry::from_providers(vec![provider.clone() as Arc<dyn LlmProvider>]);
    let mut registry = CapabilityRegistry::new();
    for capability in capabilities {
        registry = registry.register(capability);
    }
    let state = bootstrap::assemble(Arc::new(config), llm, registry).unwrap();

    Harness {
        _dir: dir,
        state,
        provider,
    }
}

fn harness(scripts: Vec<Vec<Step>>, capabilities: Vec<Arc<dyn Capability>>) -> Harness {
    harness_with(scripts, capabilities, |_| {})
}

impl Harness {
    async fn turn(&self, input: TurnInput) -> (Result<TurnOutcome>, Vec<TurnEvent>) {
        self.turn_with(input, &CancelToken::new()).await
    }

    async fn turn_with(
        &self,
        input: TurnInput,
        cancel: &CancelToken,
    ) -> (Result<TurnOutcome>, Vec<TurnEvent>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let outcome = self
            .state
            .orchestrator
            .start_or_continue_turn(input, &tx, cancel)
            .await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev.event);
        }
        (outcome, events)
    }

    async fn stored(&self, session_id: &str) -> Vec<StoredMessage> {
        self.state.transcripts.list_by_session(session_id).await.unwrap()
    }
}

fn roles(stored: &[StoredMessage]) -> Vec<Role> {
    stored.iter().map(|m| m.role).collect()
}

/// Every assistant-with-tool-calls message is immediately followed by one
/// tool message per declared call, in declaration order.
fn assert_tool_answers_follow(stored: &[StoredMessage]) {
    let mut i = 0;
    while i < stored.len() {
        let m = &stored[i];
        if m.role == Role::Assistant && !m.tool_calls.is_empty() {
            for (k, call) in m.tool_calls.iter().enumerate() {
                let answer = stored
                    .get(i + 1 + k)
                    .unwrap_or_else(|| panic!("call {} has no answer", call.call_id));
                assert_eq!(answer.role, Role::Tool);
                assert_eq!(answer.tool_call_id.as_deref(), Some(call.call_id.as_str()));
            }
            i += 1 + m.tool_calls.len();
        } else {
            assert_ne!(m.role, Role::Tool, "tool message at {i} answers nothing");
            i += 1;
        }
    }
}

fn end_content(events: &[TurnEvent]) -> &str {
    match events.last() {
        Some(TurnEvent::EndOfTurn { content }) => content,
        other => panic!("expected end of turn, got {other:?}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn new_session_hotel_search() {
    let hotels = Arc::new(Fixed::new(
        "find_hotels",
        json!([{"name": "Hotel Lutetia", "stars": 5}]),
    ));
    let h = harness(
        vec![
            vec![
                start("c1", "find_hotels"),
                args("c1", r#"{"city":"Pa"#),
                args("c1", r#"ris","stars":5,"#),
                args("c1", r#""nearCBD":true}"#),
                done(),
            ],
            vec![text("Hotel Lutetia "), text("is a great pick."), done()],
        ],
        vec![dynamic(&hotels)],
    );

    let (outcome, events) = h.turn(TurnInput::message("s-a", "Find hotels in Paris")).await;
    let outcome = outcome.unwrap();

    let stored = h.stored("s-a").await;
    assert_eq!(
        roles(&stored),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(stored[0].content, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(stored[2].tool_calls[0].arguments["city"], "Paris");
    assert_eq!(stored[3].tool_call_id.as_deref(), Some("c1"));
    assert!(stored[3].content.contains("Hotel Lutetia"));
    assert_eq!(stored[4].content, "Hotel Lutetia is a great pick.");
    assert_tool_answers_follow(&stored);
    assert_eq!(hotels.calls.load(Ordering::SeqCst), 1);

    assert!(matches!(&events[0], TurnEvent::ToolCall { call_id, .. } if call_id == "c1"));
    assert!(matches!(&events[1], TurnEvent::ToolResult { is_error: false, .. }));
    assert_eq!(end_content(&events), "Hotel Lutetia is a great pick.");

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            content: "Hotel Lutetia is a great pick.".into(),
            model_calls: 2,
            tool_calls: 1,
            usage: Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            },
        }
    );

    let first = &h.provider.requests()[0];
    assert_eq!(first.messages[0].content.extract_all_text(), DEFAULT_SYSTEM_PROMPT);
    assert!(first.tools.iter().any(|t| t.name == "find_hotels"));
}

#[tokio::test]
async fn plain_greeting_text_only() {
    let h = harness(vec![vec![text("Hi! "), text("Where to?"), done()]], vec![]);

    let (outcome, events) = h.turn(TurnInput::message("s-b", "Hello there")).await;
    outcome.unwrap();

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hi! ", "Where to?"]);
    assert_eq!(end_content(&events), "Hi! Where to?");

    let stored = h.stored("s-b").await;
    assert_eq!(roles(&stored), vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(h.provider.requests().len(), 1);
}

#[tokio::test]
async fn interleaved_calls_persist_in_readiness_order() {
    let weather = Arc::new(Fixed::new("get_weather", json!({"forecast": "sunny"})));
    let hotels = Arc::new(Fixed::new("find_hotels", json!(["Ritz"])));
    let h = harness(
        vec![
            vec![
                start("a1", "get_weather"),
                start("a2", "find_hotels"),
                args("a1", r#"{"city":"#),
                args("a2", r#"{"city":"Rome","stars":4,"nearCBD":false}"#),
                args("a1", r#""Rome"}"#),
                done(),
            ],
            vec![text("Sunny, and the Ritz is free."), done()],
        ],
        vec![dynamic(&weather), dynamic(&hotels)],
    );

    let (outcome, _) = h.turn(TurnInput::message("s-c", "Weather and hotels in Rome?")).await;
    outcome.unwrap();

    let stored = h.stored("s-c").await;
    let ids: Vec<&str> = stored[2].tool_calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a1"]);
    assert_eq!(stored[3].tool_call_id.as_deref(), Some("a2"));
    assert_eq!(stored[4].tool_call_id.as_deref(), Some("a1"));
    assert_eq!(stored[2].tool_calls[1].arguments, json!({"city": "Rome"}));
    assert_tool_answers_follow(&stored);
}

#[tokio::test]
async fn failing_capability_becomes_error_result_and_turn_continues() {
    let h = harness(
        vec![
            vec![start("c1", "find_hotels"), args("c1", r#"{"city":"Bali"}"#), done()],
            vec![text("Sorry, hotel search is unavailable."), done()],
        ],
        vec![dynamic(&Arc::new(Failing("find_hotels")))],
    );

    let (outcome, events) = h.turn(TurnInput::message("s-d", "Hotels in Bali")).await;
    outcome.unwrap();

    let stored = h.stored("s-d").await;
    let tool = &stored[3];
    assert!(tool.is_error);
    let body: Value = serde_json::from_str(&tool.content).unwrap();
    assert_eq!(body["tool_call_id"], "c1");
    assert_eq!(body["tool"], "find_hotels");
    assert!(body["error"].as_str().unwrap().contains("hotel API down"));

    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::ToolResult { is_error: true, .. })));

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(requests[1].messages[3].answers_call(), Some("c1"));
}

#[tokio::test]
async fn unknown_tool_is_answered_with_structured_error() {
    let h = harness(
        vec![
            vec![start("x", "book_spaceship"), args("x", "{}"), done()],
            vec![text("I can't do that."), done()],
        ],
        vec![],
    );

    h.turn(TurnInput::message("s-u", "Book me a spaceship")).await.0.unwrap();

    let stored = h.stored("s-u").await;
    assert!(stored[3].is_error);
    assert!(stored[3].content.contains("unimplemented tool: book_spaceship"));
    assert_tool_answers_follow(&stored);
}

#[tokio::test]
async fn stored_history_rebuilds_the_context_the_model_saw() {
    let h = harness(
        vec![
            vec![start("c1", "get_weather"), args("c1", r#"{"city":"Oslo"}"#), done()],
            vec![text("Cold."), done()],
        ],
        vec![dynamic(&Arc::new(Fixed::new("get_weather", json!("cold"))))],
    );

    h.turn(TurnInput::message("s-rt", "Weather in Oslo?")).await.0.unwrap();

    let stored = h.stored("s-rt").await;
    let rebuilt = to_context(&stored);
    let seen = &h.provider.requests()[1].messages;
    assert_eq!(&rebuilt[..seen.len()], &seen[..]);
    assert_eq!(h.stored("s-rt").await, stored);
}

#[tokio::test]
async fn second_turn_continues_history_without_reseeding() {
    let h = harness(
        vec![vec![text("Hello!"), done()], vec![text("Paris is lovely."), done()]],
        vec![],
    );

    h.turn(TurnInput::message("s-2", "Hi")).await.0.unwrap();
    h.turn(TurnInput::message("s-2", "Tell me about Paris")).await.0.unwrap();

    let stored = h.stored("s-2").await;
    assert_eq!(
        roles(&stored),
        vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    let seqs: Vec<u64> = stored.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(h.provider.requests()[1].messages.len(), 4);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limits, failures, cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn loop_limit_is_an_error() {
    let call = |id: &str| vec![start(id, "get_weather"), args(id, r#"{"city":"Lima"}"#), done()];
    let h = harness_with(
        vec![call("c1"), call("c2"), call("c3")],
        vec![dynamic(&Arc::new(Fixed::new("get_weather", json!("mild"))))],
        |c| c.turn.max_tool_loops = 2,
    );

    let (outcome, events) = h.turn(TurnInput::message("s-l", "Weather?")).await;
    assert!(matches!(outcome, Err(Error::ToolLoopLimit(2))));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));
    assert_eq!(h.provider.requests().len(), 2);

    let stored = h.stored("s-l").await;
    assert_tool_answers_follow(&stored);
    assert_eq!(stored.last().unwrap().role, Role::Tool);
}

#[tokio::test]
async fn in_band_stream_error_commits_no_assistant_message() {
    let h = harness(
        vec![vec![
            text("Let me think"),
            Step::Ev(StreamEvent::Error {
                message: "overloaded".into(),
            }),
        ]],
        vec![],
    );

    let (outcome, events) = h.turn(TurnInput::message("s-e", "Plan a trip")).await;
    match outcome {
        Err(Error::Provider { message, .. }) => assert_eq!(message, "overloaded"),
        other => panic!("expected provider error, got {other:?}"),
    }
    assert!(matches!(&events[0], TurnEvent::TextDelta { .. }));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));

    let stored = h.stored("s-e").await;
    assert_eq!(roles(&stored), vec![Role::System, Role::User]);
}

#[tokio::test]
async fn transport_error_fails_the_turn() {
    let h = harness(vec![vec![text("Partial"), Step::Fail("connection reset")]], vec![]);

    let (outcome, _) = h.turn(TurnInput::message("s-t", "Plan a trip")).await;
    assert!(matches!(outcome, Err(Error::Http(_))));
    assert_eq!(roles(&h.stored("s-t").await), vec![Role::System, Role::User]);
}

#[tokio::test]
async fn idle_stream_times_out() {
    let h = harness_with(
        vec![vec![text("Hmm"), Step::Sleep(Duration::from_secs(5)), done()]],
        vec![],
        |c| c.turn.stream_idle_timeout_ms = 50,
    );

    let (outcome, _) = h.turn(TurnInput::message("s-to", "Plan a trip")).await;
    assert!(matches!(outcome, Err(Error::Timeout(_))));
    assert_eq!(roles(&h.stored("s-to").await), vec![Role::System, Role::User]);
}

#[tokio::test]
async fn cancel_while_streaming_stops_without_partial_message() {
    let h = harness(
        vec![vec![text("Planning"), Step::Sleep(Duration::from_secs(10)), done()]],
        vec![],
    );

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let (outcome, events) = h.turn_with(TurnInput::message("s-x", "Plan"), &cancel).await;
    assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
    assert_eq!(events.last(), Some(&TurnEvent::Stopped));
    assert_eq!(roles(&h.stored("s-x").await), vec![Role::System, Role::User]);
}

#[tokio::test]
async fn cancel_during_dispatch_aborts_and_keeps_history_valid() {
    let slow = Arc::new(Fixed::new("search_flights", json!([])).slow(Duration::from_secs(10)));
    let h = harness(
        vec![vec![
            start("f1", "search_flights"),
            args("f1", r#"{"origin":"CGK","destination":"DPS","departDate":"2026-11-01"}"#),
            done(),
        ]],
        vec![dynamic(&slow)],
    );

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let (outcome, events) = h.turn_with(TurnInput::message("s-xd", "Flights?"), &cancel).await;
    assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(events.last(), Some(&TurnEvent::Stopped));

    let stored = h.stored("s-xd").await;
    assert_eq!(
        roles(&stored),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool]
    );
    assert!(stored[3].is_error);
    assert_tool_answers_follow(&stored);
}

#[tokio::test]
async fn ready_calls_dispatch_while_the_model_streams() {
    let slow = Arc::new(Fixed::new("get_weather", json!("warm")).slow(Duration::from_millis(300)));
    let h = harness(
        vec![
            vec![
                start("w1", "get_weather"),
                args("w1", r#"{"city":"Cairo"}"#),
                Step::Sleep(Duration::from_millis(300)),
                done(),
            ],
            vec![text("Warm."), done()],
        ],
        vec![dynamic(&slow)],
    );

    let started = Instant::now();
    h.turn(TurnInput::message("s-p", "Cairo weather")).await.0.unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(550),
        "tool and stream should overlap, took {:?}",
        started.elapsed()
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Greeting, input validation, titles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn greeting_on_new_session() {
    let h = harness(vec![vec![text("Welcome! Where would you like to go?"), done()]], vec![]);

    let (outcome, events) = h.turn(TurnInput::greeting("s-g")).await;
    outcome.unwrap();

    assert_eq!(end_content(&events), "Welcome! Where would you like to go?");
    assert_eq!(roles(&h.stored("s-g").await), vec![Role::System, Role::Assistant]);
    assert!(h.provider.requests()[0].tools.is_empty());
}

#[tokio::test]
async fn greeting_never_dispatches_tools() {
    let weather = Arc::new(Fixed::new("get_weather", json!("sunny")));
    let h = harness(
        vec![vec![
            text("Hello! "),
            start("g1", "get_weather"),
            args("g1", r#"{"city":"Paris"}"#),
            text("hidden"),
            done(),
        ]],
        vec![dynamic(&weather)],
    );

    let (outcome, events) = h.turn(TurnInput::greeting("s-g2")).await;
    outcome.unwrap();

    assert_eq!(weather.calls.load(Ordering::SeqCst), 0);
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::ToolCall { .. })));
    let stored = h.stored("s-g2").await;
    assert_eq!(roles(&stored), vec![Role::System, Role::Assistant]);
    assert_eq!(stored[1].content, "Hello! ");
    assert!(stored[1].tool_calls.is_empty());
}

#[tokio::test]
async fn greeting_on_existing_history_is_rejected() {
    let h = harness(vec![vec![text("Hi"), done()]], vec![]);
    h.turn(TurnInput::message("s-g3", "Hi")).await.0.unwrap();
    let before = h.stored("s-g3").await;

    let (outcome, events) = h.turn(TurnInput::greeting("s-g3")).await;
    assert!(matches!(outcome, Err(Error::InvalidInput(_))));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));
    assert_eq!(h.stored("s-g3").await, before);
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let h = harness(vec![], vec![]);
    let (outcome, _) = h.turn(TurnInput::message("s-blank", "   ")).await;
    assert!(matches!(outcome, Err(Error::InvalidInput(_))));
    assert!(h.stored("s-blank").await.is_empty());
}

#[tokio::test]
async fn title_update_names_the_session() {
    let h = harness(vec![vec![text("Bali is wonderful."), done()]], vec![]);

    let mut input = TurnInput::message("s-title", "A week in Bali");
    input.update_title = true;
    let (outcome, events) = h.turn(input).await;
    outcome.unwrap();

    assert_eq!(
        events[0],
        TurnEvent::TitleUpdated {
            title: "Bali Getaway".into(),
            tagline: "Explore your next destination".into(),
        }
    );
    let session = h.state.sessions.get("s-title").unwrap();
    assert_eq!(session.title.as_deref(), Some("Bali Getaway"));
    assert!(!session.saved);
}

#[tokio::test]
async fn stalled_title_falls_back_after_model_timeout() {
    let h = harness_with(
        vec![vec![text("Bali it is."), done()]],
        vec![],
        |c| c.turn.model_timeout_ms = 50,
    );
    h.provider.stall_titles.store(true, Ordering::SeqCst);

    let mut input = TurnInput::message("s-stall", "A week in Bali");
    input.update_title = true;
    let (outcome, events) = tokio::time::timeout(Duration::from_secs(2), h.turn(input))
        .await
        .expect("turn must not hang on the title call");
    outcome.unwrap();

    assert_eq!(
        events[0],
        TurnEvent::TitleUpdated {
            title: "Travel Planning".into(),
            tagline: "Explore your next destination".into(),
        }
    );
    assert_eq!(end_content(&events), "Bali it is.");
    let session = h.state.sessions.get("s-stall").unwrap();
    assert_eq!(session.title.as_deref(), Some("Travel Planning"));
}

#[tokio::test]
async fn cancel_during_title_generation_stops_the_turn() {
    let h = harness(vec![vec![text("never streamed"), done()]], vec![]);
    h.provider.stall_titles.store(true, Ordering::SeqCst);

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut input = TurnInput::message("s-stall-x", "A week in Bali");
    input.update_title = true;
    let (outcome, events) =
        tokio::time::timeout(Duration::from_secs(2), h.turn_with(input, &cancel))
            .await
            .expect("cancel must interrupt the title call");

    assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
    assert_eq!(events.last(), Some(&TurnEvent::Stopped));
    assert!(h.provider.requests().is_empty());
    assert_eq!(roles(&h.stored("s-stall-x").await), vec![Role::System]);
}

#[tokio::test]
async fn session_ids_that_leave_the_transcript_dir_are_rejected() {
    let h = harness(vec![vec![text("hi"), done()]], vec![]);

    let (outcome, events) = h.turn(TurnInput::message("../outside", "Hello")).await;
    assert!(matches!(outcome, Err(Error::InvalidInput(_))));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));
    assert!(h.provider.requests().is_empty());
    assert!(!h._dir.path().join("outside.jsonl").exists());
    assert!(h.state.sessions.get("../outside").is_err());
}

#[tokio::test]
async fn incomplete_call_is_dropped_and_complete_one_is_answered() {
    let weather = Arc::new(Fixed::new("get_weather", json!("sunny")));
    let h = harness(
        vec![
            vec![
                start("ok", "get_weather"),
                start("broken", "find_hotels"),
                args("broken", r#"{"city":"Ki"#),
                args("ok", r#"{"city":"Kyoto"}"#),
                done(),
            ],
            vec![text("Sunny in Kyoto."), done()],
        ],
        vec![dynamic(&weather)],
    );

    let (outcome, events) = h.turn(TurnInput::message("s-drop", "Kyoto weather and hotels")).await;
    outcome.unwrap();

    let stored = h.stored("s-drop").await;
    assert_eq!(
        roles(&stored),
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let ids: Vec<&str> = stored[2].tool_calls.iter().map(|c| c.call_id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
    assert_tool_answers_follow(&stored);
    assert_eq!(weather.calls.load(Ordering::SeqCst), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::ToolCall { call_id, .. } if call_id == "broken")));
}

#[tokio::test]
async fn run_turn_streams_and_releases_the_session() {
    let h = harness(vec![vec![text("Ciao!"), done()]], vec![]);

    let mut rx = run_turn(h.state.clone(), TurnInput::message("s-rt2", "Hi"));
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        assert_eq!(ev.session_id, "s-rt2");
        events.push(ev.event);
    }

    assert_eq!(end_content(&events), "Ciao!");
    assert!(!h.state.cancel_map.is_running("s-rt2"));
    assert!(h.state.session_locks.try_acquire("s-rt2").is_ok());
}
