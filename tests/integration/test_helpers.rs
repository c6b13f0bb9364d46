//! Scripted in-memory conversation boundary shared by the integration tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acp_bridge::acp::Connection;
use acp_bridge::conversation::{Conversation, ConversationFactory, ConversationSpec, EventSink};
use acp_bridge::models::confirmation::{ConfirmationResult, PendingAction};
use acp_bridge::models::event::AgentEvent;
use acp_bridge::models::message::UserMessage;
use acp_bridge::models::mode::{ConfirmationMode, ConfirmationPolicy};
use acp_bridge::models::status::ExecutionStatus;
use acp_bridge::models::stream::StreamChunk;
use acp_bridge::session::{confirmation::unmatched_actions, Confirmer, RegistryConfig, SessionRegistry};
use acp_bridge::{AppError, Result};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Event builders ───────────────────────────────────────────────────────────

pub fn event(value: Value) -> AgentEvent {
    serde_json::from_value(value).expect("valid event")
}

pub fn terminal_action(call: &str, command: &str) -> AgentEvent {
    event(json!({
        "kind": "action", "id": format!("a-{call}"), "tool_call_id": call,
        "tool_name": "terminal", "arguments": {"command": command},
    }))
}

pub fn terminal_output(call: &str, text: &str) -> AgentEvent {
    event(json!({
        "kind": "observation", "id": format!("o-{call}"), "tool_call_id": call,
        "tool_name": "terminal", "observation": {"type": "output", "text": text},
    }))
}

pub fn finish(call: &str, message: &str) -> AgentEvent {
    event(json!({
        "kind": "action", "id": format!("a-{call}"), "tool_call_id": call,
        "tool_name": "finish", "arguments": {"message": message},
    }))
}

// ── Scripted conversation ────────────────────────────────────────────────────

/// What one `run_one_cycle` call does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Append and emit the events, then report the status.
    Emit(Vec<AgentEvent>, ExecutionStatus),
    /// Run until `pause` is called, then report `Paused`.
    UntilPaused,
    /// Never return on its own, ignoring `pause`.
    Hang,
    /// Sleep, then finish.
    Sleep(Duration),
    /// Fail the cycle.
    Fail(String),
}

#[derive(Debug)]
struct State {
    events: Vec<AgentEvent>,
    status: ExecutionStatus,
    script: VecDeque<Step>,
    messages: Vec<UserMessage>,
    rejections: Vec<String>,
    policy_changes: Vec<ConfirmationPolicy>,
}

pub struct ScriptedConversation {
    id: Uuid,
    sink: Arc<dyn EventSink>,
    state: Mutex<State>,
    alive: AtomicBool,
    closed: AtomicBool,
    paused: watch::Sender<bool>,
    cycles_started: watch::Sender<usize>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    pauses: AtomicUsize,
}

impl ScriptedConversation {
    pub fn new(id: Uuid, sink: Arc<dyn EventSink>, events: Vec<AgentEvent>, script: Vec<Step>) -> Self {
        Self {
            id,
            sink,
            state: Mutex::new(State {
                events,
                status: ExecutionStatus::Idle,
                script: script.into(),
                messages: Vec::new(),
                rejections: Vec::new(),
                policy_changes: Vec::new(),
            }),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            paused: watch::channel(false).0,
            cycles_started: watch::channel(0).0,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: ExecutionStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn push_script(&self, step: Step) {
        self.state.lock().unwrap().script.push_back(step);
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<UserMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn rejections(&self) -> Vec<String> {
        self.state.lock().unwrap().rejections.clone()
    }

    pub fn policy_changes(&self) -> Vec<ConfirmationPolicy> {
        self.state.lock().unwrap().policy_changes.clone()
    }

    pub fn logged_events(&self) -> Vec<AgentEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn cycles(&self) -> usize {
        *self.cycles_started.borrow()
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` cycles have started.
    pub async fn wait_cycles_started(&self, count: usize) {
        let mut rx = self.cycles_started.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|started| *started >= count))
            .await
            .expect("cycle did not start in time")
            .expect("watch open");
    }

    fn append(&self, events: Vec<AgentEvent>) {
        for event in events {
            self.state.lock().unwrap().events.push(event.clone());
            self.sink.on_event(&event);
        }
    }

    async fn perform(&self, step: Step) -> Result<ExecutionStatus> {
        match step {
            Step::Emit(events, status) => {
                self.append(events);
                Ok(status)
            }
            Step::UntilPaused => {
                let mut rx = self.paused.subscribe();
                let _ = rx.wait_for(|paused| *paused).await;
                Ok(ExecutionStatus::Paused)
            }
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(ExecutionStatus::Running)
            }
            Step::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(ExecutionStatus::Finished)
            }
            Step::Fail(reason) => Err(AppError::Transient(reason)),
        }
    }
}

impl Conversation for ScriptedConversation {
    fn id(&self) -> Uuid {
        self.id
    }

    fn execution_status(&self) -> BoxFuture<'_, Result<ExecutionStatus>> {
        Box::pin(async move { Ok(self.state.lock().unwrap().status) })
    }

    fn send_message(&self, message: UserMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let text = message.plain_text();
            self.state.lock().unwrap().messages.push(message);
            self.append(vec![event(json!({
                "kind": "message", "id": Uuid::new_v4().to_string(),
                "source": "user", "text": text,
            }))]);
            Ok(())
        })
    }

    fn run_one_cycle(&self) -> BoxFuture<'_, Result<ExecutionStatus>> {
        Box::pin(async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.paused.send_replace(false);
            self.cycles_started.send_modify(|started| *started += 1);

            let step = self.state.lock().unwrap().script.pop_front();
            let result = match step {
                Some(step) => self.perform(step).await,
                None => Ok(ExecutionStatus::Finished),
            };
            if let Ok(status) = &result {
                self.state.lock().unwrap().status = *status;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn pause(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            self.paused.send_replace(true);
            self.state.lock().unwrap().status = ExecutionStatus::Paused;
            Ok(())
        })
    }

    fn set_confirmation_policy(&self, policy: ConfirmationPolicy) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.policy_changes.push(policy);
            Ok(())
        })
    }

    fn reject_pending(&self, reason: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let pending = unmatched_actions(&self.logged_events());
            let rejections: Vec<_> = pending
                .iter()
                .map(|action| {
                    event(json!({
                        "kind": "observation", "id": format!("r-{}", action.tool_call_id),
                        "tool_call_id": action.tool_call_id, "tool_name": action.tool_name,
                        "observation": {"type": "rejected", "reason": reason},
                    }))
                })
                .collect();
            self.state.lock().unwrap().rejections.push(reason.clone());
            self.append(rejections);
            Ok(())
        })
    }

    fn events(&self) -> BoxFuture<'_, Result<Vec<AgentEvent>>> {
        Box::pin(async move { Ok(self.logged_events()) })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &AgentEvent) {}

    fn on_token(&self, _chunk: &StreamChunk) {}
}

/// A standalone conversation running `script`.
pub fn scripted(script: Vec<Step>) -> Arc<ScriptedConversation> {
    Arc::new(ScriptedConversation::new(
        Uuid::new_v4(),
        Arc::new(NullSink),
        Vec::new(),
        script,
    ))
}

// ── Scripted factory ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedFactory {
    script: Mutex<Vec<Step>>,
    created: Mutex<Vec<Arc<ScriptedConversation>>>,
    specs: Mutex<Vec<ConversationSpec>>,
    persisted: Mutex<HashMap<Uuid, Vec<AgentEvent>>>,
    start_delay: Mutex<Option<Duration>>,
    fail_with: Mutex<Option<String>>,
    authenticated: AtomicBool,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Steps every newly created conversation starts with.
    pub fn set_script(&self, script: Vec<Step>) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_next(&self, reason: &str) {
        *self.fail_with.lock().unwrap() = Some(reason.to_owned());
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Seed the persisted log a resumed conversation loads.
    pub fn persist(&self, id: Uuid, events: Vec<AgentEvent>) {
        self.persisted.lock().unwrap().insert(id, events);
    }

    pub fn created(&self) -> Vec<Arc<ScriptedConversation>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<ScriptedConversation> {
        self.created().last().cloned().expect("a conversation was created")
    }

    pub fn specs(&self) -> Vec<ConversationSpec> {
        self.specs.lock().unwrap().clone()
    }
}

impl ConversationFactory for ScriptedFactory {
    fn start_or_load(
        &self,
        spec: ConversationSpec,
        sink: Arc<dyn EventSink>,
    ) -> BoxFuture<'_, Result<Arc<dyn Conversation>>> {
        Box::pin(async move {
            let delay = *self.start_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(reason) = self.fail_with.lock().unwrap().take() {
                return Err(AppError::NotConfigured(reason));
            }

            let events = if spec.resume {
                let persisted = self.persisted.lock().unwrap().get(&spec.conversation_id).cloned();
                persisted.unwrap_or_else(|| {
                    self.created()
                        .iter()
                        .rev()
                        .find(|conversation| conversation.id() == spec.conversation_id)
                        .map(|conversation| conversation.logged_events())
                        .unwrap_or_default()
                })
            } else {
                Vec::new()
            };
            let script = self.script.lock().unwrap().clone();
            let conversation =
                Arc::new(ScriptedConversation::new(spec.conversation_id, sink, events, script));
            self.specs.lock().unwrap().push(spec);
            self.created.lock().unwrap().push(Arc::clone(&conversation));
            Ok(conversation as Arc<dyn Conversation>)
        })
    }

    fn is_authenticated(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.authenticated.load(Ordering::SeqCst) })
    }
}

// ── Scripted confirmer ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<ConfirmationResult>>,
    seen: Mutex<Vec<Vec<PendingAction>>>,
}

impl ScriptedConfirmer {
    pub fn answering(answers: Vec<ConfirmationResult>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Vec<PendingAction>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm<'a>(
        &'a self,
        _session_id: &'a str,
        pending: &'a [PendingAction],
    ) -> BoxFuture<'a, Result<ConfirmationResult>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(pending.to_vec());
            Ok(self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(ConfirmationResult::accept))
        })
    }
}

// ── Registry wiring ──────────────────────────────────────────────────────────

pub fn registry_config(dir: &Path) -> RegistryConfig {
    RegistryConfig {
        default_working_dir: dir.to_path_buf(),
        base_mcp_servers: Map::new(),
        default_mode: ConfirmationMode::AlwaysAsk,
        streaming: false,
    }
}

pub struct Harness {
    pub temp: tempfile::TempDir,
    pub factory: Arc<ScriptedFactory>,
    pub connection: Connection,
    pub outbound: mpsc::UnboundedReceiver<Value>,
    pub registry: Arc<SessionRegistry>,
}

pub fn harness() -> Harness {
    let temp = tempfile::tempdir().expect("tempdir");
    let factory = ScriptedFactory::new();
    let (connection, outbound) = Connection::new("client");
    let registry = Arc::new(SessionRegistry::new(
        registry_config(temp.path()),
        Arc::clone(&factory) as Arc<dyn ConversationFactory>,
        connection.clone(),
    ));
    Harness {
        temp,
        factory,
        connection,
        outbound,
        registry,
    }
}

/// Everything queued on the outbound channel so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Value>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// `sessionUpdate` kinds of the `session/update` notifications in `messages`.
pub fn update_kinds(messages: &[Value]) -> Vec<String> {
    messages
        .iter()
        .filter(|message| message["method"] == "session/update")
        .filter_map(|message| message["params"]["update"]["sessionUpdate"].as_str())
        .map(str::to_owned)
        .collect()
}
