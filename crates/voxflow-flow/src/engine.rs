//! Flow engine — the per-session dialogue state machine.
//!
//! One engine per session. Within a session everything is strictly
//! sequenced: the run loop owns `&mut self`, so a tool dispatch, the
//! tool-set swap it causes, and the next context snapshot can never
//! interleave — the borrow checker is the mutual exclusion. Suspension
//! points are the provider call, handler-internal lookups, and the
//! termination grace delay; none of them block other sessions.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voxflow_core::config::Config;
use voxflow_core::events::TransportEvent;
use voxflow_core::types::{Message, ToolCallRequest};
use voxflow_core::{ConversationContext, TranscriptStore};
use voxflow_providers::{LlmProvider, LlmRequestConfig};

use crate::actions::ActionExecutor;
use crate::dispatch::{DispatchOutcome, ToolInvocationDispatcher};
use crate::graph::FlowGraph;

/// Spoken when the model keeps calling tools without ever answering.
const TOOL_LOOP_FALLBACK: &str = "Sorry, I lost my train of thought for a moment. Where were we?";

/// Spoken when the turn-loop provider itself fails. The raw error is
/// logged, never spoken.
const PROVIDER_FAILURE_FALLBACK: &str =
    "Sorry, the line cut out for a second — could you say that again?";

// ─────────────────────────────────────────────
// Errors and state
// ─────────────────────────────────────────────

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session is over; the engine is inert.
    #[error("session has already ended")]
    SessionEnded,
    /// A handler redirected to a node the graph doesn't define.
    #[error("transition target '{0}' is not defined in the flow graph")]
    UnknownNode(String),
    /// The transport side of the outbound channel is gone.
    #[error("transport channel closed")]
    TransportClosed,
}

/// Lifecycle of a session engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Conversing.
    Active,
    /// Terminal node reached; waiting out the grace delay.
    Terminating,
    /// Session over. Further tool calls and utterances are rejected.
    Ended,
}

/// Per-engine settings derived from config.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Request parameters (max tokens, temperature).
    pub request: LlmRequestConfig,
    /// Maximum tool dispatches per turn before forcing a spoken response.
    pub max_tool_rounds: u32,
}

impl EngineSettings {
    /// Build settings from the loaded config.
    pub fn from_config(config: &Config) -> Self {
        EngineSettings {
            model: config.llm.model.clone(),
            request: LlmRequestConfig {
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
            },
            max_tool_rounds: config.session.max_tool_rounds,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            model: "gpt-4o".to_string(),
            request: LlmRequestConfig::default(),
            max_tool_rounds: 8,
        }
    }
}

// ─────────────────────────────────────────────
// FlowEngine
// ─────────────────────────────────────────────

/// The active state machine for one session.
///
/// Owns the conversation context, the session record, and the current
/// node. The advertised tool set always equals the current node's declared
/// tools — the swap happens inside the same `&mut` scope as the node
/// change, before anything else re-enters the transcript.
pub struct FlowEngine<R> {
    graph: Arc<FlowGraph>,
    dispatcher: ToolInvocationDispatcher<R>,
    context: ConversationContext,
    record: R,
    current: String,
    state: EngineState,
    actions: ActionExecutor,
    settings: EngineSettings,
    session_id: String,
    store: Option<TranscriptStore>,
    pending_grace: Option<u64>,
}

impl<R: Send> FlowEngine<R> {
    /// Create an engine positioned at the graph's initial node.
    pub fn new(
        graph: Arc<FlowGraph>,
        dispatcher: ToolInvocationDispatcher<R>,
        record: R,
        session_id: impl Into<String>,
        outbound: mpsc::Sender<voxflow_core::events::EngineEvent>,
        settings: EngineSettings,
        store: Option<TranscriptStore>,
    ) -> Self {
        let current = graph.initial().to_string();
        FlowEngine {
            graph,
            dispatcher,
            context: ConversationContext::new(),
            record,
            current,
            state: EngineState::Active,
            actions: ActionExecutor::new(outbound),
            settings,
            session_id: session_id.into(),
            store,
            pending_grace: None,
        }
    }

    /// Id of the node the conversation currently sits in.
    pub fn current_node(&self) -> &str {
        &self.current
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The session's conversation context.
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// The session record.
    pub fn record(&self) -> &R {
        &self.record
    }

    /// The session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Grace delay scheduled by the terminal node, if any.
    pub fn pending_grace(&self) -> Option<u64> {
        self.pending_grace
    }

    /// Enter the initial node: tool set, persona and task messages,
    /// pre-actions.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        let graph = Arc::clone(&self.graph);
        let node = graph
            .node(&self.current)
            .expect("validated graph defines its initial node");

        self.context.set_tools(node.tool_definitions());
        for content in node.role_messages() {
            self.context.append(Message::system(content));
        }
        for content in node.task_messages() {
            self.context.append(Message::system(content));
        }
        self.actions
            .run_pre_actions(node)
            .await
            .map_err(|_| EngineError::TransportClosed)?;

        info!(session = %self.session_id, node = %self.current, "flow initialized");
        Ok(())
    }

    /// Dispatch one tool call from the model.
    ///
    /// On a successful dispatch with a transition target, the node swap is
    /// applied; on any rejection a corrective system message is appended
    /// and the node is unchanged.
    pub async fn handle_tool_call(&mut self, request: ToolCallRequest) -> Result<(), EngineError> {
        if self.state != EngineState::Active {
            return Err(EngineError::SessionEnded);
        }

        let graph = Arc::clone(&self.graph);
        let node = graph
            .node(&self.current)
            .expect("current node exists in validated graph");

        debug!(tool = %request.name, node = %self.current, "dispatching tool call");
        let outcome = self
            .dispatcher
            .dispatch(request, node, &mut self.record)
            .await;

        match outcome {
            DispatchOutcome::Success {
                response,
                transition_to: Some(target),
            } => self.apply_transition(&target, response).await?,
            DispatchOutcome::Success {
                response,
                transition_to: None,
            } => {
                // Local tool — side query only, node unchanged
                if let Some(text) = response {
                    self.context.append(Message::system(text));
                }
            }
            DispatchOutcome::Rejected { correction } => {
                debug!(node = %self.current, "tool call rejected; node unchanged");
                self.context.append(Message::system(correction));
            }
        }
        Ok(())
    }

    /// Swap the conversation to `target`.
    ///
    /// The tool set is replaced before the handler's result re-enters the
    /// transcript, so the model's next turn already sees the new set and
    /// can never call a tool that is no longer valid.
    async fn apply_transition(
        &mut self,
        target: &str,
        response: Option<String>,
    ) -> Result<(), EngineError> {
        let graph = Arc::clone(&self.graph);
        let node = graph
            .node(target)
            .ok_or_else(|| EngineError::UnknownNode(target.to_string()))?;

        self.current = target.to_string();
        self.context.set_tools(node.tool_definitions());
        if let Some(text) = response {
            self.context.append(Message::system(text));
        }
        for content in node.task_messages() {
            self.context.append(Message::system(content));
        }
        self.actions
            .run_pre_actions(node)
            .await
            .map_err(|_| EngineError::TransportClosed)?;

        info!(node = %target, session = %self.session_id, "applied transition");
        Ok(())
    }

    /// Forward assistant text downstream and append it to the transcript.
    ///
    /// On a terminal node this is the closing utterance: post-actions run
    /// only after it has been flushed, so the caller hears the goodbye
    /// before anything terminates.
    pub async fn handle_assistant_text(&mut self, text: &str) -> Result<(), EngineError> {
        if self.state == EngineState::Ended {
            return Err(EngineError::SessionEnded);
        }

        if !text.trim().is_empty() {
            self.actions
                .speak(text)
                .await
                .map_err(|_| EngineError::TransportClosed)?;
            self.context.append(Message::assistant(text));
        }

        if self.state == EngineState::Active && self.graph.is_terminal(&self.current) {
            let graph = Arc::clone(&self.graph);
            let node = graph
                .node(&self.current)
                .expect("current node exists in validated graph");
            let grace = self
                .actions
                .run_post_actions(node)
                .await
                .map_err(|_| EngineError::TransportClosed)?;
            if let Some(grace_secs) = grace {
                self.state = EngineState::Terminating;
                self.pending_grace = Some(grace_secs);
            }
        }
        Ok(())
    }

    /// Append a transcribed user utterance.
    pub async fn handle_user_utterance(&mut self, text: &str) -> Result<(), EngineError> {
        if self.state != EngineState::Active {
            return Err(EngineError::SessionEnded);
        }
        self.context.append(Message::user(text));
        Ok(())
    }

    /// Normal end of session: persist the transcript, emit the end signal,
    /// go inert.
    pub async fn finish(&mut self) {
        if self.state == EngineState::Ended {
            return;
        }
        self.persist_transcript();
        self.state = EngineState::Ended;
        let _ = self.actions.end_session().await;
        info!(session = %self.session_id, "session ended");
    }

    /// External termination (participant disconnect): abandon in-flight
    /// work, persist best-effort, emit the end signal exactly once.
    pub async fn abort(&mut self) {
        if self.state == EngineState::Ended {
            return;
        }
        info!(session = %self.session_id, node = %self.current, "session aborted");
        self.persist_transcript();
        self.state = EngineState::Ended;
        let _ = self.actions.end_session().await;
    }

    fn persist_transcript(&self) {
        if let Some(store) = &self.store {
            store.save_best_effort(&self.session_id, self.context.messages());
        }
    }

    /// Run the session to completion.
    ///
    /// Drives the turn loop until the flow reaches a terminal node (grace
    /// delay, then end signal) or the transport disconnects (immediate
    /// abort). The end signal is emitted exactly once on every path.
    pub async fn run(
        &mut self,
        provider: &dyn LlmProvider,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<(), EngineError> {
        self.initialize().await?;

        loop {
            let text = self.drive_turn(provider).await?;
            self.handle_assistant_text(&text).await?;

            if self.state == EngineState::Terminating {
                let grace = self.pending_grace.take().unwrap_or(0);
                let mut timer = self.actions.schedule_termination(grace);

                tokio::select! {
                    elapsed = timer.elapsed() => {
                        if elapsed {
                            self.finish().await;
                        }
                    }
                    event = inbound.recv() => {
                        match event {
                            Some(TransportEvent::Disconnected) | None => {
                                timer.cancel();
                                self.abort().await;
                            }
                            Some(TransportEvent::Utterance { .. }) => {
                                // The caller spoke over the goodbye; the
                                // session still closes on schedule.
                                timer.elapsed().await;
                                self.finish().await;
                            }
                        }
                    }
                }
                return Ok(());
            }

            match inbound.recv().await {
                Some(TransportEvent::Utterance { text }) => {
                    self.handle_user_utterance(&text).await?;
                }
                Some(TransportEvent::Disconnected) | None => {
                    self.abort().await;
                    return Ok(());
                }
            }
        }
    }

    /// Submit the context until the model produces text, dispatching tool
    /// calls inline. Each dispatch (and any transition it causes) fully
    /// completes before the next snapshot is taken.
    async fn drive_turn(&mut self, provider: &dyn LlmProvider) -> Result<String, EngineError> {
        let mut rounds = 0u32;
        loop {
            let snapshot = self.context.snapshot();
            let tools = if snapshot.tools.is_empty() {
                None
            } else {
                Some(&snapshot.tools[..])
            };

            let response = provider
                .chat(
                    &snapshot.messages,
                    tools,
                    &self.settings.model,
                    &self.settings.request,
                )
                .await;

            if response.error {
                warn!(
                    session = %self.session_id,
                    detail = response.content.as_deref().unwrap_or("?"),
                    "provider failure; speaking fallback"
                );
                return Ok(PROVIDER_FAILURE_FALLBACK.to_string());
            }

            if let Some(request) = response.tool_call {
                // Narration alongside a call is spoken before the result
                if let Some(text) = response.content {
                    if !text.trim().is_empty() {
                        self.actions
                            .speak(&text)
                            .await
                            .map_err(|_| EngineError::TransportClosed)?;
                        self.context.append(Message::assistant(text));
                    }
                }

                self.handle_tool_call(request).await?;

                rounds += 1;
                if rounds >= self.settings.max_tool_rounds {
                    warn!(rounds = rounds, "max tool rounds reached; forcing a spoken response");
                    return Ok(TOOL_LOOP_FALLBACK.to_string());
                }
                continue;
            }

            return Ok(response.content.unwrap_or_default());
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use voxflow_core::events::EngineEvent;
    use voxflow_core::types::{LlmResponse, Role, ToolDefinition};

    use crate::graph::{Action, Node, ParamField, ToolSchema};
    use crate::handler::{HandlerOutcome, ToolArgs, ToolHandler};

    // ── Test fixtures ──

    #[derive(Default)]
    struct TestRecord {
        pings: u32,
    }

    struct PingHandler;

    #[async_trait]
    impl ToolHandler<TestRecord> for PingHandler {
        async fn handle(
            &self,
            _args: &ToolArgs,
            record: &mut TestRecord,
        ) -> anyhow::Result<HandlerOutcome> {
            record.pings += 1;
            Ok(HandlerOutcome::success(format!("pong {}", record.pings)))
        }
    }

    struct GateHandler;

    #[async_trait]
    impl ToolHandler<TestRecord> for GateHandler {
        async fn handle(
            &self,
            args: &ToolArgs,
            _record: &mut TestRecord,
        ) -> anyhow::Result<HandlerOutcome> {
            if args.require_str("code")? == "open sesame" {
                Ok(HandlerOutcome::success("gate opened"))
            } else {
                Ok(HandlerOutcome::failure(
                    "Wrong code. Ask the caller to try again.",
                ))
            }
        }
    }

    fn test_graph() -> Arc<FlowGraph> {
        Arc::new(
            FlowGraph::new(
                "start",
                vec![
                    Node::new("start")
                        .role_message("You are a test voice agent.")
                        .task_message("Greet the caller.")
                        .pre_action(Action::precondition_check("line"))
                        .tool(ToolSchema::new("ping", "Side query"))
                        .tool(
                            ToolSchema::new("advance", "Move on")
                                .param(ParamField::string("code", "Pass code").required())
                                .transitions_to("mid"),
                        ),
                    Node::new("mid")
                        .task_message("Collect the details.")
                        .tool(ToolSchema::new("finish", "Wrap up").transitions_to("end")),
                    Node::new("end")
                        .task_message("Thank the caller and say goodbye.")
                        .post_action(Action::announce("Bye now."))
                        .post_action(Action::terminate(0)),
                ],
            )
            .unwrap(),
        )
    }

    fn test_dispatcher() -> ToolInvocationDispatcher<TestRecord> {
        let mut dispatcher = ToolInvocationDispatcher::new();
        dispatcher.register("ping", Arc::new(PingHandler));
        dispatcher.register("advance", Arc::new(GateHandler));
        dispatcher
    }

    fn make_engine() -> (
        FlowEngine<TestRecord>,
        mpsc::Receiver<EngineEvent>,
    ) {
        let (tx, rx) = mpsc::channel(32);
        let engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "test-session",
            tx,
            EngineSettings {
                model: "test-model".to_string(),
                ..Default::default()
            },
            None,
        );
        (engine, rx)
    }

    fn tool_names(defs: &[ToolDefinition]) -> Vec<&str> {
        let mut names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// A provider that replays canned responses.
    struct ScriptedProvider {
        responses: Mutex<Vec<LlmResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }

        fn text(content: &str) -> LlmResponse {
            LlmResponse {
                content: Some(content.to_string()),
                ..Default::default()
            }
        }

        fn tool(name: &str, arguments: &str) -> LlmResponse {
            LlmResponse {
                tool_call: Some(ToolCallRequest::new("call_test", name, arguments)),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[voxflow_core::types::Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> LlmResponse {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                ScriptedProvider::text("(script exhausted)")
            } else {
                responses.remove(0)
            }
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn display_name(&self) -> &str {
            "ScriptedProvider"
        }
    }

    // ── Initialization ──

    #[tokio::test]
    async fn test_initialize_applies_initial_node() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        assert_eq!(engine.current_node(), "start");
        assert_eq!(engine.state(), EngineState::Active);
        assert_eq!(
            tool_names(engine.context().active_tools()),
            vec!["advance", "ping"]
        );

        let msgs = engine.context().messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[0].content, "You are a test voice agent.");
        assert_eq!(msgs[1].content, "Greet the caller.");
    }

    // ── Dispatch and transitions ──

    #[tokio::test]
    async fn test_local_tool_keeps_node() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(ToolCallRequest::new("c1", "ping", "{}"))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "start");
        assert_eq!(engine.record().pings, 1);
        // Result appended as a system message, tool set unchanged
        assert_eq!(engine.context().messages().last().unwrap().content, "pong 1");
        assert_eq!(
            tool_names(engine.context().active_tools()),
            vec!["advance", "ping"]
        );
    }

    #[tokio::test]
    async fn test_transition_swaps_tools_exactly() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(ToolCallRequest::new(
                "c1",
                "advance",
                r#"{"code": "open sesame"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "mid");
        // Active set equals exactly the new node's declared tools
        let expected = engine
            .context()
            .active_tools()
            .iter()
            .map(|d| d.function.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(expected, vec!["finish"]);

        // Handler response precedes the new node's task message
        let msgs = engine.context().messages();
        let n = msgs.len();
        assert_eq!(msgs[n - 2].content, "gate opened");
        assert_eq!(msgs[n - 1].content, "Collect the details.");
    }

    #[tokio::test]
    async fn test_failed_gate_stays_in_node() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(ToolCallRequest::new("c1", "advance", r#"{"code": "wrong"}"#))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "start");
        assert_eq!(
            tool_names(engine.context().active_tools()),
            vec!["advance", "ping"]
        );
        let last = engine.context().messages().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.contains("Wrong code"));
    }

    #[tokio::test]
    async fn test_out_of_set_call_rejected_without_record_mutation() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        // "finish" belongs to the mid node, not start
        engine
            .handle_tool_call(ToolCallRequest::new("c1", "finish", "{}"))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "start");
        assert_eq!(engine.record().pings, 0);
        let last = engine.context().messages().last().unwrap();
        assert!(last.content.contains("not available"));
    }

    #[tokio::test]
    async fn test_transcript_grows_monotonically() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        let mut lengths = vec![engine.context().len()];
        engine
            .handle_tool_call(ToolCallRequest::new("c1", "ping", "{}"))
            .await
            .unwrap();
        lengths.push(engine.context().len());
        engine.handle_user_utterance("hello").await.unwrap();
        lengths.push(engine.context().len());
        engine
            .handle_tool_call(ToolCallRequest::new("c2", "advance", r#"{"code": "open sesame"}"#))
            .await
            .unwrap();
        lengths.push(engine.context().len());

        for pair in lengths.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test]
    async fn test_tool_set_invariant_across_all_transitions() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        let graph = test_graph();
        for (call, node) in [
            (
                ToolCallRequest::new("c1", "advance", r#"{"code": "open sesame"}"#),
                "mid",
            ),
            (ToolCallRequest::new("c2", "finish", "{}"), "end"),
        ] {
            engine.handle_tool_call(call).await.unwrap();
            assert_eq!(engine.current_node(), node);
            let declared = graph.node(node).unwrap().tool_definitions();
            assert_eq!(engine.context().active_tools(), &declared[..]);
        }
    }

    // ── Run loop ──

    #[tokio::test]
    async fn test_run_session_to_completion() {
        let (tx, mut rx) = mpsc::channel(32);
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(Some(dir.path().to_path_buf())).unwrap();

        let mut engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "run-1",
            tx,
            EngineSettings::default(),
            Some(store),
        );

        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::text("Hi there!"),
            ScriptedProvider::tool("advance", r#"{"code": "open sesame"}"#),
            ScriptedProvider::tool("finish", "{}"),
            ScriptedProvider::text("Goodbye, friend."),
        ]);

        let (user_tx, mut user_rx) = mpsc::channel(8);
        user_tx
            .send(TransportEvent::utterance("let's go"))
            .await
            .unwrap();

        engine.run(&provider, &mut user_rx).await.unwrap();

        assert_eq!(engine.state(), EngineState::Ended);

        // The transport observes: greeting, goodbye, announce, then the end
        // signal — in that order, even with a zero grace delay.
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::speak("Hi there!"));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::speak("Goodbye, friend."));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::speak("Bye now."));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ended);

        // Transcript persisted as a JSON array
        let store = TranscriptStore::new(Some(dir.path().to_path_buf())).unwrap();
        let saved = store.load("run-1").unwrap();
        assert!(saved.iter().any(|m| m.content == "Goodbye, friend."));
        assert!(saved.iter().any(|m| m.role == Role::User && m.content == "let's go"));
    }

    #[tokio::test]
    async fn test_disconnect_aborts_session() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "run-2",
            tx,
            EngineSettings::default(),
            None,
        );

        let provider = ScriptedProvider::new(vec![ScriptedProvider::text("Hello?")]);
        let (user_tx, mut user_rx) = mpsc::channel(8);
        user_tx.send(TransportEvent::Disconnected).await.unwrap();

        engine.run(&provider, &mut user_rx).await.unwrap();

        assert_eq!(engine.state(), EngineState::Ended);
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::speak("Hello?"));
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ended);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_during_grace_cancels_timer() {
        let (tx, mut rx) = mpsc::channel(32);

        // A long grace delay that the disconnect must cut short
        let graph = Arc::new(
            FlowGraph::new(
                "start",
                vec![
                    Node::new("start")
                        .tool(ToolSchema::new("finish", "wrap").transitions_to("end")),
                    Node::new("end")
                        .task_message("Say goodbye.")
                        .post_action(Action::announce("Bye."))
                        .post_action(Action::terminate(30)),
                ],
            )
            .unwrap(),
        );

        let mut engine = FlowEngine::new(
            graph,
            ToolInvocationDispatcher::<TestRecord>::new(),
            TestRecord::default(),
            "run-3",
            tx,
            EngineSettings::default(),
            None,
        );

        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::tool("finish", "{}"),
            ScriptedProvider::text("Goodbye."),
        ]);

        let (user_tx, mut user_rx) = mpsc::channel(8);
        let run = async {
            engine.run(&provider, &mut user_rx).await.unwrap();
            engine.state()
        };
        let feed = async {
            // Let the goodbye flush, then hang up
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            user_tx.send(TransportEvent::Disconnected).await.unwrap();
        };

        let (state, _) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(run, feed)
        })
        .await
        .expect("disconnect must end the session well before the 30s grace");

        assert_eq!(state, EngineState::Ended);

        // Exactly one end signal
        let mut ended = 0;
        while let Ok(event) = rx.try_recv() {
            if event == EngineEvent::Ended {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn test_engine_inert_after_end() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();
        engine.finish().await;

        assert_eq!(engine.state(), EngineState::Ended);
        assert!(matches!(
            engine
                .handle_tool_call(ToolCallRequest::new("c1", "ping", "{}"))
                .await,
            Err(EngineError::SessionEnded)
        ));
        assert!(matches!(
            engine.handle_user_utterance("hello?").await,
            Err(EngineError::SessionEnded)
        ));
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let (mut engine, mut rx) = make_engine();
        engine.initialize().await.unwrap();
        engine.finish().await;
        engine.finish().await;
        engine.abort().await;

        let mut ended = 0;
        while let Ok(event) = rx.try_recv() {
            if event == EngineEvent::Ended {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn test_max_tool_rounds_forces_spoken_response() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "run-4",
            tx,
            EngineSettings {
                max_tool_rounds: 3,
                ..Default::default()
            },
            None,
        );

        // The model calls the local tool forever
        let responses: Vec<LlmResponse> = (0..10)
            .map(|_| ScriptedProvider::tool("ping", "{}"))
            .collect();
        let provider = ScriptedProvider::new(responses);

        let (_user_tx, mut user_rx) = mpsc::channel::<TransportEvent>(8);
        drop(_user_tx); // closed channel → abort after the forced response

        engine.run(&provider, &mut user_rx).await.unwrap();

        assert_eq!(engine.record().pings, 3);
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::speak(TOOL_LOOP_FALLBACK)
        );
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Ended);
    }

    #[tokio::test]
    async fn test_provider_error_speaks_fallback_not_raw_error() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "run-5",
            tx,
            EngineSettings::default(),
            None,
        );

        let provider = ScriptedProvider::new(vec![LlmResponse::error(
            "Error calling LLM: 503 upstream exploded",
        )]);

        let (_user_tx, mut user_rx) = mpsc::channel::<TransportEvent>(8);
        drop(_user_tx);

        engine.run(&provider, &mut user_rx).await.unwrap();

        match rx.recv().await.unwrap() {
            EngineEvent::Speak { text } => {
                assert!(!text.contains("503"));
                assert!(!text.contains("Error calling LLM"));
            }
            other => panic!("expected speak, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_narration_alongside_tool_call_is_spoken_first() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut engine = FlowEngine::new(
            test_graph(),
            test_dispatcher(),
            TestRecord::default(),
            "run-6",
            tx,
            EngineSettings::default(),
            None,
        );

        let provider = ScriptedProvider::new(vec![
            LlmResponse {
                content: Some("One second, checking.".to_string()),
                tool_call: Some(ToolCallRequest::new("c1", "ping", "{}")),
                ..Default::default()
            },
            ScriptedProvider::text("All good!"),
        ]);

        let (_user_tx, mut user_rx) = mpsc::channel::<TransportEvent>(8);
        drop(_user_tx);

        engine.run(&provider, &mut user_rx).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::speak("One second, checking.")
        );
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::speak("All good!"));
    }

    // ── Idempotent handler replay ──

    #[tokio::test]
    async fn test_replaying_identical_call_gives_identical_delta() {
        let (mut a, _rxa) = make_engine();
        let (mut b, _rxb) = make_engine();
        a.initialize().await.unwrap();
        b.initialize().await.unwrap();

        let call = ToolCallRequest::new("c1", "ping", "{}");
        a.handle_tool_call(call.clone()).await.unwrap();
        b.handle_tool_call(call).await.unwrap();

        assert_eq!(a.record().pings, b.record().pings);
        assert_eq!(
            a.context().messages().last(),
            b.context().messages().last()
        );
    }
}
