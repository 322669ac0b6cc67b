use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use njvox_agent::{AgentAdapter, AssistantOutcome, TurnMessage};
use njvox_core::error::NjvoxError;
use njvox_core::types::Role;
use njvox_protocol::events::{
    MessageChunkEvent, MessageConfirmedEvent, MessageEndEvent, MessageRecoveryEvent, SessionCreatedEvent,
};
use njvox_protocol::frames::EventFrame;
use njvox_sessions::SessionStore;
use tracing::{info, warn};

use crate::sink::TurnSink;
use crate::types::InFlightTurn;

/// Orphaned `InFlightTurn`s older than this are reclaimed by the GC timer.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);
/// How often the GC timer sweeps the in-flight registry.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

const EVENT_SESSION_CREATED: &str = "session_created";
const EVENT_MESSAGE_CONFIRMED: &str = "message_confirmed";
const EVENT_MESSAGE_CHUNK: &str = "message_chunk";
const EVENT_MESSAGE_END: &str = "message_end";
const EVENT_MESSAGE_RECOVERY: &str = "message_recovery";
const EVENT_ERROR: &str = "error";

/// Drives one assistant turn end to end: session bookkeeping, the agent
/// call, chunk fan-out to the transport, and in-flight-turn recovery.
/// Transport-agnostic — a WS gateway and the dev CLI both drive turns
/// through the same orchestrator via their own [`TurnSink`].
pub struct ChatOrchestrator {
    sessions: Arc<SessionStore>,
    agent: Arc<AgentAdapter>,
    in_flight: DashMap<String, Arc<InFlightTurn>>,
    retention: Duration,
}

impl ChatOrchestrator {
    pub fn new(sessions: Arc<SessionStore>, agent: Arc<AgentAdapter>) -> Self {
        Self::with_retention(sessions, agent, DEFAULT_RETENTION)
    }

    pub fn with_retention(sessions: Arc<SessionStore>, agent: Arc<AgentAdapter>, retention: Duration) -> Self {
        Self {
            sessions,
            agent,
            in_flight: DashMap::new(),
            retention,
        }
    }

    /// `handle_turn`. Never propagates an error past this call —
    /// failures become an `error` event or an apology chunk, matching the
    /// "no exception escapes a turn boundary" policy.
    pub async fn handle_turn(
        &self,
        sink: &dyn TurnSink,
        transport_sid: &str,
        user_id: &str,
        session_id: Option<&str>,
        model_id: Option<&str>,
        user_text: &str,
    ) {
        let (session_id, model_id) = match self.resolve_session(sink, user_id, session_id, model_id, user_text).await {
            Some(pair) => pair,
            None => return,
        };

        let user_message = match self.sessions.append_message(&session_id, Role::User, user_text) {
            Ok(m) => m,
            Err(e) => {
                warn!(session_id, error = %e, "failed to append user message");
                self.send_error(sink, &session_id, &e).await;
                return;
            }
        };

        self.send_event(
            sink,
            EVENT_MESSAGE_CONFIRMED,
            MessageConfirmedEvent {
                session_id: session_id.clone(),
                message_id: user_message.message_id.clone(),
                sequence_number: user_message.sequence_number as u64,
                message_type: "user",
            },
        )
        .await;

        let turn = Arc::new(InFlightTurn::new(user_message.message_id.clone(), transport_sid.to_string()));
        self.in_flight.insert(session_id.clone(), Arc::clone(&turn));

        let history = match self.load_history(&session_id) {
            Ok(h) => h,
            Err(e) => {
                warn!(session_id, error = %e, "failed to load session history");
                self.in_flight.remove(&session_id);
                self.send_error(sink, &session_id, &e).await;
                return;
            }
        };

        let (mut rx, handle) =
            self.agent.spawn_respond(session_id.clone(), user_id.to_string(), model_id, history);

        // keep draining even after the sink reports closed, so the
        // final text is still correct for persistence and recovery.
        let mut transport_connected = true;
        let assistant_message_id = njvox_core::types::Oid::new().to_string();

        while let Some(segment) = rx.recv().await {
            let seq = turn.record_chunk(&segment);
            if transport_connected {
                let sent = self
                    .send_event(
                        sink,
                        EVENT_MESSAGE_CHUNK,
                        MessageChunkEvent {
                            chunk: segment,
                            sequence: seq,
                            session_id: session_id.clone(),
                            message_id: assistant_message_id.clone(),
                        },
                    )
                    .await;
                if !sent {
                    transport_connected = false;
                }
            }
        }

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                warn!(session_id, error = %join_err, "agent task did not complete cleanly");
                AssistantOutcome::Text("Something went wrong answering that — please try again.".to_string())
            }
        };

        let assistant_text = match outcome {
            AssistantOutcome::Text(text) => text,
            AssistantOutcome::StartNewSession => {
                "This conversation ran into trouble and needs to restart — please send your message again in a new session.".to_string()
            }
        };

        if let Err(e) = self.sessions.append_message(&session_id, Role::Assistant, &assistant_text) {
            warn!(session_id, error = %e, "failed to persist assistant message");
        }

        self.in_flight.remove(&session_id);

        if transport_connected {
            self.send_event(
                sink,
                EVENT_MESSAGE_END,
                MessageEndEvent { session_id: session_id.clone(), message_id: assistant_message_id },
            )
            .await;
        }
    }

    /// step 8: replays the partial buffer for a reconnecting client.
    pub async fn recover(&self, sink: &dyn TurnSink, session_id: &str) {
        let event = match self.in_flight.get(session_id) {
            Some(turn) => MessageRecoveryEvent {
                session_id: session_id.to_string(),
                recovered_text: turn.partial_text(),
                is_complete: false,
            },
            None => MessageRecoveryEvent {
                session_id: session_id.to_string(),
                recovered_text: String::new(),
                is_complete: true,
            },
        };
        self.send_event(sink, EVENT_MESSAGE_RECOVERY, event).await;
    }

    /// Creates the session if `session_id` is absent, or validates
    /// ownership of an existing one. Returns `None` (after emitting an
    /// error) when the turn cannot proceed.
    async fn resolve_session(
        &self,
        sink: &dyn TurnSink,
        user_id: &str,
        session_id: Option<&str>,
        model_id: Option<&str>,
        user_text: &str,
    ) -> Option<(String, String)> {
        match session_id {
            None => {
                let model = model_id.unwrap_or(crate::DEFAULT_MODEL_ID);
                match self.sessions.create_session(user_id, user_text, model) {
                    Ok(session) => {
                        self.send_event(
                            sink,
                            EVENT_SESSION_CREATED,
                            SessionCreatedEvent {
                                session_id: session.session_id.clone(),
                                session_name: session.name.clone(),
                            },
                        )
                        .await;
                        Some((session.session_id, session.model_id))
                    }
                    Err(e) => {
                        warn!(user_id, error = %e, "failed to create session");
                        self.send_error(sink, "", &e).await;
                        None
                    }
                }
            }
            Some(sid) => match self.sessions.get_session(sid, user_id) {
                // The session's stored model_id is authoritative here —
                // changing it is `update_session_model`'s job, not a
                // side effect of the model_id a client happens to send
                // along with a message.
                Ok(Some(session)) => Some((session.session_id, session.model_id)),
                Ok(None) => {
                    let err = NjvoxError::AuthzDenied(format!("session {sid} not accessible"));
                    self.send_error(sink, sid, &err).await;
                    None
                }
                Err(e) => {
                    warn!(session_id = sid, error = %e, "failed to look up session");
                    self.send_error(sink, sid, &e).await;
                    None
                }
            },
        }
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<TurnMessage>, NjvoxError> {
        Ok(self
            .sessions
            .list_messages(session_id)?
            .into_iter()
            .map(|m| TurnMessage { role: m.role, text: m.text })
            .collect())
    }

    /// Sends an event, swallowing the "closed" case into `false` so
    /// callers can flip their local connected-state flag.
    async fn send_event(&self, sink: &dyn TurnSink, event: &str, payload: impl serde::Serialize) -> bool {
        sink.emit(EventFrame::new(event, payload)).await.is_ok()
    }

    async fn send_error(&self, sink: &dyn TurnSink, session_id: &str, error: &NjvoxError) {
        let session_id = if session_id.is_empty() { None } else { Some(session_id.to_string()) };
        let _ = sink
            .emit(EventFrame::new(
                EVENT_ERROR,
                njvox_protocol::events::ErrorEvent {
                    code: error.code().to_string(),
                    message: error.to_string(),
                    session_id,
                },
            ))
            .await;
    }

    /// Spawns the GC timer described in evicts `InFlightTurn`s older
    /// than the configured retention. Under normal operation turns are
    /// removed by `handle_turn` itself on completion; anything still
    /// around past retention is orphaned (e.g. a panicked turn task) and
    /// would otherwise leak memory under client churn.
    pub fn spawn_gc(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.sweep_expired();
            }
        })
    }

    fn sweep_expired(&self) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|e| e.age() > self.retention)
            .map(|e| e.key().clone())
            .collect();
        for session_id in expired {
            info!(session_id, "evicting orphaned in-flight turn");
            self.in_flight.remove(&session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use njvox_agent::{RawChunk, RuntimeError, ToolInvoker, ToolSpec};
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc as tokio_mpsc;

    struct EchoRuntime {
        corrupt: bool,
    }

    #[async_trait::async_trait]
    impl njvox_agent::LlmRuntime for EchoRuntime {
        async fn run_turn(
            &self,
            _model_id: &str,
            history: &[TurnMessage],
            _tools: &[ToolSpec],
            _tool_invoker: ToolInvoker,
            chunk_tx: tokio_mpsc::Sender<RawChunk>,
        ) -> Result<(), RuntimeError> {
            if self.corrupt {
                return Err(RuntimeError::CorruptedHistory);
            }
            let last = history.last().map(|m| m.text.clone()).unwrap_or_default();
            chunk_tx
                .send(RawChunk(serde_json::json!({ "text": format!("echo: {last}"), "partial": false })))
                .await
                .ok();
            Ok(())
        }
    }

    struct MultiChunkRuntime;

    #[async_trait::async_trait]
    impl njvox_agent::LlmRuntime for MultiChunkRuntime {
        async fn run_turn(
            &self,
            _model_id: &str,
            _history: &[TurnMessage],
            _tools: &[ToolSpec],
            _tool_invoker: ToolInvoker,
            chunk_tx: tokio_mpsc::Sender<RawChunk>,
        ) -> Result<(), RuntimeError> {
            for word in ["one ", "two ", "three"] {
                chunk_tx
                    .send(RawChunk(serde_json::json!({ "text": word, "partial": false })))
                    .await
                    .ok();
            }
            Ok(())
        }
    }

    struct RecordingSink {
        events: StdMutex<Vec<EventFrame>>,
        closed: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { events: StdMutex::new(Vec::new()), closed: false }
        }

        fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.event == name)
                .filter_map(|e| e.payload.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl TurnSink for RecordingSink {
        async fn emit(&self, event: EventFrame) -> Result<(), SinkClosed> {
            if self.closed {
                return Err(SinkClosed);
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// A sink that accepts `remaining` more emits before reporting closed
    /// on every call after — models a client that disconnects mid-stream.
    struct ClosingAfterSink {
        remaining: StdMutex<usize>,
        events: StdMutex<Vec<EventFrame>>,
    }

    impl ClosingAfterSink {
        fn new(remaining: usize) -> Self {
            Self { remaining: StdMutex::new(remaining), events: StdMutex::new(Vec::new()) }
        }

        fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.event == name)
                .filter_map(|e| e.payload.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl TurnSink for ClosingAfterSink {
        async fn emit(&self, event: EventFrame) -> Result<(), SinkClosed> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(SinkClosed);
            }
            *remaining -= 1;
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn test_orchestrator(corrupt: bool) -> ChatOrchestrator {
        let sessions = Arc::new(SessionStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let agent = Arc::new(AgentAdapter::new(
            Arc::new(move |_model_id: &str| {
                Arc::new(EchoRuntime { corrupt }) as Arc<dyn njvox_agent::LlmRuntime>
            }),
            Vec::new(),
            8,
        ));
        ChatOrchestrator::new(sessions, agent)
    }

    #[tokio::test]
    async fn new_session_emits_created_confirmed_chunk_and_end() {
        let orch = test_orchestrator(false);
        let sink = RecordingSink::new();
        orch.handle_turn(&sink, "conn-1", "user-1", None, Some("model-a"), "hello there").await;

        assert_eq!(sink.events_named(EVENT_SESSION_CREATED).len(), 1);
        assert_eq!(sink.events_named(EVENT_MESSAGE_CONFIRMED).len(), 1);
        let chunks = sink.events_named(EVENT_MESSAGE_CHUNK);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0]["chunk"], "echo: hello there");
        assert_eq!(sink.events_named(EVENT_MESSAGE_END).len(), 1);
        assert!(orch.in_flight.is_empty());
    }

    #[tokio::test]
    async fn unknown_session_id_emits_authz_error_without_mutation() {
        let orch = test_orchestrator(false);
        let sink = RecordingSink::new();
        orch.handle_turn(&sink, "conn-1", "user-1", Some("nope"), None, "hi").await;

        let errors = sink.events_named(EVENT_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["code"], "AUTHZ_DENIED");
        assert!(sink.events_named(EVENT_MESSAGE_CONFIRMED).is_empty());
    }

    #[tokio::test]
    async fn corrupted_history_still_persists_and_ends_turn() {
        let orch = test_orchestrator(true);
        let sink = RecordingSink::new();
        orch.handle_turn(&sink, "conn-1", "user-1", None, Some("model-a"), "hi").await;

        assert_eq!(sink.events_named(EVENT_MESSAGE_END).len(), 1);
        let created = sink.events_named(EVENT_SESSION_CREATED);
        let session_id = created[0]["session_id"].as_str().unwrap().to_string();
        let messages = orch.sessions.list_messages(&session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].text.contains("start a new session") || messages[1].text.contains("new session"));
    }

    #[tokio::test]
    async fn recover_with_no_in_flight_turn_reports_complete() {
        let orch = test_orchestrator(false);
        let sink = RecordingSink::new();
        orch.recover(&sink, "missing-session").await;

        let events = sink.events_named(EVENT_MESSAGE_RECOVERY);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["is_complete"], true);
        assert_eq!(events[0]["recovered_text"], "");
    }

    #[tokio::test]
    async fn disconnect_mid_stream_stops_emitting_but_still_persists_full_text() {
        let sessions = Arc::new(SessionStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let agent = Arc::new(AgentAdapter::new(
            Arc::new(|_model_id: &str| Arc::new(MultiChunkRuntime) as Arc<dyn njvox_agent::LlmRuntime>),
            Vec::new(),
            8,
        ));
        let orch = ChatOrchestrator::new(sessions, agent);

        // allows session_created + message_confirmed + the first chunk
        // through, then reports closed for everything else.
        let sink = ClosingAfterSink::new(3);
        orch.handle_turn(&sink, "conn-1", "user-1", None, Some("model-a"), "go").await;

        assert_eq!(sink.events_named(EVENT_MESSAGE_CHUNK).len(), 1);
        assert!(sink.events_named(EVENT_MESSAGE_END).is_empty());

        let created = sink.events_named(EVENT_SESSION_CREATED);
        let session_id = created[0]["session_id"].as_str().unwrap().to_string();
        let messages = orch.sessions.list_messages(&session_id).unwrap();
        assert_eq!(messages[1].text, "one two three");
        assert!(orch.in_flight.is_empty());
    }

    #[tokio::test]
    async fn gc_sweeps_turns_older_than_retention() {
        let orch = test_orchestrator(false);
        orch.in_flight.insert(
            "stuck-session".to_string(),
            Arc::new(InFlightTurn::new("m1".to_string(), "conn-1".to_string())),
        );
        // retention of 0 makes every in-flight turn immediately eligible.
        let orch = ChatOrchestrator { retention: Duration::from_secs(0), ..orch };
        orch.sweep_expired();
        assert!(orch.in_flight.is_empty());
    }
}
