use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use njvox_core::types::Role;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::cache::AgentInstanceCache;
use crate::stream::{RawChunk, StreamExtractor};
use crate::tools::{AgentTool, ToolOutcome, ToolSpec};

/// One turn of prior conversation handed to the runtime as context.
#[derive(Debug, Clone)]
pub struct TurnMessage {
    pub role: Role,
    pub text: String,
}

/// Invokes a tool by name with its JSON input, dispatching to whichever
/// [`AgentTool`] the adapter registered under that name.
pub type ToolInvoker =
    Arc<dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = ToolOutcome> + Send>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent runtime provider error: {0}")]
    Provider(String),
    /// Mixed content-type errors that indicate the conversation history
    /// handed to the runtime is no longer well-formed.
    #[error("conversation history is corrupted")]
    CorruptedHistory,
}

/// The tool-calling LLM runtime the adapter wraps. A real implementation
/// drives the provider's tool-call loop, invoking `tool_invoker` for each
/// tool call the model makes and streaming raw chunks of the final
/// assistant text to `chunk_tx`.
#[async_trait::async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn run_turn(
        &self,
        model_id: &str,
        history: &[TurnMessage],
        tools: &[ToolSpec],
        tool_invoker: ToolInvoker,
        chunk_tx: mpsc::Sender<RawChunk>,
    ) -> Result<(), RuntimeError>;
}

/// What a completed turn produced, from the orchestrator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantOutcome {
    Text(String),
    /// The runtime reported corrupted history; the session's agent
    /// instance has already been evicted. The orchestrator should tell
    /// the user to start a new session.
    StartNewSession,
}

type RuntimeFactory = dyn Fn(&str) -> Arc<dyn LlmRuntime> + Send + Sync;

/// Wraps a tool-calling LLM runtime: exposes the core's operations as
/// tools, normalizes its streaming output, and keeps one live instance
/// per session.
pub struct AgentAdapter {
    cache: AgentInstanceCache<Arc<dyn LlmRuntime>>,
    factory: Arc<RuntimeFactory>,
    tools: Vec<Arc<dyn AgentTool>>,
}

impl AgentAdapter {
    pub fn new(
        factory: Arc<RuntimeFactory>,
        tools: Vec<Arc<dyn AgentTool>>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            cache: AgentInstanceCache::new(cache_capacity),
            factory,
            tools,
        }
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    fn build_invoker(&self, owner_user_id: &str) -> ToolInvoker {
        let tools = self.tools.clone();
        let owner_user_id = owner_user_id.to_string();
        Arc::new(move |name: String, input: Value| {
            let tools = tools.clone();
            let owner_user_id = owner_user_id.clone();
            Box::pin(async move {
                match tools.iter().find(|t| t.spec().name == name) {
                    Some(tool) => tool.call(&owner_user_id, input).await,
                    None => ToolOutcome::err(format!("unknown tool `{name}`")),
                }
            }) as Pin<Box<dyn Future<Output = ToolOutcome> + Send>>
        })
    }

    /// Runs one assistant turn for `session_id`, reusing a cached
    /// runtime instance when the model hasn't changed. Never returns an
    /// error — runtime failures become a user-facing apology or, for
    /// corrupted history, [`AssistantOutcome::StartNewSession`].
    pub async fn respond(
        &self,
        session_id: &str,
        owner_user_id: &str,
        model_id: &str,
        history: &[TurnMessage],
    ) -> AssistantOutcome {
        self.respond_streaming(session_id, owner_user_id, model_id, history, |_| {}).await
    }

    /// Like [`Self::respond`], but calls `on_chunk` with each segment as
    /// soon as it closes out, before the turn finishes. Lets a caller
    /// forward partial assistant text to a client while the runtime is
    /// still generating, rather than waiting for the whole turn.
    pub async fn respond_streaming(
        &self,
        session_id: &str,
        owner_user_id: &str,
        model_id: &str,
        history: &[TurnMessage],
        mut on_chunk: impl FnMut(&str),
    ) -> AssistantOutcome {
        let runtime = match self.cache.get(session_id, model_id) {
            Some(r) => r,
            None => {
                let built = (self.factory)(model_id);
                self.cache.insert(session_id, model_id, built.clone());
                built
            }
        };

        let (tx, mut rx) = mpsc::channel(64);
        let tool_specs = self.tool_specs();
        let invoker = self.build_invoker(owner_user_id);
        let history = history.to_vec();
        let model = model_id.to_string();

        let run = tokio::spawn(async move {
            runtime.run_turn(&model, &history, &tool_specs, invoker, tx).await
        });

        let mut extractor = StreamExtractor::new();
        while let Some(chunk) = rx.recv().await {
            if let Some(segment) = extractor.feed(&chunk).await {
                on_chunk(&segment);
            }
        }

        match run.await {
            Ok(Ok(())) => AssistantOutcome::Text(extractor.finish()),
            Ok(Err(RuntimeError::CorruptedHistory)) => {
                warn!(session_id, "corrupted conversation history, evicting session instance");
                self.cache.evict(session_id);
                AssistantOutcome::StartNewSession
            }
            Ok(Err(RuntimeError::Provider(message))) => {
                warn!(session_id, error = %message, "agent runtime provider error");
                AssistantOutcome::Text(
                    "Something went wrong answering that — please try again.".to_string(),
                )
            }
            Err(join_err) => {
                warn!(session_id, error = %join_err, "agent runtime task did not complete cleanly");
                AssistantOutcome::Text(
                    "Something went wrong answering that — please try again.".to_string(),
                )
            }
        }
    }

    /// Runs a turn on a dedicated task, forwarding each completed segment
    /// over an unbounded channel as it arrives. Lets a caller `.await` the
    /// next chunk on its own schedule instead of supplying a synchronous
    /// callback, which matters when forwarding to an async transport sink.
    pub fn spawn_respond(
        self: &Arc<Self>,
        session_id: String,
        owner_user_id: String,
        model_id: String,
        history: Vec<TurnMessage>,
    ) -> (mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<AssistantOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.respond_streaming(&session_id, &owner_user_id, &model_id, &history, |segment| {
                let _ = tx.send(segment.to_string());
            })
            .await
        });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoRuntime {
        corrupt: bool,
    }

    #[async_trait::async_trait]
    impl LlmRuntime for EchoRuntime {
        async fn run_turn(
            &self,
            _model_id: &str,
            history: &[TurnMessage],
            _tools: &[ToolSpec],
            _tool_invoker: ToolInvoker,
            chunk_tx: mpsc::Sender<RawChunk>,
        ) -> Result<(), RuntimeError> {
            if self.corrupt {
                return Err(RuntimeError::CorruptedHistory);
            }
            let last = history.last().map(|m| m.text.clone()).unwrap_or_default();
            chunk_tx
                .send(RawChunk(json!({ "text": format!("echo: {last}"), "partial": false })))
                .await
                .ok();
            Ok(())
        }
    }

    fn adapter(corrupt: bool) -> AgentAdapter {
        AgentAdapter::new(
            Arc::new(move |_model_id: &str| Arc::new(EchoRuntime { corrupt }) as Arc<dyn LlmRuntime>),
            Vec::new(),
            8,
        )
    }

    #[tokio::test]
    async fn echoes_back_last_message() {
        let a = adapter(false);
        let history = vec![TurnMessage { role: Role::User, text: "hi".into() }];
        let outcome = a.respond("s1", "u1", "model-a", &history).await;
        assert_eq!(outcome, AssistantOutcome::Text("echo: hi".into()));
    }

    #[tokio::test]
    async fn corrupted_history_evicts_and_signals_new_session() {
        let a = adapter(true);
        let outcome = a.respond("s1", "u1", "model-a", &[]).await;
        assert_eq!(outcome, AssistantOutcome::StartNewSession);
        assert!(a.cache.get("s1", "model-a").is_none());
    }

    #[tokio::test]
    async fn reuses_cached_instance_for_same_model() {
        let a = adapter(false);
        let history = vec![TurnMessage { role: Role::User, text: "a".into() }];
        a.respond("s1", "u1", "model-a", &history).await;
        assert!(a.cache.get("s1", "model-a").is_some());
    }

    #[tokio::test]
    async fn respond_streaming_forwards_chunks_before_finishing() {
        let a = adapter(false);
        let history = vec![TurnMessage { role: Role::User, text: "hi".into() }];
        let mut seen = Vec::new();
        let outcome = a
            .respond_streaming("s1", "u1", "model-a", &history, |segment| {
                seen.push(segment.to_string());
            })
            .await;
        assert_eq!(seen, vec!["echo: hi".to_string()]);
        assert_eq!(outcome, AssistantOutcome::Text("echo: hi".into()));
    }

    #[tokio::test]
    async fn spawn_respond_delivers_chunks_over_channel() {
        let a = Arc::new(adapter(false));
        let history = vec![TurnMessage { role: Role::User, text: "hi".into() }];
        let (mut rx, handle) =
            a.spawn_respond("s1".into(), "u1".into(), "model-a".into(), history);

        let first = rx.recv().await;
        assert_eq!(first, Some("echo: hi".to_string()));
        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.await.unwrap(), AssistantOutcome::Text("echo: hi".into()));
    }
}
