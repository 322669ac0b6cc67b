//! Concrete [`LlmRuntime`] backed by Anthropic's Messages API, driving
//! its own tool-call loop: call the model, invoke whatever tools it asked
//! for, feed the results back, repeat until it stops asking. The final
//! assistant text is handed to `chunk_tx` as one completed segment —
//! real incremental streaming is a transport-level concern the provider
//! API also supports, but the tool loop here only needs the final text.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapter::{LlmRuntime, RuntimeError, ToolInvoker, TurnMessage};
use crate::stream::RawChunk;
use crate::tools::ToolSpec;
use njvox_core::types::Role;

const API_VERSION: &str = "2023-06-01";
const MAX_TOOL_ITERATIONS: u32 = 6;

pub struct AnthropicRuntime {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_output_tokens: u32,
    system_prompt: String,
}

impl AnthropicRuntime {
    pub fn new(api_key: String, base_url: Option<String>, max_output_tokens: u32, system_prompt: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            max_output_tokens,
            system_prompt,
        }
    }

    async fn call(&self, model_id: &str, messages: &[Value], tools: &[ToolSpec]) -> Result<ApiResponse, RuntimeError> {
        let mut body = json!({
            "model": model_id,
            "max_tokens": self.max_output_tokens,
            "system": self.system_prompt,
            "messages": messages,
            "stream": false,
        });
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "input_schema": t.input_schema }))
                .collect();
            body["tools"] = Value::Array(tool_defs);
        }

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::Provider(e.to_string()))?;

        if resp.status().as_u16() == 400 {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("messages") && text.contains("content") {
                return Err(RuntimeError::CorruptedHistory);
            }
            return Err(RuntimeError::Provider(text));
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "anthropic API error");
            return Err(RuntimeError::Provider(format!("status {status}: {text}")));
        }

        resp.json().await.map_err(|e| RuntimeError::Provider(e.to_string()))
    }
}

fn history_to_messages(history: &[TurnMessage]) -> Vec<Value> {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": [{ "type": "text", "text": m.text }] })
        })
        .collect()
}

#[async_trait::async_trait]
impl LlmRuntime for AnthropicRuntime {
    async fn run_turn(
        &self,
        model_id: &str,
        history: &[TurnMessage],
        tools: &[ToolSpec],
        tool_invoker: ToolInvoker,
        chunk_tx: mpsc::Sender<RawChunk>,
    ) -> Result<(), RuntimeError> {
        let mut messages = history_to_messages(history);

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let response = self.call(model_id, &messages, tools).await?;

            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.clone()),
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_calls.push((id.clone(), name.clone(), input.clone()))
                    }
                    ContentBlock::Unknown => {}
                }
            }

            if tool_calls.is_empty() {
                let text = text_parts.join("");
                chunk_tx.send(RawChunk(json!({ "text": text, "partial": false }))).await.ok();
                return Ok(());
            }

            debug!(iteration, calls = tool_calls.len(), "agent runtime dispatching tool calls");

            let assistant_content: Vec<Value> = response
                .content
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
                    ContentBlock::ToolUse { id, name, input } => {
                        json!({ "type": "tool_use", "id": id, "name": name, "input": input })
                    }
                    ContentBlock::Unknown => json!({ "type": "text", "text": "" }),
                })
                .collect();
            messages.push(json!({ "role": "assistant", "content": assistant_content }));

            let mut tool_results = Vec::new();
            for (id, name, input) in tool_calls {
                let outcome = tool_invoker(name, input).await;
                tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": outcome.data.to_string(),
                    "is_error": outcome.is_error,
                }));
            }
            messages.push(json!({ "role": "user", "content": tool_results }));
        }

        Err(RuntimeError::Provider("tool loop exceeded maximum iterations".into()))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}
