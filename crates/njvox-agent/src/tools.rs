use std::sync::Arc;

use async_trait::async_trait;
use njvox_artifacts::ArtifactStore;
use njvox_campaigns::document::DocumentBody;
use njvox_core::error::{NjvoxError, Result};
use njvox_enrichment::EnrichmentCoordinator;
use njvox_remap::FieldRemapper;
use njvox_warehouse::{execute, QueryResult, WarehouseClient};
use serde_json::{json, Value};

use crate::providers::{DocumentService, GeocodeProvider, WebSearchProvider};

/// Describes one callable tool to the LLM runtime: name, prose
/// description, and the JSON Schema of its input object.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Outcome of a tool call, handed back to the runtime as the tool
/// result content for the next model turn.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub data: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        Self { data, is_error: false }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            data: json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// One tool the agent may invoke mid-turn. Each tool is a thin, typed
/// wrapper over an existing core operation.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn call(&self, owner_user_id: &str, input: Value) -> ToolOutcome;
}

fn missing_field(name: &str) -> ToolOutcome {
    ToolOutcome::err(format!("missing required field `{name}`"))
}

fn summarize_record(record: &njvox_enrichment::EnrichmentRecord) -> String {
    let mut traits = Vec::new();
    if record.has_email {
        traits.push("email");
    }
    if record.has_phone {
        traits.push("phone");
    }
    if record.has_linkedin {
        traits.push("LinkedIn profile");
    }
    if record.has_job {
        traits.push("job info");
    }
    if record.has_education {
        traits.push("education info");
    }
    if traits.is_empty() {
        format!("match likelihood {}/10, no additional fields on file", record.match_likelihood)
    } else {
        format!(
            "match likelihood {}/10, has {}",
            record.match_likelihood,
            traits.join(", ")
        )
    }
}

/// `warehouse_select` — calls the query executor with a single
/// `sql` string.
pub struct WarehouseSelectTool {
    pub client: Arc<dyn WarehouseClient>,
    pub remapper: FieldRemapper,
    pub allowlisted_tables: Vec<String>,
    pub row_cap: u64,
    pub timeout_secs: u64,
}

#[async_trait]
impl AgentTool for WarehouseSelectTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "warehouse_select",
            description: "Run a read-only SQL SELECT against the voter warehouse.",
            input_schema: json!({
                "type": "object",
                "properties": { "sql": { "type": "string" } },
                "required": ["sql"],
            }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(sql) = input.get("sql").and_then(Value::as_str) else {
            return missing_field("sql");
        };
        match execute(
            self.client.as_ref(),
            &self.allowlisted_tables,
            &self.remapper,
            sql,
            self.row_cap,
            self.timeout_secs,
            "agent-warehouse_select",
        )
        .await
        {
            Ok(result) => ToolOutcome::ok(query_result_to_json(&result)),
            Err(e) => ToolOutcome::err(e.detail),
        }
    }
}

fn query_result_to_json(result: &QueryResult) -> Value {
    json!({
        "columns": result.columns,
        "rows": result.rows,
        "row_count": result.row_count,
        "truncated": result.truncated,
        "effective_sql": result.effective_sql,
    })
}

/// `geocode` — external provider with a known-centroid fallback.
pub struct GeocodeTool {
    pub provider: Arc<dyn GeocodeProvider>,
}

#[async_trait]
impl AgentTool for GeocodeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "geocode",
            description: "Resolve a street address to latitude/longitude.",
            input_schema: json!({
                "type": "object",
                "properties": { "address": { "type": "string" } },
                "required": ["address"],
            }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(address) = input.get("address").and_then(Value::as_str) else {
            return missing_field("address");
        };
        match self.provider.geocode(address).await {
            Ok(result) => ToolOutcome::ok(serde_json::to_value(result).unwrap_or(Value::Null)),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

/// `web_search` — external, domain-biased search provider.
pub struct WebSearchTool {
    pub provider: Arc<dyn WebSearchProvider>,
}

#[async_trait]
impl AgentTool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search",
            description: "Search the web for background on a topic or person.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "n": { "type": "integer", "minimum": 1, "maximum": 20 },
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(query) = input.get("query").and_then(Value::as_str) else {
            return missing_field("query");
        };
        let n = input.get("n").and_then(Value::as_u64).unwrap_or(5) as usize;
        match self.provider.search(query, n).await {
            Ok(results) => ToolOutcome::ok(serde_json::to_value(results).unwrap_or(Value::Null)),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

/// `save_list` — persists a saved query.
pub struct SaveListTool {
    pub store: Arc<ArtifactStore>,
    pub allowlisted_tables: Vec<String>,
}

#[async_trait]
impl AgentTool for SaveListTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "save_list",
            description: "Save a named, re-executable SELECT as a list.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "sql": { "type": "string" },
                    "row_count": { "type": "integer" },
                },
                "required": ["name", "sql"],
            }),
        }
    }

    async fn call(&self, owner_user_id: &str, input: Value) -> ToolOutcome {
        let (Some(name), Some(sql)) = (
            input.get("name").and_then(Value::as_str),
            input.get("sql").and_then(Value::as_str),
        ) else {
            return missing_field("name/sql");
        };
        let description = input.get("description").and_then(Value::as_str);
        let row_count = input.get("row_count").and_then(Value::as_u64);
        match self.store.save(
            owner_user_id,
            name,
            description,
            sql,
            None,
            row_count,
            &self.allowlisted_tables,
        ) {
            Ok(saved) => ToolOutcome::ok(json!({ "list_id": saved.list_id })),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

/// `enrich_one` — single-subject enrichment.
pub struct EnrichOneTool {
    pub coordinator: Arc<EnrichmentCoordinator>,
}

#[async_trait]
impl AgentTool for EnrichOneTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "enrich_one",
            description: "Fetch, enrich, or summarize profile data for a single person.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "person_id": { "type": "string" },
                    "action": { "type": "string", "enum": ["fetch", "enrich", "summary"] },
                    "min_likelihood": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "force": { "type": "boolean" },
                },
                "required": ["person_id", "action"],
            }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(person_id) = input.get("person_id").and_then(Value::as_str) else {
            return missing_field("person_id");
        };
        let action = input.get("action").and_then(Value::as_str).unwrap_or("fetch");
        let min_likelihood = input.get("min_likelihood").and_then(Value::as_u64).map(|v| v as u8);
        let force = input.get("force").and_then(Value::as_bool).unwrap_or(false);

        if action == "fetch" || action == "summary" {
            return match self.coordinator.fetch(person_id) {
                Ok(Some(record)) if action == "summary" => ToolOutcome::ok(json!({
                    "status": "found",
                    "summary": summarize_record(&record),
                })),
                Ok(Some(record)) => ToolOutcome::ok(serde_json::to_value(&record).unwrap_or(Value::Null)),
                Ok(None) => ToolOutcome::ok(json!({ "status": "not_found" })),
                Err(e) => ToolOutcome::err(e.to_string()),
            };
        }

        match self.coordinator.enrich_one(person_id, min_likelihood, true, force).await {
            Ok(outcome) => ToolOutcome::ok(serde_json::to_value(&outcome).unwrap_or(Value::Null)),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

/// `enrich_batch` — preferred path for 3+ subjects.
pub struct EnrichBatchTool {
    pub coordinator: Arc<EnrichmentCoordinator>,
}

#[async_trait]
impl AgentTool for EnrichBatchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "enrich_batch",
            description: "Enrich many people in one provider call. Preferred for 3 or more subjects.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "person_ids": { "type": "array", "items": { "type": "string" } },
                    "min_likelihood": { "type": "integer", "minimum": 1, "maximum": 10 },
                    "skip_existing": { "type": "boolean" },
                    "force": { "type": "boolean" },
                },
                "required": ["person_ids"],
            }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(ids) = input.get("person_ids").and_then(Value::as_array) else {
            return missing_field("person_ids");
        };
        let person_ids: Vec<String> = ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        let min_likelihood = input.get("min_likelihood").and_then(Value::as_u64).map(|v| v as u8);
        let skip_existing = input.get("skip_existing").and_then(Value::as_bool).unwrap_or(true);
        let force = input.get("force").and_then(Value::as_bool).unwrap_or(false);

        match self
            .coordinator
            .enrich_batch(&person_ids, min_likelihood, skip_existing, force)
            .await
        {
            Ok(summary) => ToolOutcome::ok(serde_json::to_value(&summary).unwrap_or(Value::Null)),
            Err(e) => ToolOutcome::err(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocOp {
    Create,
    Read,
    List,
    Update,
}

impl DocOp {
    fn name(self) -> &'static str {
        match self {
            DocOp::Create => "doc_create",
            DocOp::Read => "doc_read",
            DocOp::List => "doc_list",
            DocOp::Update => "doc_update",
        }
    }
}

/// `doc_{create,read,list,update}` — delegate to an external document
/// service using the user's own credentials. One `DocTool` instance
/// per operation, all sharing the same backing [`DocumentService`].
pub struct DocTool {
    pub service: Arc<dyn DocumentService>,
    pub op: DocOp,
}

fn document_body_to_json(body: &DocumentBody) -> Value {
    json!({
        "paragraphs": body
            .paragraphs
            .iter()
            .map(|p| json!({
                "style": format!("{:?}", p.style),
                "runs": p.runs.iter().map(|r| json!({
                    "content": r.content,
                    "bold": r.bold,
                    "italic": r.italic,
                    "underline": r.underline,
                })).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    })
}

fn document_body_from_json(value: &Value) -> Result<DocumentBody> {
    use njvox_campaigns::document::{Paragraph, ParagraphStyle, TextRun};

    let paragraphs = value
        .get("paragraphs")
        .and_then(Value::as_array)
        .ok_or_else(|| NjvoxError::Internal("doc body missing `paragraphs`".into()))?
        .iter()
        .map(|p| {
            let style = match p.get("style").and_then(Value::as_str).unwrap_or("Normal") {
                "Heading1" => ParagraphStyle::Heading1,
                "Heading2" => ParagraphStyle::Heading2,
                "Heading3" => ParagraphStyle::Heading3,
                _ => ParagraphStyle::Normal,
            };
            let runs = p
                .get("runs")
                .and_then(Value::as_array)
                .map(|runs| {
                    runs.iter()
                        .map(|r| TextRun {
                            content: r.get("content").and_then(Value::as_str).unwrap_or("").to_string(),
                            bold: r.get("bold").and_then(Value::as_bool).unwrap_or(false),
                            italic: r.get("italic").and_then(Value::as_bool).unwrap_or(false),
                            underline: r.get("underline").and_then(Value::as_bool).unwrap_or(false),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Paragraph { style, runs }
        })
        .collect();
    Ok(DocumentBody { paragraphs })
}

#[async_trait]
impl AgentTool for DocTool {
    fn spec(&self) -> ToolSpec {
        let (description, properties, required): (&'static str, Value, Vec<&'static str>) = match self.op {
            DocOp::Create => (
                "Create a new document under the user's document service.",
                json!({
                    "user_token": { "type": "string" },
                    "name": { "type": "string" },
                    "body": { "type": "object" },
                }),
                vec!["user_token", "name"],
            ),
            DocOp::Read => (
                "Read a document's content by reference.",
                json!({
                    "user_token": { "type": "string" },
                    "doc_ref": { "type": "string" },
                }),
                vec!["user_token", "doc_ref"],
            ),
            DocOp::List => (
                "List the user's documents.",
                json!({ "user_token": { "type": "string" } }),
                vec!["user_token"],
            ),
            DocOp::Update => (
                "Replace a document's content by reference.",
                json!({
                    "user_token": { "type": "string" },
                    "doc_ref": { "type": "string" },
                    "body": { "type": "object" },
                }),
                vec!["user_token", "doc_ref", "body"],
            ),
        };
        ToolSpec {
            name: self.op.name(),
            description,
            input_schema: json!({ "type": "object", "properties": properties, "required": required }),
        }
    }

    async fn call(&self, _owner_user_id: &str, input: Value) -> ToolOutcome {
        let Some(token) = input.get("user_token").and_then(Value::as_str) else {
            return missing_field("user_token");
        };

        match self.op {
            DocOp::Create => {
                let name = input.get("name").and_then(Value::as_str).unwrap_or("Untitled");
                let body = match input.get("body").map(document_body_from_json) {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return ToolOutcome::err(e.to_string()),
                    None => DocumentBody::default(),
                };
                match self.service.create(token, name, &body).await {
                    Ok(meta) => ToolOutcome::ok(serde_json::to_value(meta).unwrap_or(Value::Null)),
                    Err(e) => ToolOutcome::err(e.to_string()),
                }
            }
            DocOp::Read => {
                let Some(doc_ref) = input.get("doc_ref").and_then(Value::as_str) else {
                    return missing_field("doc_ref");
                };
                match self.service.read(token, doc_ref).await {
                    Ok(body) => ToolOutcome::ok(document_body_to_json(&body)),
                    Err(e) => ToolOutcome::err(e.to_string()),
                }
            }
            DocOp::List => match self.service.list(token).await {
                Ok(docs) => ToolOutcome::ok(serde_json::to_value(docs).unwrap_or(Value::Null)),
                Err(e) => ToolOutcome::err(e.to_string()),
            },
            DocOp::Update => {
                let Some(doc_ref) = input.get("doc_ref").and_then(Value::as_str) else {
                    return missing_field("doc_ref");
                };
                let body = match input.get("body").map(document_body_from_json) {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return ToolOutcome::err(e.to_string()),
                    None => return missing_field("body"),
                };
                match self.service.update(token, doc_ref, &body).await {
                    Ok(meta) => ToolOutcome::ok(serde_json::to_value(meta).unwrap_or(Value::Null)),
                    Err(e) => ToolOutcome::err(e.to_string()),
                }
            }
        }
    }
}

/// Builds the `ToolSpec` list to advertise to the LLM runtime, independent
/// of whether any tool is actually wired up yet — useful for `/tools` style
/// introspection without constructing every collaborator.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("warehouse_select", "Run a read-only SQL SELECT against the voter warehouse."),
        ("geocode", "Resolve a street address to latitude/longitude."),
        ("web_search", "Search the web for background on a topic or person."),
        ("save_list", "Save a named, re-executable SELECT as a list."),
        ("enrich_one", "Fetch, enrich, or summarize profile data for a single person."),
        ("enrich_batch", "Enrich many people in one provider call."),
        ("doc_create", "Create a new document."),
        ("doc_read", "Read a document's content by reference."),
        ("doc_list", "List the user's documents."),
        ("doc_update", "Replace a document's content by reference."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use njvox_artifacts::ArtifactStore;
    use njvox_enrichment::{EnrichmentCoordinator, EnrichmentPolicy, EnrichmentProvider, EnrichmentQuery, EnrichmentRecord, EnrichmentStore};
    use rusqlite::Connection;

    struct NoMatchProvider;

    #[async_trait]
    impl EnrichmentProvider for NoMatchProvider {
        async fn enrich_one(&self, _query: &EnrichmentQuery) -> Result<Option<EnrichmentRecord>> {
            Ok(None)
        }

        async fn enrich_batch(
            &self,
            queries: &[EnrichmentQuery],
        ) -> Result<Vec<(String, Option<EnrichmentRecord>)>> {
            Ok(queries.iter().map(|q| (q.person_id.clone(), None)).collect())
        }
    }

    #[test]
    fn save_list_tool_rejects_non_select() {
        let store = Arc::new(ArtifactStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let tool = SaveListTool {
            store,
            allowlisted_tables: vec!["voters.voters".into()],
        };
        let outcome = futures_executor_block_on(tool.call(
            "u1",
            json!({ "name": "x", "sql": "DELETE FROM voters.voters" }),
        ));
        assert!(outcome.is_error);
    }

    #[test]
    fn enrich_one_fetch_missing_person_reports_not_found() {
        let store = Arc::new(EnrichmentStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let coordinator = Arc::new(EnrichmentCoordinator::new(
            store,
            Arc::new(NoMatchProvider),
            EnrichmentPolicy::default(),
        ));
        let tool = EnrichOneTool { coordinator };
        let outcome =
            futures_executor_block_on(tool.call("u1", json!({ "person_id": "p1", "action": "fetch" })));
        assert_eq!(outcome.data.get("status").and_then(Value::as_str), Some("not_found"));
    }

    fn futures_executor_block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }
}
