//! Thin reqwest-backed implementations of the external collaborators:
//! the warehouse, the email provider, the document service, and the
//! geocode/search/enrichment providers. None of these own business
//! logic — they translate the core crates' traits into one HTTP call
//! apiece and map transport failures onto `NjvoxError`.

use std::sync::Arc;

use async_trait::async_trait;
use njvox_agent::providers::{
    centroid_fallback, DocumentMeta, DocumentService, GeocodeProvider, GeocodeResult, WebSearchProvider,
    WebSearchResult,
};
use njvox_campaigns::document::{DocumentBody, DocumentSource};
use njvox_campaigns::email::{EmailBatch, EmailProvider};
use njvox_core::error::{NjvoxError, Result};
use njvox_core::secrets::Secrets;
use njvox_enrichment::{EnrichmentProvider, EnrichmentQuery, EnrichmentRecord};
use njvox_warehouse::{SubmitOptions, WarehouseClient, WarehouseRows, WarehouseValue};
use serde_json::Value;
use tracing::warn;

fn http_err(provider: &str, detail: impl std::fmt::Display) -> NjvoxError {
    NjvoxError::ProviderError { provider: provider.to_string(), detail: detail.to_string() }
}

fn value_from_json(v: &Value) -> WarehouseValue {
    match v {
        Value::Null => WarehouseValue::Null,
        Value::Bool(b) => WarehouseValue::Bool(*b),
        Value::Number(n) if n.is_i64() => WarehouseValue::Int(n.as_i64().unwrap()),
        Value::Number(n) => WarehouseValue::Float(n.as_f64().unwrap_or_default()),
        Value::String(s) => WarehouseValue::Text(s.clone()),
        other => WarehouseValue::Text(other.to_string()),
    }
}

/// Client for a columnar warehouse exposing a BigQuery-shaped REST query
/// endpoint: one JSON POST carrying the SQL text and a server-side
/// row/time budget returns a columns+rows table.
pub struct RestWarehouseClient {
    client: reqwest::Client,
    endpoint: String,
    secrets: Arc<Secrets>,
}

impl RestWarehouseClient {
    pub fn new(endpoint: String, secrets: Arc<Secrets>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, secrets }
    }
}

#[async_trait]
impl WarehouseClient for RestWarehouseClient {
    async fn submit(&self, sql: &str, opts: SubmitOptions) -> Result<WarehouseRows> {
        let token = self.secrets.get_or("warehouse_api_key", "");
        let body = serde_json::json!({
            "query": sql,
            "maxResults": opts.row_cap,
            "timeoutMs": opts.timeout_secs * 1000,
            "useQueryCache": opts.query_cache,
            "labels": { "caller": opts.label },
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_err("warehouse", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_err("warehouse", format!("status {status}: {text}")));
        }

        let payload: Value = resp.json().await.map_err(|e| http_err("warehouse", e))?;
        let columns: Vec<String> = payload
            .get("columns")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<WarehouseValue>> = payload
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_array)
                    .map(|row| row.iter().map(value_from_json).collect())
                    .collect()
            })
            .unwrap_or_default();
        let total_rows = payload.get("totalRows").and_then(Value::as_u64);

        Ok(WarehouseRows { columns, rows, total_rows })
    }
}

/// Transactional email provider behind a SendGrid-shaped batch send API.
pub struct RestEmailProvider {
    client: reqwest::Client,
    endpoint: String,
    secrets: Arc<Secrets>,
}

impl RestEmailProvider {
    pub fn new(endpoint: String, secrets: Arc<Secrets>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, secrets }
    }
}

#[async_trait]
impl EmailProvider for RestEmailProvider {
    async fn send(&self, batch: &EmailBatch) -> Result<()> {
        let token = self.secrets.get_or("email_api_key", "");
        let personalizations: Vec<Value> = batch
            .recipients
            .iter()
            .zip(batch.custom_args_for.iter())
            .map(|(r, args)| {
                serde_json::json!({
                    "to": [{ "email": r.email, "name": format!("{} {}", r.first_name, r.last_name) }],
                    "custom_args": args,
                })
            })
            .collect();
        let body = serde_json::json!({
            "subject": batch.subject,
            "html_body": batch.html_body,
            "personalizations": personalizations,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_err("email", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_err("email", format!("status {status}: {text}")));
        }
        Ok(())
    }
}

/// External document service, reached under the requesting user's own
/// delegated credentials. Implements both the
/// full CRUD surface ([`DocumentService`], used by the `doc_*` tools)
/// and the read-only [`DocumentSource`] the campaign engine consumes at
/// send time.
pub struct RestDocumentClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestDocumentClient {
    pub fn new(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }

    fn body_to_json(body: &DocumentBody) -> Value {
        serde_json::json!({
            "paragraphs": body.paragraphs.iter().map(|p| serde_json::json!({
                "style": format!("{:?}", p.style),
                "runs": p.runs.iter().map(|r| serde_json::json!({
                    "content": r.content, "bold": r.bold, "italic": r.italic, "underline": r.underline,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }

    fn body_from_json(v: &Value) -> DocumentBody {
        use njvox_campaigns::document::{Paragraph, ParagraphStyle, TextRun};
        let paragraphs = v
            .get("paragraphs")
            .and_then(Value::as_array)
            .map(|paras| {
                paras
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
                                        content: r.get("content").and_then(Value::as_str).unwrap_or("").into(),
                                        bold: r.get("bold").and_then(Value::as_bool).unwrap_or(false),
                                        italic: r.get("italic").and_then(Value::as_bool).unwrap_or(false),
                                        underline: r.get("underline").and_then(Value::as_bool).unwrap_or(false),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        Paragraph { style, runs }
                    })
                    .collect()
            })
            .unwrap_or_default();
        DocumentBody { paragraphs }
    }
}

#[async_trait]
impl DocumentService for RestDocumentClient {
    async fn create(&self, user_token: &str, name: &str, body: &DocumentBody) -> Result<DocumentMeta> {
        let resp = self
            .client
            .post(format!("{}/documents", self.base_url))
            .bearer_auth(user_token)
            .json(&serde_json::json!({ "name": name, "body": Self::body_to_json(body) }))
            .send()
            .await
            .map_err(|e| http_err("document-service", e))?;
        if !resp.status().is_success() {
            return Err(http_err("document-service", resp.status()));
        }
        resp.json().await.map_err(|e| http_err("document-service", e))
    }

    async fn read(&self, user_token: &str, doc_ref: &str) -> Result<DocumentBody> {
        let resp = self
            .client
            .get(format!("{}/documents/{doc_ref}", self.base_url))
            .bearer_auth(user_token)
            .send()
            .await
            .map_err(|e| http_err("document-service", e))?;
        if !resp.status().is_success() {
            return Err(http_err("document-service", resp.status()));
        }
        let payload: Value = resp.json().await.map_err(|e| http_err("document-service", e))?;
        Ok(Self::body_from_json(&payload))
    }

    async fn list(&self, user_token: &str) -> Result<Vec<DocumentMeta>> {
        let resp = self
            .client
            .get(format!("{}/documents", self.base_url))
            .bearer_auth(user_token)
            .send()
            .await
            .map_err(|e| http_err("document-service", e))?;
        if !resp.status().is_success() {
            return Err(http_err("document-service", resp.status()));
        }
        resp.json().await.map_err(|e| http_err("document-service", e))
    }

    async fn update(&self, user_token: &str, doc_ref: &str, body: &DocumentBody) -> Result<DocumentMeta> {
        let resp = self
            .client
            .put(format!("{}/documents/{doc_ref}", self.base_url))
            .bearer_auth(user_token)
            .json(&serde_json::json!({ "body": Self::body_to_json(body) }))
            .send()
            .await
            .map_err(|e| http_err("document-service", e))?;
        if !resp.status().is_success() {
            return Err(http_err("document-service", resp.status()));
        }
        resp.json().await.map_err(|e| http_err("document-service", e))
    }
}

/// Read-only facade over [`RestDocumentClient`] for the campaign engine,
/// which never authenticates as a particular user — it reads under a
/// service-level credential resolved from secrets.
pub struct ServiceDocumentSource {
    inner: RestDocumentClient,
    secrets: Arc<Secrets>,
}

impl ServiceDocumentSource {
    pub fn new(base_url: String, secrets: Arc<Secrets>) -> Self {
        Self { inner: RestDocumentClient::new(base_url), secrets }
    }
}

#[async_trait]
impl DocumentSource for ServiceDocumentSource {
    async fn read(&self, doc_ref: &str) -> Result<DocumentBody> {
        let token = self.secrets.get_or("document_service_token", "");
        self.inner.read(&token, doc_ref).await
    }
}

/// Geocoder with a fallback to [`centroid_fallback`] when the live
/// provider errors or is unreachable.
pub struct RestGeocodeProvider {
    client: reqwest::Client,
    endpoint: String,
    secrets: Arc<Secrets>,
}

impl RestGeocodeProvider {
    pub fn new(endpoint: String, secrets: Arc<Secrets>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, secrets }
    }
}

#[async_trait]
impl GeocodeProvider for RestGeocodeProvider {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult> {
        let key = self.secrets.get_or("geocoding_api_key", "");
        let attempt = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", &key)])
            .send()
            .await;

        match attempt {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<GeocodeResult>().await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        warn!(error = %e, "geocode response did not parse, falling back");
                        centroid_fallback(address).ok_or_else(|| http_err("geocode", e))
                    }
                }
            }
            other => {
                warn!(?other, "geocode provider unavailable, falling back to centroid table");
                centroid_fallback(address).ok_or_else(|| http_err("geocode", "provider unavailable and no centroid match"))
            }
        }
    }
}

/// Domain-biased web search (`web_search` tool), reached over a single
/// REST endpoint.
pub struct RestWebSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    secrets: Arc<Secrets>,
}

impl RestWebSearchProvider {
    pub fn new(endpoint: String, secrets: Arc<Secrets>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, secrets }
    }
}

#[async_trait]
impl WebSearchProvider for RestWebSearchProvider {
    async fn search(&self, query: &str, n: usize) -> Result<Vec<WebSearchResult>> {
        let key = self.secrets.get_or("search_api_key", "");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("n", &n.to_string()), ("key", &key)])
            .send()
            .await
            .map_err(|e| http_err("web-search", e))?;
        if !resp.status().is_success() {
            return Err(http_err("web-search", resp.status()));
        }
        resp.json().await.map_err(|e| http_err("web-search", e))
    }
}

/// Third-party enrichment provider (`enrich_one`/`enrich_batch` with
/// a likelihood threshold).
pub struct RestEnrichmentProvider {
    client: reqwest::Client,
    endpoint: String,
    secrets: Arc<Secrets>,
}

impl RestEnrichmentProvider {
    pub fn new(endpoint: String, secrets: Arc<Secrets>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, secrets }
    }
}

#[async_trait]
impl EnrichmentProvider for RestEnrichmentProvider {
    async fn enrich_one(&self, query: &EnrichmentQuery) -> Result<Option<EnrichmentRecord>> {
        let key = self.secrets.get_or("enrichment_api_key", "");
        let resp = self
            .client
            .post(format!("{}/enrich", self.endpoint))
            .bearer_auth(key)
            .json(&serde_json::json!({
                "person_id": query.person_id,
                "min_likelihood": query.min_likelihood,
            }))
            .send()
            .await
            .map_err(|e| http_err("enrichment", e))?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(http_err("enrichment", resp.status()));
        }
        resp.json().await.map_err(|e| http_err("enrichment", e))
    }

    async fn enrich_batch(&self, queries: &[EnrichmentQuery]) -> Result<Vec<(String, Option<EnrichmentRecord>)>> {
        let key = self.secrets.get_or("enrichment_api_key", "");
        let payload: Vec<Value> = queries
            .iter()
            .map(|q| serde_json::json!({ "person_id": q.person_id, "min_likelihood": q.min_likelihood }))
            .collect();
        let resp = self
            .client
            .post(format!("{}/enrich/batch", self.endpoint))
            .bearer_auth(key)
            .json(&serde_json::json!({ "queries": payload }))
            .send()
            .await
            .map_err(|e| http_err("enrichment", e))?;
        if !resp.status().is_success() {
            return Err(http_err("enrichment", resp.status()));
        }
        let results: Vec<(String, Option<EnrichmentRecord>)> =
            resp.json().await.map_err(|e| http_err("enrichment", e))?;
        Ok(results)
    }
}
