use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use njvox_agent::{AgentAdapter, AnthropicRuntime, DocTool, DocOp, EnrichBatchTool, EnrichOneTool, GeocodeTool, SaveListTool, WarehouseSelectTool, WebSearchTool};
use njvox_artifacts::ArtifactStore;
use njvox_campaigns::recipients::PersonIdRecovery;
use njvox_campaigns::CampaignEngine;
use njvox_chat::ChatOrchestrator;
use njvox_core::config::NjvoxConfig;
use njvox_core::secrets::Secrets;
use njvox_enrichment::{EnrichmentCoordinator, EnrichmentPolicy, EnrichmentStore};
use njvox_remap::FieldRemapper;
use njvox_sessions::SessionStore;
use njvox_warehouse::WarehouseClient;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;

use crate::providers::{
    RestDocumentClient, RestEmailProvider, RestEnrichmentProvider, RestGeocodeProvider, RestWarehouseClient,
    RestWebSearchProvider, ServiceDocumentSource,
};

/// Everything an agent turn needs to resolve `person_id` and join back
/// to contact fields when sending a campaign — schema-specific, so it's
/// derived from config rather than guessed by the engine.
pub struct WarehouseLayout {
    pub allowlisted_tables: Vec<String>,
    pub protected_tables: Vec<String>,
    pub row_cap: u64,
    pub query_timeout_secs: u64,
    pub contact_table: String,
    pub person_id_recovery: PersonIdRecovery,
}

/// Bundles every subsystem the HTTP and WS handlers need. Constructed
/// once at startup and shared behind `Arc` (collaborators other than
/// the session store and artifact store are safe to call concurrently).
pub struct AppState {
    pub config: NjvoxConfig,
    pub secrets: Arc<Secrets>,
    pub sessions: Arc<SessionStore>,
    pub chat: Arc<ChatOrchestrator>,
    pub agent: Arc<AgentAdapter>,
    pub artifacts: Arc<ArtifactStore>,
    pub campaigns: Arc<CampaignEngine>,
    pub enrichment: Arc<EnrichmentCoordinator>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub remapper: FieldRemapper,
    pub layout: WarehouseLayout,
}

impl AppState {
    pub fn new(config: NjvoxConfig, secrets: Arc<Secrets>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(
            std::path::Path::new(&config.database.path)
                .parent()
                .unwrap_or_else(|| std::path::Path::new(".")),
        )
        .ok();

        let sessions = Arc::new(SessionStore::new(Connection::open(&config.database.path)?)?);
        let artifacts = Arc::new(ArtifactStore::new(Connection::open(&config.database.path)?)?);
        let campaign_store = Arc::new(njvox_campaigns::store::CampaignStore::new(Connection::open(&config.database.path)?)?);
        let enrichment_store = Arc::new(EnrichmentStore::new(Connection::open(&config.database.path)?)?);

        let remapper = FieldRemapper::nj_voter_defaults();

        let warehouse: Arc<dyn WarehouseClient> = Arc::new(RestWarehouseClient::new(
            secrets.get_or("warehouse_endpoint", "https://warehouse.internal/query"),
            secrets.clone(),
        ));

        let email_provider = Arc::new(RestEmailProvider::new(
            secrets.get_or("email_endpoint", "https://email.internal/send"),
            secrets.clone(),
        ));
        let document_source = Arc::new(ServiceDocumentSource::new(
            secrets.get_or("document_service_endpoint", "https://docs.internal"),
            secrets.clone(),
        ));
        let document_service = Arc::new(RestDocumentClient::new(
            secrets.get_or("document_service_endpoint", "https://docs.internal"),
        ));
        let geocode_provider = Arc::new(RestGeocodeProvider::new(
            secrets.get_or("geocoding_endpoint", "https://geocode.internal/lookup"),
            secrets.clone(),
        ));
        let search_provider = Arc::new(RestWebSearchProvider::new(
            secrets.get_or("search_endpoint", "https://search.internal/query"),
            secrets.clone(),
        ));
        let enrichment_provider = Arc::new(RestEnrichmentProvider::new(
            secrets.get_or("enrichment_endpoint", "https://enrichment.internal"),
            secrets.clone(),
        ));

        let enrichment_policy = EnrichmentPolicy {
            cost_per_enrichment: config.budgets.cost_per_enrichment,
            daily_budget: config.budgets.daily_enrichment_budget,
            confirmation_threshold: config.budgets.session_confirmation_threshold,
            staleness_days: config.budgets.staleness_days,
        };
        let enrichment = Arc::new(EnrichmentCoordinator::new(enrichment_store, enrichment_provider, enrichment_policy));

        let campaigns = Arc::new(CampaignEngine::new(
            campaign_store,
            email_provider,
            document_source,
            warehouse.clone(),
            remapper.clone(),
        ));

        let allowlisted_tables = config.warehouse.allowlisted_tables.clone();
        let layout = WarehouseLayout {
            allowlisted_tables: allowlisted_tables.clone(),
            protected_tables: config.warehouse.protected_tables.clone(),
            row_cap: config.warehouse.row_cap,
            query_timeout_secs: config.warehouse.query_timeout_secs,
            contact_table: format!("{}.{}.voters", config.warehouse.project_id, config.warehouse.dataset),
            person_id_recovery: PersonIdRecovery {
                person_id_column: "person_id".to_string(),
                recovery_join: format!(
                    "JOIN {}.{}.voters idv ON idv.person_id = list_results.person_id",
                    config.warehouse.project_id, config.warehouse.dataset
                ),
            },
        };

        let tools: Vec<Arc<dyn njvox_agent::AgentTool>> = vec![
            Arc::new(WarehouseSelectTool {
                client: warehouse.clone(),
                remapper: remapper.clone(),
                allowlisted_tables: allowlisted_tables.clone(),
                row_cap: layout.row_cap,
                timeout_secs: layout.query_timeout_secs,
            }),
            Arc::new(GeocodeTool { provider: geocode_provider }),
            Arc::new(WebSearchTool { provider: search_provider }),
            Arc::new(SaveListTool { store: artifacts.clone(), allowlisted_tables: allowlisted_tables.clone() }),
            Arc::new(EnrichOneTool { coordinator: enrichment.clone() }),
            Arc::new(EnrichBatchTool { coordinator: enrichment.clone() }),
            Arc::new(DocTool { service: document_service.clone(), op: DocOp::Create }),
            Arc::new(DocTool { service: document_service.clone(), op: DocOp::Read }),
            Arc::new(DocTool { service: document_service.clone(), op: DocOp::List }),
            Arc::new(DocTool { service: document_service, op: DocOp::Update }),
        ];

        let anthropic_key = secrets.get_or("anthropic_api_key", "");
        let max_output_tokens = config.agent.max_output_tokens;
        let factory = Arc::new(move |_model_id: &str| {
            Arc::new(AnthropicRuntime::new(
                anthropic_key.clone(),
                None,
                max_output_tokens,
                "You are the NJ Vox analytics assistant. Use tools to answer questions about \
                 the voter warehouse, save useful queries as lists, and draft email campaigns. \
                 Never fabricate data; rely on warehouse_select for every factual claim."
                    .to_string(),
            )) as Arc<dyn njvox_agent::LlmRuntime>
        });
        let agent = Arc::new(AgentAdapter::new(factory, tools, config.agent.instance_cache_max));

        let chat = Arc::new(ChatOrchestrator::new(sessions.clone(), agent.clone()));
        chat.clone().spawn_gc(std::time::Duration::from_secs(config.retention.cleanup_interval_secs));

        Ok(Self {
            config,
            secrets,
            sessions,
            chat,
            agent,
            artifacts,
            campaigns,
            enrichment,
            warehouse,
            remapper,
            layout,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route("/query/generate-sql", post(crate::http::query::generate_sql))
        .route("/query/execute", post(crate::http::query::execute_query))
        .route(
            "/lists",
            get(crate::http::lists::list_all).post(crate::http::lists::create),
        )
        .route(
            "/lists/{id}",
            get(crate::http::lists::get_one).put(crate::http::lists::update).delete(crate::http::lists::delete),
        )
        .route("/lists/{id}/run", post(crate::http::lists::run))
        .route("/lists/{id}/regenerate-sql", post(crate::http::lists::regenerate_sql))
        .route("/lists/{id}/export", get(crate::http::lists::export_csv))
        .route(
            "/campaigns",
            get(crate::http::campaigns::list_all).post(crate::http::campaigns::create),
        )
        .route(
            "/campaigns/{id}",
            get(crate::http::campaigns::get_one)
                .put(crate::http::campaigns::update)
                .delete(crate::http::campaigns::delete),
        )
        .route("/campaigns/{id}/send", post(crate::http::campaigns::send))
        .route("/campaigns/{id}/test", post(crate::http::campaigns::test))
        .route("/campaigns/{id}/stats", get(crate::http::campaigns::stats))
        .route("/campaigns/{id}/events", get(crate::http::campaigns::events))
        .route("/webhooks/email", post(crate::http::webhooks::webhook_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
