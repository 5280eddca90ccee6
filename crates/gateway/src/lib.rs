//! HTTP API gateway for threadloom.
//!
//! Exposes the streaming turn endpoint, thread management, model and tool
//! listings, and a live feed of domain events.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use threadloom_agent::{TurnGateway, TurnOrchestrator, TurnSettings};
use threadloom_config::AppConfig;
use threadloom_core::error::ToolError;
use threadloom_core::event::EventBus;
use threadloom_core::identity::Identity;
use threadloom_core::store::ThreadStore;

/// Shared application state for the gateway.
pub struct AppState {
    pub turns: TurnGateway,
    /// Bearer token → owner id; empty means every caller is `local`
    pub bearer_tokens: BTreeMap<String, String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(turns: TurnGateway, bearer_tokens: BTreeMap<String, String>) -> Self {
        Self {
            turns,
            bearer_tokens,
            started_at: chrono::Utc::now(),
        }
    }

    /// Wire providers, tools and the orchestrator from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn ThreadStore>) -> Result<Self, ToolError> {
        let providers = Arc::new(threadloom_providers::build_from_config(config));
        let tools = Arc::new(threadloom_tools::default_registry(&config.tools)?);
        let orchestrator = TurnOrchestrator::new(
            providers,
            tools,
            store,
            Arc::new(EventBus::default()),
            TurnSettings::from_config(config),
        );
        Ok(Self::new(
            TurnGateway::new(Arc::new(orchestrator), config.turn.stream_capacity),
            config.gateway.bearer_tokens.clone(),
        ))
    }

    /// The identity a bearer token maps to, or `None` if it is unknown.
    fn authenticate(&self, token: Option<&str>) -> Option<Identity> {
        if self.bearer_tokens.is_empty() {
            return Some(Identity::local());
        }
        token
            .and_then(|t| self.bearer_tokens.get(t))
            .map(Identity::new)
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to the local console origin
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:8080"))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .expose_headers([axum::http::HeaderName::from_static(api_v1::THREAD_ID_HEADER)])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn start(
    config: AppConfig,
    store: Arc<dyn ThreadStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    if config.gateway.bearer_tokens.is_empty() {
        warn!("No bearer tokens configured; every caller acts as the local identity");
    }

    let state = Arc::new(AppState::from_config(&config, store)?);
    let app = build_router(state, config.gateway.max_body_bytes);

    info!(
        addr = %addr,
        model = %config.default_model,
        store = %config.store.backend,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: String,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.turns.orchestrator().store().name().to_string(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Resolves `Authorization: Bearer <token>` to an [`Identity`] and attaches
/// it to the request for handlers to extract.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match state.authenticate(token) {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        None => {
            warn!("Unauthorized request to /v1 API, missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
