use crate::{
    chat::{self, ChatBackend},
    config::AppConfig,
    db,
    error::{Result, ServiceError},
    query::{QueryEngine, QueryRequest, QueryResponse, TrainRequest},
    state::AppState,
    training,
};
use axum::{
    extract::State,
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let backend = chat::select_backend(&config);
        Self::with_chat(config, backend).await
    }

    /// Startup order: pool (probe logged, non-fatal), engine composition,
    /// best-effort training, then the router. Tests inject their own backend
    /// here.
    pub async fn with_chat(
        config: AppConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> anyhow::Result<Self> {
        let (pool, connected) = db::connect_pool(&config).await?;
        let config = Arc::new(config);
        let query = QueryEngine::new(pool, backend, connected);
        training::run_startup_training(&query);
        let state = AppState::new(Arc::clone(&config), query);

        Ok(Self { config, state })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::root))
            .route("/health", get(Self::health))
            .route("/query", post(Self::query))
            .route("/train", post(Self::train))
            .with_state(self.state.clone())
            .layer(cors_layer(&self.config))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "analytics query service listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn root() -> Json<serde_json::Value> {
        Json(json!({
            "message": "Natural-language analytics API",
            "status": "running",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }

    async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
        Json(json!({
            "status": "healthy",
            "database": state.query.database_status(),
        }))
    }

    async fn query(
        State(state): State<AppState>,
        Json(request): Json<QueryRequest>,
    ) -> Result<Json<QueryResponse>> {
        let sql = state.query.generate_sql(&request.question).await?;

        if sql.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "could not generate SQL from the question; please try rephrasing".to_string(),
            ));
        }

        let results = state.query.run_sql(&sql).await?;

        Ok(Json(QueryResponse {
            sql,
            results,
            error: None,
        }))
    }

    async fn train(
        State(state): State<AppState>,
        Json(request): Json<TrainRequest>,
    ) -> Result<Json<serde_json::Value>> {
        state.query.train(request.into_item()?)?;
        Ok(Json(json!({ "message": "Training successful" })))
    }
}

/// Origins come from configuration. Wildcard methods/headers are rejected
/// when credentials are allowed, so both mirror the request instead.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
