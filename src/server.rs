use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::chat::ChatClient;
use crate::config::Config;
use crate::evaluation::Evaluator;
use crate::models::{ChatMessage, ChatProductsRequest, ChatResponse, EvalRecord, EvalResult};
use crate::queue::EvalQueue;
use crate::telemetry::Telemetry;

/// Shared state handed to every request handler
pub struct AppState {
    chat: ChatClient,
    evaluator: Evaluator,
    queue: EvalQueue,
    telemetry: Telemetry,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            chat: ChatClient::new(config),
            evaluator: Evaluator::new(config),
            queue: EvalQueue::new(&config.queue_path),
            telemetry: Telemetry::new(),
        }
    }
}

/// HTTP server exposing the chat and evaluation endpoints
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            state: Arc::new(AppState::new(config)),
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(home))
            .route("/health", get(health))
            .route("/chat/products", post(chat_products))
            .route("/chat/evaluations", get(chat_evaluations))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the address and serve requests until shutdown
    pub async fn run(self, addr: &str) -> Result<()> {
        let app = Self::router(self.state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Listening on {}", addr);

        axum::serve(listener, app).await.context("Server error")?;

        Ok(())
    }
}

async fn home() -> &'static str {
    "ok"
}

async fn health() -> &'static str {
    "healthy"
}

/// POST /chat/products: run a grounded chat call and enqueue the
/// query/response pair for later evaluation
async fn chat_products(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatProductsRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    tracing::info!("query: {}", request.query);
    if request.enable_telemetry {
        tracing::info!("enable-telemetry: true");
        state.telemetry.enable();
    }

    let messages = [ChatMessage::user(&request.query)];
    let response = state
        .chat
        .chat_with_products(&messages, None)
        .await
        .map_err(|e| {
            tracing::error!("Chat adapter error: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                format!("chat completion failed: {}", e),
            )
        })?;
    tracing::info!("Return Response: {}", response.message);

    let record = EvalRecord {
        query: request.query,
        response: response.clone(),
    };
    state.queue.append(&record).await.map_err(|e| {
        tracing::error!("Queue append error: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to record chat for evaluation: {}", e),
        )
    })?;

    Ok(Json(response))
}

/// GET /chat/evaluations: consume the queue file, score every record, and
/// return the result object
async fn chat_evaluations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvalResult>, (StatusCode, String)> {
    state.telemetry.enable();

    let records = state.queue.take_all().await.map_err(|e| {
        tracing::error!("Queue consume error: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read evaluation queue: {}", e),
        )
    })?;

    let Some(records) = records else {
        let message = format!(
            "{} does not exist; run the chat/products API first to generate evaluation data",
            state.queue.path().display()
        );
        tracing::error!("{}", message);
        return Err((StatusCode::NOT_FOUND, message));
    };
    tracing::info!("Evaluating {} pending records", records.len());

    let result = state
        .evaluator
        .evaluate_records(&records)
        .await
        .map_err(|e| {
            tracing::error!("Evaluation error: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                format!("evaluation failed: {}", e),
            )
        })?;

    tracing::info!("-----Summarized Metrics-----");
    tracing::info!("{:?}", result.metrics);
    tracing::info!("-----Tabular Result-----");
    for row in &result.rows {
        tracing::info!("query: {} scores: {:?}", row.query, row.scores);
    }
    tracing::info!("View evaluation results in the studio: {}", result.studio_url);

    Ok(Json(result))
}
