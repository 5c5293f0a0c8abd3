//! HTTP API over the knowledge base.
//!
//! Provides [`serve`], which wires the knowledge base and the optional
//! generation client into an axum router:
//!
//! - `GET  /api/init`: ingest (once) and report status
//! - `GET  /api/status`: status without triggering ingestion
//! - `POST /api/search`: ranked passages plus assembled context
//! - `POST /api/chat`: retrieval followed by generation

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use ragbase::config::RagConfig;
use ragbase::generation::{ChatMessage, GeminiGenerator};
use ragbase::knowledge::context;
use ragbase::language::Language;
use ragbase::{KnowledgeBase, RagError, Status};

#[derive(Clone)]
pub struct AppState {
    kb: Arc<KnowledgeBase>,
    generator: Option<Arc<GeminiGenerator>>,
}

/// Shared setup: build the knowledge base and the generation client.
fn setup_shared_state(config: &RagConfig) -> Result<AppState> {
    let kb = Arc::new(KnowledgeBase::from_config(config)?);
    tracing::info!("knowledge base ready for ingestion");

    let generator = match GeminiGenerator::new(&config.generation) {
        Ok(g) => Some(Arc::new(g)),
        Err(e) => {
            tracing::warn!(error = %e, "generation disabled; /api/chat will return 500");
            None
        }
    };

    Ok(AppState { kb, generator })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/init", get(init))
        .route("/api/status", get(status))
        .route("/api/search", post(search))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Start the HTTP API and ingest the corpus in the background.
pub async fn serve(config: RagConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting ragbase HTTP server");

    let state = setup_shared_state(&config)?;

    // Warm up; requests that arrive first join the same in-flight build.
    let kb = Arc::clone(&state.kb);
    tokio::spawn(async move {
        if let Err(e) = kb.initialize().await {
            tracing::error!(error = %e, "background ingestion failed; will retry on next request");
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}/api");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: msg.into(),
                details: None,
            },
        }
    }
}

/// Malformed JSON, a wrong content type, or a body that does not fit the
/// request type all become a 400 in the usual error shape.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "invalid request body".into(),
                details: Some(rejection.body_text()),
            },
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match err {
            RagError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %err, "request failed");
        Self {
            status,
            body: ErrorBody {
                error: "request failed".into(),
                details: Some(err.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InitResponse {
    success: bool,
    message: &'static str,
    #[serde(flatten)]
    status: Status,
}

async fn init(State(state): State<AppState>) -> Result<Json<InitResponse>, ApiError> {
    let status = state.kb.initialize().await?;
    Ok(Json(InitResponse {
        success: true,
        message: "Knowledge base initialized",
        status,
    }))
}

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.kb.status())
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: String,
    source: String,
    chunk_index: usize,
    content: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    context: String,
    sources: BTreeSet<String>,
}

async fn search(
    State(state): State<AppState>,
    req: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(req) = req?;
    if req.query.trim().is_empty() {
        return Err(ApiError::bad_request("query is required"));
    }
    state.kb.initialize().await?;

    let top_k = req.top_k.unwrap_or(state.kb.options().top_k);
    let results = state.kb.search(&req.query, top_k).await?;
    let assembled = context::assemble(&results, state.kb.options().max_context_chars);

    let hits = results
        .into_iter()
        .map(|r| SearchHit {
            id: r.entry.id,
            source: r.entry.metadata.source,
            chunk_index: r.entry.metadata.chunk_index,
            content: r.entry.content,
            score: r.score,
        })
        .collect();

    Ok(Json(SearchResponse {
        results: hits,
        context: assembled.context,
        sources: assembled.sources,
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    sources: BTreeSet<String>,
    language: Language,
}

async fn chat(
    State(state): State<AppState>,
    req: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = req?;
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }
    let Some(generator) = state.generator.as_ref() else {
        return Err(RagError::Config("generation API key not configured".into()).into());
    };

    tracing::info!(message_len = req.message.len(), history = req.history.len(), "chat request received");

    state.kb.initialize().await?;
    let relevant = state.kb.retrieve(&req.message).await?;
    tracing::info!(has_context = !relevant.context.is_empty(), sources = ?relevant.sources, "context retrieved");

    let generation = generator
        .generate(&req.message, &relevant.context, &req.history)
        .await?;

    Ok(Json(ChatResponse {
        response: generation.text,
        sources: relevant.sources,
        language: generation.language,
    }))
}
