//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/setup/{tenant}` | Index a tenant's documents (replaces any previous index) |
//! | `POST` | `/chat` | Answer a message for a tenant |
//! | `GET`  | `/analytics/{tenant}` | Interaction analytics |
//! | `GET`  | `/history/{tenant}?limit=N` | Most recent interactions |
//! | `GET`  | `/health` | Health check (returns version and known tenants) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "tenant_not_found", "message": "Company not found." } }
//! ```
//!
//! Error codes: `bad_request` (400), `tenant_not_found` (404),
//! `index_build_failed` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use docchat_core::models::{Analytics, DocumentInput, InteractionRecord};

use crate::engine::{AskResponse, AskStatus, Engine, IngestReport, TENANT_NOT_FOUND_MESSAGE};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 1000;

/// Build the router over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/setup/{tenant}", post(handle_setup))
        .route("/chat", post(handle_chat))
        .route("/analytics/{tenant}", get(handle_analytics))
        .route("/history/{tenant}", get(handle_history))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

/// Serve until the process is terminated.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "listening");
    println!("docchat listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

// ============ POST /setup/{tenant} ============

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub documents: Vec<DocumentInput>,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub report: IngestReport,
}

pub async fn handle_setup(
    State(engine): State<Arc<Engine>>,
    Path(tenant): Path<String>,
    Json(req): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    if tenant.trim().is_empty() {
        return Err(bad_request("tenant must not be empty"));
    }
    if req.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }

    let report = engine.ingest(&tenant, req.documents).await.map_err(|e| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
    })?;

    Ok(Json(SetupResponse {
        status: "success",
        report,
    }))
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub company_id: String,
    pub message: String,
}

pub async fn handle_chat(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let span = tracing::info_span!(
        "chat",
        request_id = %Uuid::new_v4(),
        tenant = %req.company_id
    );
    let response = engine
        .ask(&req.company_id, &req.message)
        .instrument(span)
        .await;
    if response.status == AskStatus::TenantNotFound {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            AskStatus::TenantNotFound.as_str(),
            TENANT_NOT_FOUND_MESSAGE,
        ));
    }
    Ok(Json(response))
}

// ============ GET /analytics/{tenant} ============

pub async fn handle_analytics(
    State(engine): State<Arc<Engine>>,
    Path(tenant): Path<String>,
) -> Json<Analytics> {
    Json(engine.analytics(&tenant))
}

// ============ GET /history/{tenant} ============

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub tenant: String,
    pub interactions: Vec<InteractionRecord>,
}

pub async fn handle_history(
    State(engine): State<Arc<Engine>>,
    Path(tenant): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let interactions = engine.history(&tenant, limit);
    Json(HistoryResponse {
        tenant,
        interactions,
    })
}

// ============ GET /health ============

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    tenants: Vec<String>,
}

pub async fn handle_health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tenants: engine.tenants().tenant_ids(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HashingEmbedder;
    use crate::generation::DisabledGenerator;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            Config::minimal(),
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(DisabledGenerator),
        ))
    }

    #[tokio::test]
    async fn test_chat_unknown_tenant_is_404() {
        let err = handle_chat(
            State(engine()),
            Json(ChatRequest {
                company_id: "nobody".into(),
                message: "hello".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "tenant_not_found");
    }

    #[tokio::test]
    async fn test_setup_rejects_empty_documents() {
        let err = handle_setup(
            State(engine()),
            Path("acme".into()),
            Json(SetupRequest { documents: vec![] }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_setup_then_history() {
        let engine = engine();
        let Json(setup) = handle_setup(
            State(engine.clone()),
            Path("acme".into()),
            Json(SetupRequest {
                documents: vec![DocumentInput {
                    text: "Refunds are accepted within 30 days. Shipping is free.".into(),
                    source: "policy.txt".into(),
                }],
            }),
        )
        .await
        .unwrap();
        assert_eq!(setup.status, "success");
        assert_eq!(setup.report.chunks, 1);

        let Json(chat) = handle_chat(
            State(engine.clone()),
            Json(ChatRequest {
                company_id: "acme".into(),
                message: "refunds".into(),
            }),
        )
        .await
        .unwrap();
        // Generation is disabled, so the turn reports the failure.
        assert_eq!(chat.status, AskStatus::GenerationFailed);
        assert!(chat.answer.starts_with("Error processing request: "));

        let Json(history) = handle_history(
            State(engine),
            Path("acme".into()),
            Query(HistoryQuery { limit: Some(5) }),
        )
        .await;
        assert_eq!(history.interactions.len(), 1);
    }

    #[tokio::test]
    async fn test_health_lists_tenants() {
        let engine = engine();
        let Json(health) = handle_health(State(engine.clone())).await;
        assert_eq!(health.status, "ok");
        assert!(health.tenants.is_empty());

        handle_setup(
            State(engine.clone()),
            Path("globex".into()),
            Json(SetupRequest {
                documents: vec![DocumentInput {
                    text: "Office hours are 9 to 5.".into(),
                    source: "hours.txt".into(),
                }],
            }),
        )
        .await
        .unwrap();
        let Json(health) = handle_health(State(engine)).await;
        assert_eq!(health.tenants, vec!["globex".to_string()]);
    }
}
