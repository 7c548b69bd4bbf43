//! HTTP surface.
//!
//! Exposes the catalog over a JSON API: read search against the index,
//! facet values from the store, and on-demand sync/reset triggers into the
//! reconciliation engine. The engine is the only component here that
//! mutates the index; every handler works through shared handles
//! constructed once at startup.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search` | Free-text search with facet filters |
//! | `GET`  | `/filters` | Distinct facet values for UI controls |
//! | `POST` | `/sync` | Run a full sync synchronously |
//! | `POST` | `/sync/ratings` | Run a ratings refresh synchronously |
//! | `POST` | `/reset-index` | Drop, recreate, reconfigure, repopulate |
//! | `GET`  | `/health` | Liveness probe (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "sync_failed", "message": "..." } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! facet UIs.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::index::{SearchIndex, SearchRequest};
use crate::store::ResourceStore;
use crate::sync::{SyncEngine, SyncOutcome};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub index: Arc<dyn SearchIndex>,
    pub engine: Arc<SyncEngine>,
}

/// Builds the router. Split from [`run_server`] so tests can drive handlers
/// against in-memory adapters.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/filters", get(handle_filters))
        .route("/sync", post(handle_sync))
        .route("/sync/ratings", post(handle_ratings_sync))
        .route("/reset-index", post(handle_reset_index))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    info!("listening on http://{}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"search_failed"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
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

/// Constructs a 500 error with the given code, flattening the anyhow chain
/// into the message.
fn internal_error(code: &str, err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: code.to_string(),
        message: format!("{:#}", err),
    }
}

// ============ GET /search ============

/// Query parameters accepted by `GET /search`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SearchParams {
    pub query: String,
    /// Comma-separated tag values; each expands to its own equality clause.
    pub tags: String,
    pub subject: String,
    #[serde(rename = "examBoard")]
    pub exam_board: String,
    pub level: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// `field:asc` or `field:desc`.
    pub sort: String,
    /// `true` (default) or `false` for exact matching.
    pub fuzzy: Option<bool>,
}

/// JSON response body for `GET /search`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<Value>,
    total_hits: i64,
    processing_time_ms: i64,
    fuzzy_enabled: bool,
}

/// Translates the query parameters into an index-native filter expression,
/// ANDing every provided criterion. Each tag contributes its own
/// `tags = "<tag>"` clause.
pub fn build_filter_expression(params: &SearchParams) -> Option<String> {
    let mut clauses: Vec<String> = Vec::new();

    for tag in params.tags.split(',').filter(|t| !t.is_empty()) {
        clauses.push(format!("tags = \"{}\"", tag));
    }
    for (field, value) in [
        ("subject", &params.subject),
        ("examBoard", &params.exam_board),
        ("level", &params.level),
        ("type", &params.r#type),
    ] {
        if !value.is_empty() {
            clauses.push(format!("{} = \"{}\"", field, value));
        }
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// Default ordering when the caller sends no (or an unusable) `sort`.
const DEFAULT_SORT: &str = "averageRating:desc";

/// Resolves the `sort` parameter: a well-formed `field:asc|desc` value
/// passes through; anything else — including absence — falls back to
/// rating-descending, the ordering the catalog UI expects.
fn resolve_sort(sort: &str) -> String {
    match sort.split_once(':') {
        Some((field, "asc" | "desc")) if !field.is_empty() => sort.to_string(),
        _ => DEFAULT_SORT.to_string(),
    }
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let fuzzy = params.fuzzy.unwrap_or(true);

    let request = SearchRequest {
        query: params.query.clone(),
        filter: build_filter_expression(&params),
        sort: Some(resolve_sort(&params.sort)),
        limit: params.limit.unwrap_or(20),
        offset: params.offset.unwrap_or(0),
        fuzzy,
    };

    let outcome = state
        .index
        .search(&request)
        .await
        .map_err(|e| internal_error("search_failed", e))?;

    Ok(Json(SearchResponse {
        hits: outcome.hits,
        total_hits: outcome.total_hits,
        processing_time_ms: outcome.processing_time_ms,
        fuzzy_enabled: fuzzy,
    }))
}

// ============ GET /filters ============

async fn handle_filters(
    State(state): State<AppState>,
) -> Result<Json<crate::models::FacetValues>, AppError> {
    let facets = state
        .store
        .distinct_facets()
        .await
        .map_err(|e| internal_error("filters_failed", e))?;

    Ok(Json(facets))
}

// ============ POST /sync, /sync/ratings, /reset-index ============

/// JSON response body for the sync triggers.
#[derive(Serialize)]
struct SyncResponse {
    status: String,
}

fn sync_response(outcome: SyncOutcome, name: &str) -> Json<SyncResponse> {
    let status = match outcome {
        SyncOutcome::Completed(_) => format!("{} completed", name),
        SyncOutcome::Skipped => format!("{} already running", name),
    };
    Json(SyncResponse { status })
}

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, AppError> {
    let outcome = state
        .engine
        .full_sync()
        .await
        .map_err(|e| internal_error("sync_failed", e))?;

    Ok(sync_response(outcome, "sync"))
}

async fn handle_ratings_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let outcome = state
        .engine
        .ratings_sync()
        .await
        .map_err(|e| internal_error("ratings_sync_failed", e))?;

    Ok(sync_response(outcome, "ratings sync"))
}

async fn handle_reset_index(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let outcome = state
        .engine
        .reset_index()
        .await
        .map_err(|e| internal_error("reset_failed", e))?;

    Ok(sync_response(outcome, "index reset"))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Static liveness probe used by load balancers and monitoring tools.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
