use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::cache::key::canonicalize;
use crate::error::SearchError;
use crate::models::{AbTestResponse, ScoredPassage, SearchHit, SearchParams, SearchRequest, SearchResponse};
use crate::state::AppState;

type ApiError = (StatusCode, String);

/// GET / - Liveness message
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "RAG API is running" }))
}

/// POST /semantic_search - Nearest passages by embedding similarity
pub async fn semantic_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = validate(&req)?;
    let results = state.engine.semantic_search(&params).await.map_err(internal)?;
    Ok(respond(req.query, &results))
}

/// POST /keyword_search - BM25 only
pub async fn keyword_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = validate(&req)?;
    let results = state.engine.keyword_search(&params).await.map_err(internal)?;
    Ok(respond(req.query, &results))
}

/// POST /hybrid_search - Weighted fusion of semantic and BM25 scores
pub async fn hybrid_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = validate(&req)?;
    let results = state.engine.hybrid_search(&params).await.map_err(internal)?;
    Ok(respond(req.query, &results))
}

/// POST /advanced_search - Full pipeline:
///   1. Query rewrite (LLM)
///   2. Hybrid fusion over a fixed-width candidate pool
///   3. Cross-encoder reranking
///   4. Truncate to `top_k`
pub async fn advanced_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = validate(&req)?;
    let results = state.engine.advanced_search(&params).await.map_err(internal)?;
    Ok(respond(req.query, &results))
}

/// POST /ab_test - Run the requested strategy (`auto` picks one) and report it
pub async fn ab_test(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<AbTestResponse>, ApiError> {
    let params = validate(&req)?;
    let strategy = req.strategy.unwrap_or_default();
    let outcome = state
        .engine
        .ab_test(&params, strategy)
        .await
        .map_err(internal)?;

    Ok(Json(AbTestResponse {
        query: req.query,
        strategy_used: outcome.strategy_used,
        results: outcome.results.iter().map(SearchHit::from).collect(),
    }))
}

fn validate(req: &SearchRequest) -> Result<SearchParams, ApiError> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    Ok(canonicalize(req))
}

fn respond(query: String, results: &[ScoredPassage]) -> Json<SearchResponse> {
    Json(SearchResponse {
        query,
        results: results.iter().map(SearchHit::from).collect(),
    })
}

/// Details stay in the log; callers only learn that the search failed.
fn internal(err: SearchError) -> ApiError {
    tracing::error!("Search failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Search failed".to_string())
}
