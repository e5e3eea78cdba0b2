//! HTTP routes under `/api/v1`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use vector_rules_retrieval::{
    CreateRule, EngineStats, Page, RetrieveQuery, Rule, RuleEngine, RuleId, RuleType,
    RuleTypeId, UpdateRule,
};

use crate::error::ApiResult;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<RuleEngine>,

    /// Cancelled when the server shuts down.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Arc<RuleEngine>, shutdown: CancellationToken) -> Self {
        Self { engine, shutdown }
    }

    /// Token for one request; fires when the server shuts down.
    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/rules", post(create_rule).get(list_rules))
        .route("/rules/retrieve", post(retrieve_rules))
        .route(
            "/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/rule-types", post(create_rule_type).get(list_rule_types))
        .route(
            "/rule-types/{id}",
            get(get_rule_type)
                .put(update_rule_type)
                .delete(delete_rule_type),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api)
}

/// Pagination as sent by clients. Missing or malformed values fall back to
/// the defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(rename = "type")]
    rule_type: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

impl ListParams {
    fn page(&self) -> Page {
        let limit = self
            .limit
            .as_deref()
            .and_then(|limit| limit.parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(Page::DEFAULT_LIMIT);
        let offset = self
            .offset
            .as_deref()
            .and_then(|offset| offset.parse::<usize>().ok())
            .unwrap_or(0);
        Page::new(limit, offset)
    }

    fn rule_type(&self) -> Option<&str> {
        self.rule_type.as_deref().filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RuleTypeBody {
    name: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<EngineStats>> {
    Ok(Json(state.engine.stats().await?))
}

async fn create_rule(
    State(state): State<AppState>,
    body: Result<Json<CreateRule>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Rule>)> {
    let Json(request) = body?;
    let rule = state
        .engine
        .create_rule(request, &state.request_token())
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn get_rule(
    State(state): State<AppState>,
    id: Result<Path<RuleId>, PathRejection>,
) -> ApiResult<Json<Rule>> {
    let Path(id) = id?;
    Ok(Json(state.engine.get_rule(id).await?))
}

async fn update_rule(
    State(state): State<AppState>,
    id: Result<Path<RuleId>, PathRejection>,
    body: Result<Json<UpdateRule>, JsonRejection>,
) -> ApiResult<Json<Rule>> {
    let Path(id) = id?;
    let Json(request) = body?;
    let rule = state
        .engine
        .update_rule(id, request, &state.request_token())
        .await?;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    id: Result<Path<RuleId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state
        .engine
        .delete_rule(id, &state.request_token())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_rules(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let page = params.page();
    let rules = state.engine.list_rules(params.rule_type(), page).await?;
    Ok(Json(json!({
        "rules": rules,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

async fn retrieve_rules(
    State(state): State<AppState>,
    body: Result<Json<RetrieveQuery>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(query) = body?;
    let matches = state
        .engine
        .retrieve_similar(query, &state.request_token())
        .await?;
    Ok(Json(json!({ "rules": matches })))
}

async fn create_rule_type(
    State(state): State<AppState>,
    body: Result<Json<RuleTypeBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RuleType>)> {
    let Json(body) = body?;
    let rule_type = state.engine.create_rule_type(&body.name).await?;
    Ok((StatusCode::CREATED, Json(rule_type)))
}

async fn get_rule_type(
    State(state): State<AppState>,
    id: Result<Path<RuleTypeId>, PathRejection>,
) -> ApiResult<Json<RuleType>> {
    let Path(id) = id?;
    Ok(Json(state.engine.get_rule_type(id).await?))
}

async fn update_rule_type(
    State(state): State<AppState>,
    id: Result<Path<RuleTypeId>, PathRejection>,
    body: Result<Json<RuleTypeBody>, JsonRejection>,
) -> ApiResult<Json<RuleType>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.engine.rename_rule_type(id, &body.name).await?))
}

async fn delete_rule_type(
    State(state): State<AppState>,
    id: Result<Path<RuleTypeId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.engine.delete_rule_type(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_rule_types(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let page = params.page();
    let rule_types = state.engine.list_rule_types(page).await?;
    Ok(Json(json!({
        "rule_types": rule_types,
        "limit": page.limit,
        "offset": page.offset,
    })))
}
