use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    error::BlinkError,
    store::{admin::clamp_limit, LinkStats, SnippetView, StoreStats},
    AppState,
};

type ApiResult<T> = Result<T, BlinkError>;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Snippets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnippetRequest {
    pub content: String,
    #[serde(default)]
    pub is_one_time: bool,
    pub max_views: Option<u32>,
}

pub async fn create_snippet(
    State(state): State<AppState>,
    body: Result<Json<CreateSnippetRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(bad_json)?;
    let created = state
        .store
        .create_snippet(&body.content, body.is_one_time, body.max_views)?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

pub async fn read_snippet(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<SnippetView>> {
    Ok(Json(state.store.read_snippet(&code)?))
}

// ── Links ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub original_url: String,
    pub custom_slug: Option<String>,
    pub expiry_days: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    pub slug: String,
    pub short_url: String,
    pub original_url: String,
    pub expires_at: Option<i64>,
}

pub async fn create_link(
    State(state): State<AppState>,
    body: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(bad_json)?;
    // Forms submit an empty field when no custom slug is wanted.
    let custom_slug = body
        .custom_slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let created = state
        .store
        .create_link(&body.original_url, custom_slug, body.expiry_days)?;

    let response = CreateLinkResponse {
        short_url: format!("{}/{}", state.public_url.trim_end_matches('/'), created.slug),
        slug: created.slug,
        original_url: created.original_url,
        expires_at: created.expires_at,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn link_stats(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<LinkStats>> {
    Ok(Json(state.store.link_stats(&slug)?))
}

pub async fn redirect(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Redirect> {
    let target = state.store.resolve_link(&slug)?;
    Ok(Redirect::temporary(&target))
}

// ── Admin ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<Json<StoreStats>> {
    let stats = state.store.stats()?;
    info!(
        snippets = stats.snippets,
        links = stats.links,
        "audit: admin.stats"
    );
    Ok(Json(stats))
}

pub async fn admin_list_snippets(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| BlinkError::Validation(e.body_text()))?;
    let snippets = state.store.list_snippets(clamp_limit(query.limit))?;
    info!(count = snippets.len(), "audit: snippet.list");
    Ok(Json(json!({ "snippets": snippets })).into_response())
}

pub async fn admin_list_links(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| BlinkError::Validation(e.body_text()))?;
    let links = state.store.list_links(clamp_limit(query.limit))?;
    info!(count = links.len(), "audit: link.list");
    Ok(Json(json!({ "links": links })).into_response())
}

pub async fn admin_delete_snippet(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    state.store.delete_snippet(&code)?;
    Ok(Json(json!({"deleted": true})).into_response())
}

pub async fn admin_delete_link(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Response> {
    state.store.delete_link(&slug)?;
    Ok(Json(json!({"deleted": true})).into_response())
}

pub async fn admin_cleanup_links(State(state): State<AppState>) -> ApiResult<Response> {
    let removed = state.store.cleanup_expired_links()?;
    Ok(Json(json!({ "removed": removed })).into_response())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn bad_json(rejection: JsonRejection) -> BlinkError {
    BlinkError::Validation(rejection.body_text())
}
