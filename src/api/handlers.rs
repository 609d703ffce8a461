use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{CacheableEntity, EntityKind, Genre, GenreDescriptor},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct GenreResponse {
    pub tmdb_id: i64,
    pub name: String,
}

impl From<&Genre> for GenreResponse {
    fn from(genre: &Genre) -> Self {
        Self {
            tmdb_id: genre.tmdb_id,
            name: genre.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub tmdb_id: i64,
    pub kind: EntityKind,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_air_date: Option<NaiveDate>,
    pub genres: Vec<GenreResponse>,
}

impl From<&CacheableEntity> for EntityResponse {
    fn from(entity: &CacheableEntity) -> Self {
        Self {
            tmdb_id: entity.tmdb_id,
            kind: entity.kind,
            title: entity.title.clone(),
            overview: entity.overview.clone(),
            poster_path: entity.poster_path.clone(),
            first_air_date: entity.first_air_date,
            genres: entity.genres.iter().map(GenreResponse::from).collect(),
        }
    }
}

fn parse_kind(raw: &str) -> AppResult<EntityKind> {
    raw.parse().map_err(AppError::InvalidInput)
}

fn to_responses(entities: &[CacheableEntity]) -> Json<Vec<EntityResponse>> {
    Json(entities.iter().map(EntityResponse::from).collect())
}

async fn resolve_list(
    state: &AppState,
    kind: EntityKind,
    payloads: Vec<Value>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let entities = state.catalog.resolve(kind, &payloads).await?;
    Ok(to_responses(&entities))
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Single movie or TV show, fetched or refreshed through the cache
pub async fn get_entity(
    State(state): State<AppState>,
    Path((kind, tmdb_id)): Path<(String, i64)>,
) -> AppResult<Json<EntityResponse>> {
    let kind = parse_kind(&kind)?;
    let entity = state
        .catalog
        .get_or_create(kind, tmdb_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind, tmdb_id)))?;

    Ok(Json(EntityResponse::from(&entity)))
}

pub async fn trending(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let kind = parse_kind(&kind)?;
    let payloads = state.catalog.trending(kind).await;
    resolve_list(&state, kind, payloads).await
}

pub async fn top_rated(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let kind = parse_kind(&kind)?;
    let payloads = state.catalog.top_rated(kind).await;
    resolve_list(&state, kind, payloads).await
}

pub async fn discover(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let kind = parse_kind(&kind)?;
    let payloads = state.catalog.discover(kind).await;
    resolve_list(&state, kind, payloads).await
}

pub async fn search(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let kind = parse_kind(&kind)?;
    let payloads = state.catalog.search(kind, &params.q).await?;
    resolve_list(&state, kind, payloads).await
}

pub async fn recommendations(
    State(state): State<AppState>,
    Path((kind, tmdb_id)): Path<(String, i64)>,
) -> AppResult<Json<Vec<EntityResponse>>> {
    let kind = parse_kind(&kind)?;
    let payloads = state.catalog.recommendations(kind, tmdb_id).await;
    resolve_list(&state, kind, payloads).await
}

/// Provider genre list for a kind
pub async fn get_genres(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<GenreDescriptor>>> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.catalog.genres(kind).await?))
}

/// Drops the memoized genre list so the next read goes to the provider
pub async fn invalidate_genres(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<StatusCode> {
    let kind = parse_kind(&kind)?;
    state.catalog.invalidate_genres(kind).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_genres(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> AppResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    let synced = state.catalog.sync_genres(kind).await?;
    Ok(Json(json!({ "kind": kind, "synced": synced })))
}
