use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use cm_common::db::{
    PgPool, SavedSearch, SavedSearchInsert, insert_saved_search, list_saved_searches,
};
use serde::Deserialize;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SavedSearchQuery {
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

const fn default_active_only() -> bool {
    true
}

fn require_pool(state: &SharedState) -> Result<&PgPool, ApiError> {
    state
        .pool
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("saved searches need a database".into()))
}

pub async fn list(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(query): Query<SavedSearchQuery>,
    auth: AuthUser,
) -> Result<Json<Vec<SavedSearch>>, ApiError> {
    auth.ensure_can_act_for(&user_id)?;
    let pool = require_pool(&state)?;

    let searches = list_saved_searches(pool, &user_id, query.active_only).await?;
    Ok(Json(searches))
}

pub async fn create(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
    Json(insert): Json<SavedSearchInsert>,
) -> Result<(StatusCode, Json<SavedSearch>), ApiError> {
    auth.ensure_can_act_for(&user_id)?;
    insert.filters.validate()?;
    let pool = require_pool(&state)?;

    let saved = insert_saved_search(pool, &user_id, &insert).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}
