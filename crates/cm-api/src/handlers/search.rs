use std::time::Instant;

use axum::{
    Json,
    extract::{Path, State},
};
use cm_common::api::{RecommendationResponse, SearchRequest};

use super::pagination::resolve_limit;
use super::record_latency;
use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn run_search(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
    _auth: AuthUser,
    Json(request): Json<SearchRequest>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let started = Instant::now();
    let limit = resolve_limit(request.limit)?;

    let outcome = state
        .engine
        .search(&profile_id, request.kind, &request.filters)
        .await?;

    record_latency("search", started);
    Ok(Json(RecommendationResponse::from_outcome(
        outcome,
        state.engine.provider_name(),
        limit,
    )))
}
