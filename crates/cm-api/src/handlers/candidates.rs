use std::time::Instant;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use cm_common::api::{RecommendationQuery, RecommendationResponse};

use super::pagination::resolve_limit;
use super::record_latency;
use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn list_candidates(
    State(state): State<SharedState>,
    Path(gig_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
    _auth: AuthUser,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let started = Instant::now();
    let limit = resolve_limit(query.limit)?;

    let outcome = state
        .engine
        .recommend_users_for_gig(&gig_id, &query.to_filters())
        .await?;

    record_latency("gig_candidates", started);
    Ok(Json(RecommendationResponse::from_outcome(
        outcome,
        state.engine.provider_name(),
        limit,
    )))
}
