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

/// `GET /api/profiles/:profile_id/recommendations`
///
/// Scores published gigs for the profile. `batched=true` asks the provider
/// for the whole ranked list in one call instead of one lookup per gig.
pub async fn list_gig_recommendations(
    State(state): State<SharedState>,
    Path(profile_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
    _auth: AuthUser,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let started = Instant::now();
    let limit = resolve_limit(query.limit)?;
    let filters = query.to_filters();

    let outcome = if query.batched {
        state
            .engine
            .recommend_gigs_batched(&profile_id, &filters)
            .await?
    } else {
        state.engine.recommend_gigs(&profile_id, &filters).await?
    };

    record_latency("gig_recommendations", started);
    Ok(Json(RecommendationResponse::from_outcome(
        outcome,
        state.engine.provider_name(),
        limit,
    )))
}
