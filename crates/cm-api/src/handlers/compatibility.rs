use axum::{
    Json,
    extract::{Path, State},
};
use cm_common::matching::CompatibilityView;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn get_compatibility(
    State(state): State<SharedState>,
    Path((profile_id, gig_id)): Path<(String, String)>,
    _auth: AuthUser,
) -> Result<Json<CompatibilityView>, ApiError> {
    let view = state.engine.compatibility(&profile_id, &gig_id).await?;
    Ok(Json(view))
}
