use serde::Deserialize;

use crate::matching::filters::SearchFilters;
use crate::matching::recommendation::RecommendationKind;

fn default_kind() -> RecommendationKind {
    RecommendationKind::Gig
}

/// Body of `POST /api/profiles/:profile_id/search`. Filter fields sit next
/// to `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default = "default_kind")]
    pub kind: RecommendationKind,
    #[serde(flatten)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub limit: Option<usize>,
}
