use serde::Serialize;

use crate::matching::filters::take_top;
use crate::matching::pipeline::{FetchFailure, RecommendationOutcome};
use crate::matching::recommendation::Recommendation;
use crate::matching::stats::{
    BandAverages, FetchSummary, RecommendationStats, aggregate, band_averages,
};

/// What the listing endpoints return.
///
/// `stats` and `band_averages` describe the returned page; `total_matches`
/// counts everything that passed the filters before `limit` was applied.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub run_id: String,
    pub provider: &'static str,
    pub recommendations: Vec<Recommendation>,
    pub total_matches: usize,
    pub stats: RecommendationStats,
    pub band_averages: BandAverages,
    pub summary: FetchSummary,
    pub failures: Vec<FetchFailure>,
    pub partial: bool,
}

impl RecommendationResponse {
    pub fn from_outcome(
        outcome: RecommendationOutcome,
        provider: &'static str,
        limit: usize,
    ) -> Self {
        let total_matches = outcome.recommendations.len();
        let recommendations = take_top(outcome.recommendations, limit);
        Self {
            run_id: outcome.run_id,
            provider,
            stats: aggregate(&recommendations),
            band_averages: band_averages(&recommendations),
            total_matches,
            partial: outcome.summary.is_partial(),
            summary: outcome.summary,
            failures: outcome.failures,
            recommendations,
        }
    }
}
