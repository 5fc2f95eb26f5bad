use serde::Serialize;

use super::recommendation::{Priority, Recommendation};

/// Priority counts and mean score for a displayed recommendation list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecommendationStats {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
    /// Rounded mean of `compatibility_score`; 0 for an empty list.
    pub avg_compatibility: u32,
}

pub fn aggregate(recommendations: &[Recommendation]) -> RecommendationStats {
    let mut stats = RecommendationStats {
        total: recommendations.len(),
        ..RecommendationStats::default()
    };
    if recommendations.is_empty() {
        return stats;
    }

    let mut sum = 0.0;
    for recommendation in recommendations {
        match recommendation.priority {
            Priority::High => stats.high += 1,
            Priority::Medium => stats.medium += 1,
            Priority::Low => stats.low += 1,
        }
        sum += recommendation.compatibility_score;
    }

    let mean = sum / recommendations.len() as f64;
    stats.avg_compatibility = if mean.is_finite() {
        mean.round().max(0.0) as u32
    } else {
        0
    };
    stats
}

/// Rounded mean score of the recommendations in one priority band.
pub fn average_for(recommendations: &[Recommendation], priority: Priority) -> Option<u32> {
    let scores: Vec<f64> = recommendations
        .iter()
        .filter(|r| r.priority == priority)
        .map(|r| r.compatibility_score)
        .collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some(mean.round().max(0.0) as u32)
}

/// Mean score per priority band; a band with no entries has none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BandAverages {
    pub high: Option<u32>,
    pub medium: Option<u32>,
    pub low: Option<u32>,
}

pub fn band_averages(recommendations: &[Recommendation]) -> BandAverages {
    BandAverages {
        high: average_for(recommendations, Priority::High),
        medium: average_for(recommendations, Priority::Medium),
        low: average_for(recommendations, Priority::Low),
    }
}

/// How a fan-out went: how many candidates scored, failed, or fell below
/// the display floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub below_floor: usize,
    pub fallback_scored: usize,
}

impl FetchSummary {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GigSummary;
    use crate::matching::normalize::CompatibilityBreakdown;
    use crate::matching::recommendation::{CandidateData, build_recommendation};

    fn rec(score: f64) -> Recommendation {
        build_recommendation(
            CandidateData::Gig(GigSummary {
                id: format!("gig-{score}"),
                ..GigSummary::default()
            }),
            score,
            CompatibilityBreakdown::zeroed(score),
            "test",
        )
    }

    #[test]
    fn counts_bands_and_rounds_average() {
        let stats = aggregate(&[rec(90.0), rec(70.0), rec(65.0), rec(30.0)]);

        assert_eq!(
            stats,
            RecommendationStats {
                high: 1,
                medium: 2,
                low: 1,
                total: 4,
                avg_compatibility: 64,
            }
        );
        assert_eq!(stats.high + stats.medium + stats.low, stats.total);
    }

    #[test]
    fn empty_list_has_zero_average() {
        assert_eq!(aggregate(&[]), RecommendationStats::default());
    }

    #[test]
    fn average_rounds_half_up() {
        // (80 + 81) / 2 = 80.5
        assert_eq!(aggregate(&[rec(80.0), rec(81.0)]).avg_compatibility, 81);
    }

    #[test]
    fn per_band_average() {
        let recs = [rec(90.0), rec(85.0), rec(62.0)];
        assert_eq!(average_for(&recs, Priority::High), Some(88));
        assert_eq!(average_for(&recs, Priority::Medium), Some(62));
        assert_eq!(average_for(&recs, Priority::Low), None);
        assert_eq!(
            band_averages(&recs),
            BandAverages {
                high: Some(88),
                medium: Some(62),
                low: None,
            }
        );
    }
}
