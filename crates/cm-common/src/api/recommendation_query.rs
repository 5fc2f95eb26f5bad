use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::matching::filters::{DateRange, SearchFilters, SortBy};

/// Query string accepted by the recommendation listings.
///
/// List-valued filters arrive comma separated (`specializations=Editorial,Runway`).
/// Anything left out keeps the [`SearchFilters`] default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub compatibility_min: Option<f64>,
    #[serde(default)]
    pub compatibility_max: Option<f64>,
    #[serde(default)]
    pub location_radius: Option<f64>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compensation_types: Option<String>,
    #[serde(default)]
    pub specializations: Option<String>,
    #[serde(default)]
    pub experience_levels: Option<String>,
    #[serde(default)]
    pub availability_status: Option<String>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Score everything through one batched provider call.
    #[serde(default)]
    pub batched: bool,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl RecommendationQuery {
    pub fn to_filters(&self) -> SearchFilters {
        let defaults = SearchFilters::default();
        SearchFilters {
            query: self.query.as_deref().map(str::trim).unwrap_or_default().to_string(),
            compatibility_min: self.compatibility_min.unwrap_or(defaults.compatibility_min),
            compatibility_max: self.compatibility_max.unwrap_or(defaults.compatibility_max),
            location_radius: self.location_radius.unwrap_or(defaults.location_radius),
            date_range: DateRange {
                start: self.date_from,
                end: self.date_to,
            },
            compensation_types: split_list(self.compensation_types.as_deref()),
            specializations: split_list(self.specializations.as_deref()),
            experience_levels: split_list(self.experience_levels.as_deref()),
            availability_status: split_list(self.availability_status.as_deref()),
            sort_by: self.sort_by.unwrap_or(defaults.sort_by),
        }
    }
}
