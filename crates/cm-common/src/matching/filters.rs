use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::recommendation::{CandidateData, Priority, Recommendation};
use super::weights::MAX_SCORE;
use crate::parse_timestamp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Compatibility,
    Date,
    Location,
    Relevance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// The current filter and sort selection of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub query: String,
    pub compatibility_min: f64,
    pub compatibility_max: f64,
    pub location_radius: f64,
    pub date_range: DateRange,
    pub compensation_types: Vec<String>,
    pub specializations: Vec<String>,
    pub experience_levels: Vec<String>,
    pub availability_status: Vec<String>,
    pub sort_by: SortBy,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            query: String::new(),
            compatibility_min: 60.0,
            compatibility_max: MAX_SCORE,
            location_radius: 50.0,
            date_range: DateRange::default(),
            compensation_types: Vec::new(),
            specializations: Vec::new(),
            experience_levels: Vec::new(),
            availability_status: Vec::new(),
            sort_by: SortBy::Compatibility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("compatibility bounds must be within 0..=100 (got {min}..={max})")]
    OutOfRange { min: f64, max: f64 },
    #[error("compatibility_min ({min}) must not exceed compatibility_max ({max})")]
    Inverted { min: f64, max: f64 },
}

impl SearchFilters {
    /// Filters that keep every score; used where the caller wants sorting only.
    pub fn unbounded() -> Self {
        Self {
            compatibility_min: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        let (min, max) = (self.compatibility_min, self.compatibility_max);
        let in_range = |value: f64| (0.0..=MAX_SCORE).contains(&value);
        if !in_range(min) || !in_range(max) {
            return Err(FilterError::OutOfRange { min, max });
        }
        if min > max {
            return Err(FilterError::Inverted { min, max });
        }
        Ok(())
    }

    /// The free-text query, `None` when blank.
    pub fn text_query(&self) -> Option<&str> {
        let trimmed = self.query.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub fn matches(&self, recommendation: &Recommendation) -> bool {
        let score = recommendation.compatibility_score;
        if !(score >= self.compatibility_min && score <= self.compatibility_max) {
            return false;
        }

        let data = &recommendation.data;
        self.matches_query(data)
            && self.matches_compensation(data)
            && self.matches_specialization(data)
            && self.matches_experience(data)
            && self.matches_availability(data)
            && self.matches_date_range(data)
    }

    fn matches_query(&self, data: &CandidateData) -> bool {
        let Some(query) = self.text_query() else {
            return true;
        };
        let needle = query.to_lowercase();
        data.searchable_text()
            .iter()
            .any(|text| text.to_lowercase().contains(&needle))
    }

    fn matches_compensation(&self, data: &CandidateData) -> bool {
        if self.compensation_types.is_empty() {
            return true;
        }
        match data {
            CandidateData::Gig(gig) => gig
                .comp_type
                .as_deref()
                .is_some_and(|comp| contains_ignore_case(&self.compensation_types, comp)),
            CandidateData::User(_) => true,
        }
    }

    fn matches_specialization(&self, data: &CandidateData) -> bool {
        if self.specializations.is_empty() {
            return true;
        }
        data.specializations()
            .into_iter()
            .any(|specialization| contains_ignore_case(&self.specializations, specialization))
    }

    fn matches_experience(&self, data: &CandidateData) -> bool {
        if self.experience_levels.is_empty() {
            return true;
        }
        match (data, data.experience_level()) {
            (_, Some(level)) => contains_ignore_case(&self.experience_levels, level),
            // A gig that states no level is open to every level.
            (CandidateData::Gig(_), None) => true,
            (CandidateData::User(_), None) => false,
        }
    }

    fn matches_availability(&self, data: &CandidateData) -> bool {
        if self.availability_status.is_empty() {
            return true;
        }
        match data {
            CandidateData::User(user) => user
                .availability_status
                .as_deref()
                .is_some_and(|status| contains_ignore_case(&self.availability_status, status)),
            CandidateData::Gig(_) => true,
        }
    }

    fn matches_date_range(&self, data: &CandidateData) -> bool {
        let DateRange { start, end } = self.date_range;
        if start.is_none() && end.is_none() {
            return true;
        }
        let Some(created_at) = data.created_at().and_then(parse_timestamp) else {
            return false;
        };
        start.is_none_or(|start| created_at >= start) && end.is_none_or(|end| created_at <= end)
    }
}

fn contains_ignore_case(set: &[String], value: &str) -> bool {
    set.iter().any(|entry| entry.eq_ignore_ascii_case(value))
}

/// Keeps the recommendations that pass every active filter, in input order.
pub fn apply_filters(
    mut recommendations: Vec<Recommendation>,
    filters: &SearchFilters,
) -> Vec<Recommendation> {
    recommendations.retain(|recommendation| filters.matches(recommendation));
    recommendations
}

/// Stable in-place sort by the selected order.
pub fn sort_recommendations(recommendations: &mut [Recommendation], sort_by: SortBy) {
    match sort_by {
        SortBy::Compatibility | SortBy::Location => recommendations.sort_by(by_score_desc),
        SortBy::Date => recommendations.sort_by(by_created_at_desc),
        SortBy::Relevance => recommendations.sort_by(|a, b| {
            let a_high = a.priority == Priority::High;
            let b_high = b.priority == Priority::High;
            b_high.cmp(&a_high).then_with(|| by_score_desc(a, b))
        }),
    }
}

/// Filter, then sort. No truncation happens here; see [`take_top`].
pub fn run_pipeline(
    recommendations: Vec<Recommendation>,
    filters: &SearchFilters,
) -> Vec<Recommendation> {
    let mut filtered = apply_filters(recommendations, filters);
    sort_recommendations(&mut filtered, filters.sort_by);
    filtered
}

pub fn take_top(mut recommendations: Vec<Recommendation>, n: usize) -> Vec<Recommendation> {
    recommendations.truncate(n);
    recommendations
}

fn by_score_desc(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.compatibility_score.total_cmp(&a.compatibility_score)
}

// Valid timestamps first, newest first; missing or unparsable dates keep
// their relative order at the end.
fn by_created_at_desc(a: &Recommendation, b: &Recommendation) -> Ordering {
    let a_at = a.data.created_at().and_then(parse_timestamp);
    let b_at = b.data.created_at().and_then(parse_timestamp);
    match (a_at, b_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
