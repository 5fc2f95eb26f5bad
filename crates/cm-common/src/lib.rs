pub mod api;
pub mod db;
pub mod logging;
pub mod matching;
pub mod run_id;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// Read-only projections of marketplace rows used by the matching pipeline.

/// Card-level view of a `gigs` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GigSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location_text: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub comp_type: Option<String>,
    pub owner_user_id: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub looking_for: Vec<String>,
    pub looking_for_types: Vec<String>,
    pub specializations: Vec<String>,
    pub experience_level: Option<String>,
}

/// Card-level view of a `users_profile` row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSummary {
    pub id: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
    pub specializations: Vec<String>,
    pub experience_level: Option<String>,
    pub availability_status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Profile attributes the local scorer compares against gig requirements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TalentProfile {
    pub profile_id: String,
    pub display_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub primary_skill: Option<String>,
    pub talent_categories: Vec<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub height_cm: Option<f64>,
    pub years_experience: Option<f64>,
    pub specializations: Vec<String>,
}

/// Inclusive numeric bounds; an open side is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// What a gig asks of applicants, flattened from `applicant_preferences`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GigRequirements {
    pub gig_id: String,
    pub title: String,
    pub location_text: Option<String>,
    pub start_time: Option<String>,
    pub looking_for: Vec<String>,
    pub looking_for_types: Vec<String>,
    pub preferred_genders: Vec<String>,
    pub age_range: Option<NumericRange>,
    pub height_range: Option<NumericRange>,
    pub required_years_experience: Option<f64>,
    pub required_specializations: Vec<String>,
}

/// Parses the timestamp formats the data store emits for `created_at`.
///
/// Accepts RFC 3339 as well as the space-separated Postgres text form with or
/// without an offset. Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    None
}
