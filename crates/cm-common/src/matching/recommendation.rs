use serde::{Deserialize, Serialize};

use super::normalize::CompatibilityBreakdown;
use super::weights::{HIGH_PRIORITY_THRESHOLD, MAX_SCORE, MEDIUM_PRIORITY_THRESHOLD};
use crate::{GigSummary, TalentProfile, UserSummary};

pub const PROFILE_MATCH_REASON: &str = "Matches your profile";
pub const SEARCH_MATCH_REASON: &str = "Matches search criteria";
const BASIC_MATCH_REASON: &str = "Basic compatibility match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Buckets a score with closed lower bounds: 80 is high, 60 is medium.
pub fn classify_priority(score: f64) -> Priority {
    if score >= HIGH_PRIORITY_THRESHOLD {
        Priority::High
    } else if score >= MEDIUM_PRIORITY_THRESHOLD {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Clamps a provider score into `[0, 100]`; NaN becomes 0.
pub fn clamp_score(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, MAX_SCORE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Gig,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CandidateData {
    Gig(GigSummary),
    User(UserSummary),
}

impl CandidateData {
    pub fn id(&self) -> &str {
        match self {
            CandidateData::Gig(gig) => &gig.id,
            CandidateData::User(user) => &user.id,
        }
    }

    pub fn kind(&self) -> RecommendationKind {
        match self {
            CandidateData::Gig(_) => RecommendationKind::Gig,
            CandidateData::User(_) => RecommendationKind::User,
        }
    }

    pub fn created_at(&self) -> Option<&str> {
        match self {
            CandidateData::Gig(gig) => gig.created_at.as_deref(),
            CandidateData::User(user) => user.created_at.as_deref(),
        }
    }

    pub fn experience_level(&self) -> Option<&str> {
        match self {
            CandidateData::Gig(gig) => gig.experience_level.as_deref(),
            CandidateData::User(user) => user.experience_level.as_deref(),
        }
    }

    /// Specializations a candidate offers (users) or asks for (gigs).
    pub fn specializations(&self) -> Vec<&str> {
        match self {
            CandidateData::Gig(gig) => gig
                .specializations
                .iter()
                .chain(gig.looking_for.iter())
                .map(String::as_str)
                .collect(),
            CandidateData::User(user) => user.specializations.iter().map(String::as_str).collect(),
        }
    }

    /// Text fields a free-text query is matched against.
    pub fn searchable_text(&self) -> Vec<&str> {
        match self {
            CandidateData::Gig(gig) => [Some(gig.title.as_str()), gig.description.as_deref()]
                .into_iter()
                .flatten()
                .collect(),
            CandidateData::User(user) => [
                user.display_name.as_deref(),
                user.handle.as_deref(),
                user.bio.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }
}

/// A scored candidate ready for filtering and display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub data: CandidateData,
    pub compatibility_score: f64,
    pub compatibility_breakdown: CompatibilityBreakdown,
    pub reason: String,
    pub priority: Priority,
}

/// Wraps a candidate with its score. Total over any input; the score is
/// taken as given, so callers clamp first when the source is untrusted.
pub fn build_recommendation(
    data: CandidateData,
    score: f64,
    breakdown: CompatibilityBreakdown,
    reason: impl Into<String>,
) -> Recommendation {
    Recommendation {
        id: data.id().to_string(),
        kind: data.kind(),
        data,
        compatibility_score: score,
        compatibility_breakdown: breakdown,
        reason: reason.into(),
        priority: classify_priority(score),
    }
}

/// Facts about a talent/gig pair that the breakdown does not carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasonHints {
    pub role_match: Option<String>,
    pub partial_role_match: bool,
    pub category_match: bool,
    pub same_city: Option<String>,
}

impl ReasonHints {
    pub fn between(
        talent: &TalentProfile,
        looking_for: &[String],
        looking_for_types: &[String],
        location_text: Option<&str>,
    ) -> Self {
        let role_match = talent
            .primary_skill
            .as_ref()
            .filter(|skill| looking_for.contains(skill))
            .cloned();

        let partial_role_match = role_match.is_none()
            && talent
                .talent_categories
                .iter()
                .any(|category| looking_for.contains(category));

        let category_match = talent
            .talent_categories
            .iter()
            .any(|category| looking_for_types.contains(category));

        let same_city = match (location_text, talent.city.as_deref()) {
            (Some(location), Some(city)) if !city.trim().is_empty() => location
                .to_lowercase()
                .contains(&city.to_lowercase())
                .then(|| city.to_string()),
            _ => None,
        };

        Self {
            role_match,
            partial_role_match,
            category_match,
            same_city,
        }
    }

    pub fn for_gig(talent: &TalentProfile, gig: &GigSummary) -> Self {
        Self::between(
            talent,
            &gig.looking_for,
            &gig.looking_for_types,
            gig.location_text.as_deref(),
        )
    }
}

/// Human-readable explanation of a match, most specific facts first.
pub fn compatibility_reason(breakdown: &CompatibilityBreakdown, hints: &ReasonHints) -> String {
    let mut reasons = Vec::new();

    if let Some(role) = &hints.role_match {
        reasons.push(format!("Perfect role match: {role}"));
    } else if hints.partial_role_match {
        reasons.push("Partial role match".to_string());
    }

    if hints.category_match {
        reasons.push("Category type match".to_string());
    }

    if let Some(city) = &hints.same_city {
        reasons.push(format!("Same location: {city}"));
    }

    let components = [
        (breakdown.gender, "Gender requirements match"),
        (breakdown.age, "Age requirements match"),
        (breakdown.height, "Height requirements match"),
        (breakdown.experience, "Experience level matches"),
        (breakdown.specialization, "Specializations align"),
    ];
    reasons.extend(
        components
            .into_iter()
            .filter(|(points, _)| *points > 0.0)
            .map(|(_, phrase)| phrase.to_string()),
    );

    if reasons.is_empty() {
        BASIC_MATCH_REASON.to_string()
    } else {
        reasons.join(", ")
    }
}
