use super::normalize::{MatchFactors, RawCompatibility, SpecializationMatch, normalize};
use super::recommendation::ReasonHints;
use super::weights::MAX_SCORE;
use crate::{GigRequirements, NumericRange, TalentProfile};

/// Result of scoring one talent against one gig locally.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalScore {
    pub raw: RawCompatibility,
    pub hints: ReasonHints,
}

impl LocalScore {
    pub fn score(&self) -> f64 {
        self.raw.reported_score()
    }
}

/// Attribute-by-attribute scorer used when no remote score is available.
///
/// Each attribute the gig constrains is checked against the profile; an
/// unconstrained attribute counts as met. Points follow the breakdown
/// weights, so the emitted score always agrees with `normalize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAttributeMatcher;

impl WeightedAttributeMatcher {
    pub fn evaluate(&self, talent: &TalentProfile, gig: &GigRequirements) -> LocalScore {
        let (specialization_match, total_required) = specialization_overlap(talent, gig);

        let factors = MatchFactors {
            gender_match: gender_matches(talent, gig),
            age_match: range_matches(gig.age_range.as_ref(), talent.age.map(f64::from)),
            height_match: range_matches(gig.height_range.as_ref(), talent.height_cm),
            experience_match: gig
                .required_years_experience
                .is_none_or(|required| talent.years_experience.is_some_and(|years| years >= required)),
            specialization_match,
            total_required,
        };

        let unscored = RawCompatibility::MatchFactors {
            compatibility_score: 0.0,
            match_factors: factors.clone(),
        };
        let compatibility_score = normalize(&unscored).component_sum().round().min(MAX_SCORE);

        LocalScore {
            raw: RawCompatibility::MatchFactors {
                compatibility_score,
                match_factors: factors,
            },
            hints: ReasonHints::between(
                talent,
                &gig.looking_for,
                &gig.looking_for_types,
                gig.location_text.as_deref(),
            ),
        }
    }
}

fn gender_matches(talent: &TalentProfile, gig: &GigRequirements) -> bool {
    if gig.preferred_genders.is_empty() {
        return true;
    }
    talent.gender.as_deref().is_some_and(|gender| {
        gig.preferred_genders
            .iter()
            .any(|preferred| preferred.eq_ignore_ascii_case(gender))
    })
}

fn range_matches(range: Option<&NumericRange>, value: Option<f64>) -> bool {
    match range {
        None => true,
        Some(range) if range.is_unbounded() => true,
        Some(range) => value.is_some_and(|value| range.contains(value)),
    }
}

fn specialization_overlap(
    talent: &TalentProfile,
    gig: &GigRequirements,
) -> (SpecializationMatch, Option<f64>) {
    if gig.required_specializations.is_empty() {
        return (SpecializationMatch::Flag(true), None);
    }
    let matched = gig
        .required_specializations
        .iter()
        .filter(|required| {
            talent
                .specializations
                .iter()
                .any(|offered| offered.eq_ignore_ascii_case(required))
        })
        .count();
    (
        SpecializationMatch::Count(matched as f64),
        Some(gig.required_specializations.len() as f64),
    )
}
