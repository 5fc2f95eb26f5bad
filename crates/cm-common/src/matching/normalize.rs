//! Turns compatibility RPC rows into one [`CompatibilityBreakdown`] shape.
//!
//! The scoring functions have answered in several shapes over time: boolean
//! `match_factors`, a pre-computed `breakdown` object (sometimes with the older
//! `role_match` / `category_match` keys), or a bare score. [`RawCompatibility`]
//! names those shapes once at the boundary and [`normalize`] maps each of them
//! to the fixed five-component breakdown.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::weights::{BREAKDOWN_WEIGHTS, Weights};

/// Points per match factor. `total` is the score the provider reported and is
/// not guaranteed to equal the sum of the components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityBreakdown {
    pub gender: f64,
    pub age: f64,
    pub height: f64,
    pub experience: f64,
    pub specialization: f64,
    pub total: f64,
}

impl CompatibilityBreakdown {
    /// All components zero, carrying only the reported total.
    pub fn zeroed(total: f64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Every component at its full weight. Used for placeholder user results.
    pub fn full_marks(total: f64) -> Self {
        let w = BREAKDOWN_WEIGHTS;
        Self {
            gender: w.gender,
            age: w.age,
            height: w.height,
            experience: w.experience,
            specialization: w.specialization,
            total,
        }
    }

    pub fn component_sum(&self) -> f64 {
        self.gender + self.age + self.height + self.experience + self.specialization
    }
}

/// `specialization_match` is either a flag or a count of matched
/// specializations out of `total_required`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpecializationMatch {
    Flag(bool),
    Count(f64),
}

impl Default for SpecializationMatch {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl<'de> Deserialize<'de> for SpecializationMatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Bool(flag)) => Self::Flag(flag),
            Some(ref number @ Value::Number(_)) => {
                parse_number(number).map_or(Self::Flag(false), Self::Count)
            }
            Some(Value::String(raw)) => match raw.trim().parse::<f64>() {
                Ok(count) if count.is_finite() => Self::Count(count),
                _ => Self::Flag(raw.trim().eq_ignore_ascii_case("true")),
            },
            _ => Self::Flag(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchFactors {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub gender_match: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub age_match: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub height_match: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub experience_match: bool,
    #[serde(default)]
    pub specialization_match: SpecializationMatch,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_required: Option<f64>,
}

/// One compatibility result, keyed by the shape the provider answered in.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCompatibility {
    MatchFactors {
        compatibility_score: f64,
        match_factors: MatchFactors,
    },
    Breakdown {
        compatibility_score: f64,
        breakdown: CompatibilityBreakdown,
    },
    ScoreOnly {
        compatibility_score: Option<f64>,
    },
}

impl RawCompatibility {
    /// Classifies an RPC row. `match_factors` wins over `breakdown` when a row
    /// carries both.
    pub fn from_json(value: &Value) -> Self {
        let score = value.get("compatibility_score").and_then(parse_number);
        Self::from_parts(score, value.get("match_factors"), value.get("breakdown"))
    }

    pub fn from_parts(
        score: Option<f64>,
        match_factors: Option<&Value>,
        breakdown: Option<&Value>,
    ) -> Self {
        if let Some(factors) = match_factors.filter(|value| value.is_object()) {
            if let Ok(match_factors) = MatchFactors::deserialize(factors) {
                return Self::MatchFactors {
                    compatibility_score: score.unwrap_or(0.0),
                    match_factors,
                };
            }
        }

        if let Some(Value::Object(fields)) = breakdown {
            return Self::Breakdown {
                compatibility_score: score.unwrap_or(0.0),
                breakdown: legacy_breakdown(fields, score.unwrap_or(0.0)),
            };
        }

        Self::ScoreOnly {
            compatibility_score: score,
        }
    }

    /// The score as reported by the provider, `0` when it sent none.
    pub fn reported_score(&self) -> f64 {
        match self {
            Self::MatchFactors {
                compatibility_score,
                ..
            }
            | Self::Breakdown {
                compatibility_score,
                ..
            } => *compatibility_score,
            Self::ScoreOnly {
                compatibility_score,
            } => compatibility_score.unwrap_or(0.0),
        }
    }
}

impl<'de> Deserialize<'de> for RawCompatibility {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// Maps any provider shape to the fixed breakdown. Never fails.
pub fn normalize(raw: &RawCompatibility) -> CompatibilityBreakdown {
    let w = BREAKDOWN_WEIGHTS;

    match raw {
        RawCompatibility::MatchFactors {
            compatibility_score,
            match_factors,
        } => CompatibilityBreakdown {
            gender: flag_points(match_factors.gender_match, w.gender),
            age: flag_points(match_factors.age_match, w.age),
            height: flag_points(match_factors.height_match, w.height),
            experience: flag_points(match_factors.experience_match, w.experience),
            specialization: specialization_points(
                match_factors.specialization_match,
                match_factors.total_required,
                &w,
            ),
            total: *compatibility_score,
        },
        RawCompatibility::Breakdown {
            compatibility_score,
            breakdown,
        } => CompatibilityBreakdown {
            total: *compatibility_score,
            ..*breakdown
        },
        RawCompatibility::ScoreOnly {
            compatibility_score,
        } => CompatibilityBreakdown::zeroed(compatibility_score.unwrap_or(0.0)),
    }
}

/// Inverse of [`normalize`] for breakdowns whose components are either zero or
/// their full weight. Partial components collapse to a set flag, so numeric
/// specialization results do not survive the trip exactly.
pub fn build_raw_factors(breakdown: &CompatibilityBreakdown) -> RawCompatibility {
    RawCompatibility::MatchFactors {
        compatibility_score: breakdown.total,
        match_factors: MatchFactors {
            gender_match: breakdown.gender > 0.0,
            age_match: breakdown.age > 0.0,
            height_match: breakdown.height > 0.0,
            experience_match: breakdown.experience > 0.0,
            specialization_match: SpecializationMatch::Flag(breakdown.specialization > 0.0),
            total_required: None,
        },
    }
}

fn flag_points(flag: bool, weight: f64) -> f64 {
    if flag { weight } else { 0.0 }
}

fn specialization_points(
    specialization: SpecializationMatch,
    total_required: Option<f64>,
    weights: &Weights,
) -> f64 {
    match specialization {
        SpecializationMatch::Flag(flag) => flag_points(flag, weights.specialization),
        SpecializationMatch::Count(count) => {
            match total_required.filter(|total| *total > 0.0) {
                Some(total) => count / total * weights.specialization,
                // Without a denominator the count is already in points.
                None => count.clamp(0.0, weights.specialization),
            }
        }
    }
}

fn legacy_breakdown(fields: &Map<String, Value>, total: f64) -> CompatibilityBreakdown {
    let w = BREAKDOWN_WEIGHTS;
    CompatibilityBreakdown {
        gender: legacy_points(fields, &["gender", "gender_match"], w.gender),
        age: legacy_points(fields, &["age", "age_match"], w.age),
        height: legacy_points(fields, &["height", "height_match"], w.height),
        experience: legacy_points(
            fields,
            &["experience", "experience_match", "role_match"],
            w.experience,
        ),
        specialization: legacy_points(
            fields,
            &["specialization", "specialization_match", "category_match"],
            w.specialization,
        ),
        total,
    }
}

fn legacy_points(fields: &Map<String, Value>, keys: &[&str], weight: f64) -> f64 {
    match keys.iter().find_map(|key| fields.get(*key)) {
        Some(Value::Bool(flag)) => flag_points(*flag, weight),
        Some(value) => parse_number(value).unwrap_or(0.0),
        None => 0.0,
    }
}

/// Numbers arrive as JSON numbers or, for Postgres `numeric`, as strings.
pub(crate) fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(raw)) => raw.trim().eq_ignore_ascii_case("true"),
        Some(ref number @ Value::Number(_)) => parse_number(number).is_some_and(|n| n != 0.0),
        _ => false,
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_number))
}
