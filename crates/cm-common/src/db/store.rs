use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::{instrument, warn};

use crate::db::{PgPool, db_error};
use crate::db::util::{is_connection_error, is_invalid_id, timed};
use crate::matching::provider::{DataStoreClient, StoreError};
use crate::{GigRequirements, GigSummary, NumericRange, TalentProfile, UserSummary};

const GIG_COLUMNS: &str = "g.id::text AS id, g.title, g.description, g.location_text, \
    g.start_time::text AS start_time, g.end_time::text AS end_time, \
    g.comp_type::text AS comp_type, g.owner_user_id::text AS owner_user_id, \
    g.status::text AS status, g.created_at::text AS created_at, \
    g.updated_at::text AS updated_at, \
    COALESCE(g.looking_for::text[], '{}') AS looking_for, \
    COALESCE(g.looking_for_types::text[], '{}') AS looking_for_types, \
    g.applicant_preferences";

const USER_COLUMNS: &str = "u.id::text AS id, u.user_id::text AS user_id, u.display_name, \
    u.handle, u.bio, u.city, u.country, u.avatar_url, \
    COALESCE(u.specializations::text[], '{}') AS specializations, \
    u.experience_level::text AS experience_level, \
    u.availability_status::text AS availability_status, \
    u.created_at::text AS created_at, u.updated_at::text AS updated_at";

db_error!(StoreQueryError {});

impl From<StoreQueryError> for StoreError {
    fn from(err: StoreQueryError) -> Self {
        match err {
            StoreQueryError::Pool(e) => StoreError::Unavailable(e.to_string()),
            StoreQueryError::Postgres(e) if is_connection_error(&e) => {
                StoreError::Unavailable(e.to_string())
            }
            StoreQueryError::Postgres(e) => StoreError::Backend(e.to_string()),
        }
    }
}

/// The parts of `gigs.applicant_preferences` the local scorer reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApplicantPreferences {
    physical: PhysicalPreferences,
    professional: ProfessionalPreferences,
    other: OtherPreferences,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PhysicalPreferences {
    height_range: NumericRange,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfessionalPreferences {
    experience_years: NumericRange,
    specializations: RequiredPreferred,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OtherPreferences {
    age_range: NumericRange,
    genders: RequiredPreferred,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequiredPreferred {
    required: Vec<String>,
    preferred: Vec<String>,
}

fn parse_preferences(gig_id: &str, value: Option<Value>) -> ApplicantPreferences {
    match value {
        None | Some(Value::Null) => ApplicantPreferences::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(%gig_id, error = %err, "unreadable applicant_preferences, ignoring");
            ApplicantPreferences::default()
        }),
    }
}

fn bounded(range: NumericRange) -> Option<NumericRange> {
    (!range.is_unbounded()).then_some(range)
}

fn requirements_from(
    base: GigSummary,
    preferences: ApplicantPreferences,
) -> GigRequirements {
    let genders = preferences.other.genders;
    GigRequirements {
        gig_id: base.id,
        title: base.title,
        location_text: base.location_text,
        start_time: base.start_time,
        looking_for: base.looking_for,
        looking_for_types: base.looking_for_types,
        preferred_genders: if genders.required.is_empty() {
            genders.preferred
        } else {
            genders.required
        },
        age_range: bounded(preferences.other.age_range),
        height_range: bounded(preferences.physical.height_range),
        required_years_experience: preferences.professional.experience_years.min,
        required_specializations: preferences.professional.specializations.required,
    }
}

/// Specializations a gig asks for: the required ones, else the preferred.
fn with_preferences(mut gig: GigSummary, preferences: &ApplicantPreferences) -> GigSummary {
    let specializations = &preferences.professional.specializations;
    if gig.specializations.is_empty() {
        gig.specializations = if specializations.required.is_empty() {
            specializations.preferred.clone()
        } else {
            specializations.required.clone()
        };
    }
    gig
}

fn gig_from_row(row: &Row) -> (GigSummary, ApplicantPreferences) {
    let gig = GigSummary {
        id: row.get("id"),
        title: row.get::<_, Option<String>>("title").unwrap_or_default(),
        description: row.get("description"),
        location_text: row.get("location_text"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        comp_type: row.get("comp_type"),
        owner_user_id: row.get("owner_user_id"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        looking_for: row.get("looking_for"),
        looking_for_types: row.get("looking_for_types"),
        ..GigSummary::default()
    };
    let preferences = parse_preferences(&gig.id, row.get("applicant_preferences"));
    (with_preferences(gig, &preferences), preferences)
}

fn user_from_row(row: &Row) -> UserSummary {
    UserSummary {
        id: row.get("id"),
        user_id: row.get("user_id"),
        display_name: row.get("display_name"),
        handle: row.get("handle"),
        bio: row.get("bio"),
        city: row.get("city"),
        country: row.get("country"),
        avatar_url: row.get("avatar_url"),
        specializations: row.get("specializations"),
        experience_level: row.get("experience_level"),
        availability_status: row.get("availability_status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn talent_from_row(row: &Row) -> TalentProfile {
    TalentProfile {
        profile_id: row.get("id"),
        display_name: row.get("display_name"),
        city: row.get("city"),
        country: row.get("country"),
        primary_skill: row.get("primary_skill"),
        talent_categories: row.get("talent_categories"),
        gender: row.get("gender_identity"),
        age: row
            .get::<_, Option<i32>>("age")
            .and_then(|age| u32::try_from(age).ok()),
        height_cm: row.get("height_cm"),
        years_experience: row.get("years_experience"),
        specializations: row.get("specializations"),
    }
}

fn like_pattern(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Reads gigs and profiles straight from the marketplace tables.
#[derive(Clone)]
pub struct PgDataStore {
    pool: PgPool,
}

impl PgDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    async fn fetch_published_gigs(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GigSummary>, StoreQueryError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {GIG_COLUMNS} FROM gigs g \
            WHERE g.status = 'PUBLISHED' \
              AND ($1::text IS NULL OR g.title ILIKE $1 OR g.description ILIKE $1) \
            ORDER BY g.created_at DESC NULLS LAST \
            LIMIT $2"
        );
        let pattern = like_pattern(query);
        let rows = timed(
            "published_gigs",
            client.query(&sql, &[&pattern, &limit_param(limit)]),
        )
        .await?;
        Ok(rows.iter().map(|row| gig_from_row(row).0).collect())
    }

    #[instrument(skip(self))]
    async fn fetch_gig(
        &self,
        gig_id: &str,
    ) -> Result<Option<(GigSummary, ApplicantPreferences)>, StoreQueryError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {GIG_COLUMNS} FROM gigs g \
            WHERE g.id = $1::text::uuid"
        );
        let row = match timed("gig_by_id", client.query_opt(&sql, &[&gig_id])).await {
            Ok(row) => row,
            Err(err) if is_invalid_id(&err) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(row.as_ref().map(gig_from_row))
    }

    #[instrument(skip(self))]
    async fn fetch_users(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, StoreQueryError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users_profile u \
            WHERE 'TALENT' = ANY(u.account_type::text[]) \
              AND ($1::text IS NULL OR u.display_name ILIKE $1 OR u.bio ILIKE $1) \
            ORDER BY u.created_at DESC NULLS LAST \
            LIMIT $2"
        );
        let pattern = like_pattern(query);
        let rows = timed(
            "search_users",
            client.query(&sql, &[&pattern, &limit_param(limit)]),
        )
        .await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn fetch_talent(&self, profile_id: &str) -> Result<Option<TalentProfile>, StoreQueryError> {
        let client = self.pool.get().await?;
        let sql = "SELECT u.id::text AS id, u.display_name, u.city, u.country, \
                u.primary_skill, \
                COALESCE(u.talent_categories::text[], '{}') AS talent_categories, \
                u.gender_identity::text AS gender_identity, \
                date_part('year', age(u.date_of_birth))::int4 AS age, \
                u.height_cm::float8 AS height_cm, \
                u.years_experience::float8 AS years_experience, \
                COALESCE(u.specializations::text[], '{}') AS specializations \
            FROM users_profile u WHERE u.id = $1::text::uuid";
        let row = match timed("talent_profile", client.query_opt(sql, &[&profile_id])).await {
            Ok(row) => row,
            Err(err) if is_invalid_id(&err) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(row.as_ref().map(talent_from_row))
    }
}

#[async_trait]
impl DataStoreClient for PgDataStore {
    async fn published_gigs(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GigSummary>, StoreError> {
        Ok(self.fetch_published_gigs(query, limit).await?)
    }

    async fn gig(&self, gig_id: &str) -> Result<Option<GigSummary>, StoreError> {
        Ok(self.fetch_gig(gig_id).await?.map(|(gig, _)| gig))
    }

    async fn search_users(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self.fetch_users(query, limit).await?)
    }

    async fn talent_profile(&self, profile_id: &str) -> Result<Option<TalentProfile>, StoreError> {
        Ok(self.fetch_talent(profile_id).await?)
    }

    async fn gig_requirements(&self, gig_id: &str) -> Result<Option<GigRequirements>, StoreError> {
        Ok(self
            .fetch_gig(gig_id)
            .await?
            .map(|(gig, preferences)| requirements_from(gig, preferences)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::filters::SearchFilters;
    use crate::matching::normalize::CompatibilityBreakdown;
    use crate::matching::recommendation::{CandidateData, build_recommendation};
    use serde_json::json;

    #[test]
    fn reads_nested_applicant_preferences() {
        let prefs = parse_preferences(
            "g-1",
            Some(json!({
                "physical": { "height_range": { "min": 170, "max": null } },
                "professional": {
                    "experience_years": { "min": 2, "max": null },
                    "specializations": { "required": ["Editorial"], "preferred": ["Runway"] }
                },
                "other": { "age_range": { "min": 18, "max": null } }
            })),
        );

        let requirements = requirements_from(
            GigSummary {
                id: "g-1".into(),
                ..GigSummary::default()
            },
            prefs,
        );

        assert_eq!(
            requirements.height_range,
            Some(NumericRange {
                min: Some(170.0),
                max: None
            })
        );
        assert_eq!(requirements.required_years_experience, Some(2.0));
        assert_eq!(requirements.required_specializations, vec!["Editorial"]);
        assert!(requirements.preferred_genders.is_empty());
    }

    #[test]
    fn unreadable_preferences_are_unconstrained() {
        let prefs = parse_preferences("g-2", Some(json!({ "physical": "tall" })));
        let requirements = requirements_from(GigSummary::default(), prefs);
        assert!(requirements.height_range.is_none());
        assert!(requirements.age_range.is_none());
    }

    #[test]
    fn listed_gigs_carry_their_specializations_through_filters() {
        let prefs = parse_preferences(
            "g-3",
            Some(json!({
                "professional": {
                    "experience_years": { "min": 5, "max": null },
                    "specializations": { "required": ["Editorial"], "preferred": ["Runway"] }
                }
            })),
        );
        let gig = with_preferences(
            GigSummary {
                id: "g-3".into(),
                title: "Lookbook".into(),
                status: Some("PUBLISHED".into()),
                ..GigSummary::default()
            },
            &prefs,
        );
        assert_eq!(gig.specializations, vec!["Editorial"]);

        let recommendation = build_recommendation(
            CandidateData::Gig(gig),
            70.0,
            CompatibilityBreakdown::zeroed(70.0),
            "test",
        );
        let filters = SearchFilters {
            experience_levels: vec!["intermediate".into()],
            specializations: vec!["editorial".into()],
            ..SearchFilters::default()
        };
        assert!(filters.matches(&recommendation));

        let elsewhere = SearchFilters {
            specializations: vec!["Runway".into()],
            ..filters
        };
        assert!(!elsewhere.matches(&recommendation));
    }

    #[test]
    fn preferred_specializations_stand_in_when_none_required() {
        let prefs = parse_preferences(
            "g-4",
            Some(json!({
                "professional": { "specializations": { "required": [], "preferred": ["Runway"] } }
            })),
        );
        let gig = with_preferences(GigSummary::default(), &prefs);
        assert_eq!(gig.specializations, vec!["Runway"]);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(Some(" 50% off ")).as_deref(), Some("%50\\% off%"));
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(None), None);
    }
}
