use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::{PgPool, db_error};
use crate::db::util::{is_connection_error, is_invalid_id, timed};
use crate::matching::normalize::RawCompatibility;
use crate::matching::provider::{
    CompatibilityProvider, CompatibleGigRow, CompatibleUserRow, ProviderError,
};

const SCORE_SQL: &str = "SELECT compatibility_score::float8 AS compatibility_score, match_factors \
    FROM calculate_gig_compatibility(p_profile_id => $1::text::uuid, p_gig_id => $2::text::uuid)";

const COMPATIBLE_GIGS_SQL: &str = "SELECT gig_id::text AS gig_id, title, location_text, \
        start_time::text AS start_time, \
        compatibility_score::float8 AS compatibility_score, match_factors \
    FROM find_compatible_gigs_for_user(p_profile_id => $1::text::uuid, p_limit => $2::int4)";

const COMPATIBLE_USERS_SQL: &str = "SELECT profile_id::text AS profile_id, display_name, handle, city, \
        compatibility_score::float8 AS compatibility_score, match_factors \
    FROM find_compatible_users_for_gig(p_gig_id => $1::text::uuid, p_limit => $2::int4)";

db_error!(CompatibilityQueryError {
    #[error("failed to map compatibility row: {0}")]
    Mapping(String),
});

impl From<CompatibilityQueryError> for ProviderError {
    fn from(err: CompatibilityQueryError) -> Self {
        match err {
            CompatibilityQueryError::Pool(e) => ProviderError::Unavailable(e.to_string()),
            CompatibilityQueryError::Postgres(e) if is_connection_error(&e) => {
                ProviderError::Unavailable(e.to_string())
            }
            CompatibilityQueryError::Postgres(e) if is_invalid_id(&e) => {
                ProviderError::NotFound(e.to_string())
            }
            CompatibilityQueryError::Postgres(e) => ProviderError::Backend(e.to_string()),
            CompatibilityQueryError::Mapping(message) => ProviderError::Malformed(message),
        }
    }
}

/// Scores through the marketplace's SQL compatibility functions.
#[derive(Clone)]
pub struct PgCompatibilityProvider {
    pool: PgPool,
}

impl PgCompatibilityProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    async fn query_score(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<Option<RawCompatibility>, CompatibilityQueryError> {
        let client = self.pool.get().await?;
        let row = timed(
            "calculate_gig_compatibility",
            client.query_opt(SCORE_SQL, &[&profile_id, &gig_id]),
        )
        .await?;
        row.as_ref().map(raw_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn query_gigs(
        &self,
        profile_id: &str,
        limit: i32,
    ) -> Result<Vec<CompatibleGigRow>, CompatibilityQueryError> {
        let client = self.pool.get().await?;
        let rows = timed(
            "find_compatible_gigs_for_user",
            client.query(COMPATIBLE_GIGS_SQL, &[&profile_id, &limit]),
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CompatibleGigRow {
                    gig_id: get(row, "gig_id")?,
                    title: get::<Option<String>>(row, "title")?.unwrap_or_default(),
                    location_text: get(row, "location_text")?,
                    start_time: get(row, "start_time")?,
                    compatibility: raw_from_row(row)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn query_users(
        &self,
        gig_id: &str,
        limit: i32,
    ) -> Result<Vec<CompatibleUserRow>, CompatibilityQueryError> {
        let client = self.pool.get().await?;
        let rows = timed(
            "find_compatible_users_for_gig",
            client.query(COMPATIBLE_USERS_SQL, &[&gig_id, &limit]),
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CompatibleUserRow {
                    profile_id: get(row, "profile_id")?,
                    display_name: get(row, "display_name")?,
                    handle: get(row, "handle")?,
                    city: get(row, "city")?,
                    compatibility: raw_from_row(row)?,
                })
            })
            .collect()
    }
}

fn get<'a, T>(row: &'a Row, column: &str) -> Result<T, CompatibilityQueryError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column)
        .map_err(|e| CompatibilityQueryError::Mapping(format!("{column}: {e}")))
}

fn raw_from_row(row: &Row) -> Result<RawCompatibility, CompatibilityQueryError> {
    let score: Option<f64> = get(row, "compatibility_score")?;
    let match_factors: Option<Value> = get(row, "match_factors")?;
    Ok(RawCompatibility::from_parts(
        score.filter(|s| s.is_finite()),
        match_factors.as_ref(),
        None,
    ))
}

fn limit_param(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

#[async_trait]
impl CompatibilityProvider for PgCompatibilityProvider {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn score(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<RawCompatibility, ProviderError> {
        self.query_score(profile_id, gig_id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("no score for {profile_id}/{gig_id}")))
    }

    async fn compatible_gigs(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleGigRow>, ProviderError> {
        Ok(self.query_gigs(profile_id, limit_param(limit)).await?)
    }

    async fn compatible_users(
        &self,
        gig_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleUserRow>, ProviderError> {
        Ok(self.query_users(gig_id, limit_param(limit)).await?)
    }
}
