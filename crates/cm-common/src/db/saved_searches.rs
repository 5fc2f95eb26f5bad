use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_postgres::{Row, types::Json};
use tracing::{instrument, warn};

use crate::db::util::timed;
use crate::db::{PgPool, db_error, validated_actor};
use crate::matching::filters::SearchFilters;
use crate::matching::recommendation::RecommendationKind;

db_error!(SavedSearchError {
    #[error("failed to serialize filters: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("saved search owner is missing")]
    MissingUser,
    #[error("saved search name must not be empty")]
    MissingName,
});

/// A named set of filters a user can re-run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedSearchInsert {
    pub name: String,
    pub search_type: RecommendationKind,
    pub filters: SearchFilters,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedSearch {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub search_type: RecommendationKind,
    pub filters: SearchFilters,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn search_type_from(raw: &str) -> RecommendationKind {
    if raw.eq_ignore_ascii_case("user") {
        RecommendationKind::User
    } else {
        RecommendationKind::Gig
    }
}

fn search_type_str(kind: RecommendationKind) -> &'static str {
    match kind {
        RecommendationKind::Gig => "gig",
        RecommendationKind::User => "user",
    }
}

fn saved_search_from_row(row: &Row) -> SavedSearch {
    let id: String = row.get("id");
    let filters = match row.get::<_, Option<Value>>("filters") {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(saved_search_id = %id, error = %err, "stored filters unreadable, using defaults");
            SearchFilters::default()
        }),
        None => SearchFilters::default(),
    };

    SavedSearch {
        user_id: row.get("user_id"),
        name: row.get("name"),
        search_type: search_type_from(row.get::<_, &str>("search_type")),
        filters,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        id,
    }
}

#[instrument(skip(pool, insert), fields(name = %insert.name))]
pub async fn insert_saved_search(
    pool: &PgPool,
    user_id: &str,
    insert: &SavedSearchInsert,
) -> Result<SavedSearch, SavedSearchError> {
    let user_id = validated_actor(user_id).ok_or(SavedSearchError::MissingUser)?;
    let name = insert.name.trim();
    if name.is_empty() {
        return Err(SavedSearchError::MissingName);
    }
    let filters = serde_json::to_value(&insert.filters)?;

    let client = pool.get().await?;
    let row = timed(
        "insert_saved_search",
        client.query_one(
            "INSERT INTO saved_search_preferences \
                (user_id, name, search_type, filters, is_active) \
             VALUES ($1::text::uuid, $2, $3, $4, $5) \
             RETURNING id::text AS id, user_id::text AS user_id, name, search_type::text AS search_type, \
                filters, is_active, created_at",
            &[
                &user_id,
                &name,
                &search_type_str(insert.search_type),
                &Json(&filters),
                &insert.is_active,
            ],
        ),
    )
    .await?;

    Ok(saved_search_from_row(&row))
}

#[instrument(skip(pool))]
pub async fn list_saved_searches(
    pool: &PgPool,
    user_id: &str,
    active_only: bool,
) -> Result<Vec<SavedSearch>, SavedSearchError> {
    let user_id = validated_actor(user_id).ok_or(SavedSearchError::MissingUser)?;

    let client = pool.get().await?;
    let rows = timed(
        "list_saved_searches",
        client.query(
            "SELECT id::text AS id, user_id::text AS user_id, name, search_type::text AS search_type, \
                filters, is_active, created_at \
             FROM saved_search_preferences \
             WHERE user_id = $1::text::uuid AND ($2 = false OR is_active) \
             ORDER BY created_at DESC",
            &[&user_id, &active_only],
        ),
    )
    .await?;

    Ok(rows.iter().map(saved_search_from_row).collect())
}
