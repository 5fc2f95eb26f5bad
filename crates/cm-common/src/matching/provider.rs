use async_trait::async_trait;
use thiserror::Error;

use super::normalize::RawCompatibility;
use crate::{GigRequirements, GigSummary, TalentProfile, UserSummary};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("compatibility backend unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed compatibility payload: {0}")]
    Malformed(String),
    #[error("compatibility backend error: {0}")]
    Backend(String),
}

impl ProviderError {
    /// Whether the same call could succeed later (connection trouble rather
    /// than bad data).
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("data store unavailable: {0}")]
    Unavailable(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("data store error: {0}")]
    Backend(String),
}

/// A row of the batched "compatible gigs for a profile" lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibleGigRow {
    pub gig_id: String,
    pub title: String,
    pub location_text: Option<String>,
    pub start_time: Option<String>,
    pub compatibility: RawCompatibility,
}

/// A row of the batched "compatible users for a gig" lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibleUserRow {
    pub profile_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub city: Option<String>,
    pub compatibility: RawCompatibility,
}

/// Source of pairwise compatibility scores.
#[async_trait]
pub trait CompatibilityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(&self, profile_id: &str, gig_id: &str)
    -> Result<RawCompatibility, ProviderError>;

    async fn compatible_gigs(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleGigRow>, ProviderError>;

    async fn compatible_users(
        &self,
        gig_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleUserRow>, ProviderError>;
}

/// Read access to gigs and profiles.
#[async_trait]
pub trait DataStoreClient: Send + Sync {
    /// Published gigs, newest first, optionally matching a free-text query.
    async fn published_gigs(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GigSummary>, StoreError>;

    async fn gig(&self, gig_id: &str) -> Result<Option<GigSummary>, StoreError>;

    async fn search_users(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, StoreError>;

    async fn talent_profile(&self, profile_id: &str) -> Result<Option<TalentProfile>, StoreError>;

    async fn gig_requirements(&self, gig_id: &str) -> Result<Option<GigRequirements>, StoreError>;
}
