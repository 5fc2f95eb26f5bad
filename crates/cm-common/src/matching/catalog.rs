use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::normalize::RawCompatibility;
use super::provider::{
    CompatibilityProvider, CompatibleGigRow, CompatibleUserRow, DataStoreClient, ProviderError,
    StoreError,
};
use super::scoring::WeightedAttributeMatcher;
use crate::{GigRequirements, GigSummary, TalentProfile, UserSummary, parse_timestamp};

/// In-memory gigs and profiles that answer both the store and the provider
/// contract. Backs the API when no database is configured and the tests.
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    gigs: Vec<GigSummary>,
    users: Vec<UserSummary>,
    talents: HashMap<String, TalentProfile>,
    requirements: HashMap<String, GigRequirements>,
    scripted: HashMap<String, RawCompatibility>,
    failures: HashMap<String, ProviderError>,
    latency: HashMap<String, Duration>,
    matcher: WeightedAttributeMatcher,
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gig(mut self, gig: GigSummary) -> Self {
        self.gigs.push(gig);
        self
    }

    pub fn with_gig_requirements(mut self, requirements: GigRequirements) -> Self {
        self.requirements
            .insert(requirements.gig_id.clone(), requirements);
        self
    }

    pub fn with_user(mut self, user: UserSummary) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_talent(mut self, talent: TalentProfile) -> Self {
        self.talents.insert(talent.profile_id.clone(), talent);
        self
    }

    /// Answers `score` for this gig with a fixed payload instead of scoring.
    pub fn with_scripted_score(mut self, gig_id: &str, raw: RawCompatibility) -> Self {
        self.scripted.insert(gig_id.to_string(), raw);
        self
    }

    pub fn with_failure(mut self, gig_id: &str, error: ProviderError) -> Self {
        self.failures.insert(gig_id.to_string(), error);
        self
    }

    /// Delays `score` for this gig.
    pub fn with_latency(mut self, gig_id: &str, delay: Duration) -> Self {
        self.latency.insert(gig_id.to_string(), delay);
        self
    }

    fn is_published(gig: &GigSummary) -> bool {
        gig.status
            .as_deref()
            .is_none_or(|status| status.eq_ignore_ascii_case("published"))
    }

    fn evaluate(&self, profile_id: &str, gig_id: &str) -> Result<RawCompatibility, ProviderError> {
        if let Some(error) = self.failures.get(gig_id) {
            return Err(error.clone());
        }
        if let Some(raw) = self.scripted.get(gig_id) {
            return Ok(raw.clone());
        }

        let talent = self
            .talents
            .get(profile_id)
            .ok_or_else(|| ProviderError::NotFound(format!("profile {profile_id}")))?;
        let requirements = match self.requirements.get(gig_id) {
            Some(requirements) => requirements.clone(),
            None if self.gigs.iter().any(|gig| gig.id == gig_id) => GigRequirements {
                gig_id: gig_id.to_string(),
                ..GigRequirements::default()
            },
            None => return Err(ProviderError::NotFound(format!("gig {gig_id}"))),
        };

        Ok(self.matcher.evaluate(talent, &requirements).raw)
    }
}

fn matches_query(fields: &[Option<&str>], query: Option<&str>) -> bool {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return true;
    };
    let needle = query.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

#[async_trait]
impl CompatibilityProvider for LocalCatalog {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn score(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<RawCompatibility, ProviderError> {
        if let Some(delay) = self.latency.get(gig_id) {
            tokio::time::sleep(*delay).await;
        }
        self.evaluate(profile_id, gig_id)
    }

    async fn compatible_gigs(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleGigRow>, ProviderError> {
        if !self.talents.contains_key(profile_id) {
            return Err(ProviderError::NotFound(format!("profile {profile_id}")));
        }

        let mut rows: Vec<CompatibleGigRow> = self
            .gigs
            .iter()
            .filter(|gig| Self::is_published(gig))
            .filter_map(|gig| {
                let compatibility = self.evaluate(profile_id, &gig.id).ok()?;
                Some(CompatibleGigRow {
                    gig_id: gig.id.clone(),
                    title: gig.title.clone(),
                    location_text: gig.location_text.clone(),
                    start_time: gig.start_time.clone(),
                    compatibility,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            b.compatibility
                .reported_score()
                .total_cmp(&a.compatibility.reported_score())
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn compatible_users(
        &self,
        gig_id: &str,
        limit: usize,
    ) -> Result<Vec<CompatibleUserRow>, ProviderError> {
        if !self.gigs.iter().any(|gig| gig.id == gig_id) {
            return Err(ProviderError::NotFound(format!("gig {gig_id}")));
        }

        let mut rows: Vec<CompatibleUserRow> = self
            .talents
            .values()
            .filter_map(|talent| {
                let compatibility = self.evaluate(&talent.profile_id, gig_id).ok()?;
                let handle = self
                    .users
                    .iter()
                    .find(|user| user.id == talent.profile_id)
                    .and_then(|user| user.handle.clone());
                Some(CompatibleUserRow {
                    profile_id: talent.profile_id.clone(),
                    display_name: talent.display_name.clone(),
                    handle,
                    city: talent.city.clone(),
                    compatibility,
                })
            })
            .collect();

        // HashMap order is arbitrary; tie-break on id so output is stable.
        rows.sort_by(|a, b| {
            b.compatibility
                .reported_score()
                .total_cmp(&a.compatibility.reported_score())
                .then_with(|| a.profile_id.cmp(&b.profile_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl DataStoreClient for LocalCatalog {
    async fn published_gigs(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GigSummary>, StoreError> {
        let mut gigs: Vec<GigSummary> = self
            .gigs
            .iter()
            .filter(|gig| Self::is_published(gig))
            .filter(|gig| {
                matches_query(
                    &[Some(gig.title.as_str()), gig.description.as_deref()],
                    query,
                )
            })
            .cloned()
            .collect();

        gigs.sort_by_key(|gig| {
            std::cmp::Reverse(gig.created_at.as_deref().and_then(parse_timestamp))
        });
        gigs.truncate(limit);
        Ok(gigs)
    }

    async fn gig(&self, gig_id: &str) -> Result<Option<GigSummary>, StoreError> {
        Ok(self.gigs.iter().find(|gig| gig.id == gig_id).cloned())
    }

    async fn search_users(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UserSummary>, StoreError> {
        Ok(self
            .users
            .iter()
            .filter(|user| {
                matches_query(
                    &[
                        user.display_name.as_deref(),
                        user.handle.as_deref(),
                        user.bio.as_deref(),
                    ],
                    query,
                )
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn talent_profile(&self, profile_id: &str) -> Result<Option<TalentProfile>, StoreError> {
        Ok(self.talents.get(profile_id).cloned())
    }

    async fn gig_requirements(&self, gig_id: &str) -> Result<Option<GigRequirements>, StoreError> {
        if let Some(requirements) = self.requirements.get(gig_id) {
            return Ok(Some(requirements.clone()));
        }
        Ok(self
            .gigs
            .iter()
            .find(|gig| gig.id == gig_id)
            .map(|gig| GigRequirements {
                gig_id: gig.id.clone(),
                title: gig.title.clone(),
                location_text: gig.location_text.clone(),
                start_time: gig.start_time.clone(),
                looking_for: gig.looking_for.clone(),
                looking_for_types: gig.looking_for_types.clone(),
                ..GigRequirements::default()
            }))
    }
}
