use std::{
    collections::{HashMap, HashSet},
    env,
    str::FromStr,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info, instrument, warn};

use super::{
    filters::{FilterError, SearchFilters, run_pipeline},
    normalize::{CompatibilityBreakdown, RawCompatibility, normalize},
    provider::{CompatibilityProvider, DataStoreClient, ProviderError, StoreError},
    recommendation::{
        CandidateData, PROFILE_MATCH_REASON, Priority, ReasonHints, Recommendation,
        RecommendationKind, SEARCH_MATCH_REASON, build_recommendation, classify_priority,
        clamp_score, compatibility_reason,
    },
    scoring::{LocalScore, WeightedAttributeMatcher},
    stats::{FetchSummary, RecommendationStats, aggregate},
    weights::PLACEHOLDER_SCORE,
};
use crate::{GigRequirements, GigSummary, TalentProfile, UserSummary, run_id};

pub const DEFAULT_CONCURRENCY: usize = 6;
pub const MAX_CONCURRENCY: usize = 32;
pub const SEARCH_CANDIDATE_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound on in-flight provider calls per run.
    pub concurrency: usize,
    /// How many published gigs a recommendation run considers.
    pub candidate_limit: usize,
    /// Matches scoring below this are dropped from recommendation lists.
    pub display_floor: f64,
    pub provider_timeout: Duration,
    /// Score locally when the provider fails for a single gig.
    pub fallback_to_local: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            candidate_limit: 20,
            display_floor: 30.0,
            provider_timeout: Duration::from_millis(5_000),
            fallback_to_local: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: clamp_concurrency(
                parse_env("CM_MATCH_CONCURRENCY").unwrap_or(defaults.concurrency),
            ),
            candidate_limit: parse_env::<usize>("CM_MATCH_CANDIDATE_LIMIT")
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.candidate_limit),
            display_floor: parse_env::<f64>("CM_MATCH_DISPLAY_FLOOR")
                .filter(|floor| (0.0..=100.0).contains(floor))
                .unwrap_or(defaults.display_floor),
            provider_timeout: parse_env::<u64>("CM_MATCH_PROVIDER_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.provider_timeout),
            fallback_to_local: parse_env("CM_MATCH_FALLBACK_LOCAL")
                .unwrap_or(defaults.fallback_to_local),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }
}

fn clamp_concurrency(concurrency: usize) -> usize {
    concurrency.clamp(1, MAX_CONCURRENCY)
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

/// Why one candidate has no score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("compatibility lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("compatibility lookup returned no score")]
    Empty,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Provider(error) => error.is_transient(),
            FetchError::Timeout(_) => true,
            FetchError::Empty => false,
        }
    }
}

/// A candidate that was dropped because its score could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub candidate_id: String,
    pub reason: String,
    pub transient: bool,
}

impl FetchFailure {
    fn new(candidate_id: &str, error: &FetchError) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            reason: error.to_string(),
            transient: error.is_transient(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Filters(#[from] FilterError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("profile {0} not found")]
    ProfileNotFound(String),
    #[error("gig {0} not found")]
    GigNotFound(String),
    #[error("run superseded by a newer request (generation {0})")]
    Superseded(u64),
}

/// Result of one recommendation run. Failed lookups are reported next to
/// the list, never as zero-score entries in it.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationOutcome {
    pub run_id: String,
    pub recommendations: Vec<Recommendation>,
    pub failures: Vec<FetchFailure>,
    pub summary: FetchSummary,
    pub stats: RecommendationStats,
}

/// Single pairwise lookup, normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityView {
    pub profile_id: String,
    pub gig_id: String,
    pub compatibility_score: f64,
    pub compatibility_breakdown: CompatibilityBreakdown,
    pub priority: Priority,
    pub reason: String,
    pub source: &'static str,
}

/// Ticket for one run within a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    scope: String,
    generation: u64,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct ScopeRuns {
    /// Generations started and not yet finished or abandoned, ascending.
    active: Vec<u64>,
    /// Newest generation whose results were published.
    published: u64,
}

/// Last-started-wins bookkeeping. A run is superseded while a newer run of
/// the same scope is in flight, or once a newer one has published. A newer
/// run that fails does not supersede anything. Scopes with nothing in flight
/// are forgotten.
#[derive(Debug, Default)]
pub struct FetchGenerations {
    counter: AtomicU64,
    scopes: Mutex<HashMap<String, ScopeRuns>>,
}

impl FetchGenerations {
    pub fn begin(&self, scope: &str) -> FetchTicket {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scope.to_string())
            .or_default()
            .active
            .push(generation);
        FetchTicket {
            scope: scope.to_string(),
            generation,
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ticket.scope)
            .is_some_and(|runs| Self::current_in(runs, ticket.generation))
    }

    /// Ends the run of `ticket` and returns whether its results may be
    /// published.
    pub fn finish(&self, ticket: &FetchTicket) -> bool {
        self.release(ticket, true)
    }

    /// Ends the run of `ticket` without results.
    pub fn abandon(&self, ticket: &FetchTicket) {
        self.release(ticket, false);
    }

    fn current_in(runs: &ScopeRuns, generation: u64) -> bool {
        runs.active.last() == Some(&generation) && runs.published < generation
    }

    fn release(&self, ticket: &FetchTicket, publishing: bool) -> bool {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(runs) = scopes.get_mut(&ticket.scope) else {
            return false;
        };

        let current = Self::current_in(runs, ticket.generation);
        runs.active.retain(|generation| *generation != ticket.generation);
        if publishing && current {
            runs.published = ticket.generation;
        }
        if runs.active.is_empty() {
            scopes.remove(&ticket.scope);
        }
        publishing && current
    }

    #[cfg(test)]
    fn tracked_scopes(&self) -> usize {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A started run. Dropping it without publishing abandons the ticket, so an
/// early error return never leaves the scope claimed.
struct ActiveRun<'a> {
    generations: &'a FetchGenerations,
    ticket: FetchTicket,
    open: bool,
}

impl ActiveRun<'_> {
    /// Ok with the generation when the results may be published.
    fn finish(mut self) -> Result<u64, u64> {
        self.open = false;
        if self.generations.finish(&self.ticket) {
            Ok(self.ticket.generation)
        } else {
            Err(self.ticket.generation)
        }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.open {
            debug!(
                scope = %self.ticket.scope,
                generation = self.ticket.generation,
                "run ended without results"
            );
            self.generations.abandon(&self.ticket);
        }
    }
}

struct Scored {
    recommendation: Recommendation,
    fallback: bool,
}

type CandidateResult = Result<Scored, FetchFailure>;

/// Scores candidates against a profile through a [`CompatibilityProvider`]
/// and turns the results into filtered, sorted recommendation lists.
pub struct RecommendationEngine {
    provider: Arc<dyn CompatibilityProvider>,
    store: Arc<dyn DataStoreClient>,
    matcher: WeightedAttributeMatcher,
    config: EngineConfig,
    generations: FetchGenerations,
}

impl RecommendationEngine {
    pub fn new(
        provider: Arc<dyn CompatibilityProvider>,
        store: Arc<dyn DataStoreClient>,
        config: EngineConfig,
    ) -> Self {
        let config = EngineConfig {
            concurrency: clamp_concurrency(config.concurrency),
            ..config
        };
        Self {
            provider,
            store,
            matcher: WeightedAttributeMatcher,
            config,
            generations: FetchGenerations::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn generations(&self) -> &FetchGenerations {
        &self.generations
    }

    /// Gig recommendations for a profile, scored one gig at a time.
    #[instrument(skip(self, filters), fields(provider = self.provider.name()))]
    pub async fn recommend_gigs(
        &self,
        profile_id: &str,
        filters: &SearchFilters,
    ) -> Result<RecommendationOutcome, EngineError> {
        filters.validate()?;
        let run = self.start(&format!("gigs:{profile_id}"));

        let talent = self.require_talent(profile_id).await?;
        let gigs = self
            .store
            .published_gigs(filters.text_query(), self.config.candidate_limit)
            .await?;

        let results = self.score_gigs(&talent, gigs, ReasonMode::Explained).await;
        let outcome = self.assemble(results, filters, Some(self.config.display_floor));
        self.publish(run, outcome)
    }

    /// Gig recommendations from one batched provider call.
    #[instrument(skip(self, filters), fields(provider = self.provider.name()))]
    pub async fn recommend_gigs_batched(
        &self,
        profile_id: &str,
        filters: &SearchFilters,
    ) -> Result<RecommendationOutcome, EngineError> {
        filters.validate()?;
        let run = self.start(&format!("gigs:{profile_id}"));

        let rows = self
            .bounded(
                self.provider
                    .compatible_gigs(profile_id, self.config.candidate_limit),
            )
            .await?;

        let results = rows
            .into_iter()
            .map(|row| {
                let gig = GigSummary {
                    id: row.gig_id,
                    title: row.title,
                    location_text: row.location_text,
                    start_time: row.start_time,
                    status: Some("PUBLISHED".to_string()),
                    ..GigSummary::default()
                };
                Ok(Scored {
                    recommendation: scored_recommendation(
                        CandidateData::Gig(gig),
                        &row.compatibility,
                        |_| PROFILE_MATCH_REASON.to_string(),
                    ),
                    fallback: false,
                })
            })
            .collect();

        let outcome = self.assemble(results, filters, Some(self.config.display_floor));
        self.publish(run, outcome)
    }

    /// Ranked talent for a gig from one batched provider call.
    #[instrument(skip(self, filters), fields(provider = self.provider.name()))]
    pub async fn recommend_users_for_gig(
        &self,
        gig_id: &str,
        filters: &SearchFilters,
    ) -> Result<RecommendationOutcome, EngineError> {
        filters.validate()?;
        let run = self.start(&format!("candidates:{gig_id}"));

        let rows = self
            .bounded(
                self.provider
                    .compatible_users(gig_id, self.config.candidate_limit),
            )
            .await?;

        let results = rows
            .into_iter()
            .map(|row| {
                let user = UserSummary {
                    id: row.profile_id,
                    display_name: row.display_name,
                    handle: row.handle,
                    city: row.city,
                    ..UserSummary::default()
                };
                Ok(Scored {
                    recommendation: scored_recommendation(
                        CandidateData::User(user),
                        &row.compatibility,
                        |breakdown| compatibility_reason(breakdown, &ReasonHints::default()),
                    ),
                    fallback: false,
                })
            })
            .collect();

        let outcome = self.assemble(results, filters, Some(self.config.display_floor));
        self.publish(run, outcome)
    }

    /// Free-text search. Gigs are scored against the profile; users have no
    /// gig to be scored against and get the placeholder score.
    #[instrument(skip(self, filters), fields(provider = self.provider.name()))]
    pub async fn search(
        &self,
        profile_id: &str,
        kind: RecommendationKind,
        filters: &SearchFilters,
    ) -> Result<RecommendationOutcome, EngineError> {
        filters.validate()?;
        let run = self.start(&format!("search:{profile_id}"));

        let results = match kind {
            RecommendationKind::Gig => {
                let talent = self.require_talent(profile_id).await?;
                let gigs = self
                    .store
                    .published_gigs(filters.text_query(), SEARCH_CANDIDATE_LIMIT)
                    .await?;
                self.score_gigs(&talent, gigs, ReasonMode::Profile).await
            }
            RecommendationKind::User => self
                .store
                .search_users(filters.text_query(), SEARCH_CANDIDATE_LIMIT)
                .await?
                .into_iter()
                .map(|user| {
                    Ok(Scored {
                        recommendation: placeholder_recommendation(user),
                        fallback: false,
                    })
                })
                .collect(),
        };

        let outcome = self.assemble(results, filters, None);
        self.publish(run, outcome)
    }

    /// One normalized profile/gig score.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn compatibility(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<CompatibilityView, EngineError> {
        let fetched = self.fetch_score(profile_id, gig_id).await;

        let (raw, hints, source) = match fetched {
            Ok(raw) => {
                let hints = match self.reason_hints(profile_id, gig_id).await {
                    Ok(hints) => hints,
                    Err(error) => {
                        debug!(%gig_id, error = %error, "reason hints unavailable");
                        ReasonHints::default()
                    }
                };
                (raw, hints, self.provider.name())
            }
            Err(error) if self.config.fallback_to_local => {
                let talent = self.require_talent(profile_id).await?;
                let gig = self
                    .store
                    .gig(gig_id)
                    .await?
                    .ok_or_else(|| EngineError::GigNotFound(gig_id.to_string()))?;
                warn!(%gig_id, error = %error, "provider failed, scoring locally");
                let local = self.local_score(&talent, &gig).await;
                (local.raw, local.hints, "local")
            }
            Err(error) => return Err(error.into()),
        };

        let breakdown = normalize(&raw);
        let score = clamp_score(raw.reported_score());
        Ok(CompatibilityView {
            profile_id: profile_id.to_string(),
            gig_id: gig_id.to_string(),
            compatibility_score: score,
            compatibility_breakdown: CompatibilityBreakdown {
                total: score,
                ..breakdown
            },
            priority: classify_priority(score),
            reason: compatibility_reason(&breakdown, &hints),
            source,
        })
    }

    async fn require_talent(&self, profile_id: &str) -> Result<TalentProfile, EngineError> {
        self.store
            .talent_profile(profile_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(profile_id.to_string()))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, FetchError> {
        match timeout(self.config.provider_timeout, call).await {
            Ok(result) => result.map_err(FetchError::from),
            Err(_) => Err(FetchError::Timeout(self.config.provider_timeout)),
        }
    }

    async fn fetch_score(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<RawCompatibility, FetchError> {
        let raw = self
            .bounded(self.provider.score(profile_id, gig_id))
            .await?;
        match raw {
            RawCompatibility::ScoreOnly {
                compatibility_score: None,
            } => Err(FetchError::Empty),
            raw => Ok(raw),
        }
    }

    async fn local_score(
        &self,
        talent: &TalentProfile,
        gig: &GigSummary,
    ) -> LocalScore {
        let requirements = match self.store.gig_requirements(&gig.id).await {
            Ok(Some(requirements)) => requirements,
            Ok(None) => requirements_from_summary(gig),
            Err(error) => {
                debug!(gig_id = %gig.id, error = %error, "gig requirements unavailable");
                requirements_from_summary(gig)
            }
        };
        self.matcher.evaluate(talent, &requirements)
    }

    /// Scores every gig with at most `concurrency` provider calls in flight.
    /// Results come back in input order.
    async fn score_gigs(
        &self,
        talent: &TalentProfile,
        gigs: Vec<GigSummary>,
        reasons: ReasonMode,
    ) -> Vec<CandidateResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut pending = FuturesUnordered::new();

        for (index, gig) in gigs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            pending.push(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => self.score_gig(talent, gig, reasons).await,
                    Err(_) => Err(FetchFailure {
                        candidate_id: gig.id,
                        reason: "scoring pool closed".to_string(),
                        transient: true,
                    }),
                };
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(entry) = pending.next().await {
            results.push(entry);
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn score_gig(
        &self,
        talent: &TalentProfile,
        gig: GigSummary,
        reasons: ReasonMode,
    ) -> CandidateResult {
        let (raw, hints, fallback) = match self.fetch_score(&talent.profile_id, &gig.id).await {
            Ok(raw) => (raw, ReasonHints::for_gig(talent, &gig), false),
            Err(error) if self.config.fallback_to_local => {
                warn!(
                    gig_id = %gig.id,
                    error = %error,
                    transient = error.is_transient(),
                    "provider failed, scoring locally"
                );
                let local = self.local_score(talent, &gig).await;
                (local.raw, local.hints, true)
            }
            Err(error) => {
                warn!(
                    gig_id = %gig.id,
                    error = %error,
                    transient = error.is_transient(),
                    "compatibility lookup failed"
                );
                return Err(FetchFailure::new(&gig.id, &error));
            }
        };

        let recommendation = scored_recommendation(CandidateData::Gig(gig), &raw, |breakdown| {
            match reasons {
                ReasonMode::Explained => compatibility_reason(breakdown, &hints),
                ReasonMode::Profile => PROFILE_MATCH_REASON.to_string(),
            }
        });
        Ok(Scored {
            recommendation,
            fallback,
        })
    }

    fn assemble(
        &self,
        results: Vec<CandidateResult>,
        filters: &SearchFilters,
        display_floor: Option<f64>,
    ) -> RecommendationOutcome {
        let mut summary = FetchSummary {
            candidates: results.len(),
            ..FetchSummary::default()
        };
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut failures = Vec::new();

        for result in results {
            match result {
                Ok(scored) => {
                    summary.succeeded += 1;
                    if scored.fallback {
                        summary.fallback_scored += 1;
                    }
                    let recommendation = scored.recommendation;
                    if !seen.insert(recommendation.id.clone()) {
                        continue;
                    }
                    if display_floor.is_some_and(|floor| recommendation.compatibility_score < floor)
                    {
                        summary.below_floor += 1;
                        continue;
                    }
                    kept.push(recommendation);
                }
                Err(failure) => {
                    summary.failed += 1;
                    failures.push(failure);
                }
            }
        }

        metrics::counter!("cm_candidates_scored_total", "provider" => self.provider.name())
            .increment(summary.succeeded as u64);
        if summary.failed > 0 {
            metrics::counter!("cm_candidate_failures_total", "provider" => self.provider.name())
                .increment(summary.failed as u64);
        }

        let recommendations = run_pipeline(kept, filters);
        let stats = aggregate(&recommendations);

        RecommendationOutcome {
            run_id: run_id::generate(),
            recommendations,
            failures,
            summary,
            stats,
        }
    }

    /// Rows behind the reason text. Missing rows give generic hints.
    async fn reason_hints(
        &self,
        profile_id: &str,
        gig_id: &str,
    ) -> Result<ReasonHints, StoreError> {
        let Some(talent) = self.store.talent_profile(profile_id).await? else {
            return Ok(ReasonHints::default());
        };
        Ok(match self.store.gig(gig_id).await? {
            Some(gig) => ReasonHints::for_gig(&talent, &gig),
            None => ReasonHints::default(),
        })
    }

    fn start(&self, scope: &str) -> ActiveRun<'_> {
        ActiveRun {
            generations: &self.generations,
            ticket: self.generations.begin(scope),
            open: true,
        }
    }

    fn publish(
        &self,
        run: ActiveRun<'_>,
        outcome: RecommendationOutcome,
    ) -> Result<RecommendationOutcome, EngineError> {
        if let Err(generation) = run.finish() {
            metrics::counter!("cm_superseded_runs_total").increment(1);
            info!(generation, "discarding results of a superseded run");
            return Err(EngineError::Superseded(generation));
        }

        info!(
            run_id = %outcome.run_id,
            candidates = outcome.summary.candidates,
            shown = outcome.recommendations.len(),
            failed = outcome.summary.failed,
            below_floor = outcome.summary.below_floor,
            avg_compatibility = outcome.stats.avg_compatibility,
            "recommendation run complete"
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy)]
enum ReasonMode {
    /// Describe which factors matched.
    Explained,
    Profile,
}

fn scored_recommendation(
    data: CandidateData,
    raw: &RawCompatibility,
    reason: impl FnOnce(&CompatibilityBreakdown) -> String,
) -> Recommendation {
    let breakdown = normalize(raw);
    let score = clamp_score(raw.reported_score());
    let reason = reason(&breakdown);
    build_recommendation(
        data,
        score,
        CompatibilityBreakdown {
            total: score,
            ..breakdown
        },
        reason,
    )
}

fn placeholder_recommendation(user: UserSummary) -> Recommendation {
    let mut recommendation = build_recommendation(
        CandidateData::User(user),
        PLACEHOLDER_SCORE,
        CompatibilityBreakdown::full_marks(PLACEHOLDER_SCORE),
        SEARCH_MATCH_REASON,
    );
    recommendation.priority = Priority::Medium;
    recommendation
}

fn requirements_from_summary(gig: &GigSummary) -> GigRequirements {
    GigRequirements {
        gig_id: gig.id.clone(),
        title: gig.title.clone(),
        location_text: gig.location_text.clone(),
        start_time: gig.start_time.clone(),
        looking_for: gig.looking_for.clone(),
        looking_for_types: gig.looking_for_types.clone(),
        required_specializations: gig.specializations.clone(),
        ..GigRequirements::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::matching::catalog::LocalCatalog;
    use crate::matching::filters::SortBy;
    use crate::matching::normalize::{MatchFactors, SpecializationMatch};
    use crate::matching::provider::{CompatibleGigRow, CompatibleUserRow};

    fn gig(id: &str) -> GigSummary {
        GigSummary {
            id: id.into(),
            title: format!("Gig {id}"),
            status: Some("PUBLISHED".into()),
            ..GigSummary::default()
        }
    }

    fn talent() -> TalentProfile {
        TalentProfile {
            profile_id: "p-1".into(),
            ..TalentProfile::default()
        }
    }

    fn scored(score: f64) -> RawCompatibility {
        RawCompatibility::MatchFactors {
            compatibility_score: score,
            match_factors: MatchFactors {
                gender_match: true,
                age_match: true,
                height_match: false,
                experience_match: true,
                specialization_match: SpecializationMatch::Flag(false),
                total_required: None,
            },
        }
    }

    fn no_fallback() -> EngineConfig {
        EngineConfig {
            fallback_to_local: false,
            ..EngineConfig::default()
        }
    }

    fn engine(catalog: LocalCatalog, config: EngineConfig) -> RecommendationEngine {
        let catalog = Arc::new(catalog);
        RecommendationEngine::new(catalog.clone(), catalog, config)
    }

    fn all_scores() -> SearchFilters {
        SearchFilters::unbounded()
    }

    #[tokio::test]
    async fn keeps_window_and_sorts_descending() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("a"))
            .with_gig(gig("b"))
            .with_gig(gig("c"))
            .with_scripted_score("a", scored(72.0))
            .with_scripted_score("b", scored(40.0))
            .with_scripted_score("c", scored(95.0));

        let outcome = engine(catalog, no_fallback())
            .recommend_gigs("p-1", &SearchFilters::default())
            .await
            .unwrap();

        let scores: Vec<_> = outcome
            .recommendations
            .iter()
            .map(|r| r.compatibility_score)
            .collect();
        assert_eq!(scores, vec![95.0, 72.0]);
        assert_eq!(outcome.summary.succeeded, 3);
        assert_eq!(outcome.summary.failed, 0);
    }

    #[tokio::test]
    async fn failed_lookups_are_reported_not_zero_scored() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("ok"))
            .with_gig(gig("broken"))
            .with_gig(gig("zero"))
            .with_scripted_score("ok", scored(85.0))
            .with_scripted_score("zero", scored(0.0))
            .with_failure("broken", ProviderError::Backend("rpc exploded".into()));

        let config = EngineConfig {
            display_floor: 0.0,
            ..no_fallback()
        };
        let outcome = engine(catalog, config)
            .recommend_gigs("p-1", &all_scores())
            .await
            .unwrap();

        let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "zero"]);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].candidate_id, "broken");
        assert!(!outcome.failures[0].transient);
        assert_eq!(outcome.stats.total, 2);
    }

    #[tokio::test]
    async fn display_floor_drops_weak_matches() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("weak"))
            .with_gig(gig("fine"))
            .with_scripted_score("weak", scored(12.0))
            .with_scripted_score("fine", scored(45.0));

        let outcome = engine(catalog, no_fallback())
            .recommend_gigs("p-1", &all_scores())
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.summary.below_floor, 1);
    }

    #[tokio::test]
    async fn falls_back_to_local_scoring() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("flaky"))
            .with_failure("flaky", ProviderError::Unavailable("pool timeout".into()));

        let outcome = engine(catalog, EngineConfig::default())
            .recommend_gigs("p-1", &all_scores())
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.summary.fallback_scored, 1);
        // Nothing constrained, so the local matcher gives full marks.
        assert_eq!(outcome.recommendations[0].compatibility_score, 100.0);
    }

    #[tokio::test]
    async fn slow_provider_times_out_as_failure() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("slow"))
            .with_latency("slow", Duration::from_millis(500));

        let config = EngineConfig {
            provider_timeout: Duration::from_millis(20),
            ..no_fallback()
        };
        let outcome = engine(catalog, config)
            .recommend_gigs("p-1", &all_scores())
            .await
            .unwrap();

        assert!(outcome.recommendations.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].transient);
    }

    #[tokio::test]
    async fn unknown_profile_is_an_error() {
        let result = engine(LocalCatalog::new().with_gig(gig("a")), no_fallback())
            .recommend_gigs("ghost", &all_scores())
            .await;
        assert!(matches!(result, Err(EngineError::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn invalid_filters_are_rejected_before_fetching() {
        let filters = SearchFilters {
            compatibility_min: 80.0,
            compatibility_max: 20.0,
            ..SearchFilters::default()
        };
        let result = engine(LocalCatalog::new(), no_fallback())
            .recommend_gigs("p-1", &filters)
            .await;
        assert!(matches!(result, Err(EngineError::Filters(_))));
    }

    #[tokio::test]
    async fn newer_run_supersedes_older_one() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("slow"))
            .with_latency("slow", Duration::from_millis(200))
            .with_scripted_score("slow", scored(90.0));
        let engine = engine(catalog, no_fallback());

        let scores = all_scores();

        let (stale, _) = tokio::join!(engine.recommend_gigs("p-1", &scores), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.generations().begin("gigs:p-1")
        });

        assert!(matches!(stale, Err(EngineError::Superseded(_))));
    }

    #[tokio::test]
    async fn runs_for_other_scopes_do_not_interfere() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("slow"))
            .with_latency("slow", Duration::from_millis(100))
            .with_scripted_score("slow", scored(90.0));
        let engine = engine(catalog, no_fallback());

        let scores = all_scores();

        let (result, _) = tokio::join!(engine.recommend_gigs("p-1", &scores), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.generations().begin("gigs:someone-else")
        });

        assert!(result.is_ok());
    }

    #[test]
    fn generations_track_latest_ticket_per_scope() {
        let generations = FetchGenerations::default();
        let first = generations.begin("gigs:p-1");
        let second = generations.begin("gigs:p-1");

        assert!(!generations.is_current(&first));
        assert!(generations.is_current(&second));
        assert!(!generations.finish(&first));
        assert!(generations.finish(&second));
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn failed_newer_ticket_leaves_older_one_current() {
        let generations = FetchGenerations::default();
        let older = generations.begin("gigs:p-1");
        let newer = generations.begin("gigs:p-1");

        assert!(!generations.is_current(&older));
        generations.abandon(&newer);
        assert!(generations.is_current(&older));
        assert!(generations.finish(&older));
        assert_eq!(generations.tracked_scopes(), 0);
    }

    #[test]
    fn published_newer_run_still_supersedes_older_one() {
        let generations = FetchGenerations::default();
        let older = generations.begin("gigs:p-1");
        let newer = generations.begin("gigs:p-1");

        assert!(generations.finish(&newer));
        assert!(!generations.finish(&older));
        assert_eq!(generations.tracked_scopes(), 0);
    }

    /// Store over a [`LocalCatalog`] that can fail gig listings after a
    /// number of calls, or fail every profile lookup.
    struct FlakyStore {
        inner: Arc<LocalCatalog>,
        listings_before_failure: usize,
        listings: AtomicUsize,
        profiles_down: bool,
    }

    impl FlakyStore {
        fn new(inner: Arc<LocalCatalog>) -> Self {
            Self {
                inner,
                listings_before_failure: usize::MAX,
                listings: AtomicUsize::new(0),
                profiles_down: false,
            }
        }
    }

    #[async_trait]
    impl DataStoreClient for FlakyStore {
        async fn published_gigs(
            &self,
            query: Option<&str>,
            limit: usize,
        ) -> Result<Vec<GigSummary>, StoreError> {
            if self.listings.fetch_add(1, Ordering::SeqCst) >= self.listings_before_failure {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.published_gigs(query, limit).await
        }

        async fn gig(&self, gig_id: &str) -> Result<Option<GigSummary>, StoreError> {
            self.inner.gig(gig_id).await
        }

        async fn search_users(
            &self,
            query: Option<&str>,
            limit: usize,
        ) -> Result<Vec<UserSummary>, StoreError> {
            self.inner.search_users(query, limit).await
        }

        async fn talent_profile(
            &self,
            profile_id: &str,
        ) -> Result<Option<TalentProfile>, StoreError> {
            if self.profiles_down {
                return Err(StoreError::Backend("users_profile unreadable".into()));
            }
            self.inner.talent_profile(profile_id).await
        }

        async fn gig_requirements(
            &self,
            gig_id: &str,
        ) -> Result<Option<GigRequirements>, StoreError> {
            self.inner.gig_requirements(gig_id).await
        }
    }

    #[tokio::test]
    async fn failed_runs_leave_no_scope_behind() {
        let engine = engine(LocalCatalog::new().with_gig(gig("a")), no_fallback());

        for profile in ["ghost-1", "ghost-2", "ghost-3"] {
            let result = engine.recommend_gigs(profile, &all_scores()).await;
            assert!(matches!(result, Err(EngineError::ProfileNotFound(_))));
        }
        let result = engine.recommend_gigs_batched("ghost-4", &all_scores()).await;
        assert!(result.is_err());
        let result = engine.search("ghost-5", RecommendationKind::Gig, &all_scores()).await;
        assert!(result.is_err());

        assert_eq!(engine.generations().tracked_scopes(), 0);
    }

    #[tokio::test]
    async fn failed_newer_run_does_not_discard_older_one() {
        let catalog = Arc::new(
            LocalCatalog::new()
                .with_talent(talent())
                .with_gig(gig("slow"))
                .with_latency("slow", Duration::from_millis(200))
                .with_scripted_score("slow", scored(90.0)),
        );
        let store = FlakyStore {
            listings_before_failure: 1,
            ..FlakyStore::new(catalog.clone())
        };
        let engine = RecommendationEngine::new(catalog, Arc::new(store), no_fallback());

        let scores = all_scores();

        let (older, newer) = tokio::join!(engine.recommend_gigs("p-1", &scores), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.recommend_gigs("p-1", &all_scores()).await
        });

        assert!(matches!(newer, Err(EngineError::Store(_))));
        let older = older.unwrap();
        assert_eq!(older.recommendations[0].compatibility_score, 90.0);
        assert_eq!(engine.generations().tracked_scopes(), 0);
    }

    #[tokio::test]
    async fn compatibility_survives_unreadable_hint_rows() {
        let catalog = Arc::new(
            LocalCatalog::new()
                .with_talent(talent())
                .with_gig(gig("g-1"))
                .with_scripted_score("g-1", scored(88.0)),
        );
        let store = FlakyStore {
            profiles_down: true,
            ..FlakyStore::new(catalog.clone())
        };
        let engine = RecommendationEngine::new(catalog, Arc::new(store), no_fallback());

        let view = engine.compatibility("p-1", "g-1").await.unwrap();

        assert_eq!(view.compatibility_score, 88.0);
        assert_eq!(view.source, "local");
        assert!(!view.reason.is_empty());
    }

    /// Counts concurrent `score` calls.
    struct CountingProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CompatibilityProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn score(
            &self,
            _profile_id: &str,
            _gig_id: &str,
        ) -> Result<RawCompatibility, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(scored(70.0))
        }

        async fn compatible_gigs(
            &self,
            _profile_id: &str,
            _limit: usize,
        ) -> Result<Vec<CompatibleGigRow>, ProviderError> {
            Ok(Vec::new())
        }

        async fn compatible_users(
            &self,
            _gig_id: &str,
            _limit: usize,
        ) -> Result<Vec<CompatibleUserRow>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_and_order_preserved() {
        let mut catalog = LocalCatalog::new().with_talent(talent());
        for n in 0..12 {
            catalog = catalog.with_gig(GigSummary {
                created_at: Some(format!("2025-01-{:02}T00:00:00Z", n + 1)),
                ..gig(&format!("g{n:02}"))
            });
        }
        let provider = Arc::new(CountingProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = EngineConfig {
            candidate_limit: 50,
            ..no_fallback()
        }
        .with_concurrency(3);
        let engine = RecommendationEngine::new(provider.clone(), Arc::new(catalog), config);

        let outcome = engine
            .recommend_gigs("p-1", &all_scores())
            .await
            .unwrap();

        assert!(provider.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(outcome.recommendations.len(), 12);
        // Equal scores keep store order, newest first.
        assert_eq!(outcome.recommendations[0].id, "g11");
        assert_eq!(outcome.recommendations[11].id, "g00");
    }

    #[tokio::test]
    async fn user_search_uses_placeholder_scores() {
        let catalog = LocalCatalog::new()
            .with_user(UserSummary {
                id: "u-1".into(),
                display_name: Some("Aoife".into()),
                ..UserSummary::default()
            })
            .with_user(UserSummary {
                id: "u-2".into(),
                display_name: Some("Niamh".into()),
                ..UserSummary::default()
            });
        let filters = SearchFilters {
            query: "aoife".into(),
            ..SearchFilters::default()
        };

        let outcome = engine(catalog, no_fallback())
            .search("p-1", RecommendationKind::User, &filters)
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.len(), 1);
        let rec = &outcome.recommendations[0];
        assert_eq!(rec.compatibility_score, 75.0);
        assert_eq!(rec.priority, Priority::Medium);
        assert_eq!(rec.reason, "Matches search criteria");
        assert_eq!(rec.compatibility_breakdown.component_sum(), 100.0);
    }

    #[tokio::test]
    async fn gig_search_scores_and_ignores_display_floor() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("low"))
            .with_scripted_score("low", scored(10.0));

        let outcome = engine(catalog, no_fallback())
            .search("p-1", RecommendationKind::Gig, &all_scores())
            .await
            .unwrap();

        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.recommendations[0].reason, "Matches your profile");
    }

    #[tokio::test]
    async fn batched_gigs_dedupe_and_sort() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("a"))
            .with_gig(gig("b"))
            .with_scripted_score("a", scored(65.0))
            .with_scripted_score("b", scored(88.0));

        let filters = SearchFilters {
            sort_by: SortBy::Relevance,
            ..SearchFilters::default()
        };
        let outcome = engine(catalog, no_fallback())
            .recommend_gigs_batched("p-1", &filters)
            .await
            .unwrap();

        let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(outcome.stats.high, 1);
        assert_eq!(outcome.stats.medium, 1);
    }

    #[tokio::test]
    async fn users_for_gig_are_ranked() {
        let catalog = LocalCatalog::new()
            .with_gig(gig("g-1"))
            .with_gig_requirements(GigRequirements {
                gig_id: "g-1".into(),
                preferred_genders: vec!["female".into()],
                ..GigRequirements::default()
            })
            .with_talent(TalentProfile {
                profile_id: "match".into(),
                gender: Some("Female".into()),
                ..TalentProfile::default()
            })
            .with_talent(TalentProfile {
                profile_id: "partial".into(),
                gender: Some("male".into()),
                ..TalentProfile::default()
            });

        let outcome = engine(catalog, no_fallback())
            .recommend_users_for_gig("g-1", &all_scores())
            .await
            .unwrap();

        let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["match", "partial"]);
        assert_eq!(outcome.recommendations[1].compatibility_score, 80.0);
    }

    #[tokio::test]
    async fn single_lookup_normalizes_and_explains() {
        let catalog = LocalCatalog::new()
            .with_talent(talent())
            .with_gig(gig("g-1"))
            .with_scripted_score("g-1", scored(65.0));

        let view = engine(catalog, no_fallback())
            .compatibility("p-1", "g-1")
            .await
            .unwrap();

        assert_eq!(view.priority, Priority::Medium);
        assert_eq!(view.compatibility_breakdown.gender, 20.0);
        assert_eq!(view.compatibility_breakdown.height, 0.0);
        assert_eq!(view.source, "local");
        assert!(view.reason.contains("Experience level matches"));
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(EngineConfig::default().with_concurrency(0).concurrency, 1);
        assert_eq!(EngineConfig::default().with_concurrency(500).concurrency, 32);
    }
}
