pub mod catalog;
pub mod filters;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod recommendation;
pub mod scoring;
pub mod stats;
pub mod weights;

pub use catalog::LocalCatalog;
pub use filters::{DateRange, FilterError, SearchFilters, SortBy};
pub use normalize::{CompatibilityBreakdown, RawCompatibility};
pub use pipeline::{
    CompatibilityView, EngineConfig, EngineError, FetchError, FetchFailure, RecommendationEngine,
    RecommendationOutcome,
};
pub use provider::{CompatibilityProvider, DataStoreClient, ProviderError, StoreError};
pub use recommendation::{Priority, Recommendation, RecommendationKind};
pub use stats::{FetchSummary, RecommendationStats};
