/// Declares a storage error enum with the `Pool` and `Postgres` variants every
/// query module needs, plus any module-specific variants.
macro_rules! db_error {
    ($name:ident { $($variants:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres error: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($variants)*
        }
    };
}
pub(crate) use db_error;

pub mod compatibility;
pub mod pool;
pub mod saved_searches;
pub mod store;
pub mod util;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use compatibility::{CompatibilityQueryError, PgCompatibilityProvider};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked, ping};
pub use saved_searches::{
    SavedSearch, SavedSearchError, SavedSearchInsert, insert_saved_search, list_saved_searches,
};
pub use store::{PgDataStore, StoreQueryError};

/// Trims an acting user id; `None` when blank.
pub(crate) fn validated_actor(actor: &str) -> Option<&str> {
    let trimmed = actor.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
