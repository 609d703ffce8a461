/// Metadata provider abstraction
///
/// The rest of the crate talks to the catalog provider through [`CatalogProvider`], which
/// keeps the cache layers testable without a network and leaves room for a second
/// provider later.
use serde_json::Value;

use crate::{error::FetchError, models::EntityKind};

pub mod tmdb;

pub use tmdb::{RetryPolicy, TmdbClient};

/// Read-only operations the cache needs from the metadata provider
///
/// Every method returns the raw provider payload. List operations return the entries of the
/// response's `results` (or `genres`) array; a response without that key yields an empty
/// list.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Detail lookup for a single movie or TV show
    async fn details(&self, kind: EntityKind, tmdb_id: i64) -> Result<Value, FetchError>;

    /// Weekly trending list
    async fn trending(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError>;

    /// Top-rated list
    async fn top_rated(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError>;

    /// Free-text search
    async fn search(&self, kind: EntityKind, query: &str) -> Result<Vec<Value>, FetchError>;

    /// Recommendations seeded by one title
    async fn recommendations(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> Result<Vec<Value>, FetchError>;

    /// Default discover listing
    async fn discover(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError>;

    /// Static genre list for a kind
    async fn genre_list(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
