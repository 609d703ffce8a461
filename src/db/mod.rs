use crate::{
    error::AppResult,
    models::{CacheableEntity, EntityKind, Genre, GenreDescriptor},
};

pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use cache::{CacheKey, EntryCache, MemoryCache};
pub use memory::MemoryCatalogStore;
pub use postgres::{create_pool, PgCatalogStore};
pub use self::redis::{create_redis_client, CacheWriterHandle, RedisCache};

/// Persistence contract for cached catalog entities and genres
///
/// Entities are keyed by `(kind, tmdb_id)` under a uniqueness constraint. Implementations
/// must commit each call atomically.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads an entity together with its genre associations
    async fn find_entity(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> AppResult<Option<CacheableEntity>>;

    /// Inserts a new entity record together with its genres in one atomic write.
    ///
    /// Genres in `genres` are created if unknown (an existing genre keeps its stored name)
    /// and become the entity's association set; `entity.genres` is ignored. Returns the
    /// stored association set, or `None` without writing anything when a record with the
    /// same key already exists.
    async fn insert_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Option<Vec<Genre>>>;

    /// Overwrites the scalar fields of an existing record and, in the same atomic write,
    /// replaces its associations with `genres`. An empty `genres` leaves the associations
    /// untouched. Returns the association set after the write.
    async fn update_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>>;

    /// Returns the genre with `descriptor.id`, creating it with `descriptor.name` if absent.
    /// An existing genre keeps its stored name.
    async fn ensure_genre(&self, descriptor: &GenreDescriptor) -> AppResult<Genre>;

    /// Ensures every genre in `genres` and replaces the entity's associations with exactly
    /// that set, atomically. Returns the stored association set.
    async fn replace_genres(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>>;

    /// All locally known genres, sorted by provider id
    async fn list_genres(&self) -> AppResult<Vec<Genre>>;
}
