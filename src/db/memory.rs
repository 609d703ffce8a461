use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::RwLock;

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{CacheableEntity, EntityKind, Genre, GenreDescriptor},
};

type EntityKey = (EntityKind, i64);

#[derive(Default)]
struct MemoryState {
    entities: HashMap<EntityKey, CacheableEntity>,
    genres: BTreeMap<i64, Genre>,
    associations: HashMap<EntityKey, BTreeSet<i64>>,
}

impl MemoryState {
    fn ensure_genre(&mut self, descriptor: &GenreDescriptor) -> Genre {
        self.genres
            .entry(descriptor.id)
            .or_insert_with(|| Genre::from(descriptor))
            .clone()
    }

    fn genres_of(&self, key: &EntityKey) -> Vec<Genre> {
        self.associations
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.genres.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Caller holds the write lock and has checked that `key` exists
    fn write_genres(&mut self, key: EntityKey, descriptors: &[GenreDescriptor]) -> Vec<Genre> {
        let ids: BTreeSet<i64> = descriptors
            .iter()
            .map(|descriptor| self.ensure_genre(descriptor).tmdb_id)
            .collect();
        self.associations.insert(key, ids);
        self.genres_of(&key)
    }
}

/// In-process [`CatalogStore`], used in tests and when no database is configured
///
/// Every call runs under a single write lock, which gives the same per-key uniqueness and
/// all-or-nothing writes the PostgreSQL store gets from its primary key and transactions.
#[derive(Default)]
pub struct MemoryCatalogStore {
    state: RwLock<MemoryState>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entities of `kind`
    pub async fn entity_count(&self, kind: EntityKind) -> usize {
        let state = self.state.read().await;
        state.entities.keys().filter(|(k, _)| *k == kind).count()
    }
}

fn not_cached(kind: EntityKind, tmdb_id: i64) -> AppError {
    AppError::NotFound(format!("{} {} is not cached", kind, tmdb_id))
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_entity(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> AppResult<Option<CacheableEntity>> {
        let state = self.state.read().await;
        let key = (kind, tmdb_id);

        Ok(state.entities.get(&key).map(|entity| {
            let mut entity = entity.clone();
            entity.genres = state.genres_of(&key);
            entity
        }))
    }

    async fn insert_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Option<Vec<Genre>>> {
        let mut state = self.state.write().await;
        let key = (entity.kind, entity.tmdb_id);

        if state.entities.contains_key(&key) {
            return Ok(None);
        }

        let mut record = entity.clone();
        record.genres.clear();
        state.entities.insert(key, record);
        Ok(Some(state.write_genres(key, genres)))
    }

    async fn update_entity(
        &self,
        entity: &CacheableEntity,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>> {
        let mut state = self.state.write().await;
        let key = (entity.kind, entity.tmdb_id);

        let record = state
            .entities
            .get_mut(&key)
            .ok_or_else(|| not_cached(entity.kind, entity.tmdb_id))?;

        record.title = entity.title.clone();
        record.overview = entity.overview.clone();
        record.poster_path = entity.poster_path.clone();
        record.first_air_date = entity.first_air_date;
        record.cached_at = entity.cached_at;
        record.cache_ttl = entity.cache_ttl;

        if genres.is_empty() {
            return Ok(state.genres_of(&key));
        }
        Ok(state.write_genres(key, genres))
    }

    async fn ensure_genre(&self, descriptor: &GenreDescriptor) -> AppResult<Genre> {
        let mut state = self.state.write().await;
        Ok(state.ensure_genre(descriptor))
    }

    async fn replace_genres(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
        genres: &[GenreDescriptor],
    ) -> AppResult<Vec<Genre>> {
        let mut state = self.state.write().await;
        let key = (kind, tmdb_id);

        if !state.entities.contains_key(&key) {
            return Err(not_cached(kind, tmdb_id));
        }
        Ok(state.write_genres(key, genres))
    }

    async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        let state = self.state.read().await;
        Ok(state.genres.values().cloned().collect())
    }
}
