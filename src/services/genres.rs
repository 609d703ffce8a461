use std::{collections::HashSet, sync::Arc};

use crate::{
    db::{CacheKey, CatalogStore, EntryCache},
    error::AppResult,
    models::{genre::parse_descriptors, CacheableEntity, EntityKind, Genre, GenreDescriptor},
    services::providers::CatalogProvider,
};

/// Resolves provider genre descriptors to local genres and keeps an entity's associations
/// in step with them
///
/// Every entity write that carries genres goes through here, and each one is a single
/// store call, so a record is never visible with a half-written genre set.
#[derive(Clone)]
pub struct GenreReconciler {
    store: Arc<dyn CatalogStore>,
}

impl GenreReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Replaces `entity`'s genre set with exactly the genres in `descriptors`.
    ///
    /// Unknown genres are created with the descriptor's name; known genres keep their
    /// stored name. An empty descriptor list leaves the existing associations untouched.
    pub async fn reconcile(
        &self,
        entity: &mut CacheableEntity,
        descriptors: &[GenreDescriptor],
    ) -> AppResult<()> {
        if descriptors.is_empty() {
            tracing::debug!(
                kind = %entity.kind,
                tmdb_id = entity.tmdb_id,
                "Empty genre list, keeping existing associations"
            );
            return Ok(());
        }

        let genres = self
            .store
            .replace_genres(entity.kind, entity.tmdb_id, &distinct(descriptors))
            .await?;
        self.adopt(entity, genres);
        Ok(())
    }

    /// Stores a new entity and its genres as one write. Returns `false`, leaving `entity`
    /// untouched, when the record already exists.
    pub async fn insert(
        &self,
        entity: &mut CacheableEntity,
        descriptors: &[GenreDescriptor],
    ) -> AppResult<bool> {
        match self
            .store
            .insert_entity(entity, &distinct(descriptors))
            .await?
        {
            Some(genres) => {
                self.adopt(entity, genres);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persists `entity`'s scalar fields and reconciles its genres as one write
    pub async fn update(
        &self,
        entity: &mut CacheableEntity,
        descriptors: &[GenreDescriptor],
    ) -> AppResult<()> {
        let genres = self
            .store
            .update_entity(entity, &distinct(descriptors))
            .await?;
        self.adopt(entity, genres);
        Ok(())
    }

    fn adopt(&self, entity: &mut CacheableEntity, genres: Vec<Genre>) {
        tracing::debug!(
            kind = %entity.kind,
            tmdb_id = entity.tmdb_id,
            genres = ?genres.iter().map(|genre| genre.tmdb_id).collect::<Vec<_>>(),
            "Genres reconciled"
        );
        entity.genres = genres;
    }
}

/// First descriptor per genre id, in input order
fn distinct(descriptors: &[GenreDescriptor]) -> Vec<GenreDescriptor> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    descriptors
        .iter()
        .filter(|descriptor| seen.insert(descriptor.id))
        .cloned()
        .collect()
}

/// The provider's static genre lists, memoized per kind until explicitly invalidated
#[derive(Clone)]
pub struct GenreCatalog {
    provider: Arc<dyn CatalogProvider>,
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn EntryCache>,
}

impl GenreCatalog {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn EntryCache>,
    ) -> Self {
        Self {
            provider,
            store,
            cache,
        }
    }

    /// Genre list for `kind`. A failed or empty provider response yields an empty list and
    /// is not memoized, so the next call asks the provider again.
    pub async fn genres(&self, kind: EntityKind) -> AppResult<Vec<GenreDescriptor>> {
        let key = CacheKey::GenreList(kind);
        if let Some(cached) = self.cache.get_from_cache::<Vec<GenreDescriptor>>(&key).await? {
            tracing::debug!(kind = %kind, "Genre list cache hit");
            return Ok(cached);
        }

        let genres = match self.provider.genre_list(kind).await {
            Ok(entries) => parse_descriptors(Some(&serde_json::Value::Array(entries))),
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Genre list unavailable");
                return Ok(Vec::new());
            }
        };

        if !genres.is_empty() {
            self.cache.set_in_background(&key, &genres);
        }

        tracing::info!(
            kind = %kind,
            genres = genres.len(),
            provider = self.provider.name(),
            "Genre list fetched"
        );

        Ok(genres)
    }

    /// Drops the memoized list for `kind`
    pub async fn invalidate(&self, kind: EntityKind) -> AppResult<()> {
        self.cache.invalidate(&CacheKey::GenreList(kind)).await
    }

    /// Makes sure every genre in the provider list exists locally. Returns how many genres
    /// the list held.
    pub async fn sync(&self, kind: EntityKind) -> AppResult<usize> {
        let genres = self.genres(kind).await?;
        for descriptor in &genres {
            self.store.ensure_genre(descriptor).await?;
        }

        tracing::info!(kind = %kind, synced = genres.len(), "Genres synced");
        Ok(genres.len())
    }
}
