use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::CatalogStore,
    error::AppResult,
    models::{CacheableEntity, EntityDetails, EntityKind, DEFAULT_CACHE_TTL},
    services::{genres::GenreReconciler, providers::CatalogProvider},
};

/// Get-or-create cache of provider entities with a per-entity freshness window
///
/// - Absent: fetched from the provider; a failed or not-found fetch creates nothing.
/// - Fresh: served from storage without touching the provider.
/// - Stale: refreshed from the provider. Fields the provider omitted keep their cached
///   value. When the refresh fails the stale snapshot is served as-is.
#[derive(Clone)]
pub struct EntityStore {
    provider: Arc<dyn CatalogProvider>,
    store: Arc<dyn CatalogStore>,
    reconciler: GenreReconciler,
    default_ttl: i64,
}

impl EntityStore {
    pub fn new(provider: Arc<dyn CatalogProvider>, store: Arc<dyn CatalogStore>) -> Self {
        Self::with_ttl(provider, store, DEFAULT_CACHE_TTL)
    }

    /// Store whose newly created entities get `default_ttl` seconds of freshness
    pub fn with_ttl(
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn CatalogStore>,
        default_ttl: i64,
    ) -> Self {
        Self {
            provider,
            reconciler: GenreReconciler::new(store.clone()),
            store,
            default_ttl,
        }
    }

    /// Cached entity for `(kind, tmdb_id)`, fetching or refreshing it as needed.
    ///
    /// Provider failures never surface here: they turn into `None` for uncached ids and into
    /// the stale snapshot for cached ones. Only storage errors are returned.
    pub async fn get_or_create(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> AppResult<Option<CacheableEntity>> {
        match self.store.find_entity(kind, tmdb_id).await? {
            Some(entity) if entity.is_fresh(Utc::now()) => {
                tracing::debug!(kind = %kind, tmdb_id, "Cache hit");
                Ok(Some(entity))
            }
            Some(entity) => self.refresh(entity).await.map(Some),
            None => self.create(kind, tmdb_id).await,
        }
    }

    async fn create(&self, kind: EntityKind, tmdb_id: i64) -> AppResult<Option<CacheableEntity>> {
        tracing::debug!(kind = %kind, tmdb_id, "Cache miss");

        let payload = match self.provider.details(kind, tmdb_id).await {
            Ok(payload) => payload,
            Err(e) if e.is_not_found() => {
                tracing::info!(kind = %kind, tmdb_id, "Entity not found at provider");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(kind = %kind, tmdb_id, error = %e, "Entity fetch failed, nothing cached");
                return Ok(None);
            }
        };

        let details = EntityDetails::from_payload(kind, &payload);
        let mut entity =
            CacheableEntity::from_details(kind, tmdb_id, &details, self.default_ttl, Utc::now());

        if !self.reconciler.insert(&mut entity, &details.genres).await? {
            // A concurrent caller created the record first; apply this payload on top of it
            tracing::debug!(kind = %kind, tmdb_id, "Lost create race, updating existing record");
            return match self.store.find_entity(kind, tmdb_id).await? {
                Some(existing) => self.apply(existing, &details).await.map(Some),
                None => Ok(None),
            };
        }

        tracing::info!(
            kind = %kind,
            tmdb_id,
            title = %entity.title,
            genres = entity.genres.len(),
            "Entity cached"
        );

        Ok(Some(entity))
    }

    async fn refresh(&self, entity: CacheableEntity) -> AppResult<CacheableEntity> {
        let (kind, tmdb_id) = (entity.kind, entity.tmdb_id);
        tracing::debug!(kind = %kind, tmdb_id, cached_at = %entity.cached_at, "Cache entry stale");

        match self.provider.details(kind, tmdb_id).await {
            Ok(payload) => {
                let details = EntityDetails::from_payload(kind, &payload);
                let refreshed = self.apply(entity, &details).await?;
                tracing::info!(kind = %kind, tmdb_id, "Entity refreshed");
                Ok(refreshed)
            }
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    tmdb_id,
                    error = %e,
                    "Refresh failed, serving stale entity"
                );
                Ok(entity)
            }
        }
    }

    async fn apply(
        &self,
        mut entity: CacheableEntity,
        details: &EntityDetails,
    ) -> AppResult<CacheableEntity> {
        entity.merge(details, Utc::now());
        self.reconciler.update(&mut entity, &details.genres).await?;
        Ok(entity)
    }
}
