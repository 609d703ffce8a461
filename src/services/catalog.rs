use std::{fmt::Display, future::Future, sync::Arc};

use serde_json::Value;

use crate::{
    config::Config,
    db::{CatalogStore, EntryCache},
    error::{AppError, AppResult, FetchError},
    models::{payload_id, CacheableEntity, EntityKind, GenreDescriptor},
    services::{
        batch::BatchFetcher, entity_store::EntityStore, genres::GenreCatalog,
        providers::CatalogProvider,
    },
};

/// Caller-facing entry point bundling the provider, the entity cache and the genre catalog
///
/// List operations pass provider payloads through untouched; provider failures become empty
/// lists. Use [`Catalog::resolve`] to turn list payloads into cached entities.
#[derive(Clone)]
pub struct Catalog {
    provider: Arc<dyn CatalogProvider>,
    entities: EntityStore,
    genres: GenreCatalog,
    batch: BatchFetcher,
}

impl Catalog {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn EntryCache>,
        batch: BatchFetcher,
        default_ttl: i64,
    ) -> Self {
        Self {
            entities: EntityStore::with_ttl(provider.clone(), store.clone(), default_ttl),
            genres: GenreCatalog::new(provider.clone(), store, cache),
            provider,
            batch,
        }
    }

    pub fn from_config(
        config: &Config,
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn EntryCache>,
    ) -> Self {
        Self::new(
            provider,
            store,
            cache,
            BatchFetcher::new(config.batch_concurrency),
            config.cache_ttl_secs,
        )
    }

    pub async fn get_or_create(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> AppResult<Option<CacheableEntity>> {
        self.entities.get_or_create(kind, tmdb_id).await
    }

    pub async fn get_or_create_movie(&self, tmdb_id: i64) -> AppResult<Option<CacheableEntity>> {
        self.get_or_create(EntityKind::Movie, tmdb_id).await
    }

    pub async fn get_or_create_tv(&self, tmdb_id: i64) -> AppResult<Option<CacheableEntity>> {
        self.get_or_create(EntityKind::TvShow, tmdb_id).await
    }

    /// Raw detail payloads for every id that could be fetched, in completion order
    pub async fn fetch_many(&self, kind: EntityKind, ids: Vec<i64>) -> Vec<Value> {
        tracing::info!(kind = %kind, count = ids.len(), "Fetching detail batch");
        self.batch
            .fetch_details(self.provider.clone(), kind, ids)
            .await
    }

    pub async fn fetch_many_movies(&self, ids: Vec<i64>) -> Vec<Value> {
        self.fetch_many(EntityKind::Movie, ids).await
    }

    pub async fn fetch_many_tv(&self, ids: Vec<i64>) -> Vec<Value> {
        self.fetch_many(EntityKind::TvShow, ids).await
    }

    pub async fn trending(&self, kind: EntityKind) -> Vec<Value> {
        absorb("trending", kind, self.provider.trending(kind)).await
    }

    pub async fn top_rated(&self, kind: EntityKind) -> Vec<Value> {
        absorb("top_rated", kind, self.provider.top_rated(kind)).await
    }

    pub async fn search(&self, kind: EntityKind, query: &str) -> AppResult<Vec<Value>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }
        Ok(absorb("search", kind, self.provider.search(kind, query)).await)
    }

    pub async fn recommendations(&self, kind: EntityKind, tmdb_id: i64) -> Vec<Value> {
        absorb(
            "recommendations",
            kind,
            self.provider.recommendations(kind, tmdb_id),
        )
        .await
    }

    pub async fn discover(&self, kind: EntityKind) -> Vec<Value> {
        absorb("discover", kind, self.provider.discover(kind)).await
    }

    /// Cached entities for the ids in `payloads`, in list order. Entries without an id or
    /// that cannot be resolved are skipped.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        payloads: &[Value],
    ) -> AppResult<Vec<CacheableEntity>> {
        let mut entities = Vec::with_capacity(payloads.len());
        for tmdb_id in payloads.iter().filter_map(payload_id) {
            if let Some(entity) = self.entities.get_or_create(kind, tmdb_id).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Scheduler entry point: pulls the trending list and brings each listed entity into the
    /// cache (creating or refreshing as needed) through the bounded fan-out. Returns how many
    /// entities were resolved.
    pub async fn refresh_trending(&self, kind: EntityKind) -> usize {
        let ids: Vec<i64> = self
            .trending(kind)
            .await
            .iter()
            .filter_map(payload_id)
            .collect();

        let entities = self.entities.clone();
        let resolved = self
            .batch
            .fetch_many(ids.clone(), move |tmdb_id| {
                let entities = entities.clone();
                async move {
                    match entities.get_or_create(kind, tmdb_id).await {
                        Ok(Some(entity)) => Ok(entity),
                        Ok(None) => Err(AppError::NotFound(format!("{} {}", kind, tmdb_id))),
                        Err(e) => Err(e),
                    }
                }
            })
            .await;

        tracing::info!(
            kind = %kind,
            listed = ids.len(),
            resolved = resolved.len(),
            "Trending refresh completed"
        );

        resolved.len()
    }

    pub async fn genres(&self, kind: EntityKind) -> AppResult<Vec<GenreDescriptor>> {
        self.genres.genres(kind).await
    }

    pub async fn invalidate_genres(&self, kind: EntityKind) -> AppResult<()> {
        self.genres.invalidate(kind).await
    }

    pub async fn sync_genres(&self, kind: EntityKind) -> AppResult<usize> {
        self.genres.sync(kind).await
    }
}

/// Converts a provider list failure into an empty list plus a log line
async fn absorb<Fut>(operation: &str, kind: impl Display, list: Fut) -> Vec<Value>
where
    Fut: Future<Output = Result<Vec<Value>, FetchError>>,
{
    match list.await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(operation, kind = %kind, error = %e, "Provider list unavailable");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCache, MemoryCatalogStore};
    use crate::services::providers::MockCatalogProvider;
    use serde_json::json;

    fn catalog(provider: MockCatalogProvider) -> (Catalog, Arc<MemoryCatalogStore>) {
        let store = Arc::new(MemoryCatalogStore::new());
        let catalog = Catalog::new(
            Arc::new(provider),
            store.clone(),
            Arc::new(MemoryCache::new()),
            BatchFetcher::default(),
            crate::models::DEFAULT_CACHE_TTL,
        );
        (catalog, store)
    }

    fn unavailable(endpoint: &str) -> FetchError {
        FetchError::Unavailable {
            endpoint: endpoint.to_string(),
            reason: "HTTP 503".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_failures_become_empty() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_trending()
            .returning(|_| Err(unavailable("/trending/movie/week")));
        provider
            .expect_discover()
            .returning(|_| Err(unavailable("/discover/tv")));

        let (catalog, _) = catalog(provider);

        assert!(catalog.trending(EntityKind::Movie).await.is_empty());
        assert!(catalog.discover(EntityKind::TvShow).await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_search_rejected_without_provider_call() {
        let mut provider = MockCatalogProvider::new();
        provider.expect_search().times(0);

        let (catalog, _) = catalog(provider);

        let result = catalog.search(EntityKind::Movie, "   ").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_search_passes_trimmed_query() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_search()
            .withf(|kind, query| *kind == EntityKind::TvShow && query.to_string() == "severance")
            .times(1)
            .returning(|_, _| Ok(vec![json!({"id": 95396, "name": "Severance"})]));

        let (catalog, _) = catalog(provider);

        let results = catalog.search(EntityKind::TvShow, " severance ").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_preserves_order_and_skips_missing() {
        let mut provider = MockCatalogProvider::new();
        provider.expect_details().returning(|kind, id| match id {
            404 => Err(FetchError::NotFound {
                endpoint: format!("/{}/{}", kind, id),
            }),
            _ => Ok(json!({"id": id, "title": format!("Movie {}", id)})),
        });

        let (catalog, _) = catalog(provider);

        let payloads = vec![
            json!({"id": 680}),
            json!({"id": 404}),
            json!({"title": "no id"}),
            json!({"id": 550}),
        ];
        let entities = catalog.resolve(EntityKind::Movie, &payloads).await.unwrap();
        let ids: Vec<i64> = entities.iter().map(|e| e.tmdb_id).collect();
        assert_eq!(ids, vec![680, 550]);
    }

    #[tokio::test]
    async fn test_fetch_many_movies_returns_successes_only() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_details()
            .times(4)
            .returning(|kind, id| {
                if id % 2 == 0 {
                    Ok(json!({"id": id}))
                } else {
                    Err(unavailable(&format!("/{}/{}", kind, id)))
                }
            });

        let (catalog, _) = catalog(provider);

        let payloads = catalog.fetch_many_movies(vec![1, 2, 3, 4]).await;
        assert_eq!(payloads.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_trending_caches_listed_entities() {
        let mut provider = MockCatalogProvider::new();
        provider.expect_trending().times(1).returning(|_| {
            Ok(vec![
                json!({"id": 1396, "name": "Breaking Bad"}),
                json!({"id": 1399, "name": "Game of Thrones"}),
                json!({"id": 9}),
            ])
        });
        provider.expect_details().times(3).returning(|kind, id| match id {
            9 => Err(FetchError::NotFound {
                endpoint: format!("/{}/{}", kind, id),
            }),
            _ => Ok(json!({"id": id, "name": format!("Show {}", id)})),
        });

        let (catalog, store) = catalog(provider);

        assert_eq!(catalog.refresh_trending(EntityKind::TvShow).await, 2);
        assert_eq!(store.entity_count(EntityKind::TvShow).await, 2);
    }

    #[tokio::test]
    async fn test_get_or_create_tv_uses_tv_kind() {
        let mut provider = MockCatalogProvider::new();
        provider
            .expect_details()
            .withf(|kind, id| *kind == EntityKind::TvShow && *id == 1396)
            .times(1)
            .returning(|_, _| Ok(json!({"id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20"})));

        let (catalog, _) = catalog(provider);

        let show = catalog.get_or_create_tv(1396).await.unwrap().unwrap();
        assert_eq!(show.kind, EntityKind::TvShow);
        assert_eq!(show.title, "Breaking Bad");
        assert!(show.first_air_date.is_some());
    }
}
