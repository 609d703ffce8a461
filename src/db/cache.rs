use std::{collections::HashMap, fmt::Display, sync::Mutex};

use crate::{
    error::{AppError, AppResult},
    models::EntityKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The provider's static genre list for one kind
    GenreList(EntityKind),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::GenreList(kind) => write!(f, "genres:{}", kind),
        }
    }
}

/// Key/value store for explicitly invalidatable cache entries
///
/// Values travel as JSON strings; use the typed helpers on `dyn EntryCache`.
#[async_trait::async_trait]
pub trait EntryCache: Send + Sync {
    async fn get_raw(&self, key: &CacheKey) -> AppResult<Option<String>>;

    /// Stores a value without blocking the caller. Entries never expire on their own; they
    /// stay until invalidated.
    fn set_raw_in_background(&self, key: &CacheKey, value: String);

    /// Removes an entry so the next read misses. Writes queued before the call are applied
    /// first, so a pending write cannot resurrect the entry.
    async fn invalidate(&self, key: &CacheKey) -> AppResult<()>;
}

impl dyn EntryCache {
    /// Retrieves and deserializes a value, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Serializes and stores a value asynchronously
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw_in_background(key, json),
            Err(e) => tracing::error!(error = %e, key = %key, "Cache serialization error"),
        }
    }
}

/// Process-local [`EntryCache`]; writes apply immediately
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl EntryCache for MemoryCache {
    async fn get_raw(&self, key: &CacheKey) -> AppResult<Option<String>> {
        Ok(self.entries().get(&key.to_string()).cloned())
    }

    fn set_raw_in_background(&self, key: &CacheKey, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        self.entries().remove(&key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cache_key_display_genre_list() {
        assert_eq!(
            format!("{}", CacheKey::GenreList(EntityKind::Movie)),
            "genres:movie"
        );
        assert_eq!(
            format!("{}", CacheKey::GenreList(EntityKind::TvShow)),
            "genres:tv"
        );
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_invalidate() {
        let cache: Arc<dyn EntryCache> = Arc::new(MemoryCache::new());
        let key = CacheKey::GenreList(EntityKind::Movie);

        let miss: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(miss, None);

        cache.set_in_background(&key, &vec!["Drama".to_string()]);
        let hit: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(hit, Some(vec!["Drama".to_string()]));

        cache.invalidate(&key).await.unwrap();
        let gone: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn test_memory_cache_rejects_mismatched_type() {
        let cache: Arc<dyn EntryCache> = Arc::new(MemoryCache::new());
        let key = CacheKey::GenreList(EntityKind::Movie);

        cache.set_in_background(&key, &"not a number");
        let result: AppResult<Option<i32>> = cache.get_from_cache(&key).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
