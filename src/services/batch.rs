use std::{collections::HashSet, fmt::Display, future::Future, sync::Arc};

use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{models::EntityKind, services::providers::CatalogProvider};

/// Default ceiling on concurrent in-flight fetches
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Fans independent per-id fetches out over a bounded number of concurrent tasks
///
/// Each id is fetched once. A failure for one id is logged and dropped without affecting the
/// others, so the output holds only the successful payloads, in completion order.
#[derive(Debug, Clone, Copy)]
pub struct BatchFetcher {
    concurrency: usize,
}

impl Default for BatchFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BatchFetcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `fetch` for every distinct id with at most `concurrency` running at once
    pub async fn fetch_many<I, F, Fut, T, E>(&self, ids: I, fetch: F) -> Vec<T>
    where
        I: IntoIterator<Item = i64>,
        F: Fn(i64) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();

        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let permits = permits.clone();
            let fetch_one = fetch(id);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring only waits for a free slot
                let _permit = permits.acquire_owned().await.ok();
                (id, fetch_one.await)
            });
        }

        let requested = seen.len();
        let mut results = Vec::with_capacity(requested);
        let mut failures = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(payload))) => results.push(payload),
                Ok((id, Err(e))) => {
                    failures += 1;
                    tracing::warn!(id, error = %e, "Batch fetch failed for id");
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(error = %e, "Batch fetch task join error");
                }
            }
        }

        if failures > 0 {
            tracing::warn!(
                requested,
                success_count = results.len(),
                error_count = failures,
                "Partial batch fetch failure"
            );
        }

        results
    }

    /// Detail payloads for `ids`, fetched through `provider`
    pub async fn fetch_details(
        &self,
        provider: Arc<dyn CatalogProvider>,
        kind: EntityKind,
        ids: impl IntoIterator<Item = i64>,
    ) -> Vec<Value> {
        self.fetch_many(ids, |id| {
            let provider = provider.clone();
            async move { provider.details(kind, id).await }
        })
        .await
    }
}
