use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use reelcache::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, CacheWriterHandle, CatalogStore, EntryCache,
        MemoryCache, MemoryCatalogStore, PgCatalogStore, RedisCache,
    },
    services::{providers::CatalogProvider, Catalog, TmdbClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reelcache=info".parse()?))
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let provider: Arc<dyn CatalogProvider> = Arc::new(TmdbClient::from_config(&config)?);

    let store: Arc<dyn CatalogStore> = match &config.database_url {
        Some(url) => {
            let store = PgCatalogStore::new(create_pool(url).await?);
            store.migrate().await?;
            tracing::info!("Using PostgreSQL catalog store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, cached entities will not survive a restart");
            Arc::new(MemoryCatalogStore::new())
        }
    };

    let (cache, writer): (Arc<dyn EntryCache>, Option<CacheWriterHandle>) =
        match &config.redis_url {
            Some(url) => {
                let (cache, writer) = RedisCache::new(create_redis_client(url)?);
                tracing::info!("Using Redis for the genre list cache");
                (Arc::new(cache), Some(writer))
            }
            None => (Arc::new(MemoryCache::new()), None),
        };

    let catalog = Catalog::from_config(&config, provider, store, cache);
    let app = create_router(AppState::new(catalog));

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = writer {
        writer.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
