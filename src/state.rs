use crate::cache::{MemoryCache, NoopCache, ProductCache};
use crate::config::{AppConfig, StoreBackend};
use crate::db::PgStore;
use crate::storage::{CatalogStore, MemoryStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub cache: Arc<dyn ProductCache>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Builds the state from the environment. Also returns the Postgres store,
    /// when that is the backend, so the caller can run migrations on its pool.
    pub async fn init() -> anyhow::Result<(Self, Option<PgStore>)> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, pg) = match config.store_backend {
            StoreBackend::Postgres => {
                let pg = PgStore::connect(&config).await?;
                (Arc::new(pg.clone()) as Arc<dyn CatalogStore>, Some(pg))
            }
            StoreBackend::Memory => (Arc::new(MemoryStore::new()) as Arc<dyn CatalogStore>, None),
        };

        let cache = if config.cache_enabled {
            Arc::new(MemoryCache::new()) as Arc<dyn ProductCache>
        } else {
            Arc::new(NoopCache) as Arc<dyn ProductCache>
        };

        Ok((Self::from_parts(store, cache, config), pg))
    }

    pub fn from_parts(
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn ProductCache>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { store, cache, config }
    }

    /// In-memory store and cache, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store_backend: StoreBackend::Memory,
            ..AppConfig::default()
        });
        Self::from_parts(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()), config)
    }
}
