//! Application state wiring the session stack together.
//!
//! `SessionManager` is generic over the cache tier and durable store;
//! AppState pins it to the configured cache and the SQLite store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sessiontier_core::session::{FastPathLoader, FlushReport, RequestMiddleware, SessionManager};
use sessiontier_infra::cache::ConfiguredCache;
use sessiontier_infra::config::{AppConfig, load_config, resolve_data_dir};
use sessiontier_infra::sqlite::pool::DatabasePool;
use sessiontier_infra::sqlite::state::SqliteDurableStore;
use tracing::{info, warn};

pub type ConcreteSessionManager = SessionManager<ConfiguredCache, SqliteDurableStore>;
pub type ConcreteMiddleware = RequestMiddleware<ConfiguredCache, SqliteDurableStore>;

pub struct AppState {
    pub manager: Arc<ConcreteSessionManager>,
    pub middleware: ConcreteMiddleware,
    pub fast_path: FastPathLoader<SqliteDurableStore>,
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Load configuration, open the database and connect the cache tier.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let db_url = config.infra.database_url(&data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("opening database {db_url}"))?;

        let cache = ConfiguredCache::connect(&config.infra.cache)
            .await
            .context("connecting to cache tier")?;

        let store = Arc::new(SqliteDurableStore::new(db_pool.clone()));
        let manager = Arc::new(SessionManager::new(
            Arc::new(cache),
            Arc::clone(&store),
            config.session.clone(),
        ));
        let middleware = RequestMiddleware::new(Arc::clone(&manager));
        let fast_path = FastPathLoader::new(store, config.session.durable_read_timeout());

        Ok(Self {
            manager,
            middleware,
            fast_path,
            config,
            data_dir,
            db_pool,
        })
    }

    /// Flush queued writes and close the database.
    pub async fn shutdown(self) -> FlushReport {
        let report = self.manager.flush_now().await;
        if report.failed > 0 {
            warn!(failed = report.failed, "some writes were not persisted");
        } else if report.written > 0 {
            info!(written = report.written, "flushed pending writes");
        }
        self.db_pool.close().await;
        report
    }
}
