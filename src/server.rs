//! HTTP server wiring

use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::error::{Result, ScopeError};
use crate::realtime::{self, SessionManager};
use crate::storage::{
    fetch_recent_episodes, fetch_recent_steps, SharedStore, SqliteStore, DEFAULT_POOL_SIZE,
};
use crate::types::{DashboardConfig, EpisodeRecord, LiveConfig, StepRecord};

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    run_name: Arc<str>,
    store: Option<SharedStore>,
    live: LiveConfig,
    sessions: SessionManager,
}

impl AppState {
    /// `store` is `None` when no collector database could be opened; every
    /// endpoint then reports the outage instead of failing.
    pub fn new(run_name: &str, store: Option<SharedStore>, live: LiveConfig) -> Self {
        Self {
            run_name: Arc::from(run_name),
            sessions: SessionManager::new(store.clone(), live),
            store,
            live,
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_description(&self) -> Option<String> {
        self.store.as_ref().map(|store| store.describe())
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn store(&self) -> Result<&SharedStore> {
        self.store.as_ref().ok_or_else(ScopeError::no_collector)
    }

    pub async fn recent_steps(&self, n: usize) -> Result<Vec<StepRecord>> {
        fetch_recent_steps(self.store()?, n, self.live.query_timeout).await
    }

    pub async fn recent_episodes(&self, n: usize) -> Result<Vec<EpisodeRecord>> {
        fetch_recent_episodes(self.store()?, n, self.live.query_timeout).await
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/reward-history", get(api::reward_history))
        .route("/api/component-breakdown", get(api::component_breakdown))
        .route("/api/episode-history", get(api::episode_history))
        .route("/api/alerts", get(api::alerts))
        .route("/api/run", get(api::run_info))
        .route("/api/sessions", get(api::sessions))
        .route("/ws/live", get(realtime::live_handler))
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Dashboard HTTP + WebSocket server
pub struct DashboardServer {
    config: DashboardConfig,
    state: AppState,
}

impl DashboardServer {
    /// Create a server over an explicit store
    pub fn new(config: DashboardConfig, store: Option<SharedStore>) -> Self {
        let state = AppState::new(&config.run_name, store, config.live);
        Self { config, state }
    }

    /// Create a server over the run database named by `config`.
    ///
    /// A missing or unreadable database is not fatal: the server starts
    /// without a store and reports the outage per request.
    pub fn open(config: DashboardConfig) -> Self {
        let db_path = config.db_path();
        let opened =
            SqliteStore::with_options(&db_path, DEFAULT_POOL_SIZE, config.live.query_timeout);
        let store: Option<SharedStore> = match opened {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("Starting without a data collector: {}", e);
                None
            }
        };
        Self::new(config, store)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ScopeError::Config(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    ///
    /// Live sessions are cancelled as soon as the signal fires.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            run = %self.config.run_name,
            data = %self.config.data_dir.display(),
            "Dashboard listening on http://{}",
            addr
        );

        let sessions = self.state.sessions.clone();
        let app = router(self.state);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                sessions.shutdown();
            })
            .await?;

        tracing::info!("Dashboard stopped");
        Ok(())
    }
}
