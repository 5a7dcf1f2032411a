mod cache;
mod config;
mod errors;
mod guide;
mod llm_client;
mod recommend;
mod routes;
mod state;
mod storage;
mod users;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::guide::extract::DEFAULT_INDUSTRIES;
use crate::guide::{Catalog, GuideExtractor};
use crate::llm_client::{LlmClient, ModelBackend};
use crate::recommend::{RecommendationCache, RecommendationService, RetryPolicy};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::FileStore;
use crate::users::UserStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("fairmate_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fairmate API v{}", env!("CARGO_PKG_VERSION"));

    // Storage
    let users = UserStore::new(Arc::new(FileStore::open(config.users_dir())?));
    let cache: RecommendationCache = RecommendationCache::new(
        Arc::new(FileStore::open(config.cache_dir())?),
        Some(config.cache_ttl()),
    );
    info!("Data directory: {}", config.data_dir.display());

    match cache.purge_older_than(config.cache_ttl()) {
        Ok(removed) => info!("Startup cache purge removed {removed} stale entries"),
        Err(e) => warn!("Startup cache purge failed: {e}"),
    }

    // Event guide (parsed once; an unreadable guide degrades to an empty catalog)
    let (catalog, catalog_warning) = load_catalog(&config).await;

    // LLM client (optional)
    let backend: Option<Arc<dyn ModelBackend>> = match &config.anthropic_api_key {
        Some(key) => {
            let client = LlmClient::new(key.clone(), config.llm_request_timeout())?;
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Some(Arc::new(client))
        }
        None => {
            warn!("ANTHROPIC_API_KEY is not set; recommendations will be served from cache only");
            None
        }
    };

    let retry = RetryPolicy {
        max_attempts: config.llm_max_attempts,
        ..RetryPolicy::default()
    };
    let recommender = Arc::new(RecommendationService::new(
        backend,
        cache.clone(),
        retry,
        config.recommend_timeout(),
    ));

    // Build app state
    let state = AppState {
        config: config.clone(),
        catalog: Arc::new(catalog),
        catalog_warning,
        users,
        recommender,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    match cache.purge_older_than(config.cache_ttl()) {
        Ok(removed) => info!("Final cache purge removed {removed} stale entries"),
        Err(e) => warn!("Final cache purge failed: {e}"),
    }

    Ok(())
}

async fn load_catalog(config: &Config) -> (Catalog, Option<String>) {
    let extractor = GuideExtractor::new(
        config.guide_halls.clone(),
        DEFAULT_INDUSTRIES.iter().map(|s| s.to_string()).collect(),
    );
    let path = config.guide_pdf_path.clone();
    let result = tokio::task::spawn_blocking(move || extractor.extract_file(&path)).await;

    match result {
        Ok(Ok(catalog)) => {
            info!(
                "Event guide loaded: {} companies across {} venues",
                catalog.len(),
                catalog.venues().len()
            );
            (catalog, None)
        }
        Ok(Err(e)) => {
            warn!(
                "Could not load event guide {}: {e}",
                config.guide_pdf_path.display()
            );
            (Catalog::default(), Some(format!("event guide unavailable: {e}")))
        }
        Err(e) => {
            warn!("Guide extraction task failed: {e}");
            (Catalog::default(), Some("event guide unavailable".to_string()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
