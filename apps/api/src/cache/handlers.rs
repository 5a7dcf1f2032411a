use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::errors::AppError;
use crate::state::AppState;

/// Larger purge horizons are clamped to this.
const MAX_PURGE_HOURS: i64 = 24 * 365 * 100;

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub older_than_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub removed: usize,
}

/// GET /api/v1/cache/stats
pub async fn handle_cache_stats(
    State(state): State<AppState>,
) -> Result<Json<CacheStatsResponse>, AppError> {
    let cache = state.recommender.cache().clone();
    let ttl_hours = cache.ttl().map(|ttl| ttl.num_hours());
    let stats = tokio::task::spawn_blocking(move || cache.stats())
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("cache stats task failed: {e}")))??;
    Ok(Json(CacheStatsResponse { stats, ttl_hours }))
}

/// DELETE /api/v1/cache?older_than_hours=N
/// Without `older_than_hours` every entry is removed.
pub async fn handle_purge_cache(
    State(state): State<AppState>,
    Query(query): Query<PurgeQuery>,
) -> Result<Json<PurgeResponse>, AppError> {
    if query.older_than_hours.is_some_and(|hours| hours < 0) {
        return Err(AppError::Validation(
            "older_than_hours must not be negative".to_string(),
        ));
    }
    let cache = state.recommender.cache().clone();
    let removed = tokio::task::spawn_blocking(move || match query.older_than_hours {
        Some(hours) => {
            cache.purge_older_than(chrono::Duration::hours(hours.min(MAX_PURGE_HOURS)))
        }
        None => cache.clear(),
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("cache purge task failed: {e}")))??;
    Ok(Json(PurgeResponse { removed }))
}
