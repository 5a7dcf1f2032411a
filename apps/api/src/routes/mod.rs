pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

use crate::cache::handlers as cache;
use crate::guide::handlers as guide;
use crate::recommend::handlers as recommend;
use crate::state::AppState;
use crate::users::handlers as users;

/// Resume PDFs are small; the guide itself is never uploaded.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Event guide
        .route("/api/v1/venues", get(guide::handle_list_venues))
        .route("/api/v1/companies", get(guide::handle_list_companies))
        // User state
        .route("/api/v1/users", post(users::handle_create_user))
        .route("/api/v1/users/metrics", get(users::handle_user_metrics))
        .route(
            "/api/v1/users/:user_id",
            get(users::handle_get_user).put(users::handle_replace_user),
        )
        .route(
            "/api/v1/users/:user_id/interactions/:company",
            put(users::handle_update_interaction),
        )
        .route(
            "/api/v1/users/:user_id/summary",
            get(users::handle_user_summary),
        )
        .route(
            "/api/v1/users/:user_id/export",
            get(users::handle_export_user),
        )
        // Recommendations
        .route("/api/v1/recommendations", post(recommend::handle_recommend))
        .route(
            "/api/v1/recommendations/upload",
            post(recommend::handle_recommend_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Cache maintenance
        .route("/api/v1/cache/stats", get(cache::handle_cache_stats))
        .route("/api/v1/cache", delete(cache::handle_purge_cache))
        .with_state(state)
}
