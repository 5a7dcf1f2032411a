use std::sync::Arc;

use crate::config::Config;
use crate::guide::Catalog;
use crate::recommend::RecommendationService;
use crate::users::UserStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once in `main`; dropped after graceful shutdown.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Parsed once at startup. Empty when the guide could not be read.
    pub catalog: Arc<Catalog>,
    /// Why the catalog is empty, surfaced as a warning on guide endpoints.
    pub catalog_warning: Option<String>,
    pub users: UserStore,
    pub recommender: Arc<RecommendationService>,
}
