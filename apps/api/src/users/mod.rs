// Per-user interaction tracking: one JSON record per user id, overwritten
// wholesale on every save.

pub mod export;
pub mod handlers;
pub mod models;
pub mod store;

pub use models::{Interaction, InteractionStatus, UserRecord, UserSummary};
pub use store::{generate_user_id, UserMetrics, UserStore};
