use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{validate_key, BlobStore, StorageError};
use crate::users::UserRecord;

const USER_ID_LEN: usize = 8;

/// New short id: the first 8 hex characters of a random UUID.
pub fn generate_user_id() -> String {
    Uuid::new_v4().simple().to_string()[..USER_ID_LEN].to_string()
}

/// Totals across every stored user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserMetrics {
    pub total_users: usize,
    /// Users whose latest interaction falls inside the activity window.
    pub active_users: usize,
    pub unreadable_records: usize,
    pub total_storage_bytes: u64,
}

#[derive(Clone)]
pub struct UserStore {
    store: Arc<dyn BlobStore>,
}

impl UserStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Unknown ids get an empty record; nothing is written until `save`.
    pub fn load(&self, user_id: &str) -> Result<UserRecord, StorageError> {
        validate_key(user_id)?;
        let Some(bytes) = self.store.get(user_id)? else {
            debug!(user_id, "No stored record, starting empty");
            return Ok(UserRecord::new(user_id));
        };
        let mut record: UserRecord =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                key: user_id.to_string(),
                reason: e.to_string(),
            })?;
        if record.user_id != user_id {
            warn!(user_id, stored = %record.user_id, "Stored record carries a different id");
            record.user_id = user_id.to_string();
        }
        Ok(record)
    }

    /// Replaces the stored record. Concurrent writers: the last one wins.
    pub fn save(&self, user_id: &str, record: &UserRecord) -> Result<(), StorageError> {
        validate_key(user_id)?;
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StorageError::Corrupt {
            key: user_id.to_string(),
            reason: e.to_string(),
        })?;
        self.store.put(user_id, &bytes)?;
        debug!(user_id, interactions = record.interactions.len(), "User record saved");
        Ok(())
    }

    /// Reads every record once. Unreadable records still count towards users
    /// and bytes but never as active.
    pub fn metrics(&self, activity_window: Duration) -> Result<UserMetrics, StorageError> {
        let cutoff = Utc::now() - activity_window;
        let mut metrics = UserMetrics::default();
        for key in self.store.keys()? {
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            metrics.total_users += 1;
            metrics.total_storage_bytes += bytes.len() as u64;
            match serde_json::from_slice::<UserRecord>(&bytes) {
                Ok(record) => {
                    if record.last_activity().is_some_and(|at| at >= cutoff) {
                        metrics.active_users += 1;
                    }
                }
                Err(e) => {
                    debug!(user_id = %key, "Unreadable user record skipped in metrics: {e}");
                    metrics.unreadable_records += 1;
                }
            }
        }
        Ok(metrics)
    }
}
