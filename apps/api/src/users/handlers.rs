use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::state::AppState;
use crate::storage::{validate_key, StorageError};
use crate::users::export::export_csv;
use crate::users::{
    generate_user_id, Interaction, InteractionStatus, UserMetrics, UserRecord, UserSummary,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Serialize)]
pub struct UserStateResponse {
    pub record: UserRecord,
    /// False when the record could not be read or written; the session keeps
    /// working from the returned copy.
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRecordRequest {
    #[serde(default)]
    pub interactions: BTreeMap<String, Interaction>,
}

#[derive(Debug, Serialize)]
pub struct UserMetricsResponse {
    #[serde(flatten)]
    pub metrics: UserMetrics,
    pub activity_window_hours: i64,
    pub storage_mb: f64,
    pub warnings: Vec<String>,
    pub performance_ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct InteractionUpdate {
    pub status: Option<String>,
    pub note: Option<String>,
}

/// POST /api/v1/users
pub async fn handle_create_user(
    State(state): State<AppState>,
) -> (StatusCode, Json<UserStateResponse>) {
    let user_id = generate_user_id();
    let record = UserRecord::new(&user_id);
    let (persisted, warning) = persist(&state, &record).await;
    info!(user_id = %user_id, persisted, "New user created");
    (
        StatusCode::CREATED,
        Json(UserStateResponse {
            record,
            persisted,
            warning,
        }),
    )
}

/// GET /api/v1/users/:user_id
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStateResponse>, AppError> {
    let (record, warning) = load_or_empty(&state, &user_id).await?;
    Ok(Json(UserStateResponse {
        record,
        persisted: warning.is_none(),
        warning,
    }))
}

/// PUT /api/v1/users/:user_id
pub async fn handle_replace_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<ReplaceRecordRequest>,
) -> Result<Json<UserStateResponse>, AppError> {
    validate_key(&user_id)?;
    let record = UserRecord {
        user_id,
        interactions: req.interactions,
    };
    let (persisted, warning) = persist(&state, &record).await;
    Ok(Json(UserStateResponse {
        record,
        persisted,
        warning,
    }))
}

/// PUT /api/v1/users/:user_id/interactions/:company
pub async fn handle_update_interaction(
    State(state): State<AppState>,
    Path((user_id, company)): Path<(String, String)>,
    Json(update): Json<InteractionUpdate>,
) -> Result<Json<UserStateResponse>, AppError> {
    let company = company.trim();
    if company.is_empty() {
        return Err(AppError::Validation("company must not be empty".to_string()));
    }
    let status = update
        .status
        .as_deref()
        .map(str::parse::<InteractionStatus>)
        .transpose()
        .map_err(AppError::Validation)?;

    // Track under the guide's spelling when the company is listed.
    let company = state
        .catalog
        .find(company)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| company.to_string());

    let (mut record, load_warning) = load_or_empty(&state, &user_id).await?;
    if let Some(status) = status {
        record.set_status(&company, status);
    }
    if let Some(note) = update.note.as_deref() {
        record.set_note(&company, note);
    }

    // The stored record could not be read: keep the change in memory only so
    // the unreadable file is left as it is.
    if load_warning.is_some() {
        warn!(user_id = %record.user_id, "Skipping save over an unreadable record");
        return Ok(Json(UserStateResponse {
            record,
            persisted: false,
            warning: load_warning,
        }));
    }

    let (persisted, warning) = persist(&state, &record).await;
    Ok(Json(UserStateResponse {
        record,
        persisted,
        warning,
    }))
}

/// GET /api/v1/users/:user_id/summary
pub async fn handle_user_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserSummary>, AppError> {
    let (record, _) = load_or_empty(&state, &user_id).await?;
    Ok(Json(record.summary()))
}

/// GET /api/v1/users/:user_id/export
pub async fn handle_export_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, AppError> {
    let (record, _) = load_or_empty(&state, &user_id).await?;
    let body = export_csv(&state.catalog, &record)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CSV export failed: {e}")))?;
    let disposition = format!("attachment; filename=\"fairmate-{user_id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// GET /api/v1/users/metrics
/// Operations view over all stored users, with capacity warnings.
pub async fn handle_user_metrics(
    State(state): State<AppState>,
) -> Result<Json<UserMetricsResponse>, AppError> {
    let users = state.users.clone();
    let window = state.config.activity_window();
    let metrics = tokio::task::spawn_blocking(move || users.metrics(window))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("user metrics task failed: {e}")))??;

    let storage_mb = metrics.total_storage_bytes as f64 / BYTES_PER_MB;
    let warnings = capacity_warnings(&metrics, storage_mb, &state.config);
    for warning in &warnings {
        warn!("{warning}");
    }
    Ok(Json(UserMetricsResponse {
        metrics,
        activity_window_hours: state.config.activity_window_hours,
        storage_mb: (storage_mb * 10.0).round() / 10.0,
        performance_ok: warnings.is_empty(),
        warnings,
    }))
}

fn capacity_warnings(metrics: &UserMetrics, storage_mb: f64, config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if metrics.total_users > config.max_users_warning {
        warnings.push(format!(
            "High user count: {} users (recommended max: {})",
            metrics.total_users, config.max_users_warning
        ));
    }
    if storage_mb > config.max_storage_warning_mb as f64 {
        warnings.push(format!(
            "High storage usage: {storage_mb:.1}MB (recommended max: {}MB)",
            config.max_storage_warning_mb
        ));
    }
    warnings
}

/// A malformed id is a client error; any other storage failure degrades to
/// an empty record plus a warning.
pub(crate) async fn load_or_empty(
    state: &AppState,
    user_id: &str,
) -> Result<(UserRecord, Option<String>), AppError> {
    let users = state.users.clone();
    let id = user_id.to_string();
    let loaded = tokio::task::spawn_blocking(move || users.load(&id))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("user load task failed: {e}")))?;
    match loaded {
        Ok(record) => Ok((record, None)),
        Err(e @ StorageError::InvalidKey(_)) => Err(e.into()),
        Err(e) => {
            warn!(user_id, "Could not load user record: {e}");
            Ok((
                UserRecord::new(user_id),
                Some(format!("Saved progress could not be loaded: {e}")),
            ))
        }
    }
}

async fn persist(state: &AppState, record: &UserRecord) -> (bool, Option<String>) {
    let users = state.users.clone();
    let owned = record.clone();
    let task = tokio::task::spawn_blocking(move || users.save(&owned.user_id, &owned));
    let saved = match task.await {
        Ok(saved) => saved,
        Err(e) => {
            warn!(user_id = %record.user_id, "User save task failed: {e}");
            return (false, Some("Changes were not saved".to_string()));
        }
    };
    match saved {
        Ok(()) => (true, None),
        Err(e) => {
            if e.is_full() {
                warn!(user_id = %record.user_id, "Disk full, user record not saved");
            } else {
                warn!(user_id = %record.user_id, "Could not save user record: {e}");
            }
            (false, Some(format!("Changes were not saved: {e}")))
        }
    }
}
