use anyhow::anyhow;
use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::guide::{Catalog, CompanyRecord, ExtractionError};
use crate::recommend::resume::resume_text_from_pdf;
use crate::recommend::{Recommendation, RecommendationError, UnavailableReason};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub resume_text: String,
    #[serde(default)]
    pub preferences: String,
}

/// A catalog company, optionally with the model's ranking attached.
#[derive(Debug, Serialize)]
pub struct MatchView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alignment_factors: Vec<String>,
    pub company: CompanyRecord,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    /// False when the model could not be used and `matches` is the plain listing.
    pub ranked: bool,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub matches: Vec<MatchView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /api/v1/recommendations
pub async fn handle_recommend(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<RecommendationResponse>, AppError> {
    run(&state, &req.resume_text, &req.preferences).await
}

/// POST /api/v1/recommendations/upload (multipart: `resume` PDF, optional `preferences`)
pub async fn handle_recommend_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RecommendationResponse>, AppError> {
    let mut resume: Option<Vec<u8>> = None;
    let mut preferences = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("resume") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read resume upload: {e}")))?;
                resume = Some(bytes.to_vec());
            }
            Some("preferences") => {
                preferences = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read preferences: {e}")))?;
            }
            _ => {}
        }
    }

    let bytes = resume.ok_or_else(|| AppError::Validation("missing 'resume' file field".to_string()))?;
    info!("Received resume upload ({} bytes)", bytes.len());

    let resume_text = tokio::task::spawn_blocking(move || resume_text_from_pdf(&bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow!("resume extraction task failed: {e}")))?
        .map_err(|e| match e {
            ExtractionError::EmptyResume => AppError::Validation(e.to_string()),
            other => AppError::Validation(format!("could not read resume PDF: {other}")),
        })?;

    run(&state, &resume_text, &preferences).await
}

async fn run(
    state: &AppState,
    resume_text: &str,
    preferences: &str,
) -> Result<Json<RecommendationResponse>, AppError> {
    let catalog = &state.catalog;
    match state.recommender.recommend(resume_text, preferences, catalog).await {
        Ok(rec) => Ok(Json(ranked(rec, catalog))),
        Err(RecommendationError::EmptyResume) => Err(AppError::Validation(
            RecommendationError::EmptyResume.to_string(),
        )),
        Err(e @ RecommendationError::EmptyCatalog) => {
            let warning = match &state.catalog_warning {
                Some(load_error) => format!("{e} ({load_error})"),
                None => e.to_string(),
            };
            Ok(Json(unranked(catalog, None, warning)))
        }
        Err(e @ RecommendationError::Unavailable { reason, .. }) => {
            warn!("Serving unranked listing: {e}");
            let warning = format!("Recommendations are unavailable ({reason}); showing all companies instead.");
            Ok(Json(unranked(catalog, Some(reason), warning)))
        }
    }
}

fn ranked(rec: Recommendation, catalog: &Catalog) -> RecommendationResponse {
    let matches = rec
        .matches
        .into_iter()
        .filter_map(|m| {
            let company = catalog.find(&m.company_name)?.clone();
            Some(MatchView {
                match_score: Some(m.match_score),
                rationale: Some(m.rationale),
                alignment_factors: m.alignment_factors,
                company,
            })
        })
        .collect();
    RecommendationResponse {
        ranked: true,
        cached: rec.cached,
        fingerprint: Some(rec.fingerprint),
        matches,
        reason: None,
        warning: None,
    }
}

fn unranked(
    catalog: &Catalog,
    reason: Option<UnavailableReason>,
    warning: String,
) -> RecommendationResponse {
    let matches = catalog
        .companies()
        .iter()
        .map(|c| MatchView {
            match_score: None,
            rationale: None,
            alignment_factors: Vec::new(),
            company: c.clone(),
        })
        .collect();
    RecommendationResponse {
        ranked: false,
        cached: false,
        fingerprint: None,
        matches,
        reason,
        warning: Some(warning),
    }
}
