use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::guide::{CompanyRecord, EducationLevel, EventDay, Venue};
use crate::state::AppState;
use crate::users::handlers::load_or_empty;
use crate::users::{InteractionStatus, UserRecord};

#[derive(Debug, Serialize)]
pub struct VenueSummary {
    pub day: EventDay,
    pub hall: String,
    /// e.g. "SRC Hall A (Day 1)"
    pub label: String,
    pub company_count: usize,
}

#[derive(Debug, Serialize)]
pub struct VenueListResponse {
    pub venues: Vec<VenueSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub day: String,
    pub hall: String,
    pub level: Option<String>,
    pub industry: Option<String>,
    /// `unvisited` or an interaction status; needs `user_id`.
    pub status: Option<String>,
    pub user_id: Option<String>,
}

/// Narrowing applied after the venue lookup. Every filter is optional.
#[derive(Debug)]
struct CompanyFilter {
    level: Option<EducationLevel>,
    industry: Option<String>,
    status: Option<(InteractionStatus, UserRecord)>,
}

impl CompanyFilter {
    fn keeps(&self, company: &CompanyRecord) -> bool {
        let level_ok = self.level.map_or(true, |level| company.open_to(level));
        let industry_ok = self
            .industry
            .as_deref()
            .map_or(true, |industry| company.has_industry(industry));
        let status_ok = self
            .status
            .as_ref()
            .map_or(true, |(status, record)| record.status_of(&company.name) == *status);
        level_ok && industry_ok && status_ok
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
pub struct CompanyListResponse {
    pub venue: Venue,
    pub companies: Vec<CompanyRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// GET /api/v1/venues
pub async fn handle_list_venues(State(state): State<AppState>) -> Json<VenueListResponse> {
    let catalog = &state.catalog;
    let venues = catalog
        .venues()
        .iter()
        .map(|v| VenueSummary {
            day: v.day,
            hall: v.hall.clone(),
            label: v.to_string(),
            company_count: catalog.count_for(v),
        })
        .collect();
    Json(VenueListResponse {
        venues,
        warning: state.catalog_warning.clone(),
    })
}

/// GET /api/v1/companies?day=1&hall=SRC%20Hall%20A
///
/// Optional filters: `level`, `industry`, and `status` together with `user_id`.
/// A venue with nothing listed answers with an empty list and a warning.
pub async fn handle_list_companies(
    State(state): State<AppState>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<CompanyListResponse>, AppError> {
    let day: EventDay = query.day.parse().map_err(AppError::Validation)?;
    let hall = query.hall.trim();
    if hall.is_empty() {
        return Err(AppError::Validation("hall must not be empty".to_string()));
    }

    // Prefer the guide's spelling of the hall in the response.
    let venue = state
        .catalog
        .venues()
        .iter()
        .find(|v| v.matches(day, hall))
        .cloned()
        .unwrap_or_else(|| Venue::new(day, hall));

    let (filter, filter_warning) = build_filter(&state, &query).await?;

    let response = match state.catalog.for_venue(&venue) {
        Ok(companies) => CompanyListResponse {
            companies: companies
                .into_iter()
                .filter(|c| filter.keeps(c))
                .cloned()
                .collect(),
            venue,
            warning: filter_warning,
        },
        Err(e) => {
            warn!("Company listing degraded: {e}");
            let warning = match &state.catalog_warning {
                Some(load_error) => format!("{e} ({load_error})"),
                None => e.to_string(),
            };
            CompanyListResponse {
                venue,
                companies: Vec::new(),
                warning: Some(warning),
            }
        }
    };
    Ok(Json(response))
}

async fn build_filter(
    state: &AppState,
    query: &CompanyQuery,
) -> Result<(CompanyFilter, Option<String>), AppError> {
    let level = non_blank(&query.level)
        .map(str::parse::<EducationLevel>)
        .transpose()
        .map_err(AppError::Validation)?;
    let industry = non_blank(&query.industry).map(str::to_string);

    let Some(status) = non_blank(&query.status) else {
        return Ok((
            CompanyFilter {
                level,
                industry,
                status: None,
            },
            None,
        ));
    };
    let status = if status.eq_ignore_ascii_case("unvisited") {
        InteractionStatus::None
    } else {
        status.parse::<InteractionStatus>().map_err(AppError::Validation)?
    };
    let Some(user_id) = non_blank(&query.user_id) else {
        return Err(AppError::Validation(
            "status filter needs a user_id".to_string(),
        ));
    };
    let (record, warning) = load_or_empty(state, user_id).await?;
    Ok((
        CompanyFilter {
            level,
            industry,
            status: Some((status, record)),
        },
        warning,
    ))
}
