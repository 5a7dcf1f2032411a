// Resume-based company recommendations.
// Cache first, then the model with bounded retries; every model answer passes
// the strict schema check before it is cached or returned.

pub mod handlers;
pub mod prompts;
pub mod resume;
pub mod schema;
pub mod service;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ResultCache;

pub use service::{RecommendationService, RetryPolicy};

/// One recommended company, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub company_name: String,
    /// 0 to 100
    pub match_score: u8,
    pub rationale: String,
    #[serde(default)]
    pub alignment_factors: Vec<String>,
}

pub type RecommendationCache = ResultCache<Vec<RankedMatch>>;

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub matches: Vec<RankedMatch>,
    pub fingerprint: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    NotConfigured,
    RetriesExhausted,
    Timeout,
    ModelError,
    InvalidResponse,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::NotConfigured => "model access is not configured",
            UnavailableReason::RetriesExhausted => "retries exhausted",
            UnavailableReason::Timeout => "timed out",
            UnavailableReason::ModelError => "model request rejected",
            UnavailableReason::InvalidResponse => "model response failed validation",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("resume text is empty")]
    EmptyResume,

    #[error("no companies available to recommend from")]
    EmptyCatalog,

    #[error("recommendations unavailable ({reason}) after {attempts} attempt(s): {detail}")]
    Unavailable {
        reason: UnavailableReason,
        attempts: u32,
        detail: String,
    },
}

impl RecommendationError {
    pub fn unavailable(reason: UnavailableReason, attempts: u32, detail: impl Into<String>) -> Self {
        RecommendationError::Unavailable {
            reason,
            attempts,
            detail: detail.into(),
        }
    }
}
