//! Strict validation of the model's recommendation payload.
//!
//! The model's text either becomes a typed, ranked `Vec<RankedMatch>` or a
//! `SchemaError` carrying a stable reason code. Nothing loosely typed leaves
//! this module.

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::guide::models::normalize_label;
use crate::guide::Catalog;
use crate::llm_client::strip_json_fences;
use crate::recommend::RankedMatch;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response JSON does not match the schema: {0}")]
    Malformed(String),

    #[error("match score {score} for '{company}' is outside 0-100")]
    ScoreOutOfRange { company: String, score: f64 },

    #[error("response contains no matches for listed companies")]
    Empty,
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::NoJson => "no_json",
            SchemaError::Malformed(_) => "malformed",
            SchemaError::ScoreOutOfRange { .. } => "score_out_of_range",
            SchemaError::Empty => "empty",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResponse {
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    company_name: String,
    #[serde(alias = "match_percentage")]
    match_score: f64,
    #[serde(default, alias = "explanation")]
    rationale: String,
    #[serde(default)]
    alignment_factors: Vec<String>,
}

/// Locates the JSON object in `text`, validates it and resolves every match
/// against `catalog`. Returns at most `limit` matches, best first.
pub fn parse_recommendations(
    text: &str,
    catalog: &Catalog,
    limit: usize,
) -> Result<Vec<RankedMatch>, SchemaError> {
    let json = locate_object(text).ok_or(SchemaError::NoJson)?;
    let raw: RawResponse =
        serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut matches = Vec::with_capacity(raw.matches.len());

    for m in raw.matches {
        if !m.match_score.is_finite() || !(0.0..=100.0).contains(&m.match_score) {
            return Err(SchemaError::ScoreOutOfRange {
                company: m.company_name,
                score: m.match_score,
            });
        }
        let Some(company) = catalog.find(&m.company_name) else {
            debug!("Dropping recommendation for unlisted company '{}'", m.company_name);
            continue;
        };
        if !seen.insert(normalize_label(&company.name)) {
            continue;
        }
        matches.push(RankedMatch {
            company_name: company.name.clone(),
            match_score: m.match_score.round() as u8,
            rationale: m.rationale.trim().to_string(),
            alignment_factors: m
                .alignment_factors
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        });
    }

    if matches.is_empty() {
        return Err(SchemaError::Empty);
    }

    // Stable: equal scores keep the model's order.
    matches.sort_by(|a, b| b.match_score.cmp(&a.match_score));
    matches.truncate(limit);
    Ok(matches)
}

fn locate_object(text: &str) -> Option<&str> {
    let text = strip_json_fences(text);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::GuideExtractor;

    fn catalog() -> Catalog {
        GuideExtractor::default().parse_text(
            "SRC Hall A\n\
             A01  Acme Corp  Technology & IT  UG\n\
             A02  Globex  Consulting  PG\n\
             A03  Initech  Banking & Finance  Both\n",
        )
    }

    #[test]
    fn test_valid_response_is_ranked() {
        let text = r#"{"matches": [
            {"company_name": "Globex", "match_score": 70, "rationale": "consulting fit"},
            {"company_name": "acme corp", "match_score": 92, "rationale": "  strong Rust  ", "alignment_factors": ["Rust", " "]}
        ]}"#;
        let matches = parse_recommendations(text, &catalog(), 8).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].company_name, "Acme Corp");
        assert_eq!(matches[0].match_score, 92);
        assert_eq!(matches[0].rationale, "strong Rust");
        assert_eq!(matches[0].alignment_factors, vec!["Rust".to_string()]);
        assert_eq!(matches[1].company_name, "Globex");
    }

    #[test]
    fn test_fenced_and_chatty_response() {
        let text = "Sure! Here you go:\n```json\n{\"matches\": [{\"company_name\": \"Initech\", \"match_score\": 55.6}]}\n```";
        let matches = parse_recommendations(text, &catalog(), 8).unwrap();
        assert_eq!(matches[0].match_score, 56);
        assert_eq!(matches[0].rationale, "");
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let text = r#"{"matches": [{"company_name": "Globex", "booth_number": "A02", "match_percentage": 80, "explanation": "fit"}]}"#;
        let matches = parse_recommendations(text, &catalog(), 8).unwrap();
        assert_eq!(matches[0].match_score, 80);
        assert_eq!(matches[0].rationale, "fit");
    }

    #[test]
    fn test_no_json_reason_code() {
        let err = parse_recommendations("I cannot help with that.", &catalog(), 8).unwrap_err();
        assert_eq!(err, SchemaError::NoJson);
        assert_eq!(err.code(), "no_json");
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = parse_recommendations(r#"{"results": []}"#, &catalog(), 8).unwrap_err();
        assert_eq!(err.code(), "malformed");

        let err = parse_recommendations(r#"{"matches": [{"company_name": "Globex"}]}"#, &catalog(), 8)
            .unwrap_err();
        assert_eq!(err.code(), "malformed");
    }

    #[test]
    fn test_score_out_of_range() {
        let text = r#"{"matches": [{"company_name": "Globex", "match_score": 140}]}"#;
        let err = parse_recommendations(text, &catalog(), 8).unwrap_err();
        assert_eq!(err.code(), "score_out_of_range");
    }

    #[test]
    fn test_unknown_companies_dropped_and_all_unknown_is_empty() {
        let text = r#"{"matches": [
            {"company_name": "Hallucinated Inc", "match_score": 99},
            {"company_name": "Globex", "match_score": 60}
        ]}"#;
        let matches = parse_recommendations(text, &catalog(), 8).unwrap();
        assert_eq!(matches.len(), 1);

        let text = r#"{"matches": [{"company_name": "Hallucinated Inc", "match_score": 99}]}"#;
        let err = parse_recommendations(text, &catalog(), 8).unwrap_err();
        assert_eq!(err, SchemaError::Empty);
    }

    #[test]
    fn test_duplicates_and_limit() {
        let text = r#"{"matches": [
            {"company_name": "Globex", "match_score": 90},
            {"company_name": "GLOBEX", "match_score": 10},
            {"company_name": "Acme Corp", "match_score": 80},
            {"company_name": "Initech", "match_score": 70}
        ]}"#;
        let matches = parse_recommendations(text, &catalog(), 2).unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.company_name.as_str()).collect();
        assert_eq!(names, vec!["Globex", "Acme Corp"]);
    }
}
