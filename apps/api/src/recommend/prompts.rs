use crate::guide::Catalog;
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};

/// Bump whenever the template changes; part of the cache fingerprint.
pub const PROMPT_VERSION: u32 = 1;
pub const MAX_RESUME_CHARS: usize = 2500;
pub const MAX_PROMPT_COMPANIES: usize = 150;

pub const RECOMMEND_PROMPT_TEMPLATE: &str = r#"You are a career counselor helping a student find the best company matches at a career fair.

STUDENT PROFILE:
{resume_text}

USER PREFERENCES:
{preferences}

AVAILABLE COMPANIES:
{companies}

Analyze the profile and preferences, then recommend the TOP {match_limit} companies that would be the best matches. Consider industry alignment, education requirements, skills relevance, and career goals.

Respond ONLY with valid JSON in exactly this shape:
{
  "matches": [
    {
      "company_name": "Company Name",
      "match_score": 85,
      "rationale": "Brief explanation of the match",
      "alignment_factors": ["Factor 1", "Factor 2"]
    }
  ]
}
match_score is an integer from 0 to 100."#;

pub fn recommend_system() -> String {
    format!("{JSON_ONLY_SYSTEM} {GROUNDING_INSTRUCTION}")
}

/// Fills the template. `resume_text` should already be normalized.
pub fn build_recommend_prompt(
    resume_text: &str,
    preferences: &str,
    catalog: &Catalog,
    match_limit: usize,
) -> String {
    let resume: String = resume_text.chars().take(MAX_RESUME_CHARS).collect();
    let preferences = match preferences.trim() {
        "" => "None stated",
        p => p,
    };
    let companies = catalog
        .companies()
        .iter()
        .take(MAX_PROMPT_COMPANIES)
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.summary_line()))
        .collect::<Vec<_>>()
        .join("\n");

    let match_limit = match_limit.to_string();
    fill_template(
        RECOMMEND_PROMPT_TEMPLATE,
        &[
            ("resume_text", resume.as_str()),
            ("preferences", preferences),
            ("companies", companies.as_str()),
            ("match_limit", match_limit.as_str()),
        ],
    )
}

/// Single pass over the template: substituted values are never rescanned, so
/// braces in user text stay literal. Unknown `{...}` runs are copied as is.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::GuideExtractor;

    fn catalog() -> Catalog {
        GuideExtractor::default().parse_text(
            "SRC Hall A\nA01  Acme Corp  Technology & IT  UG\nA02  Globex  Consulting  PG\n",
        )
    }

    #[test]
    fn test_prompt_contains_all_sections() {
        let prompt = build_recommend_prompt("Rust developer", "fintech", &catalog(), 8);
        assert!(prompt.contains("Rust developer"));
        assert!(prompt.contains("fintech"));
        assert!(prompt.contains("1. Acme Corp (A01) - Technology & IT - Undergraduate - SRC Hall A (Day 1)"));
        assert!(prompt.contains("2. Globex"));
        assert!(prompt.contains("TOP 8"));
        assert!(!prompt.contains("{resume_text}"));
    }

    #[test]
    fn test_resume_is_truncated() {
        let long = "x".repeat(MAX_RESUME_CHARS + 500);
        let prompt = build_recommend_prompt(&long, "", &catalog(), 8);
        assert!(prompt.contains(&"x".repeat(MAX_RESUME_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_RESUME_CHARS + 1)));
        assert!(prompt.contains("None stated"));
    }

    #[test]
    fn test_placeholders_inside_user_text_stay_literal() {
        let catalog = GuideExtractor::default().parse_text(
            "SRC Hall A\nA01  Acme {companies} Corp  Technology & IT  UG\n",
        );
        let prompt = build_recommend_prompt(
            "Resume body {preferences}",
            "remote {resume_text} {match_limit}",
            &catalog,
            5,
        );
        assert!(prompt.contains("Resume body {preferences}"));
        assert!(prompt.contains("remote {resume_text} {match_limit}"));
        assert!(prompt.contains("1. Acme {companies} Corp (A01)"));
        assert_eq!(prompt.matches("Resume body").count(), 1);
        assert!(prompt.contains("TOP 5"));
        assert!(prompt.contains("\"matches\": ["));
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        let filled = fill_template("{a} {b} {{a}} {", &[("a", "x{a}")]);
        assert_eq!(filled, "x{a} {b} {x{a}} {");
    }

    #[test]
    fn test_system_prompt_demands_json_and_grounding() {
        let system = recommend_system();
        assert!(system.contains("valid JSON"));
        assert!(system.contains("AVAILABLE COMPANIES"));
    }
}
