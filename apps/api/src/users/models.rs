use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    #[default]
    None,
    Visited,
    Interested,
    Applied,
}

impl InteractionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionStatus::None => "none",
            InteractionStatus::Visited => "visited",
            InteractionStatus::Interested => "interested",
            InteractionStatus::Applied => "applied",
        }
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(InteractionStatus::None),
            "visited" => Ok(InteractionStatus::Visited),
            "interested" => Ok(InteractionStatus::Interested),
            "applied" => Ok(InteractionStatus::Applied),
            other => Err(format!(
                "Unknown interaction status: {other}. Use none, visited, interested or applied"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(default)]
    pub status: InteractionStatus,
    #[serde(default)]
    pub note: String,
    /// Older records carry no timestamp; they load as "now".
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Interaction {
    fn new() -> Self {
        Self {
            status: InteractionStatus::None,
            note: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Everything one user has recorded, keyed by company name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub interactions: BTreeMap<String, Interaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub companies_tracked: usize,
    pub visited: usize,
    pub interested: usize,
    pub applied: usize,
    pub notes_written: usize,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            interactions: BTreeMap::new(),
        }
    }

    pub fn interaction(&self, company: &str) -> Option<&Interaction> {
        self.interactions.get(company)
    }

    pub fn status_of(&self, company: &str) -> InteractionStatus {
        self.interaction(company)
            .map(|i| i.status)
            .unwrap_or_default()
    }

    pub fn note_of(&self, company: &str) -> &str {
        self.interaction(company)
            .map(|i| i.note.as_str())
            .unwrap_or("")
    }

    pub fn set_status(&mut self, company: &str, status: InteractionStatus) {
        let entry = self.entry(company);
        entry.status = status;
        entry.updated_at = Utc::now();
    }

    pub fn set_note(&mut self, company: &str, note: &str) {
        let entry = self.entry(company);
        entry.note = note.trim().to_string();
        entry.updated_at = Utc::now();
    }

    /// Most recent change across all interactions.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.interactions.values().map(|i| i.updated_at).max()
    }

    pub fn summary(&self) -> UserSummary {
        let mut summary = UserSummary {
            user_id: self.user_id.clone(),
            ..UserSummary::default()
        };
        for interaction in self.interactions.values() {
            match interaction.status {
                InteractionStatus::None => {}
                InteractionStatus::Visited => summary.visited += 1,
                InteractionStatus::Interested => summary.interested += 1,
                InteractionStatus::Applied => summary.applied += 1,
            }
            if interaction.status != InteractionStatus::None || !interaction.note.is_empty() {
                summary.companies_tracked += 1;
            }
            if !interaction.note.is_empty() {
                summary.notes_written += 1;
            }
        }
        summary
    }

    fn entry(&mut self, company: &str) -> &mut Interaction {
        self.interactions
            .entry(company.to_string())
            .or_insert_with(Interaction::new)
    }
}
