use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::guide::ExtractionError;

/// The two days of the event. Each day has its own set of companies per hall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDay {
    Day1,
    Day2,
}

impl EventDay {
    pub fn number(self) -> u8 {
        match self {
            EventDay::Day1 => 1,
            EventDay::Day2 => 2,
        }
    }
}

impl fmt::Display for EventDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Day {}", self.number())
    }
}

impl FromStr for EventDay {
    type Err = String;

    /// Accepts `1`, `day1`, `day 1`, `Day 2`, `day_2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.trim_start_matches("day") {
            "1" => Ok(EventDay::Day1),
            "2" => Ok(EventDay::Day2),
            _ => Err(format!("Unknown event day: {s}. Use 1 or 2")),
        }
    }
}

/// A physical hall on a given event day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Venue {
    pub day: EventDay,
    pub hall: String,
}

impl Venue {
    pub fn new(day: EventDay, hall: impl Into<String>) -> Self {
        Self {
            day,
            hall: hall.into(),
        }
    }

    /// Case- and whitespace-insensitive comparison against a hall name from a request.
    pub fn matches(&self, day: EventDay, hall: &str) -> bool {
        self.day == day && normalize_label(&self.hall) == normalize_label(hall)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hall, self.day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EducationLevel {
    Undergraduate,
    Graduate,
    PhD,
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EducationLevel::Undergraduate => "Undergraduate",
            EducationLevel::Graduate => "Graduate",
            EducationLevel::PhD => "PhD",
        };
        f.write_str(label)
    }
}

impl FromStr for EducationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "ug" | "undergraduate" | "undergrad" | "bachelor" | "bachelors" => {
                Ok(EducationLevel::Undergraduate)
            }
            "pg" | "graduate" | "postgraduate" | "master" | "masters" => Ok(EducationLevel::Graduate),
            "phd" | "doctoral" => Ok(EducationLevel::PhD),
            _ => Err(format!(
                "Unknown education level: {s}. Use undergraduate, graduate or phd"
            )),
        }
    }
}

/// One employer listing from the guide. Immutable after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub venue: Venue,
    pub booth_label: String,
    pub industry_tags: BTreeSet<String>,
    pub eligible_levels: BTreeSet<EducationLevel>,
}

impl CompanyRecord {
    /// Listings that name no level are open to everyone.
    pub fn open_to(&self, level: EducationLevel) -> bool {
        self.eligible_levels.is_empty() || self.eligible_levels.contains(&level)
    }

    pub fn has_industry(&self, industry: &str) -> bool {
        let wanted = normalize_label(industry);
        self.industry_tags.iter().any(|t| normalize_label(t) == wanted)
    }

    /// One-line description used in recommendation prompts.
    pub fn summary_line(&self) -> String {
        let industries = if self.industry_tags.is_empty() {
            "Unknown industry".to_string()
        } else {
            self.industry_tags
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let levels = if self.eligible_levels.is_empty() {
            "Any level".to_string()
        } else {
            self.eligible_levels
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join("/")
        };
        format!(
            "{} ({}) - {} - {} - {}",
            self.name, self.booth_label, industries, levels, self.venue
        )
    }
}

/// Every company listed in one guide, ordered by venue (guide order) then booth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    venues: Vec<Venue>,
    companies: Vec<CompanyRecord>,
}

impl Catalog {
    pub fn new(venues: Vec<Venue>, companies: Vec<CompanyRecord>) -> Self {
        Self { venues, companies }
    }

    pub fn venues(&self) -> &[Venue] {
        &self.venues
    }

    pub fn companies(&self) -> &[CompanyRecord] {
        &self.companies
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Companies listed for `venue`. An empty venue is an extraction failure
    /// the caller is expected to show as "no data".
    pub fn for_venue(&self, venue: &Venue) -> Result<Vec<&CompanyRecord>, ExtractionError> {
        let companies: Vec<&CompanyRecord> = self
            .companies
            .iter()
            .filter(|c| c.venue.matches(venue.day, &venue.hall))
            .collect();
        if companies.is_empty() {
            return Err(ExtractionError::NoCompanies(venue.to_string()));
        }
        Ok(companies)
    }

    pub fn count_for(&self, venue: &Venue) -> usize {
        self.companies.iter().filter(|c| &c.venue == venue).count()
    }

    /// First company whose name matches case-insensitively.
    pub fn find(&self, name: &str) -> Option<&CompanyRecord> {
        let wanted = normalize_label(name);
        self.companies
            .iter()
            .find(|c| normalize_label(&c.name) == wanted)
    }

    /// Stable content hash; changes whenever any listed field changes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for company in &self.companies {
            hasher.update(company.name.as_bytes());
            hasher.update([0x1f, company.venue.day.number()]);
            hasher.update(company.venue.hall.as_bytes());
            hasher.update([0x1f]);
            hasher.update(company.booth_label.as_bytes());
            for tag in &company.industry_tags {
                hasher.update([0x1f]);
                hasher.update(tag.as_bytes());
            }
            for level in &company.eligible_levels {
                hasher.update([0x1f]);
                hasher.update(level.to_string().as_bytes());
            }
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Collapses whitespace and lowercases, for label comparisons.
pub fn normalize_label(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
