//! Guide Extractor: turns the event guide's text layer into `CompanyRecord`s.
//!
//! The guide is laid out as day markers ("Day 1"), hall headings
//! ("SRC Hall A", optionally "SRC Hall A Day 2") and booth rows:
//!
//! ```text
//! Booth 12  Acme Corp  Technology & IT  Undergraduate, Graduate
//! A01 Very Long Company Name
//!     Pte Ltd  Banking & Finance  UG
//! ```
//!
//! A booth token opens an entry; every following line up to the next booth,
//! heading or day marker is a wrapped continuation of it. Inside an entry the
//! name runs up to the first recognised field (industry or education level).

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::guide::models::{normalize_label, Catalog, CompanyRecord, EducationLevel, EventDay, Venue};
use crate::guide::ExtractionError;

/// Hall headings of the default guide, in print order.
pub const DEFAULT_HALLS: &[&str] = &["SRC Hall A", "SRC Hall B", "SRC Hall C", "EA Atrium"];

/// Industry vocabulary used by the guide.
pub const DEFAULT_INDUSTRIES: &[&str] = &[
    "Banking & Finance",
    "Technology & IT",
    "Consulting",
    "Engineering & Manufacturing",
    "Energy & Renewables",
    "Public Sector",
    "Pharmaceutical, Healthcare, Biomedical Sciences",
    "Chemicals",
    "Education",
    "Luxury, Retail & Consumer Goods",
    "Real Estate & Construction",
    "Financial Services",
    "Banks (Local/Asia)",
    "Transport, Maritime",
    "Healthcare",
];

lazy_static! {
    static ref DAY_RE: Regex = Regex::new(r"(?i)^day\s*([12])\b").unwrap();
    static ref HEADING_DAY_RE: Regex =
        Regex::new(r"(?i)^(.*?)[\s\-–(,|]*\bday\s*([12])\)?$").unwrap();
    static ref BOOTH_RE: Regex =
        Regex::new(r"^(?:(?i:booth)\s*(\d{1,3})|([A-Z]\d{2,3}))\b[\s:.\-–|]*").unwrap();
    static ref COLUMN_RE: Regex = Regex::new(r"\s*\|\s*|\t+|\s{2,}").unwrap();
    static ref LEVEL_RE: Regex = Regex::new(
        r"(?i)\b(all\s+levels|undergraduates?|postgraduates?|graduates?|bachelors?|masters?|doctoral|ph\.?\s?d|ug|pg|both)\b"
    )
    .unwrap();
    static ref CONNECTIVE_RE: Regex = Regex::new(r"(?i)\b(and|or)\b").unwrap();
}

const NAME_TRIM: &[char] = &[' ', '|', ',', '-', '–', ':', ';', '.'];

/// A field found inside an entry: byte range plus what it resolved to.
#[derive(Debug)]
enum Field {
    Industry(String),
    Levels(Vec<EducationLevel>),
}

#[derive(Debug)]
struct FieldMatch {
    start: usize,
    end: usize,
    field: Field,
}

#[derive(Debug)]
struct PendingEntry {
    venue: Option<Venue>,
    booth_label: String,
    lines: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GuideExtractor {
    halls: Vec<String>,
    industries: Vec<String>,
    /// `<hall>[,|-:] ` at the start of a row, one per hall.
    hall_prefixes: Vec<(String, Regex)>,
}

impl Default for GuideExtractor {
    fn default() -> Self {
        Self::new(
            DEFAULT_HALLS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_INDUSTRIES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl GuideExtractor {
    pub fn new(halls: Vec<String>, mut industries: Vec<String>) -> Self {
        // Longest first so "Pharmaceutical, Healthcare, ..." wins over "Healthcare".
        industries.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let mut hall_prefixes: Vec<(String, Regex)> = halls
            .iter()
            .filter_map(|hall| {
                let words: Vec<String> = hall.split_whitespace().map(regex::escape).collect();
                if words.is_empty() {
                    return None;
                }
                let pattern = format!(r"(?i)^{}(?:\s*[,|:\-–]\s*|\s+)", words.join(r"\s+"));
                Regex::new(&pattern).ok().map(|re| (hall.clone(), re))
            })
            .collect();
        // "SRC Hall A1" must be tried before "SRC Hall A".
        hall_prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            halls,
            industries,
            hall_prefixes,
        }
    }

    /// Reads the guide PDF from disk and parses it.
    pub fn extract_file(&self, path: &Path) -> Result<Catalog, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("guide not found: {}", path.display()),
            )));
        }
        let text = pdf_extract::extract_text(path).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        info!("Extracted {} chars of text from {}", text.len(), path.display());
        self.require_entries(self.parse_text(&text))
    }

    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<Catalog, ExtractionError> {
        let text =
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        self.require_entries(self.parse_text(&text))
    }

    fn require_entries(&self, catalog: Catalog) -> Result<Catalog, ExtractionError> {
        if catalog.is_empty() {
            return Err(ExtractionError::EmptyGuide);
        }
        Ok(catalog)
    }

    /// Pure parse of the guide's text layer.
    pub fn parse_text(&self, text: &str) -> Catalog {
        let mut day = EventDay::Day1;
        let mut venue: Option<Venue> = None;
        let mut pending: Option<PendingEntry> = None;
        let mut records: Vec<CompanyRecord> = Vec::new();
        let mut venues: Vec<Venue> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let collapsed = collapse_whitespace(line);

            if let Some((hall, heading_day)) = self.match_heading(&collapsed) {
                self.flush(pending.take(), &mut records);
                if let Some(d) = heading_day {
                    day = d;
                }
                let v = Venue::new(day, hall);
                if !venues.contains(&v) {
                    venues.push(v.clone());
                }
                venue = Some(v);
                continue;
            }

            if let Some(caps) = DAY_RE.captures(&collapsed) {
                self.flush(pending.take(), &mut records);
                day = if &caps[1] == "2" { EventDay::Day2 } else { EventDay::Day1 };
                // A hall heading must follow before entries count again.
                venue = None;
                continue;
            }

            // A row may name its hall inline: `SRC Hall A, Booth 12  Acme Corp ...`.
            let line = match self.split_inline_venue(line) {
                Some((hall, rest)) => {
                    let v = Venue::new(day, hall);
                    if !venues.contains(&v) {
                        venues.push(v.clone());
                    }
                    venue = Some(v);
                    rest
                }
                None => line,
            };

            if let Some(caps) = BOOTH_RE.captures(line) {
                self.flush(pending.take(), &mut records);
                let booth_label = match (caps.get(1), caps.get(2)) {
                    (Some(n), _) => format!("Booth {}", n.as_str()),
                    (None, Some(code)) => code.as_str().to_string(),
                    (None, None) => continue,
                };
                let rest = &line[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
                pending = Some(PendingEntry {
                    venue: venue.clone(),
                    booth_label,
                    lines: vec![rest.to_string()],
                });
                continue;
            }

            if let Some(entry) = pending.as_mut() {
                entry.lines.push(line.to_string());
            }
        }
        self.flush(pending.take(), &mut records);

        let companies = order_and_dedup(records, &venues);
        debug!(
            "Parsed guide: {} companies across {} venues",
            companies.len(),
            venues.len()
        );
        Catalog::new(venues, companies)
    }

    /// `SRC Hall A`, `SRC Hall A Day 2`, `SRC Hall A - Day 2`, `SRC Hall A (Day 2)`.
    fn match_heading(&self, line: &str) -> Option<(String, Option<EventDay>)> {
        let (label, day) = match HEADING_DAY_RE.captures(line) {
            Some(caps) => {
                let day = if &caps[2] == "2" { EventDay::Day2 } else { EventDay::Day1 };
                (caps[1].to_string(), Some(day))
            }
            None => (line.to_string(), None),
        };
        let wanted = normalize_label(&label);
        self.halls
            .iter()
            .find(|h| normalize_label(h) == wanted)
            .map(|h| (h.clone(), day))
    }

    /// Hall name leading a booth row; returns the hall and the row from the booth token on.
    fn split_inline_venue<'a>(&self, line: &'a str) -> Option<(String, &'a str)> {
        self.hall_prefixes.iter().find_map(|(hall, re)| {
            let rest = &line[re.find(line)?.end()..];
            BOOTH_RE.is_match(rest).then(|| (hall.clone(), rest))
        })
    }

    fn flush(&self, entry: Option<PendingEntry>, records: &mut Vec<CompanyRecord>) {
        let Some(entry) = entry else { return };
        let Some(venue) = entry.venue else {
            debug!("Skipping booth {} listed outside any venue", entry.booth_label);
            return;
        };
        let (name, industry_tags, eligible_levels) = self.parse_entry(&entry.lines);
        if name.is_empty() {
            warn!("Booth {} in {} has no company name", entry.booth_label, venue);
            return;
        }
        records.push(CompanyRecord {
            name,
            venue,
            booth_label: entry.booth_label,
            industry_tags,
            eligible_levels,
        });
    }

    /// Splits an entry into name, industries and levels.
    fn parse_entry(&self, lines: &[String]) -> (String, BTreeSet<String>, BTreeSet<EducationLevel>) {
        let segments: Vec<&str> = lines
            .iter()
            .flat_map(|l| COLUMN_RE.split(l))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let mut industries = BTreeSet::new();
        let mut levels = BTreeSet::new();

        // Column layout: name segments run until the first segment made only of fields.
        let first_field_segment = if segments.len() > 1 {
            segments.iter().position(|s| self.is_field_segment(s))
        } else {
            None
        };

        let name = match first_field_segment {
            Some(idx) if idx > 0 => {
                for seg in &segments[idx..] {
                    self.collect_fields(seg, &mut industries, &mut levels);
                }
                segments[..idx].join(" ")
            }
            _ => {
                // No usable columns: the fields are the longest trailing run made
                // only of fields, so industry words inside the name stay put.
                let joined = collapse_whitespace(&segments.join(" "));
                let matches = self.find_fields(&joined);
                let cut = matches
                    .iter()
                    .map(|m| m.start)
                    .filter(|&start| !ends_with_connective(&joined[..start]))
                    .find(|&start| self.is_field_segment(&joined[start..]))
                    .unwrap_or(joined.len());
                for m in matches.into_iter().filter(|m| m.start >= cut) {
                    apply_field(m.field, &mut industries, &mut levels);
                }
                joined[..cut].to_string()
            }
        };

        let name = collapse_whitespace(&name)
            .trim_matches(NAME_TRIM)
            .to_string();
        (name, industries, levels)
    }

    fn collect_fields(
        &self,
        segment: &str,
        industries: &mut BTreeSet<String>,
        levels: &mut BTreeSet<EducationLevel>,
    ) {
        for m in self.find_fields(segment) {
            apply_field(m.field, industries, levels);
        }
    }

    /// True when nothing but fields, connectives and punctuation remains.
    fn is_field_segment(&self, segment: &str) -> bool {
        let matches = self.find_fields(segment);
        if matches.is_empty() {
            return false;
        }
        let mut residue = String::with_capacity(segment.len());
        let mut cursor = 0;
        for m in &matches {
            residue.push_str(&segment[cursor..m.start]);
            residue.push(' ');
            cursor = m.end;
        }
        residue.push_str(&segment[cursor..]);
        let residue = CONNECTIVE_RE.replace_all(&residue, " ");
        residue.chars().all(|c| !c.is_alphanumeric())
    }

    /// All non-overlapping industry and level matches, ordered by position.
    fn find_fields(&self, text: &str) -> Vec<FieldMatch> {
        let lower = text.to_ascii_lowercase();
        let mut found: Vec<FieldMatch> = Vec::new();

        for industry in &self.industries {
            let needle = industry.to_ascii_lowercase();
            let mut from = 0;
            while let Some(offset) = lower[from..].find(&needle) {
                let start = from + offset;
                let end = start + needle.len();
                from = end;
                if !is_word_boundary(&lower, start, end) {
                    continue;
                }
                if found.iter().any(|f| start < f.end && f.start < end) {
                    continue;
                }
                found.push(FieldMatch {
                    start,
                    end,
                    field: Field::Industry(industry.clone()),
                });
            }
        }

        for caps in LEVEL_RE.find_iter(text) {
            let (start, end) = (caps.start(), caps.end());
            if found.iter().any(|f| start < f.end && f.start < end) {
                continue;
            }
            found.push(FieldMatch {
                start,
                end,
                field: Field::Levels(levels_for(caps.as_str())),
            });
        }

        found.sort_by_key(|f| f.start);
        found
    }
}

fn apply_field(field: Field, industries: &mut BTreeSet<String>, levels: &mut BTreeSet<EducationLevel>) {
    match field {
        Field::Industry(name) => {
            industries.insert(name);
        }
        Field::Levels(found) => levels.extend(found),
    }
}

fn levels_for(token: &str) -> Vec<EducationLevel> {
    let token = token.to_ascii_lowercase();
    let compact: String = token.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    match compact.as_str() {
        "alllevels" => vec![
            EducationLevel::Undergraduate,
            EducationLevel::Graduate,
            EducationLevel::PhD,
        ],
        "both" => vec![EducationLevel::Undergraduate, EducationLevel::Graduate],
        "phd" | "doctoral" => vec![EducationLevel::PhD],
        t if t.starts_with("undergraduate") || t.starts_with("bachelor") || t == "ug" => {
            vec![EducationLevel::Undergraduate]
        }
        _ => vec![EducationLevel::Graduate],
    }
}

/// A name never ends in `of`, `and`, `&` and the like.
fn ends_with_connective(prefix: &str) -> bool {
    let last = prefix
        .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(last.as_str(), "of" | "and" | "&" | "for" | "the" | "de" | "in" | "on")
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Groups records by venue in guide order, sorts each venue by booth and
/// drops repeated names within a venue (page-header repeats).
fn order_and_dedup(records: Vec<CompanyRecord>, venues: &[Venue]) -> Vec<CompanyRecord> {
    let mut ordered = Vec::with_capacity(records.len());
    for venue in venues {
        let mut seen: HashSet<String> = HashSet::new();
        let mut in_venue: Vec<CompanyRecord> = records
            .iter()
            .filter(|r| &r.venue == venue)
            .filter(|r| seen.insert(normalize_label(&r.name)))
            .cloned()
            .collect();
        in_venue.sort_by_key(|r| booth_sort_key(&r.booth_label));
        ordered.extend(in_venue);
    }
    ordered
}

/// `A01` → ("A", 1); `Booth 12` → ("", 12).
fn booth_sort_key(label: &str) -> (String, u32) {
    let prefix: String = match label.strip_prefix("Booth") {
        Some(_) => String::new(),
        None => label.chars().take_while(|c| c.is_ascii_alphabetic()).collect(),
    };
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    (prefix, digits.parse().unwrap_or(u32::MAX))
}
