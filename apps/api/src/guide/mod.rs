// Event guide: PDF extraction and the in-memory company catalog.
// The guide does not change during the event, so it is parsed once at startup.

pub mod extract;
pub mod handlers;
pub mod models;

use thiserror::Error;

pub use extract::GuideExtractor;
pub use models::{Catalog, CompanyRecord, EducationLevel, EventDay, Venue};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("guide I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read PDF text: {0}")]
    Pdf(String),

    #[error("no companies listed for {0}")]
    NoCompanies(String),

    #[error("no company entries found in the guide")]
    EmptyGuide,

    #[error("uploaded resume contains no extractable text")]
    EmptyResume,
}
