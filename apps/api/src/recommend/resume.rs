use tracing::debug;

use crate::cache::normalize_text;
use crate::guide::ExtractionError;

/// Pulls plain text out of an uploaded resume PDF.
pub fn resume_text_from_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyResume);
    }
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ExtractionError::EmptyResume);
    }
    debug!("Extracted {} characters of resume text", text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_upload_is_empty_resume() {
        assert!(matches!(
            resume_text_from_pdf(&[]),
            Err(ExtractionError::EmptyResume)
        ));
    }

    #[test]
    fn test_non_pdf_upload_is_pdf_error() {
        assert!(matches!(
            resume_text_from_pdf(b"plain text, not a pdf"),
            Err(ExtractionError::Pdf(_))
        ));
    }
}
