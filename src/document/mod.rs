//! Document text extraction
//!
//! Turns uploaded bytes into plain text. Only PDF and plain text are accepted;
//! every other declared media type is rejected here even if the caller has
//! already filtered it.

use std::fmt;
use thiserror::Error;

/// Extraction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text: {0}")]
    ExtractionFailure(String),
}

/// Media types the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    PlainText,
}

impl MediaType {
    /// Parse a declared MIME type, ignoring case and parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Result<Self, ExtractError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "text/plain" => Ok(Self::PlainText),
            _ => Err(ExtractError::UnsupportedFormat(mime.to_string())),
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Raw uploaded document
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    /// Declared media type, as given by the uploader
    pub media_type: String,
}

impl Document {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Extract plain text from a document.
pub fn extract(document: &Document) -> Result<String, ExtractError> {
    let media_type = MediaType::from_mime(&document.media_type)?;

    tracing::debug!(
        "Extracting {} bytes as {}",
        document.bytes.len(),
        media_type
    );

    match media_type {
        MediaType::Pdf => extract_pdf(&document.bytes),
        MediaType::PlainText => extract_plain_text(&document.bytes),
    }
}

fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ExtractError::ExtractionFailure(format!("invalid UTF-8 at byte {}", e.valid_up_to()))
    })?;

    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

/// Pages are joined with a newline in page order. A page without text
/// still contributes an (empty) entry so page positions are preserved.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractError::ExtractionFailure(format!("unreadable PDF: {}", e)))?;

    let pages = pdf.get_pages();
    let mut texts = Vec::with_capacity(pages.len());

    for page_number in pages.keys() {
        let text = pdf.extract_text(&[*page_number]).map_err(|e| {
            ExtractError::ExtractionFailure(format!("page {}: {}", page_number, e))
        })?;
        texts.push(text);
    }

    tracing::debug!("Extracted text from {} PDF pages", texts.len());
    Ok(texts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parsing() {
        assert_eq!(MediaType::from_mime("application/pdf").unwrap(), MediaType::Pdf);
        assert_eq!(
            MediaType::from_mime("Text/Plain; charset=utf-8").unwrap(),
            MediaType::PlainText
        );
        assert!(matches!(
            MediaType::from_mime("image/png"),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_plain_text() {
        let doc = Document::new("hello world".as_bytes(), "text/plain");
        assert_eq!(extract(&doc).unwrap(), "hello world");
    }

    #[test]
    fn test_plain_text_strips_bom() {
        let doc = Document::new("\u{feff}hola".as_bytes(), "text/plain");
        assert_eq!(extract(&doc).unwrap(), "hola");
    }

    #[test]
    fn test_invalid_utf8() {
        let doc = Document::new(vec![0x66, 0x6f, 0xff, 0xfe], "text/plain");
        assert!(matches!(
            extract(&doc),
            Err(ExtractError::ExtractionFailure(_))
        ));
    }

    #[test]
    fn test_unsupported_format_wins_over_content() {
        let doc = Document::new("plain words".as_bytes(), "image/png");
        assert_eq!(
            extract(&doc),
            Err(ExtractError::UnsupportedFormat("image/png".to_string()))
        );
    }

    #[test]
    fn test_malformed_pdf() {
        let doc = Document::new("not a pdf at all".as_bytes(), "application/pdf");
        assert!(matches!(
            extract(&doc),
            Err(ExtractError::ExtractionFailure(_))
        ));
    }
}
