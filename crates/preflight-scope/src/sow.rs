//! SOW document reading through the extraction boundary.

use preflight_analyzers::TextExtractor;

use crate::ScopeError;

/// Supported SOW document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SowKind {
    /// PDF document, read through the text extractor.
    Pdf,
    /// Plain text document.
    Txt,
}

/// SOW text ready for clause extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SowText {
    /// Original filename.
    pub filename: String,
    /// Document kind.
    pub kind: SowKind,
    /// Extracted text, capped at the analysis window.
    pub text: String,
}

const SOW_TEXT_CAP: usize = 80_000;
const SOW_PDF_PAGE_CAP: usize = 20;
const SOW_PDF_MIN_TEXT: usize = 200;

fn kind_from_filename(name: &str) -> Option<SowKind> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        Some(SowKind::Pdf)
    } else if lower.ends_with(".txt") {
        Some(SowKind::Txt)
    } else {
        None
    }
}

/// Reads SOW text from an uploaded document.
///
/// # Errors
/// Returns [`ScopeError::UnsupportedSow`] for other extensions,
/// [`ScopeError::EmptySow`] for blank TXT uploads, and
/// [`ScopeError::ScannedPdf`] when PDF extraction yields near-empty text.
pub fn read_sow_text(
    filename: &str,
    bytes: &[u8],
    extractor: &dyn TextExtractor,
) -> Result<SowText, ScopeError> {
    let kind = kind_from_filename(filename).ok_or(ScopeError::UnsupportedSow)?;

    let text = match kind {
        SowKind::Txt => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            if text.is_empty() {
                return Err(ScopeError::EmptySow);
            }
            text
        }
        SowKind::Pdf => {
            let extracted = extractor.extract_text(bytes, Some(SOW_PDF_PAGE_CAP))?;
            let text = extracted.text.trim().to_string();
            if text.chars().count() < SOW_PDF_MIN_TEXT {
                return Err(ScopeError::ScannedPdf);
            }
            text
        }
    };

    Ok(SowText {
        filename: filename.to_string(),
        kind,
        text: text.chars().take(SOW_TEXT_CAP).collect(),
    })
}

#[cfg(test)]
mod tests {
    //! Unit tests for SOW reading edge cases.

    use preflight_analyzers::Utf8TextExtractor;

    use super::*;

    #[test]
    fn txt_sow_must_be_non_empty() {
        let error = read_sow_text("sow.txt", b"   \n ", &Utf8TextExtractor)
            .expect_err("blank sow rejected");
        assert!(matches!(error, ScopeError::EmptySow));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let error = read_sow_text("sow.docx", b"text", &Utf8TextExtractor)
            .expect_err("docx rejected");
        assert!(matches!(error, ScopeError::UnsupportedSow));
    }

    #[test]
    fn near_empty_pdf_is_rejected_as_scanned() {
        let error = read_sow_text("sow.pdf", b"tiny", &Utf8TextExtractor)
            .expect_err("scanned pdf rejected");
        assert!(matches!(error, ScopeError::ScannedPdf));
    }

    #[test]
    fn txt_sow_reads_through() {
        let sow = read_sow_text("sow.txt", b"1. Scope\n- build the portal\n", &Utf8TextExtractor)
            .expect("sow reads");
        assert_eq!(sow.kind, SowKind::Txt);
        assert!(sow.text.contains("build the portal"));
    }
}
