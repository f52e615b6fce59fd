use crate::error::IngestError;
use lopdf::Document;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        fs::metadata(path).map_err(IngestError::Io)?;

        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // An image-only or damaged page contributes no text; that is
            // not an error.
            let text = document.extract_text(&[page_no]).unwrap_or_default();
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Extract the full document text: per-page text concatenated in page
/// order with no separator. A document with no extractable text yields an
/// empty string.
pub fn extract_document_text(path: &Path) -> Result<String, IngestError> {
    let pages = LopdfExtractor.extract_pages(path)?;
    Ok(pages.into_iter().map(|page| page.text).collect())
}

#[cfg(test)]
mod tests {
    use super::extract_document_text;
    use crate::error::IngestError;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_an_io_error() {
        let result = extract_document_text(Path::new("/nonexistent/never.pdf"));
        assert!(matches!(result, Err(IngestError::Io(_))));
    }

    #[test]
    fn invalid_container_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf at all")?;

        let result = extract_document_text(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn truncated_pdf_header_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("truncated.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_document_text(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
