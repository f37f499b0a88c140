//! Text-extraction collaborator: turns a source document into plain text.
//!
//! Default: `PdfTextExtractor` (pdf-extract, run on the blocking pool).

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read '{document}': {source}")]
    Io {
        document: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract text from '{document}': {message}")]
    Pdf { document: String, message: String },

    #[error("No text could be extracted from '{0}'")]
    Empty(String),

    #[error("Extraction of '{document}' timed out after {secs}s")]
    Timeout { document: String, secs: u64 },
}

/// Where a document comes from. Deserializes from `{"path": ...}` or
/// `{"text": ...}`; uploaded PDF bytes are only constructed in-process.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Path(PathBuf),
    Text(String),
    #[serde(skip)]
    Pdf { name: String, bytes: Bytes },
}

impl DocumentSource {
    /// Identifier recorded alongside the extracted text.
    pub fn identifier(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.display().to_string(),
            DocumentSource::Text(_) => "inline-text".to_string(),
            DocumentSource::Pdf { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            DocumentSource::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            DocumentSource::Pdf { name, bytes } => write!(f, "Pdf({name}, {} bytes)", bytes.len()),
        }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, document: &DocumentSource) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, document: &DocumentSource) -> Result<String, ExtractionError> {
        let identifier = document.identifier();
        let bytes = match document {
            DocumentSource::Text(text) => return Ok(text.clone()),
            DocumentSource::Pdf { bytes, .. } => bytes.clone(),
            DocumentSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| ExtractionError::Io {
                        document: identifier.clone(),
                        source,
                    })?
                    .into()
            }
        };

        debug!("Extracting text from {identifier} ({} bytes)", bytes.len());

        let document = identifier.clone();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Pdf {
                document: identifier.clone(),
                message: format!("extraction task failed: {e}"),
            })?
            .map_err(|e| ExtractionError::Pdf {
                document,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_inline_text_passes_through() {
        let text = PdfTextExtractor
            .extract_text(&DocumentSource::Text("5 years of Go experience".into()))
            .await
            .unwrap();
        assert_eq!(text, "5 years of Go experience");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = DocumentSource::Path(PathBuf::from("/definitely/not/here/cv.pdf"));
        let err = PdfTextExtractor.extract_text(&source).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
        assert!(err.to_string().contains("cv.pdf"));
    }

    #[tokio::test]
    async fn test_non_pdf_file_is_pdf_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a pdf").unwrap();
        let source = DocumentSource::Path(file.path().to_path_buf());
        let err = PdfTextExtractor.extract_text(&source).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf { .. }));
    }

    #[test]
    fn test_document_source_deserializes_externally_tagged() {
        let path: DocumentSource = serde_json::from_str(r#"{"path": "cv.pdf"}"#).unwrap();
        assert_eq!(path.identifier(), "cv.pdf");
        let text: DocumentSource = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert!(matches!(text, DocumentSource::Text(ref t) if t == "hello"));
    }

    #[test]
    fn test_debug_does_not_dump_document_text() {
        let source = DocumentSource::Text("secret résumé".into());
        assert_eq!(format!("{source:?}"), "Text(13 chars)");
    }
}
