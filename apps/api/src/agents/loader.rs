use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::extraction::{DocumentSource, ExtractionError, TextExtractor};
use super::{Agent, AgentError, AgentKind, AgentOutput, CapabilitySet};
use crate::session::{source_key, Session, CV_TEXT_KEY, JD_TEXT_KEY};

/// Upper bound on stored document text before truncation.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 120_000;
const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]";
/// pdf-extract separates pages with a form feed.
const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub max_document_chars: usize,
    pub extraction_timeout: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
            extraction_timeout: Duration::from_secs(30),
        }
    }
}

/// Writes one document's text into session memory under a fixed key.
pub struct LoaderAgent {
    kind: AgentKind,
    memory_key: &'static str,
    document: DocumentSource,
    extractor: Arc<dyn TextExtractor>,
    options: LoaderOptions,
}

impl LoaderAgent {
    pub fn cv(
        document: DocumentSource,
        extractor: Arc<dyn TextExtractor>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            kind: AgentKind::CvLoader,
            memory_key: CV_TEXT_KEY,
            document,
            extractor,
            options,
        }
    }

    pub fn jd(
        document: DocumentSource,
        extractor: Arc<dyn TextExtractor>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            kind: AgentKind::JdLoader,
            memory_key: JD_TEXT_KEY,
            document,
            extractor,
            options,
        }
    }

    async fn extract(&self) -> Result<String, ExtractionError> {
        let identifier = self.document.identifier();
        let raw = tokio::time::timeout(
            self.options.extraction_timeout,
            self.extractor.extract_text(&self.document),
        )
        .await
        .map_err(|_| ExtractionError::Timeout {
            document: identifier.clone(),
            secs: self.options.extraction_timeout.as_secs(),
        })??;

        let text = normalize_document_text(&raw, self.options.max_document_chars);
        if text.is_empty() {
            return Err(ExtractionError::Empty(identifier));
        }
        Ok(text)
    }
}

#[async_trait]
impl Agent for LoaderAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::NONE
    }

    async fn run(&self, session: &Session) -> Result<AgentOutput, AgentError> {
        let text = self.extract().await?;
        let chars = text.chars().count();
        let source = source_key(self.memory_key);

        session.put_once(self.memory_key, text)?;
        session.put_once(source.clone(), self.document.identifier())?;

        info!(
            "[{}] saved {chars} chars from {} to '{}'",
            self.kind,
            self.document.identifier(),
            self.memory_key
        );

        Ok(AgentOutput {
            agent: self.kind,
            text: format!(
                "Stored {chars} characters of document text under session key '{}'.",
                self.memory_key
            ),
            writes: vec![self.memory_key.to_string(), source],
            unsourced_citations: 0,
        })
    }
}

/// Collapses whitespace runs within each page, joins pages with newlines, and
/// truncates to `max_chars` characters with a visible marker.
pub fn normalize_document_text(raw: &str, max_chars: usize) -> String {
    let content = raw
        .split(PAGE_BREAK)
        .map(|page| page.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if content.chars().count() > max_chars {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{truncated}{TRUNCATION_MARKER}")
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;

    struct FixedExtractor(Result<&'static str, &'static str>);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract_text(&self, document: &DocumentSource) -> Result<String, ExtractionError> {
            self.0
                .map(str::to_string)
                .map_err(|message| ExtractionError::Pdf {
                    document: document.identifier(),
                    message: message.to_string(),
                })
        }
    }

    struct StalledExtractor;

    #[async_trait]
    impl TextExtractor for StalledExtractor {
        async fn extract_text(&self, _: &DocumentSource) -> Result<String, ExtractionError> {
            std::future::pending().await
        }
    }

    fn cv_loader(extractor: Arc<dyn TextExtractor>) -> LoaderAgent {
        LoaderAgent::cv(
            DocumentSource::Path("cv.pdf".into()),
            extractor,
            LoaderOptions::default(),
        )
    }

    #[test]
    fn test_normalize_collapses_whitespace_per_page() {
        let raw = "Jane   Doe\n\nSenior  Engineer\u{000C}  Go\tRust  \u{000C}\u{000C}";
        assert_eq!(
            normalize_document_text(raw, 1000),
            "Jane Doe Senior Engineer\nGo Rust"
        );
    }

    #[test]
    fn test_normalize_truncates_with_marker() {
        let out = normalize_document_text("abcdefghij", 4);
        assert_eq!(out, "abcd\n...[TRUNCATED]");
    }

    #[test]
    fn test_normalize_counts_characters() {
        assert_eq!(normalize_document_text("éééé", 4), "éééé");
    }

    #[tokio::test]
    async fn test_loader_writes_text_and_source() {
        let session = Session::new(SessionId::new());
        let loader = cv_loader(Arc::new(FixedExtractor(Ok("5 years  of Go experience"))));

        let output = loader.run(&session).await.unwrap();

        assert_eq!(output.agent, AgentKind::CvLoader);
        assert_eq!(session.get(CV_TEXT_KEY).unwrap(), "5 years of Go experience");
        assert_eq!(session.get("pdf_resume_text.source").unwrap(), "cv.pdf");
        assert_eq!(output.writes.len(), 2);
    }

    #[tokio::test]
    async fn test_loader_surfaces_extraction_error() {
        let session = Session::new(SessionId::new());
        let loader = cv_loader(Arc::new(FixedExtractor(Err("corrupt xref table"))));

        let err = loader.run(&session).await.unwrap_err();

        assert!(matches!(err, AgentError::Extraction(ExtractionError::Pdf { .. })));
        assert!(err.is_fatal());
        assert!(session.keys().is_empty());
    }

    #[tokio::test]
    async fn test_blank_document_is_an_extraction_error() {
        let session = Session::new(SessionId::new());
        let loader = cv_loader(Arc::new(FixedExtractor(Ok(" \n\t "))));
        let err = loader.run(&session).await.unwrap_err();
        assert!(matches!(err, AgentError::Extraction(ExtractionError::Empty(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_timeout() {
        let session = Session::new(SessionId::new());
        let loader = cv_loader(Arc::new(StalledExtractor));
        let err = loader.run(&session).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Extraction(ExtractionError::Timeout { secs: 30, .. })
        ));
    }

    #[tokio::test]
    async fn test_document_text_is_immutable_once_loaded() {
        let session = Session::new(SessionId::new());
        session.put(CV_TEXT_KEY, "already here");
        let loader = cv_loader(Arc::new(FixedExtractor(Ok("new text"))));
        let err = loader.run(&session).await.unwrap_err();
        assert!(matches!(err, AgentError::Session(_)));
        assert_eq!(session.get(CV_TEXT_KEY).unwrap(), "already here");
    }

    #[test]
    fn test_loader_is_granted_no_tools() {
        let loader = cv_loader(Arc::new(FixedExtractor(Ok("text"))));
        assert!(loader.capabilities().tools().is_empty());
        assert!(loader
            .capabilities()
            .require(AgentKind::CvLoader, "search_memory")
            .is_err());
    }
}
