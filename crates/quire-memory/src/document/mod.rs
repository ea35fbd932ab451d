pub mod corpus;
pub mod error;
pub mod loader;
pub mod splitter;
pub mod types;

pub use corpus::{CorpusLoader, CorpusReport, FileReport, SkippedFile};
pub use error::DocumentError;
pub use loader::CsvLoader;
pub use splitter::{SplitterConfig, WordSplitter, clean_text};
pub use types::{DocType, Document, DocumentChunk, DocumentMetadata};

#[cfg(feature = "pdf")]
pub use loader::PdfLoader;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    /// Extract the documents of one corpus file, labelled with `source_name`.
    fn load<'a>(
        &'a self,
        path: &'a std::path::Path,
        source_name: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + 'a>,
    >;

    fn supported_extensions(&self) -> &[&str];
}

pub(crate) fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
