use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "pdf")]
use super::PdfLoader;
use super::{
    CsvLoader, DocType, DocumentChunk, DocumentError, DocumentLoader, SplitterConfig,
    WordSplitter, file_name,
};

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file: String,
    pub source_name: String,
    pub doc_type: DocType,
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// Result of walking a corpus directory.
#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    pub chunks: Vec<DocumentChunk>,
    pub files: Vec<FileReport>,
    pub skipped: Vec<SkippedFile>,
}

/// Walks a corpus directory and turns every supported file into chunks.
pub struct CorpusLoader {
    document_names: HashMap<String, String>,
    csv_source_name: String,
    splitter: WordSplitter,
    #[cfg(feature = "pdf")]
    pdf: PdfLoader,
    csv: CsvLoader,
}

impl CorpusLoader {
    #[must_use]
    pub fn new(
        splitter: SplitterConfig,
        document_names: HashMap<String, String>,
        csv_source_name: impl Into<String>,
    ) -> Self {
        Self {
            document_names,
            csv_source_name: csv_source_name.into(),
            splitter: WordSplitter::new(splitter),
            #[cfg(feature = "pdf")]
            pdf: PdfLoader::default(),
            csv: CsvLoader::default(),
        }
    }

    /// Display name for a corpus file.
    #[must_use]
    pub fn source_name(&self, file: &str, doc_type: DocType) -> String {
        match doc_type {
            DocType::Csv => self.csv_source_name.clone(),
            DocType::Pdf => self
                .document_names
                .get(file)
                .cloned()
                .unwrap_or_else(|| file.to_owned()),
        }
    }

    fn loader_for(&self, path: &Path) -> Option<(DocType, &dyn DocumentLoader)> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        #[cfg(feature = "pdf")]
        if self.pdf.supported_extensions().contains(&ext.as_str()) {
            return Some((DocType::Pdf, &self.pdf));
        }
        if self.csv.supported_extensions().contains(&ext.as_str()) {
            return Some((DocType::Csv, &self.csv));
        }
        None
    }

    /// Load all supported files in `dir`, in file name order.
    ///
    /// A missing directory yields an empty report. Files that cannot be read or
    /// parsed are recorded in `skipped` and do not abort the walk.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` exists but cannot be listed.
    pub async fn load_corpus(&self, dir: &Path) -> Result<CorpusReport, DocumentError> {
        let mut report = CorpusReport::default();

        if !tokio::fs::try_exists(dir).await? {
            tracing::warn!(dir = %dir.display(), "corpus directory does not exist");
            return Ok(report);
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        tracing::info!(dir = %dir.display(), files = paths.len(), "loading corpus");

        for path in paths {
            let file = file_name(&path);
            let Some((doc_type, loader)) = self.loader_for(&path) else {
                tracing::debug!(file = %file, "skipping unsupported file");
                report.skipped.push(SkippedFile {
                    file,
                    reason: "unsupported format".into(),
                });
                continue;
            };

            let source_name = self.source_name(&file, doc_type);
            match loader.load(&path, &source_name).await {
                Ok(documents) => {
                    let before = report.chunks.len();
                    for document in &documents {
                        report.chunks.extend(self.splitter.split(document));
                    }
                    let chunks = report.chunks.len() - before;
                    tracing::info!(file = %file, source = %source_name, chunks, "ingested");
                    report.files.push(FileReport {
                        file,
                        source_name,
                        doc_type,
                        chunks,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %file, "failed to load corpus file: {e}");
                    report.skipped.push(SkippedFile {
                        file,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            chunks = report.chunks.len(),
            skipped = report.skipped.len(),
            "corpus loaded"
        );
        Ok(report)
    }
}
