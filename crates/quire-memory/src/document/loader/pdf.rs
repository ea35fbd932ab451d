use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, DocType, Document, DocumentError, DocumentLoader, DocumentMetadata,
    file_name,
};

pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
        source_name: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + 'a>>
    {
        let max_size = self.max_file_size;
        Box::pin(async move {
            let meta = tokio::fs::metadata(path).await?;
            if meta.len() > max_size {
                return Err(DocumentError::FileTooLarge(meta.len()));
            }

            let path_buf = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_by_pages(&path_buf)
                    .map_err(|e| DocumentError::Pdf(e.to_string()))
            })
            .await
            .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            let source_file = file_name(path);
            tracing::info!(source = source_name, pages = pages.len(), "loaded PDF");

            let mut documents = Vec::with_capacity(pages.len());
            for (i, content) in pages.into_iter().enumerate() {
                if content.trim().is_empty() {
                    tracing::debug!(source = source_name, page = i + 1, "skipping empty page");
                    continue;
                }
                let page = u32::try_from(i + 1)
                    .map_err(|_| DocumentError::UnsupportedFormat("too many pages".into()))?;
                documents.push(Document {
                    content,
                    metadata: DocumentMetadata {
                        source_file: source_file.clone(),
                        source_name: source_name.to_owned(),
                        page,
                        doc_type: DocType::Pdf,
                        row: None,
                    },
                });
            }
            Ok(documents)
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}
