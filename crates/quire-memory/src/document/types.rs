use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Pdf,
    Csv,
}

impl DocType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// File name inside the corpus directory.
    pub source_file: String,
    /// Human-readable name used in citations.
    pub source_name: String,
    /// 1-based page for PDFs; 0 for dataset rows.
    pub page: u32,
    pub doc_type: DocType,
    /// Row position for tabular sources.
    pub row: Option<usize>,
}

/// One extracted unit of a corpus file: a PDF page or a rendered CSV row.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source_file: String,
    pub source_name: String,
    pub page: u32,
    pub doc_type: DocType,
    pub chunk_index: usize,
    pub chunk_id: String,
}

impl DocumentChunk {
    #[must_use]
    pub fn new(text: String, metadata: &DocumentMetadata, chunk_index: usize) -> Self {
        let chunk_id = chunk_id(&metadata.source_file, metadata.page, chunk_index, &text);
        Self {
            text,
            source_file: metadata.source_file.clone(),
            source_name: metadata.source_name.clone(),
            page: metadata.page,
            doc_type: metadata.doc_type,
            chunk_index,
            chunk_id,
        }
    }

    /// Citation label in the form the model is asked to reproduce.
    #[must_use]
    pub fn citation_label(&self) -> String {
        match self.doc_type {
            DocType::Csv => format!("[{}]", self.source_name),
            DocType::Pdf => format!("[{}, p.{}]", self.source_name, self.page),
        }
    }
}

/// Content-addressed identifier, stable across re-ingestion of identical files.
#[must_use]
pub fn chunk_id(source_file: &str, page: u32, chunk_index: usize, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_file.as_bytes());
    hasher.update(&[0]);
    hasher.update(&page.to_le_bytes());
    hasher.update(&(chunk_index as u64).to_le_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}
