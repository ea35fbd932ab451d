use std::sync::LazyLock;

use regex::Regex;

use super::types::{DocType, Document, DocumentChunk};

static HYPHEN_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\s*\n\s*").expect("hyphen break regex is valid"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Windows of this many characters or fewer are dropped.
    pub min_chunk_chars: usize,
    /// Rendered rows of this many characters or fewer are dropped.
    pub min_row_chars: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            min_chunk_chars: 80,
            min_row_chars: 40,
        }
    }
}

/// Sliding word-window splitter.
pub struct WordSplitter {
    config: SplitterConfig,
}

impl WordSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split one document into chunks tagged with its provenance.
    ///
    /// PDF pages are cleaned and windowed; dataset rows become a single chunk.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<DocumentChunk> {
        match document.metadata.doc_type {
            DocType::Csv => self.split_row(document),
            DocType::Pdf => self.split_page(document),
        }
    }

    fn split_row(&self, document: &Document) -> Vec<DocumentChunk> {
        let text = document.content.trim();
        if text.chars().count() <= self.config.min_row_chars {
            return Vec::new();
        }
        let index = document.metadata.row.unwrap_or(0);
        vec![DocumentChunk::new(text.to_owned(), &document.metadata, index)]
    }

    fn split_page(&self, document: &Document) -> Vec<DocumentChunk> {
        let cleaned = clean_text(&document.content);
        word_windows(&cleaned, self.config.chunk_size, self.config.chunk_overlap)
            .into_iter()
            .filter(|w| w.chars().count() > self.config.min_chunk_chars)
            .enumerate()
            .map(|(i, text)| DocumentChunk::new(text, &document.metadata, i))
            .collect()
    }
}

/// Rejoin words hyphenated across line breaks and collapse whitespace runs.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let joined = HYPHEN_BREAK_RE.replace_all(text, "");
    WHITESPACE_RE.replace_all(&joined, " ").trim().to_owned()
}

fn word_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::types::DocumentMetadata;

    fn make_doc(content: &str, doc_type: DocType) -> Document {
        Document {
            content: content.to_owned(),
            metadata: DocumentMetadata {
                source_file: "test.pdf".to_owned(),
                source_name: "Test Report".to_owned(),
                page: 7,
                doc_type,
                row: None,
            },
        }
    }

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn small_config(size: usize, overlap: usize) -> SplitterConfig {
        SplitterConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            min_chunk_chars: 0,
            min_row_chars: 0,
        }
    }

    #[test]
    fn empty_document() {
        let splitter = WordSplitter::new(SplitterConfig::default());
        assert!(splitter.split(&make_doc("", DocType::Pdf)).is_empty());
        assert!(splitter.split(&make_doc("   \n  ", DocType::Pdf)).is_empty());
    }

    #[test]
    fn clean_text_rejoins_hyphenation_and_collapses_whitespace() {
        assert_eq!(
            clean_text("finan-\n  cial  inclusion\n\nin   Rwanda "),
            "financial inclusion in Rwanda"
        );
    }

    #[test]
    fn windows_overlap_by_configured_words() {
        let splitter = WordSplitter::new(small_config(600, 100));
        let chunks = splitter.split(&make_doc(&numbered_words(1200), DocType::Pdf));
        assert_eq!(chunks.len(), 3);

        let first: Vec<&str> = chunks[0].text.split(' ').collect();
        let second: Vec<&str> = chunks[1].text.split(' ').collect();
        assert_eq!(first.len(), 600);
        assert_eq!(second.len(), 600);
        assert_eq!(&first[500..], &second[..100]);
        assert_eq!(second[0], "word0500");
        assert!(chunks[2].text.ends_with("word1199"));
    }

    #[test]
    fn last_window_stops_at_end() {
        let chunks = word_windows(&numbered_words(10), 4, 1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "word0006 word0007 word0008 word0009");
    }

    #[test]
    fn full_overlap_still_progresses() {
        let chunks = word_windows(&numbered_words(5), 3, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "word0000 word0001 word0002");
    }

    #[test]
    fn short_fragments_are_dropped() {
        let splitter = WordSplitter::new(SplitterConfig::default());
        let chunks = splitter.split(&make_doc("Table of contents", DocType::Pdf));
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunks_carry_provenance() {
        let splitter = WordSplitter::new(small_config(5, 1));
        let chunks = splitter.split(&make_doc(&numbered_words(12), DocType::Pdf));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.page, 7);
            assert_eq!(chunk.source_name, "Test Report");
            assert_eq!(chunk.source_file, "test.pdf");
            assert_eq!(chunk.doc_type, DocType::Pdf);
        }
    }

    #[test]
    fn csv_row_is_one_chunk_keeping_line_breaks() {
        let mut doc = make_doc(
            "Indicator: Mobile money accounts\n  Country: Rwanda\n  Annual values: 2022=5000",
            DocType::Csv,
        );
        doc.metadata.page = 0;
        doc.metadata.row = Some(4);
        let splitter = WordSplitter::new(SplitterConfig::default());
        let chunks = splitter.split(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 4);
        assert!(chunks[0].text.contains('\n'));
    }

    #[test]
    fn short_csv_row_is_dropped() {
        let splitter = WordSplitter::new(SplitterConfig::default());
        assert!(splitter.split(&make_doc("Indicator: Row 1", DocType::Csv)).is_empty());
    }

    mod proptest_splitter {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn split_never_panics(
                content in "\\PC{0,3000}",
                chunk_size in 0usize..800,
                chunk_overlap in 0usize..900,
            ) {
                let splitter = WordSplitter::new(small_config(chunk_size, chunk_overlap));
                let _ = splitter.split(&make_doc(&content, DocType::Pdf));
            }

            #[test]
            fn windows_respect_size_and_cover_every_word(
                n in 1usize..400,
                chunk_size in 1usize..120,
                chunk_overlap in 0usize..60,
            ) {
                let text = numbered_words(n);
                let windows = word_windows(&text, chunk_size, chunk_overlap);
                let mut seen = std::collections::HashSet::new();
                for w in &windows {
                    let words: Vec<&str> = w.split(' ').collect();
                    prop_assert!(words.len() <= chunk_size);
                    seen.extend(words.into_iter().map(str::to_owned));
                }
                prop_assert_eq!(seen.len(), n);
            }

            #[test]
            fn splitting_is_idempotent(content in "[a-zA-Z .,\\-\n]{0,2000}") {
                let splitter = WordSplitter::new(small_config(50, 10));
                let doc = make_doc(&content, DocType::Pdf);
                prop_assert_eq!(splitter.split(&doc), splitter.split(&doc));
            }
        }
    }
}
