//! Inline citation parsing and verification against retrieved chunks.

use std::fmt;
use std::sync::LazyLock;

use quire_memory::RetrievedChunk;
use quire_memory::document::DocType;
use regex::Regex;
use serde::Serialize;

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\n]+)\]").expect("bracket regex is valid"));

static PAGED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:source:\s*)?(.+?)\s*,\s*(?:pp?\.|pages?)\s*(\d+)(?:\s*[-–]\s*\d+)?$")
        .expect("paged citation regex is valid")
});

static SOURCE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^source:\s*").expect("source prefix regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Citation {
    pub source: String,
    /// `None` for dataset citations, which carry no page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "[{}, p.{page}]", self.source),
            None => write!(f, "[{}]", self.source),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationCheck {
    pub verified: Vec<Citation>,
    /// Citations naming a source or page that was not retrieved.
    pub unverified: Vec<Citation>,
}

impl CitationCheck {
    #[must_use]
    pub fn is_sound(&self) -> bool {
        !self.verified.is_empty() && self.unverified.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ','])
        .to_lowercase()
}

fn parse_part(part: &str) -> Option<Citation> {
    let part = part.trim();
    if !part.chars().any(char::is_alphabetic) {
        return None;
    }
    if let Some(caps) = PAGED_RE.captures(part) {
        let page = caps[2].parse().ok()?;
        return Some(Citation {
            source: caps[1].trim().to_owned(),
            page: Some(page),
        });
    }
    let source = SOURCE_PREFIX_RE.replace(part, "").trim().to_owned();
    (!source.is_empty()).then_some(Citation { source, page: None })
}

/// Every bracketed citation-like span in `text`, deduplicated in order of appearance.
///
/// A bracket may hold several citations separated by `;`. Numeric markers
/// such as `[1]` are not citations.
#[must_use]
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for caps in BRACKET_RE.captures_iter(text) {
        for citation in caps[1].split(';').filter_map(parse_part) {
            if !out.contains(&citation) {
                out.push(citation);
            }
        }
    }
    out
}

fn cites(citation: &Citation, chunk: &RetrievedChunk) -> bool {
    let c = &chunk.chunk;
    match (citation.page, c.doc_type) {
        (Some(page), DocType::Pdf) => page == c.page,
        (Some(page), DocType::Csv) => page == 0,
        (None, DocType::Csv) => true,
        (None, DocType::Pdf) => false,
    }
}

/// Bracketed prose such as `[sic]` or `[...]`: a single word cannot name a
/// corpus source.
fn is_aside(source: &str) -> bool {
    source
        .split_whitespace()
        .filter(|word| word.chars().any(char::is_alphabetic))
        .count()
        < 2
}

/// Check each citation against the chunks retrieved for the query.
///
/// A paged citation is verified only if a retrieved chunk has that source and
/// page. A page-less citation is verified only for a retrieved dataset source.
/// Single-word page-less brackets naming nothing retrieved are asides, not
/// citations; longer ones are unverified.
#[must_use]
pub fn verify_citations(citations: &[Citation], chunks: &[RetrievedChunk]) -> CitationCheck {
    let mut check = CitationCheck::default();
    for citation in citations {
        let name = normalize(&citation.source);
        let mut same_source = chunks
            .iter()
            .filter(|chunk| normalize(&chunk.chunk.source_name) == name)
            .peekable();

        if citation.page.is_none()
            && same_source.peek().is_none()
            && is_aside(&citation.source)
        {
            continue;
        }
        if same_source.any(|chunk| cites(citation, chunk)) {
            check.verified.push(citation.clone());
        } else {
            check.unverified.push(citation.clone());
        }
    }
    check
}
