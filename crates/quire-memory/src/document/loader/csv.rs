use std::path::Path;
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, DocType, Document, DocumentError, DocumentLoader, DocumentMetadata,
    file_name,
};

static YEAR_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("year column regex is valid"));

const INDICATOR_COLUMNS: [&str; 2] = ["INDICATOR", "Indicator Name"];

/// Renders each row of an indicator table as one document.
pub struct CsvLoader {
    pub max_file_size: u64,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Render one row as `Indicator:` line, identifying columns, then dated values.
fn render_row(headers: &[String], record: &csv::StringRecord, row: usize) -> String {
    let cell = |i: usize| record.get(i).map(str::trim).unwrap_or_default();

    let indicator = INDICATOR_COLUMNS
        .iter()
        .find_map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .map(cell)
                .filter(|v| !v.is_empty())
        })
        .map_or_else(|| format!("Row {row}"), str::to_owned);

    let mut parts = vec![format!("Indicator: {indicator}")];
    let mut years = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        let value = cell(i);
        if value.is_empty() {
            continue;
        }
        if YEAR_COLUMN_RE.is_match(header) {
            years.push(format!("{header}={value}"));
        } else {
            parts.push(format!("  {header}: {value}"));
        }
    }
    if !years.is_empty() {
        parts.push(format!("  Annual values: {}", years.join(", ")));
    }
    parts.join("\n")
}

fn parse_rows(bytes: &[u8], source_file: &str, source_name: &str) -> Result<Vec<Document>, DocumentError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        documents.push(Document {
            content: render_row(&headers, &record, row),
            metadata: DocumentMetadata {
                source_file: source_file.to_owned(),
                source_name: source_name.to_owned(),
                page: 0,
                doc_type: DocType::Csv,
                row: Some(row),
            },
        });
    }
    Ok(documents)
}

impl DocumentLoader for CsvLoader {
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
            let bytes = tokio::fs::read(path).await?;
            let documents = parse_rows(&bytes, &file_name(path), source_name)?;
            tracing::info!(source = source_name, rows = documents.len(), "loaded CSV");
            Ok(documents)
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["csv"]
    }
}
