use std::fmt::Write;

use quire_memory::document::DocType;

use crate::confidence::ConfidenceLevel;
use crate::pipeline::QueryResponse;

const RULE_WIDTH: usize = 70;
const PREVIEW_CHARS: usize = 220;

fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{flat} …")
    } else {
        flat
    }
}

/// Render a query response for the terminal.
#[must_use]
pub fn format_response(response: &QueryResponse, show_context: bool) -> String {
    let result = &response.result;
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "QUESTION: {}", result.question);
    let _ = writeln!(out, "{rule}\n");
    let _ = writeln!(out, "ANSWER:\n{}\n", result.answer);

    if result.confidence == ConfidenceLevel::Low && !result.is_fallback {
        let best = result.best_similarity.unwrap_or_default();
        let _ = writeln!(
            out,
            "WARNING: low retrieval confidence (best similarity {best:.2}); check the cited pages.\n"
        );
    }
    if let Some(reason) = result.fallback_reason {
        let _ = writeln!(out, "[fallback: {}]", reason.as_str());
    }
    let _ = write!(
        out,
        "[{} ms | {} in / {} out tokens]",
        result.latency_ms, result.input_tokens, result.output_tokens
    );

    if show_context && !response.retrieved.is_empty() {
        let _ = write!(out, "\n\n--- RETRIEVED CONTEXT ---");
        for (i, retrieved) in response.retrieved.iter().enumerate() {
            let c = &retrieved.chunk;
            let location = match c.doc_type {
                DocType::Csv => "dataset".to_owned(),
                DocType::Pdf => format!("Page {}", c.page),
            };
            let _ = write!(
                out,
                "\n\n  [{}] {} | {location} | sim={:.3}\n  {}",
                i + 1,
                c.source_name,
                retrieved.similarity,
                preview(&c.text)
            );
        }
    }
    out
}
