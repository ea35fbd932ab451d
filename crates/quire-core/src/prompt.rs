use std::fmt::Write;

use quire_llm::provider::Message;
use quire_memory::RetrievedChunk;
use quire_memory::document::DocType;

const EXCERPT_SEPARATOR: &str = "\n\n------------------------------------------------------------\n\n";

/// Instructions restricting the model to the supplied excerpts.
#[must_use]
pub fn system_prompt(fallback: &str) -> String {
    format!(
        "You are a precise, document-grounded research assistant.\n\
         \n\
         STRICT RULES:\n\
         1. Answer ONLY using information explicitly present in the document excerpts \
         provided with the question.\n\
         2. If the excerpts do not contain sufficient information to answer the question, \
         respond with EXACTLY this sentence and nothing else:\n\
         {fallback}\n\
         3. Do NOT add external knowledge, opinions, or inferences beyond what the excerpts state.\n\
         4. Every factual claim must carry an inline citation copied from the excerpt header, \
         in the form [Source Name, p.N]. Dataset excerpts have no page: cite them as [Source Name].\n\
         5. Only cite excerpts that were provided. Be concise and factual."
    )
}

/// Header the model copies its citation from.
#[must_use]
pub fn excerpt_header(index: usize, chunk: &RetrievedChunk) -> String {
    let c = &chunk.chunk;
    match c.doc_type {
        DocType::Csv => format!(
            "[Excerpt {index} | Cite as: [{}] | Relevance: {:.2}]",
            c.source_name, chunk.similarity
        ),
        DocType::Pdf => format!(
            "[Excerpt {index} | Cite as: [{}, p.{}] | Relevance: {:.2}]",
            c.source_name, c.page, chunk.similarity
        ),
    }
}

#[must_use]
pub fn user_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let mut excerpts = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            excerpts.push_str(EXCERPT_SEPARATOR);
        }
        let _ = write!(excerpts, "{}\n{}", excerpt_header(i + 1, chunk), chunk.chunk.text);
    }
    format!(
        "Question: {question}\n\nDocument excerpts:\n\n{excerpts}\n\n\
         Please answer the question based strictly on the excerpts above."
    )
}

#[must_use]
pub fn build_messages(question: &str, chunks: &[RetrievedChunk], fallback: &str) -> Vec<Message> {
    vec![
        Message::system(system_prompt(fallback)),
        Message::user(user_prompt(question, chunks)),
    ]
}
