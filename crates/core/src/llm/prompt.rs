//! Prompt templates and response parsing

/// Opening marker around each generated paraphrase
pub const VARIANT_START: &str = "<SOQ>";
/// Closing marker around each generated paraphrase
pub const VARIANT_END: &str = "<EOQ>";

/// Answer used by the generation prompt when the passages do not cover the question
pub const NOT_IN_DOCUMENTS: &str = "The answer is not in the documents.";

/// Prompt asking for `count` rephrasings of `question`, each wrapped in markers
pub fn expansion_prompt(question: &str, count: usize) -> String {
    format!(
        "You are an AI language model assistant. Write {count} different rephrasings of the \
user question below. Keep the original meaning exactly: do not add or remove information, \
and do not broaden, narrow or change the intent. Do not answer the question.\n\
\n\
Wrap each rephrasing between {VARIANT_START} and {VARIANT_END} and output nothing else.\n\
\n\
Original question: {question}\n\
\n\
Example: for \"What is the capital of France?\" and 2 rephrasings, the output is\n\
{VARIANT_START}Which city serves as the capital of France?{VARIANT_END}\n\
{VARIANT_START}What is the main city of France?{VARIANT_END}\n"
    )
}

/// Prompt asking for an answer drawn only from `passages`
pub fn answer_prompt(question: &str, passages: &[&str]) -> String {
    let mut documents = String::new();
    for (i, passage) in passages.iter().enumerate() {
        documents.push_str(&format!("[{}] {}\n", i + 1, passage.trim()));
    }

    format!(
        "You are an AI assistant that answers questions from the documents provided.\n\
\n\
Question: {question}\n\
\n\
Documents:\n\
{documents}\n\
Give a concise, accurate answer to exactly this question using only the documents. \
If the documents do not contain the answer, reply with \"{NOT_IN_DOCUMENTS}\"\n"
    )
}

/// Extract the marker-wrapped paraphrases from a model response
///
/// Each variant is trimmed and blank ones are dropped. An unterminated final
/// marker is ignored. Markers may span lines.
pub fn parse_variants(response: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut rest = response;

    while let Some(start) = rest.find(VARIANT_START) {
        let after_start = &rest[start + VARIANT_START.len()..];
        let Some(end) = after_start.find(VARIANT_END) else {
            break;
        };
        let variant = after_start[..end].trim();
        if !variant.is_empty() {
            variants.push(variant.to_string());
        }
        rest = &after_start[end + VARIANT_END.len()..];
    }

    variants
}
