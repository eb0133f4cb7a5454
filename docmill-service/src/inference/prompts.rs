//! Deterministic prompt templates for the four analysis operations.
//!
//! The embedded content is already truncated by the extractor; templates add
//! a fixed instruction frame around it. Classification, entity extraction,
//! and intent detection ask for a strict JSON object; summarization asks for
//! free text with a target length.

/// Approximate word target for summaries
const SUMMARY_TARGET_WORDS: usize = 200;

pub(super) fn classification_prompt(file_name: &str, content: &str) -> String {
    format!(
        r#"Classify the following document.

Respond with ONLY a JSON object of this exact shape:
{{"category": "<one of: Invoice, Contract, Report, Correspondence, Form, Technical, Other>", "confidences": {{"<category>": <0.0-1.0>, ...}}, "tags": ["<short tag>", ...]}}

Document name: {file_name}

Document content:
{content}"#
    )
}

pub(super) fn summary_prompt(file_name: &str, content: &str) -> String {
    format!(
        r#"Summarize the following document in about {SUMMARY_TARGET_WORDS} words of plain prose.
After the summary, add a line reading exactly "Key points:" followed by 3-5 bullet points, each on its own line starting with "- ".

Document name: {file_name}

Document content:
{content}"#
    )
}

pub(super) fn entity_extraction_prompt(file_name: &str, content: &str) -> String {
    format!(
        r#"Extract the named entities from the following document.

Respond with ONLY a JSON object of this exact shape:
{{"entities": [{{"type": "<person|organization|location|date|amount|other>", "value": "<entity text>", "confidence": <0.0-1.0>}}, ...]}}

Document name: {file_name}

Document content:
{content}"#
    )
}

pub(super) fn intent_detection_prompt(file_name: &str, content: &str) -> String {
    format!(
        r#"Determine the primary intent of the following document (why it was sent or created).

Respond with ONLY a JSON object of this exact shape:
{{"primary_intent": "<short phrase>", "confidence": <0.0-1.0>, "suggested_action": "<short recommended next step>"}}

Document name: {file_name}

Document content:
{content}"#
    )
}
