use std::fmt::Write;

use ai_client::truncate_to_char_boundary;

use crate::types::{AggregatedResultSet, EntityName};

pub(crate) const SCORING_SYSTEM: &str = "\
You assess the public reputation of a named entity from web search evidence.\n\n\
Produce three INDEPENDENT integer scores from 0 to 100:\n\
- presence: how visible and findable the entity is. Many distinct, relevant \
sources score high; a few thin or off-topic hits score low.\n\
- sentiment: the overall tone of what the sources say about the entity. \
Praise and neutral coverage score high; complaints, scandals and criticism \
score low.\n\
- coherence: how well the user's claim about the entity matches the evidence. \
Without a claim, judge how consistent the sources are with each other.\n\n\
Rules:\n\
- Justify each dimension on its own. Never derive one score from another and \
never report a single overall reputation number.\n\
- Use the whole range. Reserve 70-85 for evidence that is genuinely \
middling; do not default to it.\n\
- Judge only the evidence given. Results marked [placeholder] carry no \
information.\n\
- sentiment_label summarizes the tone: positive, neutral, mixed or negative.\n\
- summary is two or three sentences a non-specialist can read.";

pub(crate) const GROUPING_SYSTEM: &str = "\
You check whether a set of web search results, all retrieved for one name, \
describe more than one real-world entity (for example a company and an \
unrelated person or band that share the name).\n\n\
- Set ambiguous to true only when at least two clearly distinct entities \
each account for several results.\n\
- For each distinct entity, give a short distinguishing name (the shared \
name plus a qualifier, e.g. \"Acme (hardware retailer)\") and a one-sentence \
rationale citing the results.\n\
- When the results describe a single entity, set ambiguous to false and \
return an empty candidate list.\n\
- Do not guess. Passing mentions and aggregator pages are not evidence of a \
separate entity.";

/// Numbered evidence list: title, URL and a truncated snippet per result.
pub(crate) fn evidence_block(results: &AggregatedResultSet, max_snippet_bytes: usize) -> String {
    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let title = result.title.as_deref().unwrap_or("(untitled)");
        let _ = writeln!(out, "{}. {}", i + 1, title);
        if let Some(url) = result.url.as_deref() {
            let _ = writeln!(out, "   {url}");
        }
        if let Some(snippet) = result.snippet.as_deref() {
            let snippet = truncate_to_char_boundary(snippet.trim(), max_snippet_bytes);
            if !snippet.is_empty() {
                let _ = writeln!(out, "   {snippet}");
            }
        }
    }
    out
}

pub(crate) fn scoring_prompt(
    entity: &EntityName,
    identity: Option<&str>,
    results: &AggregatedResultSet,
    message: Option<&str>,
    max_snippet_bytes: usize,
) -> String {
    let mut prompt = format!("Entity: {entity}\n");
    if let Some(identity) = identity {
        let _ = writeln!(prompt, "Specifically: {identity}");
    }
    match message.map(str::trim).filter(|m| !m.is_empty()) {
        Some(message) => {
            let _ = writeln!(prompt, "Claim to check for coherence: {message}");
        }
        None => prompt.push_str("No claim supplied.\n"),
    }
    let _ = write!(
        prompt,
        "\nSearch evidence ({} results):\n{}",
        results.len(),
        evidence_block(results, max_snippet_bytes)
    );
    prompt
}

pub(crate) fn grouping_prompt(
    entity: &EntityName,
    results: &AggregatedResultSet,
    max_snippet_bytes: usize,
) -> String {
    format!(
        "Name searched: {entity}\n\nResults ({}):\n{}",
        results.len(),
        evidence_block(results, max_snippet_bytes)
    )
}
