//! Prompt construction for each pipeline stage

use super::types::ResearchArea;
use delve_core::SourceRecord;

/// Snippets longer than this are cut when sources are listed in a prompt
const SNIPPET_LIMIT: usize = 300;

pub fn plan_prompt(topic: &str, max_areas: usize) -> String {
    format!(
        r#"You are a research planning expert. Break the following research topic into at most {max_areas} distinct research areas that together cover it thoroughly.

Topic: "{topic}"

Respond with a JSON array only, using this structure:
[
  {{
    "name": "Short area name",
    "description": "One sentence describing what this area should investigate"
  }}
]"#
    )
}

pub fn refine_query_prompt(topic: &str, area: &ResearchArea) -> String {
    format!(
        r#"You are refining web searches for a research project on "{topic}".

Research area: {name}
Area focus: {description}

Previous queries:
{queries}

Sources collected so far:
{sources}

Write ONE new search query that targets aspects of this area not yet covered by the sources above. Respond with the query text only."#,
        name = area.name,
        description = area.description,
        queries = bullet_list(&area.queries),
        sources = compact_sources(&area.sources, false),
    )
}

pub fn summary_prompt(topic: &str, area: &ResearchArea) -> String {
    format!(
        r#"You are analyzing sources for a research project on "{topic}".

Research area: {name}
Area focus: {description}

Sources:
{sources}

Write a concise synthesis of what these sources say about this area. Highlight key facts, points of agreement or disagreement, and open questions. If the sources are thin, say what is missing."#,
        name = area.name,
        description = area.description,
        sources = compact_sources(&area.sources, true),
    )
}

pub fn aggregate_prompt(topic: &str, areas: &[ResearchArea]) -> String {
    let sections: String = areas
        .iter()
        .map(|area| format!("### {}\n{}\n\n", area.name, area.summary.trim()))
        .collect();

    format!(
        r#"You are writing the final report of a research project.

Topic: "{topic}"

Findings by research area:

{sections}Write a structured report that:
1. Summarizes the most important findings
2. Identifies patterns across the research areas
3. Highlights key insights
4. Provides actionable conclusions"#
    )
}

/// One line per source: `- title (url)` plus an optional shortened snippet
pub fn compact_sources(sources: &[SourceRecord], with_snippets: bool) -> String {
    if sources.is_empty() {
        return "(none)".to_string();
    }

    sources
        .iter()
        .map(|source| {
            let mut line = format!("- {} ({})", source.title, source.url);
            if with_snippets && !source.snippet.trim().is_empty() {
                line.push_str(": ");
                line.push_str(&truncate_chars(source.snippet.trim(), SNIPPET_LIMIT));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
