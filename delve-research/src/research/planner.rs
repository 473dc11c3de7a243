//! Research planning: turning model replies into research areas

use super::types::ResearchArea;
use delve_core::{DelveError, DelveResult, ErrorContext};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Parse the planning reply into at most `max_areas` areas.
///
/// A JSON array anywhere in the reply wins; otherwise a numbered or bulleted
/// list is accepted. Yields a `Plan` error when neither produces an area.
pub fn parse_plan(response: &str, max_areas: usize) -> DelveResult<Vec<ResearchArea>> {
    let mut areas = match parse_json_areas(response) {
        Some(areas) if !areas.is_empty() => areas,
        _ => {
            debug!("Plan reply has no usable JSON array, trying list format");
            parse_list_areas(response)
        }
    };

    dedup_by_name(&mut areas);

    if areas.is_empty() {
        let preview: String = response.trim().chars().take(120).collect();
        return Err(DelveError::Plan {
            message: format!("no research areas found in planning reply: {:?}", preview),
            context: ErrorContext::new("planner").with_operation("parse_plan"),
        });
    }

    areas.truncate(max_areas);
    Ok(areas)
}

/// Numbered rendering of a plan, used as the Planning event message
pub fn render_plan(areas: &[ResearchArea]) -> String {
    let mut out = format!("Identified {} research areas:", areas.len());
    for (i, area) in areas.iter().enumerate() {
        if area.description.is_empty() {
            out.push_str(&format!("\n{}. {}", i + 1, area.name));
        } else {
            out.push_str(&format!("\n{}. {}: {}", i + 1, area.name, area.description));
        }
    }
    out
}

/// Pull a search query out of a refinement reply.
///
/// Takes the first non-empty line with list markers, labels and quotes
/// removed. Falls back to `fallback` when nothing remains.
pub fn extract_query(reply: &str, fallback: &str) -> String {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("```"))
        .unwrap_or_default();

    let mut query = strip_list_marker(line).trim();
    for label in ["search query:", "refined query:", "query:"] {
        if let Some(rest) = query
            .get(..label.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(label))
            .and_then(|_| query.get(label.len()..))
        {
            query = rest.trim();
            break;
        }
    }
    let query = query
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
        .trim();

    if query.is_empty() {
        fallback.to_string()
    } else {
        query.to_string()
    }
}

fn parse_json_areas(response: &str) -> Option<Vec<ResearchArea>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }

    let parsed: Value = serde_json::from_str(&response[start..=end]).ok()?;
    let items = parsed.as_array()?;

    Some(items.iter().filter_map(area_from_json).collect())
}

fn area_from_json(item: &Value) -> Option<ResearchArea> {
    match item {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty()).then(|| ResearchArea::new(name, ""))
        }
        Value::Object(map) => {
            let name = ["name", "area", "title"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))?
                .trim();
            if name.is_empty() {
                return None;
            }
            let description = ["description", "focus", "summary"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .unwrap_or_default()
                .trim();
            Some(ResearchArea::new(name, description))
        }
        _ => None,
    }
}

fn parse_list_areas(response: &str) -> Vec<ResearchArea> {
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let item = strip_list_marker(trimmed);
            // Only lines that actually carried a marker count as list items.
            if item.len() == trimmed.len() {
                return None;
            }
            let item = item.replace("**", "");
            let (name, description) = split_name_description(item.trim());
            (!name.is_empty()).then(|| ResearchArea::new(name, description))
        })
        .collect()
}

/// Remove a leading `1.`, `2)`, `-`, `*` or `•` marker.
///
/// A numeric marker must be followed by whitespace, so `1.5 GHz` stays text.
fn strip_list_marker(line: &str) -> &str {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        return match rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            Some(item) if item.starts_with(char::is_whitespace) => item.trim_start(),
            _ => line,
        };
    }

    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    line
}

fn split_name_description(item: &str) -> (&str, &str) {
    let split = item
        .find(':')
        .map(|idx| (idx, 1))
        .or_else(|| item.find(" - ").map(|idx| (idx, 3)));

    match split {
        Some((idx, width)) => (item[..idx].trim(), item[idx + width..].trim()),
        None => (item.trim(), ""),
    }
}

fn dedup_by_name(areas: &mut Vec<ResearchArea>) {
    let mut seen = HashSet::new();
    areas.retain(|area| seen.insert(area.name.to_lowercase()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_embedded_in_prose() {
        let reply = r#"Sure! Here is the plan:
```json
[
  {"name": "Hardware", "description": "Qubit technologies and their trade-offs"},
  {"name": "Algorithms", "description": "Known quantum speedups"}
]
```
Let me know if you need more."#;

        let areas = parse_plan(reply, 5).unwrap();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].name, "Hardware");
        assert_eq!(areas[1].description, "Known quantum speedups");
    }

    #[test]
    fn accepts_plain_string_arrays() {
        let areas = parse_plan(r#"["Hardware", "Algorithms", "  "]"#, 5).unwrap();
        let names: Vec<_> = areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Hardware", "Algorithms"]);
        assert!(areas[0].description.is_empty());
    }

    #[test]
    fn falls_back_to_numbered_list() {
        let reply = "Research areas:\n\
                     1. **Hardware**: Qubit technologies\n\
                     2) Algorithms - Known speedups\n\
                     - Applications: Chemistry and optimization\n\
                     Closing remarks without a marker";

        let areas = parse_plan(reply, 5).unwrap();
        assert_eq!(areas.len(), 3);
        assert_eq!(areas[0].name, "Hardware");
        assert_eq!(areas[0].description, "Qubit technologies");
        assert_eq!(areas[1].name, "Algorithms");
        assert_eq!(areas[1].description, "Known speedups");
        assert_eq!(areas[2].name, "Applications");
    }

    #[test]
    fn decimal_numbers_are_not_list_markers() {
        let reply = "1.5 GHz clocks are typical for control electronics\n\
                     2.Hardware: no space after the marker\n\
                     3. Error correction: Surface codes";

        let areas = parse_plan(reply, 5).unwrap();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].name, "Error correction");
        assert_eq!(strip_list_marker("1.5 GHz"), "1.5 GHz");
        assert_eq!(strip_list_marker("12) Qubits"), "Qubits");
        assert_eq!(extract_query("1.5 GHz qubit control", "x"), "1.5 GHz qubit control");
    }

    #[test]
    fn truncates_to_max_areas_and_drops_duplicates() {
        let reply = r#"[{"name":"A"},{"name":"a"},{"name":"B"},{"name":"C"},{"name":"D"}]"#;
        let areas = parse_plan(reply, 2).unwrap();
        let names: Vec<_> = areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn unusable_reply_is_a_plan_error() {
        let err = parse_plan("I cannot help with that.", 5).unwrap_err();
        assert!(matches!(err, DelveError::Plan { .. }));
        assert!(err.to_string().contains("no research areas"));
    }

    #[test]
    fn render_plan_numbers_areas() {
        let areas = vec![
            ResearchArea::new("Hardware", "Qubits"),
            ResearchArea::new("Algorithms", ""),
        ];
        assert_eq!(
            render_plan(&areas),
            "Identified 2 research areas:\n1. Hardware: Qubits\n2. Algorithms"
        );
    }

    #[test]
    fn extract_query_cleans_reply() {
        assert_eq!(
            extract_query("Query: \"quantum error correction surface codes\"\nBecause...", "x"),
            "quantum error correction surface codes"
        );
        assert_eq!(extract_query("\n  1. topological qubits  ", "x"), "topological qubits");
        assert_eq!(extract_query("   \n\"\"", "Hardware"), "Hardware");
    }
}
