use crate::models::{BlockKind, ChangeSet, NotebookSnapshot};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|pre|blockquote|section)\s*>|<li[^>]*>")
        .expect("valid regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Visible text of a markup fragment, one trimmed non-empty line per entry.
pub fn html_to_lines(html: &str) -> Vec<String> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let with_breaks = LINE_BREAK_TAGS.replace_all(html, "\n");
    let text = ANY_TAG.replace_all(&with_breaks, "");
    decode_entities(&text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn str_field<'a>(payload: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "—".to_string(),
        Some(serde_json::Value::String(text)) if text.is_empty() => "—".to_string(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn summarize_table_row(row: &serde_json::Value, columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| format!("{}: {}", column, cell_text(row.get(column))))
        .collect::<Vec<_>>()
        .join("; ")
}

fn changed_ids(changes: &ChangeSet, kind: BlockKind) -> Vec<&String> {
    changes
        .payloads_by_kind
        .get(&kind)
        .map(|payloads| payloads.keys().collect())
        .unwrap_or_default()
}

/// Plain-text summary of a save, sent alongside the structured change set.
pub fn build_readable_report(changes: &ChangeSet, snapshot: &NotebookSnapshot, saved_at: DateTime<Utc>) -> String {
    let mut lines = vec![format!("Notebook Save @ {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"))];

    if changes.title.is_some() {
        lines.push(String::new());
        lines.push(format!("Title: {}", snapshot.title));
    }

    if changes.document_html.is_some() {
        lines.push(String::new());
        lines.push("Notes:".to_string());
        let notes = html_to_lines(&snapshot.document_html);
        if notes.is_empty() {
            lines.push("- (no note content)".to_string());
        }
        for (index, note) in notes.iter().enumerate() {
            lines.push(format!("{}. {}", index + 1, note));
        }
    }

    let sequence_ids = changed_ids(changes, BlockKind::Sequence);
    if !sequence_ids.is_empty() {
        lines.push(String::new());
        lines.push("Sequences:".to_string());
        for (index, id) in sequence_ids.into_iter().enumerate() {
            let Some(data) = snapshot.payloads_by_kind.sequence.get(id) else {
                lines.push(format!("{}. {}: (removed)", index + 1, id));
                continue;
            };
            let residues = str_field(data, "sequence").map(|sequence| sequence.len()).unwrap_or(0);
            lines.push(format!(
                "{}. {} — {} residues (last saved {})",
                index + 1,
                str_field(data, "name").unwrap_or(id),
                residues,
                str_field(data, "savedAt").unwrap_or("unknown")
            ));
        }
    }

    let protein_ids = changed_ids(changes, BlockKind::Protein);
    if !protein_ids.is_empty() {
        lines.push(String::new());
        lines.push("Protein Structures:".to_string());
        for (index, id) in protein_ids.into_iter().enumerate() {
            let source = snapshot
                .payloads_by_kind
                .protein
                .get(id)
                .and_then(|data| data.get("metadata"))
                .and_then(|metadata| str_field(metadata, "source"));
            lines.push(format!("{}. {}: {}", index + 1, id, source.unwrap_or("updated")));
        }
    }

    let table_ids = changed_ids(changes, BlockKind::Table);
    if !table_ids.is_empty() {
        lines.push(String::new());
        lines.push("Tables:".to_string());
        for (index, id) in table_ids.into_iter().enumerate() {
            let Some(data) = snapshot.payloads_by_kind.table.get(id) else {
                lines.push(format!("{}. {}: (removed)", index + 1, id));
                continue;
            };
            lines.push(format!("{}. {}:", index + 1, id));
            let columns = data
                .get("columns")
                .and_then(|value| value.as_array())
                .map(|columns| {
                    columns
                        .iter()
                        .filter_map(|column| column.as_str().map(ToString::to_string))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let rows = data
                .get("rows")
                .and_then(|value| value.as_array())
                .cloned()
                .unwrap_or_default();
            if rows.is_empty() {
                lines.push("   - (no rows)".to_string());
            }
            for (row_index, row) in rows.iter().enumerate() {
                let label = row
                    .get("id")
                    .map(|value| cell_text(Some(value)))
                    .unwrap_or_else(|| (row_index + 1).to_string());
                lines.push(format!("   - Row {}: {}", label, summarize_table_row(row, &columns)));
            }
        }
    }

    let protocol_ids = changed_ids(changes, BlockKind::Protocol);
    if !protocol_ids.is_empty() {
        lines.push(String::new());
        lines.push("Protocols:".to_string());
        for (index, id) in protocol_ids.into_iter().enumerate() {
            let Some(data) = snapshot.payloads_by_kind.protocol.get(id) else {
                lines.push(format!("{}. {}: (removed)", index + 1, id));
                continue;
            };
            lines.push(format!(
                "{}. {} — {}",
                index + 1,
                str_field(data, "title").unwrap_or(id),
                str_field(data, "description").unwrap_or("No overview provided")
            ));
            let steps = data.get("steps").and_then(|value| value.as_array());
            for (step_index, step) in steps.into_iter().flatten().enumerate() {
                if let Some(step) = step.as_str().map(str::trim).filter(|step| !step.is_empty()) {
                    lines.push(format!("   Step {}: {}", step_index + 1, step));
                }
            }
            if let Some(notes) = str_field(data, "notes") {
                lines.push(format!("   Notes: {}", notes));
            }
        }
    }

    if !changes.placements_by_kind.is_empty() {
        lines.push(String::new());
        lines.push("Layout Updates:".to_string());
        for kind in changes.placements_by_kind.keys() {
            lines.push(format!("- {} blocks changed.", kind.label()));
        }
    }

    if lines.len() == 1 {
        lines.push(String::new());
        lines.push("No detectable changes.".to_string());
    }

    lines.join("\n")
}
