//! JSON and CSV renderings of the log buffer.

use crate::error::Result;
use crate::model::LogEntry;

const CSV_HEADER: &str = "timestamp,level,category,message,workflowId,runId,duration";

/// Pretty-printed JSON array.
pub fn to_json(entries: &[LogEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Header row plus one fully quoted row per entry, newline separated.
pub fn to_csv(entries: &[LogEntry]) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for entry in entries {
        let duration = entry
            .duration_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        let fields = [
            entry.timestamp.as_str(),
            entry.level.as_str(),
            entry.category.as_str(),
            entry.message.as_str(),
            entry.workflow_id.as_deref().unwrap_or(""),
            entry.run_id.as_deref().unwrap_or(""),
            duration.as_str(),
        ];
        lines.push(
            fields
                .iter()
                .map(|field| quote(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_doubles_embedded_quotes() {
        assert_eq!(quote(r#"say "hi", then go"#), r#""say ""hi"", then go""#);
        assert_eq!(quote(""), r#""""#);
    }
}
