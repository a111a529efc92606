//! Rendering of remote results into observation text.

use serde_json::{Map, Value};

/// Keep only `fields` of a JSON object.
///
/// Missing fields are rendered as `null` so the model sees that they
/// exist but are empty.
pub fn pick(value: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for field in fields {
        out.insert(
            (*field).to_string(),
            value.get(*field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

/// Compact one-line JSON.
pub fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// `1. first\n2. second`, or `empty` when there are no items.
pub fn numbered<I, S>(items: I, empty: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let lines: Vec<String> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

/// Human readable byte size: `512 B`, `1.50 KB`, `3.25 GB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_drops_extras_and_fills_nulls() {
        let ticket = json!({"priority": 1, "id": 7, "subject": "Printer", "extra": true});
        let picked = pick(&ticket, &["id", "subject", "status"]);
        assert_eq!(picked, json!({"id": 7, "subject": "Printer", "status": null}));
        assert!(!compact(&picked).contains('\n'));
    }

    #[test]
    fn numbered_lists() {
        assert_eq!(numbered(["a", "b"], "none"), "1. a\n2. b");
        assert_eq!(numbered(Vec::<String>::new(), "none"), "none");
    }

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "3.50 GB");
        assert_eq!(human_size(4096 * 1024 * 1024 * 1024), "4096.00 GB");
    }
}
