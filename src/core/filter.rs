// logsmith - core/filter.rs
//
// Search matcher for log entries.
// The level filter and the search query are AND-combined.
// Core layer: pure logic, no I/O.

use crate::core::model::{EntryFormat, LogEntry};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A parsed search query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchQuery {
    /// No query: every entry matches.
    #[default]
    Any,
    /// Free-text substring search.
    Text { needle: String, case_sensitive: bool },
    /// `key:value` search against entry fields.
    Field { key: String, value: String },
}

impl SearchQuery {
    /// Parse user input.
    ///
    /// `key:value` is a field query when `key` looks like an identifier and
    /// the value is non-empty (so `https://...` and `12:30` stay free text).
    pub fn parse(input: &str, case_sensitive: bool) -> Self {
        static FIELD_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = FIELD_RE.get_or_init(|| {
            regex::Regex::new(r"^(?P<key>[A-Za-z_][A-Za-z0-9_.\-]*):(?P<value>.+)$")
                .expect("field query regex")
        });

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::Any;
        }
        if let Some(caps) = re.captures(trimmed) {
            let value = caps["value"].trim();
            if !value.is_empty() && !caps["value"].starts_with("//") {
                return Self::Field {
                    key: caps["key"].to_string(),
                    value: value.to_string(),
                };
            }
        }
        Self::Text {
            needle: trimmed.to_string(),
            case_sensitive,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// Level filter plus query. All active parts are AND-combined.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Exact level to keep (case-insensitive). `None` = all levels.
    pub level: Option<String>,
    pub query: SearchQuery,
}

impl EntryFilter {
    pub fn new(query: SearchQuery, level: Option<&str>) -> Self {
        Self {
            level: level
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_lowercase),
            query,
        }
    }

    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.query.is_any()
    }

    /// Whether `entry` passes the level filter and the query.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = &self.level {
            if !entry.level.eq_ignore_ascii_case(level) {
                return false;
            }
        }
        match &self.query {
            SearchQuery::Any => true,
            SearchQuery::Text {
                needle,
                case_sensitive,
            } => {
                let needle = Needle::new(needle, *case_sensitive);
                match entry.format {
                    EntryFormat::Legacy | EntryFormat::Plain => needle.found_in(&entry.raw),
                    EntryFormat::Record => record_contains(entry, &needle),
                }
            }
            SearchQuery::Field { key, value } => field_matches(entry, key, value),
        }
    }
}

struct Needle {
    text: String,
    case_sensitive: bool,
}

impl Needle {
    fn new(text: &str, case_sensitive: bool) -> Self {
        Self {
            text: if case_sensitive {
                text.to_string()
            } else {
                text.to_lowercase()
            },
            case_sensitive,
        }
    }

    fn found_in(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.text)
        } else {
            haystack.to_lowercase().contains(&self.text)
        }
    }

    fn found_in_value(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.found_in(s),
            Value::Number(n) => self.found_in(&n.to_string()),
            Value::Array(items) => items.iter().any(|v| self.found_in_value(v)),
            Value::Object(map) => map.values().any(|v| self.found_in_value(v)),
            Value::Bool(_) | Value::Null => false,
        }
    }
}

fn record_contains(entry: &LogEntry, needle: &Needle) -> bool {
    needle.found_in(&entry.level)
        || needle.found_in_value(&entry.message)
        || entry
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.values().any(|v| needle.found_in_value(v)))
        || entry.extra.values().any(|v| needle.found_in_value(v))
}

fn field_matches(entry: &LogEntry, key: &str, value: &str) -> bool {
    let wanted = value.to_lowercase();
    let key_lower = key.to_lowercase();

    match key_lower.as_str() {
        "level" => return entry.level.to_lowercase().contains(&wanted),
        "message" if !entry.message.is_object() => {
            return entry.message_text().to_lowercase().contains(&wanted)
        }
        "timestamp" | "datetime" => {
            return entry.timestamp.to_rfc3339().to_lowercase().contains(&wanted)
        }
        _ => {}
    }

    let in_message = match &entry.message {
        Value::Object(map) => object_has(map, &key_lower, &wanted),
        _ => false,
    };
    in_message
        || entry
            .context
            .as_ref()
            .is_some_and(|ctx| object_has(ctx, &key_lower, &wanted))
        || object_has(&entry.extra, &key_lower, &wanted)
}

/// Recursive search for `key` (lower-cased) whose value matches `wanted`.
fn object_has(map: &Map<String, Value>, key: &str, wanted: &str) -> bool {
    map.iter().any(|(k, v)| {
        (k.to_lowercase() == key && scalar_matches(v, wanted)) || value_has(v, key, wanted)
    })
}

fn value_has(value: &Value, key: &str, wanted: &str) -> bool {
    match value {
        Value::Object(map) => object_has(map, key, wanted),
        Value::Array(items) => items.iter().any(|v| value_has(v, key, wanted)),
        _ => false,
    }
}

fn scalar_matches(value: &Value, wanted: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(wanted),
        Value::Number(n) => match (n.as_f64(), wanted.parse::<f64>()) {
            (Some(have), Ok(want)) => have == want,
            _ => n.to_string() == wanted,
        },
        Value::Bool(b) => wanted.parse::<bool>().is_ok_and(|w| w == *b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(level: &str, message: Value, context: Option<Value>) -> LogEntry {
        LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 22).unwrap(),
            level: level.to_string(),
            message,
            context: context.and_then(|c| c.as_object().cloned()),
            extra: Map::new(),
            format: EntryFormat::Record,
            raw: String::new(),
        }
    }

    fn legacy(level: &str, raw: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            level: level.to_string(),
            message: Value::String(raw.to_string()),
            context: None,
            extra: Map::new(),
            format: EntryFormat::Legacy,
            raw: format!("[01/01/2024 10:00] {raw}"),
        }
    }

    #[test]
    fn test_parse_query_kinds() {
        assert_eq!(SearchQuery::parse("   ", false), SearchQuery::Any);
        assert_eq!(
            SearchQuery::parse("level:error", false),
            SearchQuery::Field {
                key: "level".into(),
                value: "error".into()
            }
        );
        assert!(matches!(
            SearchQuery::parse("https://example.com", false),
            SearchQuery::Text { .. }
        ));
        assert!(matches!(
            SearchQuery::parse("12:30", false),
            SearchQuery::Text { .. }
        ));
        assert!(matches!(
            SearchQuery::parse("user:", false),
            SearchQuery::Text { .. }
        ));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = EntryFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&legacy("info", "anything")));
    }

    #[test]
    fn test_level_filter_is_exact_and_case_insensitive() {
        let filter = EntryFilter::new(SearchQuery::Any, Some("ERROR"));
        assert!(filter.matches(&record("error", json!("x"), None)));
        assert!(!filter.matches(&record("errors", json!("x"), None)));
        assert!(!filter.matches(&record("warning", json!("x"), None)));
    }

    #[test]
    fn test_field_query_and_conflicting_level_filter_match_nothing() {
        let filter = EntryFilter::new(SearchQuery::parse("level:error", false), Some("warning"));
        for entry in [
            record("error", json!("a"), None),
            record("warning", json!("b"), None),
            legacy("error", "PHP Fatal error: x"),
        ] {
            assert!(!filter.matches(&entry));
        }
    }

    #[test]
    fn test_text_search_legacy_uses_raw_block() {
        let entry = legacy("error", "PHP Fatal error: X\n#0 foo()");
        assert!(EntryFilter::new(SearchQuery::parse("FOO()", false), None).matches(&entry));
        assert!(!EntryFilter::new(SearchQuery::parse("FOO()", true), None).matches(&entry));
        // The bracket stamp is part of the raw block.
        assert!(EntryFilter::new(SearchQuery::parse("01/01/2024", false), None).matches(&entry));
    }

    #[test]
    fn test_text_search_record_recurses_into_values() {
        let entry = record(
            "info",
            json!("login"),
            Some(json!({"user": {"name": "Alice", "id": 42}})),
        );
        let find = |q: &str| EntryFilter::new(SearchQuery::parse(q, false), None).matches(&entry);
        assert!(find("alice"));
        assert!(find("42"));
        assert!(find("LOGIN"));
        // Keys are not searched by free text.
        assert!(!find("name"));
    }

    #[test]
    fn test_field_query_searches_nested_keys() {
        let entry = record(
            "info",
            json!("checkout"),
            Some(json!({"order": {"Customer": "Bob Smith", "total": 19.5, "paid": true}})),
        );
        let find = |q: &str| EntryFilter::new(SearchQuery::parse(q, false), None).matches(&entry);
        assert!(find("customer:bob"));
        assert!(find("total:19.5"));
        assert!(find("paid:true"));
        assert!(!find("paid:false"));
        assert!(!find("total:19"));
        assert!(find("message:check"));
        assert!(!find("missing:x"));
    }

    #[test]
    fn test_field_query_on_structured_message_payload() {
        let entry = record("info", json!({"event": "signup", "plan": "pro"}), None);
        let find = |q: &str| EntryFilter::new(SearchQuery::parse(q, false), None).matches(&entry);
        assert!(find("event:signup"));
        assert!(find("plan:PRO"));
    }

    #[test]
    fn test_field_query_timestamp_virtual_field() {
        let entry = record("info", json!("m"), None);
        assert!(EntryFilter::new(SearchQuery::parse("timestamp:2024-01-15", false), None)
            .matches(&entry));
        assert!(EntryFilter::new(SearchQuery::parse("datetime:14:30", false), None)
            .matches(&entry));
    }
}
