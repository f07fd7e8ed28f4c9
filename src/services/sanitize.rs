//! Heuristic detection and stripping of injection-looking input.
//!
//! This is a best-effort filter. It rejects obvious script blocks, URI
//! schemes, event-handler names, NoSQL operators and SQL keywords, but it
//! will flag honest text ("Drop Earrings") and miss obfuscated payloads.
//! It is not a security boundary.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde_json::Value;

const SCRIPT_BLOCK: &str = r"(?is)<script\b.*?</script\s*>";
const NOSQL_OPERATOR: &str = r"\$(?:gt|lt|ne|in|nin|or|and)";
const SQL_KEYWORD: &str = r"(?i)\b(?:select|insert|update|delete|drop|union|exec|eval)\b";

/// Ordered pattern table. Index positions match `SUSPICIOUS_SET`.
const PATTERNS: [(&str, &str); 9] = [
    ("script_block", SCRIPT_BLOCK),
    ("javascript_uri", r"(?i)javascript:"),
    ("data_uri", r"(?i)data:"),
    ("vbscript_uri", r"(?i)vbscript:"),
    ("onclick_handler", r"(?i)onclick"),
    ("onload_handler", r"(?i)onload"),
    ("onerror_handler", r"(?i)onerror"),
    ("nosql_operator", NOSQL_OPERATOR),
    ("sql_keyword", SQL_KEYWORD),
];

static SUSPICIOUS_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(PATTERNS.iter().map(|(_, pattern)| *pattern))
        .expect("suspicious pattern table must compile")
});

static NOSQL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(NOSQL_OPERATOR).expect("nosql pattern must compile"));

static STRIP_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(SCRIPT_BLOCK).expect("script pattern must compile"));
static STRIP_SQL: Lazy<Regex> =
    Lazy::new(|| Regex::new(SQL_KEYWORD).expect("sql pattern must compile"));
static STRIP_NOSQL: Lazy<Regex> =
    Lazy::new(|| Regex::new(NOSQL_OPERATOR).expect("nosql pattern must compile"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

/// Where in an input tree a suspicious pattern was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspiciousMatch {
    pub path: String,
    pub pattern: &'static str,
}

/// Returns true if any string (or object key) in `value` looks like an
/// injection attempt. Numbers, booleans and null never match.
pub fn contains_suspicious_patterns(value: &Value) -> bool {
    find_suspicious(value).is_some()
}

/// Walks `value` depth-first and reports the first suspicious leaf.
pub fn find_suspicious(value: &Value) -> Option<SuspiciousMatch> {
    walk(value, String::new())
}

fn walk(value: &Value, path: String) -> Option<SuspiciousMatch> {
    match value {
        Value::String(text) => match_text(text).map(|pattern| SuspiciousMatch { path, pattern }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(index, item)| walk(item, format!("{path}[{index}]"))),
        Value::Object(map) => map.iter().find_map(|(key, item)| {
            let child = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            if NOSQL_KEY.is_match(key) {
                return Some(SuspiciousMatch {
                    path: child,
                    pattern: "nosql_operator",
                });
            }
            walk(item, child)
        }),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

fn match_text(text: &str) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    SUSPICIOUS_SET
        .matches(text)
        .iter()
        .next()
        .map(|index| PATTERNS[index].0)
}

/// Deletes script blocks, SQL keywords and NoSQL operators, then collapses
/// whitespace and trims.
pub fn sanitize_input(input: &str) -> String {
    let stripped = STRIP_SCRIPT.replace_all(input, "");
    let stripped = STRIP_SQL.replace_all(&stripped, "");
    let stripped = STRIP_NOSQL.replace_all(&stripped, "");
    WHITESPACE_RUN
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// HTML entity escaping for text that ends up rendered by clients.
pub fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#x27;"),
            '/' => output.push_str("&#x2F;"),
            '\\' => output.push_str("&#x5C;"),
            '`' => output.push_str("&#96;"),
            _ => output.push(c),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_script_block_nested() {
        let body = json!({
            "title": "Phone",
            "details": { "notes": ["fine", "<SCRIPT>alert(1)</script>"] }
        });
        let found = find_suspicious(&body).unwrap();
        assert_eq!(found.pattern, "script_block");
        assert_eq!(found.path, "details.notes[1]");
    }

    #[test]
    fn test_detects_event_handler() {
        assert!(contains_suspicious_patterns(&json!({
            "description": "<img src=x OnError=steal()>"
        })));
        assert!(contains_suspicious_patterns(&json!("body onload=go()")));
    }

    #[test]
    fn test_detects_nosql_operator_in_value_and_key() {
        assert!(contains_suspicious_patterns(&json!({ "title": "$gt" })));
        assert!(contains_suspicious_patterns(&json!({ "price": { "$gt": 0 } })));
        assert!(contains_suspicious_patterns(&json!({ "filter": { "$or": [] } })));
    }

    #[test]
    fn test_detects_uri_schemes() {
        assert!(contains_suspicious_patterns(&json!("JavaScript:alert(1)")));
        assert!(contains_suspicious_patterns(&json!("vbscript:msgbox")));
        assert!(contains_suspicious_patterns(&json!("data:text/html;base64,xx")));
    }

    #[test]
    fn test_sql_keywords_match_whole_words_only() {
        assert!(contains_suspicious_patterns(&json!("1; DROP TABLE products")));
        assert!(contains_suspicious_patterns(&json!("Drop Earrings")));
        assert!(!contains_suspicious_patterns(&json!("Dropship ready")));
        assert!(!contains_suspicious_patterns(&json!("selection of teas")));
    }

    #[test]
    fn test_clean_inputs_never_match() {
        assert!(!contains_suspicious_patterns(&json!({})));
        assert!(!contains_suspicious_patterns(&json!({ "price": 10, "stock": 3 })));
        assert!(!contains_suspicious_patterns(&json!("")));
        assert!(!contains_suspicious_patterns(&json!(null)));
        assert!(!contains_suspicious_patterns(&json!({
            "title": "Phone",
            "description": "A phone",
            "category": "Electronics",
            "images": [{ "public_id": "p1", "url": "https://cdn.example.com/p1.png" }]
        })));
    }

    #[test]
    fn test_sanitize_strips_and_collapses() {
        assert_eq!(
            sanitize_input("  Nice <script>x()</script>  phone   "),
            "Nice phone"
        );
        assert_eq!(sanitize_input("union of $ne parts"), "of parts");
        assert_eq!(sanitize_input("Drop Earrings"), "Earrings");
    }

    #[test]
    fn test_sanitize_leaves_input_untouched() {
        let original = String::from("select this");
        let cleaned = sanitize_input(&original);
        assert_eq!(original, "select this");
        assert_eq!(cleaned, "this");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & 'c'"), "a &lt; b &amp; &#x27;c&#x27;");
    }
}
