//! Declarative field rules over untyped JSON input.
//!
//! A [`RuleSet`] is a list of per-field chains. Each chain mixes checks and
//! sanitizers and runs in declaration order against the named leaf of the
//! input tree; sanitized values are written back so later stages see them.
//! Violations from every field are collected before the caller decides
//! anything.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use validator::{ValidateUrl, ValidationErrors};

use crate::services::sanitize::{escape_html, sanitize_input};

static OBJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern must compile"));
static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:https?|ftp)://").expect("url scheme pattern must compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Body,
    Query,
    Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
    pub location: Location,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>, location: Location) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            location,
        }
    }
}

/// Flattens derive-level validation errors, sorted by field for stable output.
pub fn violations_from(errors: &ValidationErrors) -> Vec<Violation> {
    let mut violations: Vec<Violation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            field_errors
                .iter()
                .map(|error| {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {field}"));
                    Violation::new(field.to_string(), message, Location::Body)
                })
                .collect::<Vec<_>>()
        })
        .collect();
    violations.sort_by(|a, b| a.field.cmp(&b.field));

    if violations.is_empty() && !errors.errors().is_empty() {
        violations.push(Violation::new("body", errors.to_string(), Location::Body));
    }
    violations
}

#[derive(Debug, Clone)]
pub enum Check {
    NotEmpty,
    MaxLength(usize),
    MinLength(usize),
    Float { min: Option<f64>, max: Option<f64> },
    Int { min: Option<i64>, max: Option<i64> },
    OneOf(&'static [&'static str]),
    Url,
    ObjectId,
    IsArray,
    Matches(&'static Lazy<Regex>),
}

#[derive(Debug, Clone, Copy)]
pub enum Sanitizer {
    Trim,
    StripSuspicious,
    Escape,
    /// Numeric strings become JSON numbers, the way the store would cast them.
    ToNumber,
}

#[derive(Debug, Clone)]
enum Step {
    Check(Check, &'static str),
    Sanitize(Sanitizer),
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    field: &'static str,
    location: Location,
    optional: bool,
    steps: Vec<Step>,
}

impl FieldRule {
    pub fn new(field: &'static str, location: Location) -> Self {
        Self {
            field,
            location,
            optional: false,
            steps: Vec::new(),
        }
    }

    pub fn body(field: &'static str) -> Self {
        Self::new(field, Location::Body)
    }

    pub fn query(field: &'static str) -> Self {
        Self::new(field, Location::Query)
    }

    pub fn param(field: &'static str) -> Self {
        Self::new(field, Location::Params)
    }

    /// Skip the whole chain when the field is absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn check(mut self, check: Check, message: &'static str) -> Self {
        self.steps.push(Step::Check(check, message));
        self
    }

    pub fn sanitize(mut self, sanitizer: Sanitizer) -> Self {
        self.steps.push(Step::Sanitize(sanitizer));
        self
    }

    pub fn trim(self) -> Self {
        self.sanitize(Sanitizer::Trim)
    }

    pub fn not_empty(self, message: &'static str) -> Self {
        self.check(Check::NotEmpty, message)
    }

    pub fn max_length(self, max: usize, message: &'static str) -> Self {
        self.check(Check::MaxLength(max), message)
    }

    pub fn min_length(self, min: usize, message: &'static str) -> Self {
        self.check(Check::MinLength(min), message)
    }

    pub fn float(self, min: Option<f64>, max: Option<f64>, message: &'static str) -> Self {
        self.check(Check::Float { min, max }, message)
    }

    pub fn int(self, min: Option<i64>, max: Option<i64>, message: &'static str) -> Self {
        self.check(Check::Int { min, max }, message)
    }

    pub fn one_of(self, allowed: &'static [&'static str], message: &'static str) -> Self {
        self.check(Check::OneOf(allowed), message)
    }

    pub fn url(self, message: &'static str) -> Self {
        self.check(Check::Url, message)
    }

    pub fn object_id(self, message: &'static str) -> Self {
        self.check(Check::ObjectId, message)
    }

    pub fn is_array(self, message: &'static str) -> Self {
        self.check(Check::IsArray, message)
    }

    pub fn matches(self, pattern: &'static Lazy<Regex>, message: &'static str) -> Self {
        self.check(Check::Matches(pattern), message)
    }

    fn run(&self, path: String, slot: Option<&mut Value>, out: &mut Vec<Violation>) {
        let Some(value) = slot else {
            if self.optional {
                return;
            }
            // A missing value fails its first check and nothing after it.
            if let Some(message) = self.steps.iter().find_map(|step| match step {
                Step::Check(_, message) => Some(*message),
                Step::Sanitize(_) => None,
            }) {
                out.push(Violation::new(path, message, self.location));
            }
            return;
        };

        for step in &self.steps {
            match step {
                Step::Sanitize(sanitizer) => apply_sanitizer(*sanitizer, value),
                Step::Check(check, message) => {
                    if !passes(check, value) {
                        out.push(Violation::new(path.clone(), *message, self.location));
                        if matches!(check, Check::NotEmpty) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Rules for a field of every element of an array field, evaluated only when
/// the array is present.
#[derive(Debug, Clone)]
pub struct EachRule {
    array: &'static str,
    rule: FieldRule,
}

impl EachRule {
    pub fn new(array: &'static str, rule: FieldRule) -> Self {
        Self { array, rule }
    }

    fn run(&self, input: &mut Map<String, Value>, out: &mut Vec<Violation>) {
        let Some(Value::Array(items)) = input.get_mut(self.array) else {
            return;
        };
        for (index, item) in items.iter_mut().enumerate() {
            let path = format!("{}[{}].{}", self.array, index, self.rule.field);
            let slot = item.as_object_mut().and_then(|map| map.get_mut(self.rule.field));
            self.rule.run(path, slot, out);
        }
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    Field(FieldRule),
    Each(EachRule),
}

impl From<FieldRule> for Rule {
    fn from(value: FieldRule) -> Self {
        Rule::Field(value)
    }
}

impl From<EachRule> for Rule {
    fn from(value: EachRule) -> Self {
        Rule::Each(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// Evaluates every rule against `input`, sanitizing it in place.
    ///
    /// Non-object input is treated as an empty object, so required fields
    /// report as missing.
    pub fn run(&self, input: &mut Value) -> Vec<Violation> {
        let mut scratch = Map::new();
        let map = match input.as_object_mut() {
            Some(map) => map,
            None => &mut scratch,
        };

        let mut violations = Vec::new();
        for rule in &self.rules {
            match rule {
                Rule::Field(field) => {
                    field.run(field.field.to_string(), map.get_mut(field.field), &mut violations)
                }
                Rule::Each(each) => each.run(map, &mut violations),
            }
        }
        violations
    }
}

fn apply_sanitizer(sanitizer: Sanitizer, value: &mut Value) {
    if let Value::Array(items) = value {
        items.iter_mut().for_each(|item| apply_sanitizer(sanitizer, item));
        return;
    }
    let replacement = match (sanitizer, &*value) {
        (Sanitizer::Trim, Value::String(text)) => Some(Value::String(text.trim().to_string())),
        (Sanitizer::Trim, Value::Number(number)) => Some(Value::String(number.to_string())),
        (Sanitizer::Trim, Value::Bool(flag)) => Some(Value::String(flag.to_string())),
        (Sanitizer::StripSuspicious, Value::String(text)) => {
            Some(Value::String(sanitize_input(text)))
        }
        (Sanitizer::Escape, Value::String(text)) => Some(Value::String(escape_html(text))),
        (Sanitizer::ToNumber, Value::String(text)) => to_number(text.trim()),
        _ => None,
    };
    if let Some(replacement) = replacement {
        *value = replacement;
    }
}

fn to_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map(Value::from)
}

fn passes(check: &Check, value: &Value) -> bool {
    match (check, value) {
        (Check::IsArray, value) => value.is_array(),
        (Check::NotEmpty, Value::Array(items)) => !items.is_empty(),
        (Check::NotEmpty, Value::Object(map)) => !map.is_empty(),
        (Check::NotEmpty, value) => text_of(value).is_some_and(|text| !text.trim().is_empty()),
        (check, Value::Array(items)) => items.iter().all(|item| passes(check, item)),
        (check, value) => passes_scalar(check, value),
    }
}

fn passes_scalar(check: &Check, value: &Value) -> bool {
    match check {
        Check::MaxLength(max) => text_of(value).is_some_and(|text| text.chars().count() <= *max),
        Check::MinLength(min) => text_of(value).is_some_and(|text| text.chars().count() >= *min),
        Check::Float { min, max } => as_float(value).is_some_and(|number| {
            min.map_or(true, |min| number >= min) && max.map_or(true, |max| number <= max)
        }),
        Check::Int { min, max } => as_int(value).is_some_and(|number| {
            min.map_or(true, |min| number >= min) && max.map_or(true, |max| number <= max)
        }),
        Check::OneOf(allowed) => text_of(value).is_some_and(|text| allowed.contains(&text.as_str())),
        Check::Url => text_of(value)
            .is_some_and(|text| URL_SCHEME.is_match(&text) && text.validate_url()),
        Check::ObjectId => text_of(value).is_some_and(|text| OBJECT_ID.is_match(&text)),
        Check::Matches(pattern) => text_of(value).is_some_and(|text| pattern.is_match(&text)),
        Check::NotEmpty | Check::IsArray => true,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+$").unwrap());

    #[test]
    fn test_violations_accumulate_in_declaration_order() {
        let rules = RuleSet::new()
            .rule(FieldRule::body("name").trim().not_empty("name required"))
            .rule(FieldRule::body("age").int(Some(0), None, "age must be >= 0"))
            .rule(FieldRule::body("tag").optional().one_of(&["a", "b"], "bad tag"));

        let mut input = json!({ "age": -3, "tag": "c" });
        let violations = rules.run(&mut input);

        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "age", "tag"]);
        assert_eq!(violations[0].message, "name required");
    }

    #[test]
    fn test_missing_value_reports_first_check_only() {
        let rules = RuleSet::new().rule(
            FieldRule::body("price")
                .not_empty("Price is required")
                .float(Some(0.0), None, "Price must be a positive number"),
        );
        let violations = rules.run(&mut json!({}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "Price is required");
    }

    #[test]
    fn test_sanitizers_write_back() {
        let rules = RuleSet::new().rule(
            FieldRule::body("title")
                .trim()
                .sanitize(Sanitizer::StripSuspicious)
                .sanitize(Sanitizer::Escape),
        );
        let mut input = json!({ "title": "  fish & <script>x</script> chips " });
        assert!(rules.run(&mut input).is_empty());
        assert_eq!(input["title"], json!("fish &amp; chips"));
    }

    #[test]
    fn test_numeric_checks_accept_numbers_and_numeric_strings() {
        let rules = RuleSet::new()
            .rule(FieldRule::query("page").int(Some(1), None, "bad page"))
            .rule(FieldRule::body("price").float(Some(0.0), None, "bad price"));

        assert!(rules.run(&mut json!({ "page": "2", "price": 9.5 })).is_empty());
        assert!(rules.run(&mut json!({ "page": 3, "price": "0" })).is_empty());
        assert_eq!(rules.run(&mut json!({ "page": "0", "price": -1 })).len(), 2);
        assert_eq!(rules.run(&mut json!({ "page": "1.5", "price": true })).len(), 2);
    }

    #[test]
    fn test_array_values_are_checked_per_element() {
        let rules = RuleSet::new().rule(FieldRule::query("category").one_of(&["a", "b"], "bad"));
        assert!(rules.run(&mut json!({ "category": ["a", "b"] })).is_empty());
        assert_eq!(rules.run(&mut json!({ "category": ["a", "z"] })).len(), 1);
    }

    #[test]
    fn test_each_rule_only_runs_when_array_present() {
        let rules = RuleSet::new()
            .rule(FieldRule::body("images").optional().is_array("must be array"))
            .rule(EachRule::new("images", FieldRule::body("url").not_empty("url required").url("bad url")));

        assert!(rules.run(&mut json!({})).is_empty());

        let violations = rules.run(&mut json!({
            "images": [{ "url": "https://cdn.example.com/a.png" }, { "url": "nope" }, {}]
        }));
        assert_eq!(
            violations,
            vec![
                Violation::new("images[1].url", "bad url", Location::Body),
                Violation::new("images[2].url", "url required", Location::Body),
            ]
        );
    }

    #[test]
    fn test_object_id_and_pattern_checks() {
        let rules = RuleSet::new()
            .rule(FieldRule::param("id").object_id("bad id"))
            .rule(FieldRule::body("slug").optional().matches(&LETTERS, "bad slug"));

        assert!(rules.run(&mut json!({ "id": "507f1f77bcf86cd799439011" })).is_empty());
        assert_eq!(rules.run(&mut json!({ "id": "507f1f77" })).len(), 1);
        assert_eq!(rules.run(&mut json!({ "id": "507f1f77bcf86cd799439011", "slug": "A1" })).len(), 1);
    }

    #[test]
    fn test_non_object_input_reports_required_fields() {
        let rules = RuleSet::new().rule(FieldRule::body("title").not_empty("title required"));
        let violations = rules.run(&mut json!(["not", "an", "object"]));
        assert_eq!(violations.len(), 1);
    }
}
