//! Tool arguments and typed access to them.
//!
//! [`ToolArgs`] is the JSON object handed over by the tool layer. [`ArgReader`] reads it on
//! behalf of one operation: every accessor normalizes its value and reports failures as
//! `InvalidArgument` naming the field, and [`ArgReader::finish`] rejects anything left unread.
//! `null` is treated as absent.

use super::dates::parse_date;
use crate::{GatewayError, Operation};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Arguments of one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a JSON object; `null` means no arguments.
    pub fn from_value(operation: Operation, value: Value) -> Result<Self, GatewayError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(GatewayError::invalid(
                operation,
                "arguments",
                format!("expected a JSON object, got {}", json_type(&other)),
            )),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Value::is_null)
    }

    fn present_keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, v)| !v.is_null()).map(|(k, _)| k.as_str())
    }
}

impl From<Map<String, Value>> for ToolArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validating reader over [`ToolArgs`] for one operation.
#[derive(Debug)]
pub struct ArgReader<'a> {
    operation: Operation,
    args: &'a ToolArgs,
    seen: BTreeSet<String>,
}

impl<'a> ArgReader<'a> {
    pub fn new(operation: Operation, args: &'a ToolArgs) -> Self {
        Self { operation, args, seen: BTreeSet::new() }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn invalid(&self, field: &str, reason: impl Into<String>) -> GatewayError {
        GatewayError::invalid(self.operation, field, reason)
    }

    /// Whether `name` was supplied with a non-null value. Does not mark it read.
    pub fn has(&self, name: &str) -> bool {
        self.args.get(name).is_some()
    }

    /// Raw value under `name` or one of its aliases. Supplying two spellings is an error.
    pub fn raw(&mut self, name: &str, aliases: &[&str]) -> Result<Option<(String, &'a Value)>, GatewayError> {
        let mut found: Option<(String, &'a Value)> = None;
        for key in std::iter::once(name).chain(aliases.iter().copied()) {
            self.seen.insert(key.to_string());
            if let Some(value) = self.args.get(key) {
                if let Some((first, _)) = &found {
                    return Err(self.invalid(key, format!("conflicts with `{}`", first)));
                }
                found = Some((key.to_string(), value));
            }
        }
        Ok(found)
    }

    /// Free text with whitespace collapsed; empty text is rejected.
    pub fn text(&mut self, name: &str) -> Result<Option<String>, GatewayError> {
        self.text_aliased(name, &[])
    }

    pub fn text_aliased(&mut self, name: &str, aliases: &[&str]) -> Result<Option<String>, GatewayError> {
        let Some((field, value)) = self.raw(name, aliases)? else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(self.invalid(&field, format!("expected a string, got {}", json_type(value))));
        };
        let text = collapse_whitespace(raw);
        if text.is_empty() {
            return Err(self.invalid(&field, "must not be empty"));
        }
        Ok(Some(text))
    }

    pub fn required_text(&mut self, name: &str) -> Result<String, GatewayError> {
        self.text(name)?.ok_or_else(|| self.invalid(name, "is required"))
    }

    /// Boolean, also accepting the strings `"true"` and `"false"`.
    pub fn flag(&mut self, name: &str) -> Result<Option<bool>, GatewayError> {
        let Some((field, value)) = self.raw(name, &[])? else {
            return Ok(None);
        };
        match value {
            Value::Bool(b) => Ok(Some(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.invalid(&field, format!("`{}` is not a boolean", s))),
            },
            other => Err(self.invalid(&field, format!("expected a boolean, got {}", json_type(other)))),
        }
    }

    /// Non-negative integer, also accepting numeric strings.
    pub fn count(&mut self, name: &str) -> Result<Option<u64>, GatewayError> {
        let Some((field, value)) = self.raw(name, &[])? else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(&field, format!("expected a non-negative integer, got {}", value)))
    }

    /// Array of strings or a comma-separated string. Blank entries are dropped; an empty list
    /// is rejected.
    pub fn list(&mut self, name: &str) -> Result<Option<Vec<String>>, GatewayError> {
        let Some((field, value)) = self.raw(name, &[])? else {
            return Ok(None);
        };
        let items: Vec<String> = match value {
            Value::String(s) => s.split(',').map(collapse_whitespace).collect(),
            Value::Array(values) => {
                let mut items = Vec::with_capacity(values.len());
                for item in values {
                    match item {
                        Value::String(s) => items.push(collapse_whitespace(s)),
                        other => {
                            return Err(self.invalid(
                                &field,
                                format!("list entries must be strings, got {}", json_type(other)),
                            ))
                        }
                    }
                }
                items
            }
            other => {
                return Err(self.invalid(&field, format!("expected a list, got {}", json_type(other))))
            }
        };
        let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
        if items.is_empty() {
            return Err(self.invalid(&field, "must contain at least one entry"));
        }
        Ok(Some(items))
    }

    pub fn date(&mut self, name: &str, aliases: &[&str]) -> Result<Option<(String, NaiveDate)>, GatewayError> {
        let Some((field, value)) = self.raw(name, aliases)? else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(self.invalid(&field, format!("expected a date string, got {}", json_type(value))));
        };
        let date = parse_date(raw).map_err(|reason| self.invalid(&field, reason))?;
        Ok(Some((field, date)))
    }

    /// One of `allowed`, matched case-insensitively and returned in canonical spelling.
    pub fn choice(&mut self, name: &str, allowed: &'static [&'static str]) -> Result<Option<&'static str>, GatewayError> {
        let Some(raw) = self.text(name)? else {
            return Ok(None);
        };
        match_choice(&raw, allowed).map(Some).ok_or_else(|| self.unknown_value(name, &raw, allowed))
    }

    /// Comma-separated or array form of [`choice`](Self::choice), joined with commas.
    pub fn choices(&mut self, name: &str, allowed: &'static [&'static str]) -> Result<Option<String>, GatewayError> {
        let Some(items) = self.list(name)? else {
            return Ok(None);
        };
        let mut canonical = Vec::with_capacity(items.len());
        for item in &items {
            let value = match_choice(item, allowed).ok_or_else(|| self.unknown_value(name, item, allowed))?;
            if !canonical.contains(&value) {
                canonical.push(value);
            }
        }
        Ok(Some(canonical.join(",")))
    }

    /// `pageSize`: defaults to `default`, clamped to `max`, zero rejected.
    pub fn page_size(&mut self, default: u32, max: u32) -> Result<u32, GatewayError> {
        match self.count("pageSize")? {
            None => Ok(default.min(max)),
            Some(0) => Err(self.invalid("pageSize", "must be at least 1")),
            Some(n) => Ok(n.min(u64::from(max)) as u32),
        }
    }

    /// First supplied argument no accessor has asked about yet.
    pub fn unread(&self) -> Option<String> {
        self.args.present_keys().find(|key| !self.seen.contains(*key)).map(str::to_string)
    }

    /// Reject every supplied argument no accessor asked about.
    pub fn finish(self) -> Result<(), GatewayError> {
        match self.unread() {
            Some(key) => Err(self.invalid(&key, "unknown argument for this operation")),
            None => Ok(()),
        }
    }

    fn unknown_value(&self, name: &str, raw: &str, allowed: &[&str]) -> GatewayError {
        self.invalid(name, format!("`{}` is not one of {}", raw, allowed.join(", ")))
    }
}

fn match_choice(raw: &str, allowed: &'static [&'static str]) -> Option<&'static str> {
    let wanted = raw.trim().replace([' ', '-'], "_");
    allowed.iter().copied().find(|candidate| candidate.eq_ignore_ascii_case(&wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OP: Operation = Operation::SearchStudies;

    fn args(value: Value) -> ToolArgs {
        ToolArgs::from_value(OP, value).unwrap()
    }

    #[test]
    fn null_and_non_objects() {
        assert!(ToolArgs::from_value(OP, Value::Null).unwrap().is_empty());
        let err = ToolArgs::from_value(OP, json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn text_collapses_whitespace_and_rejects_blank() {
        let args = args(json!({"query": "  heart \n failure  ", "condition": "   "}));
        let mut reader = ArgReader::new(OP, &args);
        assert_eq!(reader.text("query").unwrap().as_deref(), Some("heart failure"));
        let err = reader.text("condition").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { ref field, .. } if field == "condition"));
    }

    #[test]
    fn aliases_conflict_when_both_given() {
        let args = args(json!({"startDateFrom": "2020-01-01", "start": "2021-01-01"}));
        let mut reader = ArgReader::new(OP, &args);
        assert!(reader.date("startDateFrom", &["start"]).is_err());
    }

    #[test]
    fn null_is_absent() {
        let args = args(json!({"condition": null}));
        let mut reader = ArgReader::new(OP, &args);
        assert_eq!(reader.text("condition").unwrap(), None);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn choices_normalize_case_and_dedupe() {
        let args = args(json!({"phase": "phase2, Phase3,PHASE2", "sex": "female"}));
        let mut reader = ArgReader::new(OP, &args);
        assert_eq!(
            reader.choices("phase", &["PHASE1", "PHASE2", "PHASE3"]).unwrap().as_deref(),
            Some("PHASE2,PHASE3")
        );
        assert_eq!(reader.choice("sex", &["ALL", "FEMALE", "MALE"]).unwrap(), Some("FEMALE"));
    }

    #[test]
    fn unknown_choice_lists_allowed_values() {
        let args = args(json!({"sex": "other"}));
        let mut reader = ArgReader::new(OP, &args);
        let err = reader.choice("sex", &["ALL", "FEMALE", "MALE"]).unwrap_err();
        assert!(err.to_string().contains("ALL, FEMALE, MALE"));
    }

    #[test]
    fn page_size_defaults_clamps_and_rejects_zero() {
        let empty = ToolArgs::new();
        assert_eq!(ArgReader::new(OP, &empty).page_size(100, 1000).unwrap(), 100);

        let big = args(json!({"pageSize": 5000}));
        assert_eq!(ArgReader::new(OP, &big).page_size(100, 1000).unwrap(), 1000);

        let zero = args(json!({"pageSize": 0}));
        assert!(ArgReader::new(OP, &zero).page_size(100, 1000).is_err());

        let text = args(json!({"pageSize": "25"}));
        assert_eq!(ArgReader::new(OP, &text).page_size(100, 1000).unwrap(), 25);
    }

    #[test]
    fn lists_accept_arrays_and_csv() {
        let args = args(json!({"a": ["x", " y "], "b": "p, ,q", "c": []}));
        let mut reader = ArgReader::new(OP, &args);
        assert_eq!(reader.list("a").unwrap(), Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(reader.list("b").unwrap(), Some(vec!["p".to_string(), "q".to_string()]));
        assert!(reader.list("c").is_err());
    }

    #[test]
    fn finish_reports_unread_arguments() {
        let args = args(json!({"condition": "asthma", "colour": "blue"}));
        let mut reader = ArgReader::new(OP, &args);
        reader.text("condition").unwrap();
        let err = reader.finish().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { ref field, .. } if field == "colour"));
    }

    #[test]
    fn flags_accept_strings() {
        let args = args(json!({"healthyVolunteers": "TRUE", "bad": 3}));
        let mut reader = ArgReader::new(OP, &args);
        assert_eq!(reader.flag("healthyVolunteers").unwrap(), Some(true));
        assert!(reader.flag("bad").is_err());
    }
}
