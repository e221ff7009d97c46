//! Structured fetch results and tool input types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Normalized result of one data source.
///
/// Records keep their fields in the order the source produced them, so
/// field capping is stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FetchValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Sequence(Vec<FetchValue>),
    Record(Vec<(String, FetchValue)>),
}

impl FetchValue {
    /// Build a value from a raw response body.
    ///
    /// Bodies that are not valid JSON are kept verbatim as text.
    pub fn from_raw_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => value.into(),
            Err(_) => FetchValue::Text(text.to_string()),
        }
    }

    /// Build a record from `(field, value)` pairs.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FetchValue)>,
    {
        FetchValue::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a record field by name.
    pub fn get(&self, field: &str) -> Option<&FetchValue> {
        match self {
            FetchValue::Record(fields) => fields.iter().find(|(k, _)| k == field).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[FetchValue]> {
        match self {
            FetchValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FetchValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FetchValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Number of elements (sequence), fields (record), or 1 for a scalar.
    /// Null counts as empty.
    pub fn len(&self) -> usize {
        match self {
            FetchValue::Null => 0,
            FetchValue::Sequence(items) => items.len(),
            FetchValue::Record(fields) => fields.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply result-size limits.
    ///
    /// A sequence keeps its first `max_items` elements and every record element
    /// keeps its first `max_fields` fields. A top-level record is a keyed
    /// collection: it keeps its first `max_items` fields and each field value is
    /// capped like a sequence. Scalars pass through.
    pub fn capped(self, limits: &ResultLimits) -> Self {
        match self {
            FetchValue::Sequence(items) => FetchValue::Sequence(cap_sequence(items, limits)),
            FetchValue::Record(fields) => FetchValue::Record(
                fields
                    .into_iter()
                    .take(limits.max_items)
                    .map(|(key, value)| match value {
                        FetchValue::Sequence(items) => {
                            (key, FetchValue::Sequence(cap_sequence(items, limits)))
                        }
                        other => (key, other),
                    })
                    .collect(),
            ),
            scalar => scalar,
        }
    }

    /// Serialize to a compact JSON string.
    pub fn to_json_string(&self) -> String {
        Value::from(self.clone()).to_string()
    }
}

fn cap_sequence(items: Vec<FetchValue>, limits: &ResultLimits) -> Vec<FetchValue> {
    items
        .into_iter()
        .take(limits.max_items)
        .map(|item| match item {
            FetchValue::Record(fields) => {
                FetchValue::Record(fields.into_iter().take(limits.max_fields).collect())
            }
            other => other,
        })
        .collect()
}

impl From<Value> for FetchValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FetchValue::Null,
            Value::Bool(b) => FetchValue::Bool(b),
            Value::Number(n) => FetchValue::Number(n),
            Value::String(s) => FetchValue::Text(s),
            Value::Array(items) => {
                FetchValue::Sequence(items.into_iter().map(FetchValue::from).collect())
            }
            Value::Object(map) => FetchValue::Record(
                map.into_iter()
                    .map(|(k, v)| (k, FetchValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<FetchValue> for Value {
    fn from(value: FetchValue) -> Self {
        match value {
            FetchValue::Null => Value::Null,
            FetchValue::Bool(b) => Value::Bool(b),
            FetchValue::Number(n) => Value::Number(n),
            FetchValue::Text(s) => Value::String(s),
            FetchValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            FetchValue::Record(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Bounds applied to every fetch result before it reaches a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLimits {
    /// Maximum elements kept from a sequence
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Maximum fields kept per record element
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,
}

impl ResultLimits {
    pub fn new(max_items: usize, max_fields: usize) -> Self {
        Self {
            max_items,
            max_fields,
        }
    }
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_fields: default_max_fields(),
        }
    }
}

fn default_max_items() -> usize {
    10
}

fn default_max_fields() -> usize {
    6
}

/// Input to a tool function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub method: String,
    pub params: BTreeMap<String, Value>,
}

impl ToolInput {
    /// Create a new ToolInput
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: BTreeMap::new(),
        }
    }

    /// Parse tool arguments from a JSON object string.
    ///
    /// An empty string or `null` yields no parameters.
    pub fn from_json(method: impl Into<String>, arguments_json: &str) -> Result<Self, ToolError> {
        let mut input = Self::new(method);
        let trimmed = arguments_json.trim();
        if trimmed.is_empty() {
            return Ok(input);
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => {
                input.params = map.into_iter().collect();
                Ok(input)
            }
            Ok(Value::Null) => Ok(input),
            Ok(_) => Err(ToolError::InvalidParameter(
                "arguments must be a JSON object".to_string(),
            )),
            Err(e) => Err(ToolError::InvalidParameter(format!(
                "failed to parse arguments JSON: {}",
                e
            ))),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Get an optional i64 parameter, accepting numeric strings
    pub fn param_i64_opt(&self, key: &str) -> Option<i64> {
        match self.params.get(key) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// All scalar parameters rendered as strings.
    ///
    /// Numbers and booleans are stringified; nulls are skipped; nested
    /// values are rejected.
    pub fn scalar_params(&self) -> Result<BTreeMap<String, String>, ToolError> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.params {
            let rendered = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ToolError::InvalidParameter(format!(
                        "'{}' must be a scalar value",
                        key
                    )))
                }
            };
            out.insert(key.clone(), rendered);
        }
        Ok(out)
    }
}

/// Tool-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wide_record(prefix: &str, fields: usize) -> FetchValue {
        FetchValue::record(
            (0..fields).map(|i| (format!("{}{:02}", prefix, i), FetchValue::from(json!(i)))),
        )
    }

    #[test]
    fn test_from_raw_text_parses_json() {
        let value = FetchValue::from_raw_text(r#"{"x": 1, "y": [true, null]}"#);
        assert_eq!(value.get("x").and_then(FetchValue::as_i64), Some(1));
        assert_eq!(value.get("y").map(FetchValue::len), Some(2));
    }

    #[test]
    fn test_from_raw_text_falls_back_to_text() {
        let value = FetchValue::from_raw_text("Total rules installed: 4200");
        assert_eq!(value.as_text(), Some("Total rules installed: 4200"));
    }

    #[test]
    fn test_record_preserves_field_order() {
        let value: FetchValue = serde_json::from_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        let FetchValue::Record(fields) = &value else {
            panic!("expected record");
        };
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(value.to_json_string(), r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn test_cap_sequence_of_records() {
        let items = FetchValue::Sequence((0..1000).map(|_| wide_record("f", 20)).collect());
        let capped = items.capped(&ResultLimits::default());

        let seq = capped.as_sequence().unwrap();
        assert_eq!(seq.len(), 10);
        for item in seq {
            assert_eq!(item.len(), 6);
            // first fields are kept, in order
            assert!(item.get("f00").is_some());
            assert!(item.get("f05").is_some());
            assert!(item.get("f06").is_none());
        }
    }

    #[test]
    fn test_cap_keeps_non_record_elements() {
        let items = FetchValue::from(json!(["a", 1, null, ["nested", "list"]]));
        let capped = items.clone().capped(&ResultLimits::new(10, 1));
        assert_eq!(capped, items);
    }

    #[test]
    fn test_cap_top_level_record_as_collection() {
        let value = FetchValue::from(json!({
            "001": [{"a": 1, "b": 2, "c": 3}, {"a": 4}, {"a": 5}],
            "002": [],
            "003": "scalar",
        }));
        let capped = value.capped(&ResultLimits::new(2, 2));

        assert_eq!(capped.len(), 2);
        let first = capped.get("001").unwrap().as_sequence().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].len(), 2);
        assert!(capped.get("003").is_none());
    }

    #[test]
    fn test_cap_scalar_passthrough() {
        let value = FetchValue::Text("x".repeat(100));
        assert_eq!(value.clone().capped(&ResultLimits::new(1, 1)), value);
    }

    #[test]
    fn test_null_is_empty() {
        assert!(FetchValue::Null.is_empty());
        assert!(FetchValue::Sequence(vec![]).is_empty());
        assert!(!FetchValue::Bool(false).is_empty());
    }

    #[test]
    fn test_tool_input_from_json() {
        let input = ToolInput::from_json("search", r#"{"query": "sshd", "limit": 5}"#).unwrap();
        assert_eq!(input.method, "search");
        assert_eq!(input.param_str("query").unwrap(), "sshd");
        assert_eq!(input.param_i64_opt("limit"), Some(5));
    }

    #[test]
    fn test_tool_input_from_empty_json() {
        let input = ToolInput::from_json("noop", "  ").unwrap();
        assert!(input.params.is_empty());
        let input = ToolInput::from_json("noop", "null").unwrap();
        assert!(input.params.is_empty());
    }

    #[test]
    fn test_tool_input_rejects_non_object() {
        let result = ToolInput::from_json("bad", "[1, 2]");
        assert!(matches!(result, Err(ToolError::InvalidParameter(_))));
        let result = ToolInput::from_json("bad", "{not json");
        assert!(matches!(result, Err(ToolError::InvalidParameter(_))));
    }

    #[test]
    fn test_param_i64_opt_accepts_numeric_string() {
        let input = ToolInput::new("t").with_param("limit", json!("25"));
        assert_eq!(input.param_i64_opt("limit"), Some(25));
        let input = ToolInput::new("t").with_param("limit", json!("many"));
        assert_eq!(input.param_i64_opt("limit"), None);
    }

    #[test]
    fn test_scalar_params() {
        let input = ToolInput::new("t")
            .with_param("agent_id", json!("002"))
            .with_param("limit", json!(20))
            .with_param("skip", Value::Null);
        let params = input.scalar_params().unwrap();
        assert_eq!(params.get("agent_id").map(String::as_str), Some("002"));
        assert_eq!(params.get("limit").map(String::as_str), Some("20"));
        assert!(!params.contains_key("skip"));

        let nested = ToolInput::new("t").with_param("agent_id", json!({"id": 1}));
        assert!(nested.scalar_params().is_err());
    }

    #[test]
    fn test_result_limits_defaults() {
        let limits = ResultLimits::default();
        assert_eq!(limits.max_items, 10);
        assert_eq!(limits.max_fields, 6);

        let parsed: ResultLimits = serde_json::from_str(r#"{"max_items": 3}"#).unwrap();
        assert_eq!(parsed, ResultLimits::new(3, 6));
    }
}
