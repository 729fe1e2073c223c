//! Request/response shapes.

use std::fmt;

use faultline_dsl::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Zero or more rule clauses followed by one query atom.
    pub query: String,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<ResultBinding>,
    pub count: usize,
}

impl QueryResponse {
    pub fn new(results: Vec<ResultBinding>) -> Self {
        let count = results.len();
        Self { results, count }
    }
}

/// A bound value, rendered without quoting syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    Number(i64),
    String(String),
}

impl From<&Value> for BindingValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => BindingValue::Number(*n),
            Value::String(s) => BindingValue::String(s.clone()),
        }
    }
}

impl From<&str> for BindingValue {
    fn from(s: &str) -> Self {
        BindingValue::String(s.to_string())
    }
}

impl From<i64> for BindingValue {
    fn from(n: i64) -> Self {
        BindingValue::Number(n)
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Number(n) => write!(f, "{n}"),
            BindingValue::String(s) => f.write_str(s),
        }
    }
}

/// Variable name → value, in the order the variables first appear in the
/// query pattern. Serialized as a JSON object with that key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultBinding {
    entries: IndexMap<String, BindingValue>,
}

impl ResultBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; a new key goes to the end.
    pub fn insert(&mut self, name: impl Into<String>, value: BindingValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.entries.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, BindingValue)> for ResultBinding {
    fn from_iter<I: IntoIterator<Item = (K, BindingValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_serializes_in_insertion_order() {
        let binding: ResultBinding = [
            ("Service", BindingValue::from("order-service")),
            ("TraceID", BindingValue::from("trace-xyz")),
            ("Status", BindingValue::from(500i64)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_string(&binding).expect("json"),
            r#"{"Service":"order-service","TraceID":"trace-xyz","Status":500}"#
        );
    }

    #[test]
    fn response_round_trips_through_json() {
        let mut binding = ResultBinding::new();
        binding.insert("X", BindingValue::from("a"));
        let response = QueryResponse::new(vec![binding]);
        let text = serde_json::to_string(&response).expect("json");
        assert_eq!(text, r#"{"results":[{"X":"a"}],"count":1}"#);
        let back: QueryResponse = serde_json::from_str(&text).expect("decode");
        assert_eq!(back, response);
    }

    #[test]
    fn reinserting_a_key_keeps_its_position() {
        let mut binding = ResultBinding::new();
        binding.insert("TraceID", BindingValue::from("t1"));
        binding.insert("Service", BindingValue::from("api"));
        binding.insert("TraceID", BindingValue::from("t2"));
        assert_eq!(binding.keys().collect::<Vec<_>>(), vec!["TraceID", "Service"]);
        assert_eq!(binding.get("TraceID"), Some(&BindingValue::from("t2")));
        assert_eq!(binding.len(), 2);
    }

    #[test]
    fn decoding_preserves_key_order() {
        let binding: ResultBinding =
            serde_json::from_str(r#"{"Z":1,"A":"x","M":2}"#).expect("decode");
        assert_eq!(binding.keys().collect::<Vec<_>>(), vec!["Z", "A", "M"]);
    }
}
