//! JSON documents addressed by dot-separated paths.
//!
//! `set("player.score", 10)` creates `{"player":{"score":10}}`. Missing
//! intermediate objects are created; an intermediate that holds a
//! non-object value is replaced by an object.

use serde_json::{Map, Value};

use crate::error::AnalyticsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Map<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self { root: Map::new() }
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), AnalyticsError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AnalyticsError::InvalidPath(path.to_string()));
        }

        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(AnalyticsError::InvalidPath(path.to_string())),
        };

        let mut node = &mut self.root;
        for segment in parents {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = entry
                .as_object_mut()
                .ok_or_else(|| AnalyticsError::InvalidPath(path.to_string()))?;
        }
        node.insert(last.to_string(), value.into());
        Ok(())
    }

    pub fn set_str(&mut self, path: &str, value: &str) -> Result<(), AnalyticsError> {
        self.set(path, value)
    }

    pub fn set_int(&mut self, path: &str, value: i64) -> Result<(), AnalyticsError> {
        self.set(path, value)
    }

    /// Non-finite numbers have no JSON form and are stored as `null`.
    pub fn set_double(&mut self, path: &str, value: f64) -> Result<(), AnalyticsError> {
        self.set(path, value)
    }

    pub fn set_bool(&mut self, path: &str, value: bool) -> Result<(), AnalyticsError> {
        self.set(path, value)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut value = self.root.get(segments.next()?)?;
        for segment in segments {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths_create_objects() {
        let mut doc = Document::new();
        doc.set_str("String", "lots of string").unwrap();
        doc.set_str("boop.test", "blah").unwrap();
        doc.set_int("Val.a", 32).unwrap();
        doc.set_int("Val.b", 35).unwrap();
        doc.set_double("double", 3.5).unwrap();
        doc.set_bool("flag", true).unwrap();

        assert_eq!(
            doc.to_value(),
            json!({
                "String": "lots of string",
                "boop": {"test": "blah"},
                "Val": {"a": 32, "b": 35},
                "double": 3.5,
                "flag": true
            })
        );
    }

    #[test]
    fn later_writes_replace_earlier_ones() {
        let mut doc = Document::new();
        doc.set_int("a.b", 1).unwrap();
        doc.set_int("a.b", 2).unwrap();
        assert_eq!(doc.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn scalar_parent_is_replaced_by_object() {
        let mut doc = Document::new();
        doc.set_int("a", 1).unwrap();
        doc.set_bool("a.b", false).unwrap();
        assert_eq!(doc.to_value(), json!({"a": {"b": false}}));
    }

    #[test]
    fn empty_segments_are_rejected() {
        let mut doc = Document::new();
        for path in ["", ".", "a.", ".a", "a..b"] {
            let err = doc.set_int(path, 1).unwrap_err();
            assert!(matches!(err, AnalyticsError::InvalidPath(_)), "{path}");
        }
        assert!(doc.is_empty());
    }

    #[test]
    fn strings_are_escaped_when_serialized() {
        let mut doc = Document::new();
        doc.set_str("s", "tab\there \"quoted\" \\ newline\n").unwrap();
        let text = serde_json::to_string(&doc.into_value()).unwrap();
        assert_eq!(text, r#"{"s":"tab\there \"quoted\" \\ newline\n"}"#);
    }

    #[test]
    fn non_finite_double_becomes_null() {
        let mut doc = Document::new();
        doc.set_double("x", f64::NAN).unwrap();
        assert_eq!(doc.get("x"), Some(&Value::Null));
    }

    #[test]
    fn get_missing_path() {
        let doc = Document::new();
        assert!(doc.get("a.b").is_none());
    }
}
