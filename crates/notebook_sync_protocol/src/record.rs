//! Record payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record payload: a JSON object with a string `id` and arbitrary fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates a record holding only an id.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::String(id.into()));
        Self(fields)
    }

    /// Wraps an existing JSON object.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Sets a field, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the record id, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record and returns its fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_accessors() {
        let record = Record::new("n1").with("title", "Groceries").with("pinned", true);
        assert_eq!(record.id(), Some("n1"));
        assert_eq!(record.get("title"), Some(&json!("Groceries")));
        assert_eq!(record.fields().len(), 3);
    }

    #[test]
    fn non_string_id_is_absent() {
        let record: Record = serde_json::from_value(json!({"id": 7, "title": "x"})).unwrap();
        assert_eq!(record.id(), None);
    }
}
