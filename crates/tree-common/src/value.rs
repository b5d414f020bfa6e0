//! Tagged metadata values.
//!
//! Node metadata is an arbitrary nested mapping owned by the backend. The
//! core only needs to traverse it (search), strip fields from it (redaction)
//! and hand it to serializers, so it is modelled as an explicit tagged value
//! rather than passed around as untyped JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A JSON-like metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Sequence(Vec<MetaValue>),
    Mapping(Metadata),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Metadata> {
        match self {
            MetaValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// True for values that have a total order with others of their type.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            MetaValue::Bool(_) | MetaValue::Number(_) | MetaValue::String(_)
        )
    }

    /// Name of the variant, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "bool",
            MetaValue::Number(_) => "number",
            MetaValue::String(_) => "string",
            MetaValue::Sequence(_) => "sequence",
            MetaValue::Mapping(_) => "mapping",
        }
    }

    /// Visit every string leaf, depth first.
    pub fn for_each_string<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match self {
            MetaValue::String(s) => f(s),
            MetaValue::Sequence(items) => {
                for item in items {
                    item.for_each_string(f);
                }
            }
            MetaValue::Mapping(map) => map.for_each_string(f),
            _ => {}
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for MetaValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetaValue::Null,
            serde_json::Value::Bool(b) => MetaValue::Bool(b),
            serde_json::Value::Number(n) => MetaValue::Number(n),
            serde_json::Value::String(s) => MetaValue::String(s),
            serde_json::Value::Array(items) => {
                MetaValue::Sequence(items.into_iter().map(MetaValue::from).collect())
            }
            serde_json::Value::Object(map) => MetaValue::Mapping(Metadata(
                map.into_iter().map(|(k, v)| (k, MetaValue::from(v))).collect(),
            )),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Number(value.into())
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(MetaValue::Number)
            .unwrap_or(MetaValue::Null)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Mapping of string keys to metadata values, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &MetaValue> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }

    /// Look up a dotted path such as `sample.temperature.units`.
    pub fn get_path(&self, dotted: &str) -> Option<&MetaValue> {
        let mut segments = dotted.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_mapping()?.0.get(segment)?;
        }
        Some(current)
    }

    /// Remove the value at a dotted path. Returns the removed value, if any.
    pub fn remove_path(&mut self, dotted: &str) -> Option<MetaValue> {
        match dotted.split_once('.') {
            None => self.0.remove(dotted),
            Some((head, rest)) => match self.0.get_mut(head)? {
                MetaValue::Mapping(inner) => inner.remove_path(rest),
                _ => None,
            },
        }
    }

    /// Visit every string leaf in the mapping.
    pub fn for_each_string<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        for value in self.0.values() {
            value.for_each_string(f);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Metadata {
    fn from(value: serde_json::Value) -> Self {
        match MetaValue::from(value) {
            MetaValue::Mapping(m) => m,
            _ => Metadata::default(),
        }
    }
}

impl FromIterator<(String, MetaValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, MetaValue)>>(iter: T) -> Self {
        Metadata(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Metadata {
        Metadata::from(json!({
            "sample": {"name": "quartz", "temperature": {"value": 300, "units": "K"}},
            "tags": ["calibration", "beamline-7"],
            "operator": "anonymous"
        }))
    }

    #[test]
    fn test_get_path() {
        let md = sample();
        assert_eq!(
            md.get_path("sample.temperature.units").and_then(|v| v.as_str()),
            Some("K")
        );
        assert_eq!(md.get_path("sample.temperature.value").and_then(|v| v.as_f64()), Some(300.0));
        assert!(md.get_path("sample.missing").is_none());
        assert!(md.get_path("tags.0").is_none());
    }

    #[test]
    fn test_remove_path() {
        let mut md = sample();
        assert!(md.remove_path("sample.temperature.units").is_some());
        assert!(md.get_path("sample.temperature.units").is_none());
        assert!(md.get_path("sample.temperature.value").is_some());

        assert!(md.remove_path("operator").is_some());
        assert!(md.get("operator").is_none());
        assert!(md.remove_path("nope.nested").is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let md = sample();
        let json = md.to_json();
        assert_eq!(Metadata::from(json), md);
    }

    #[test]
    fn test_untagged_deserialize() {
        let value: MetaValue = serde_json::from_str(r#"[1, "a", null, {"k": true}]"#).unwrap();
        match value {
            MetaValue::Sequence(items) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[2], MetaValue::Null);
                assert!(matches!(items[3], MetaValue::Mapping(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_each_string() {
        let md = sample();
        let mut seen = Vec::new();
        md.for_each_string(&mut |s| seen.push(s.to_string()));
        assert!(seen.contains(&"quartz".to_string()));
        assert!(seen.contains(&"beamline-7".to_string()));
        assert!(seen.contains(&"K".to_string()));
    }
}
