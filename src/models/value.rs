use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single configuration value.
///
/// Configuration trees are heterogeneous: scalars, lists and nested mappings
/// can appear at any depth. Mappings keep their declaration order, which is
/// the order the differ reports changes in.
///
/// Floats compare by bit pattern, so a `.nan` leaf equals itself and an
/// unchanged snapshot never reports a change.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Mapping(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<ConfigSnapshot> for Value {
    fn from(snapshot: ConfigSnapshot) -> Self {
        Value::Mapping(snapshot.0)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
        Ok(Value::Integer(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
        match i64::try_from(u) {
            Ok(i) => Ok(Value::Integer(i)),
            Err(_) => Ok(Value::Float(u as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<Value, E> {
        Ok(Value::Float(x))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((MapKey(key), item)) = map.next_entry::<MapKey, Value>()? {
            entries.insert(key, item);
        }
        Ok(Value::Mapping(entries))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Mapping key that accepts any scalar.
///
/// YAML keys such as `403:` arrive as integers; configuration keys are
/// always addressed as strings.
struct MapKey(String);

struct MapKeyVisitor;

impl Visitor<'_> for MapKeyVisitor {
    type Value = MapKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar mapping key")
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<MapKey, E> {
        Ok(MapKey(b.to_string()))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<MapKey, E> {
        Ok(MapKey(i.to_string()))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<MapKey, E> {
        Ok(MapKey(u.to_string()))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<MapKey, E> {
        Ok(MapKey(x.to_string()))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<MapKey, E> {
        Ok(MapKey(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<MapKey, E> {
        Ok(MapKey(s))
    }

    fn visit_unit<E: de::Error>(self) -> Result<MapKey, E> {
        Ok(MapKey(String::new()))
    }
}

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapKeyVisitor)
    }
}

/// Full state of one named configuration object at one instant.
///
/// Snapshots are immutable inputs to the differ. Key order is the order the
/// keys were declared in, never sorted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSnapshot(IndexMap<String, Value>);

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from `(key, value)` pairs, keeping their order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parse a snapshot from a YAML document. An empty document is an empty
    /// snapshot.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml_ng::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml)
    }

    /// Encode as block-style YAML, the form stored by the structured sink
    /// and compared by the unchanged-snapshot check.
    pub fn encode(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }

    /// Look up a value by dotted path, e.g. `page.404`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Mapping(map) => map.get(segment)?,
                Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.0
    }
}

impl Serialize for ConfigSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, item) in &self.0 {
            map.serialize_entry(key, item)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfigSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Mapping(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(de::Error::custom(format!(
                "configuration snapshot must be a mapping, found `{}`",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_keeps_declaration_order() {
        let snapshot = ConfigSnapshot::from_yaml_str("zeta: 1\nalpha: 2\nmid: 3\n").unwrap();
        let keys: Vec<&str> = snapshot.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_numeric_keys_become_strings() {
        let snapshot = ConfigSnapshot::from_yaml_str("page:\n  403: /403\n  404: /404\n").unwrap();
        assert_eq!(snapshot.get_path("page.404"), Some(&Value::from("/404")));
    }

    #[test]
    fn test_scalar_types() {
        let snapshot =
            ConfigSnapshot::from_yaml_str("a: ~\nb: true\nc: 42\nd: 1.5\ne: ''\nf: [x, y]\n")
                .unwrap();
        assert_eq!(snapshot.get("a"), Some(&Value::Null));
        assert_eq!(snapshot.get("b"), Some(&Value::Bool(true)));
        assert_eq!(snapshot.get("c"), Some(&Value::Integer(42)));
        assert_eq!(snapshot.get("d"), Some(&Value::Float(1.5)));
        assert_eq!(snapshot.get("e"), Some(&Value::from("")));
        assert_eq!(snapshot.get_path("f.1"), Some(&Value::from("y")));
    }

    #[test]
    fn test_empty_document_is_empty_snapshot() {
        assert!(ConfigSnapshot::from_yaml_str("").unwrap().is_empty());
        assert!(ConfigSnapshot::from_yaml_str("~").unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        assert!(ConfigSnapshot::from_yaml_str("- a\n- b\n").is_err());
    }

    #[test]
    fn test_encode_is_stable() {
        let a = ConfigSnapshot::from_pairs([("name", "Drupal 8"), ("mail", "admin@example.com")]);
        let b = a.clone();
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert!(a.encode().unwrap().contains("Drupal 8"));
    }

    #[test]
    fn test_inline_display() {
        let mut inner = IndexMap::new();
        inner.insert("a".to_string(), Value::Integer(1));
        inner.insert(
            "b".to_string(),
            Value::Sequence(vec![Value::from("x"), Value::Bool(false)]),
        );
        assert_eq!(Value::Mapping(inner).to_string(), "{a: 1, b: [x, false]}");
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        let snapshot = ConfigSnapshot::from_yaml_str("ratio: .nan\n").unwrap();
        assert_eq!(snapshot, snapshot.clone());
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(1.0), Value::Integer(1));
    }
}
