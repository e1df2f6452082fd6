//! Tagged data representation the interpreter resolves paths against.
//!
//! Context data is ingested once (usually from `serde_json::Value`) and
//! classified up front, so the interpreter matches on variants instead of
//! probing types at every resolution site. JSON objects whose keys all look
//! like locale codes and whose values are all strings become
//! [`Value::LocaleMap`]; those are the values `${name}` narrows to a single
//! translation at render time.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    /// Locale code to translated text. Values are always `Value::String`.
    LocaleMap(IndexMap<String, Value>),
}

impl Value {
    /// Build a locale map from `(locale, text)` pairs.
    pub fn locale_map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Value::LocaleMap(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    /// Ingest any serializable value (structs become mappings).
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Value::from)
    }

    /// Truthiness used by `${if:NAME}`: absent, null, false, zero, the empty
    /// string and empty collections are all false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Mapping(map) | Value::LocaleMap(map) => !map.is_empty(),
        }
    }

    /// Used by `${if:NAME?}`: a collection counts only if one of its
    /// elements is truthy.
    pub fn is_populated(&self) -> bool {
        match self {
            Value::Sequence(items) => items.iter().any(Value::is_truthy),
            Value::Mapping(map) | Value::LocaleMap(map) => map.values().any(Value::is_truthy),
            other => other.is_truthy(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::LocaleMap(_) => "locale map",
        }
    }

    /// Look up a single path segment. A purely numeric segment indexes a
    /// sequence; anything else is a key lookup.
    pub fn get(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Mapping(map) | Value::LocaleMap(map) => map.get(segment),
            _ => None,
        }
    }

    /// Walk a dotted path. Missing segments yield `None`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| current.get(segment))
    }

    /// Elements a `for` block iterates over: a sequence in order, or the
    /// values of a mapping in insertion order. Scalars are not iterable.
    pub fn items(&self) -> Option<Vec<&Value>> {
        match self {
            Value::Sequence(items) => Some(items.iter().collect()),
            Value::Mapping(map) | Value::LocaleMap(map) => Some(map.values().collect()),
            _ => None,
        }
    }

    /// Equality used by `==` and `!=`; numbers compare by value so `1`
    /// equals `1.0`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            _ => self == other,
        }
    }

    /// Ordering used by `<`, `>`, `<=`, `>=`. Only numbers against numbers
    /// and strings against strings are ordered.
    pub fn scalar_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn is_locale_code(key: &str) -> bool {
    let (language, region) = match key.find(['-', '_']) {
        Some(idx) => (&key[..idx], Some(&key[idx + 1..])),
        None => (key, None),
    };
    let language_ok =
        (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_alphabetic());
    let region_ok = region.map_or(true, |r| {
        (2..=8).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric())
    });
    language_ok && region_ok
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let is_locale_map = !map.is_empty()
                    && map
                        .iter()
                        .all(|(k, v)| is_locale_code(k) && v.is_string());
                let entries: IndexMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                if is_locale_map {
                    Value::LocaleMap(entries)
                } else {
                    Value::Mapping(entries)
                }
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Sequence(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Mapping(map) | Value::LocaleMap(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
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
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}
