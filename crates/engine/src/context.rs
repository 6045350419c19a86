//! Context store: the nested key/value tree scenario nodes read from and
//! write their results into.
//!
//! Reads of missing paths yield `None` and writes create whatever intermediate
//! objects they need. The shape of the context grows as nodes commit results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Split a dotted path into its non-empty segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').map(str::trim).filter(|s| !s.is_empty())
}

/// Walk `segments` down from `value`. Numeric segments index into arrays.
pub fn lookup<'a, I, S>(value: &'a Value, segments: I) -> Option<&'a Value>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment.as_ref()),
            Value::Array(items) => segment
                .as_ref()
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Assign `new_value` at `segments` below `target`, creating objects on the
/// way. A non-object met on the way is replaced by an empty object and its
/// previous value is lost.
pub fn write_path<'s, I>(target: &mut Value, segments: I, new_value: Value)
where
    I: IntoIterator<Item = &'s str>,
{
    let segments: Vec<&str> = segments.into_iter().collect();
    let Some((last, parents)) = segments.split_last() else {
        *target = new_value;
        return;
    };

    let mut current = target;
    for segment in parents {
        current = as_object_mut(current, segment)
            .entry((*segment).to_owned())
            .or_insert(Value::Null);
    }
    as_object_mut(current, last).insert((*last).to_owned(), new_value);
}

fn as_object_mut<'v>(value: &'v mut Value, segment: &str) -> &'v mut Map<String, Value> {
    if !value.is_object() {
        if !value.is_null() {
            warn!(
                segment,
                replaced = %value,
                "context path write replaced a non-object value"
            );
        }
        *value = Value::Object(Map::new());
    }
    let Value::Object(map) = value else {
        unreachable!("value was coerced to an object");
    };
    map
}

// ---------------------------------------------------------------------------
// ContextStore
// ---------------------------------------------------------------------------

/// Top-level string keys mapped to arbitrary JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextStore {
    values: Map<String, Value>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON object. Non-object values yield an empty store.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// The whole store as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Read the top-level value for `key`, or the value at `path` below it.
    pub fn get(&self, key: &str, path: Option<&str>) -> Option<&Value> {
        let root = self.values.get(key)?;
        match path {
            Some(path) => lookup(root, path_segments(path)),
            None => Some(root),
        }
    }

    /// Replace the top-level value for `key` wholesale.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Assign `value` at the dotted `path` under `key`, initialising `key` to
    /// an empty object when absent. An empty path behaves like [`set`](Self::set).
    pub fn set_path(&mut self, key: &str, path: &str, value: Value) {
        if path_segments(path).next().is_none() {
            self.set(key, value);
            return;
        }
        let root = self
            .values
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        write_path(root, path_segments(path), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Independent copy of the whole store.
    pub fn snapshot(&self) -> ContextStore {
        self.clone()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
