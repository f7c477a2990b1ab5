//! Body value model: scalar leaves plus nested maps and lists.
//!
//! [`ValueMap`] is the ordered map every packet body is made of. It is backed
//! by a plain vector of pairs instead of a hash map because bodies are small
//! (tens of fields) and insertion order must survive encode/decode.

use std::fmt;

/// A single body value.
///
/// Scalars coming off the wire always decode as [`Value::Str`]; typed reads
/// go through [`Value::as_int`], which parses on demand. `Int` exists so
/// handlers can build responses without stringifying every number at the
/// call site — both forms encode identically.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string leaf.
    Str(String),
    /// An integer leaf, encoded in decimal.
    Int(i64),
    /// A nested map, flattened to dotted keys on the wire.
    Map(ValueMap),
    /// A list, flattened to indexed keys plus a `.[]` count key.
    List(Vec<Value>),
}

impl Value {
    /// Returns the string form of a scalar leaf.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer, parsing string leaves on demand.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the nested map, if this value is one.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the list elements, if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Map(_) => f.write_str("<map>"),
            Value::List(items) => write!(f, "<list:{}>", items.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::Map(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<ValueMap>> for Value {
    fn from(items: Vec<ValueMap>) -> Self {
        Value::List(items.into_iter().map(Value::Map).collect())
    }
}

/// An insertion-ordered string-keyed map.
///
/// `set` on an existing key replaces the value in place, keeping the key's
/// original position — the same observable behavior as the dictionary the
/// protocol was originally specified against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a key, preserving its position on replace.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Looks a key up.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks a dotted path up, descending through nested maps and lists
    /// (numeric segments index into lists).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Map(m) => m.get(segment)?,
                Value::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for ValueMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_preserves_position_on_replace() {
        let mut map = ValueMap::new();
        map.set("first", 1i64);
        map.set("second", 2i64);
        map.set("third", 3i64);
        map.set("second", "replaced");

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["first", "second", "third"]);
        assert_eq!(map.get("second").and_then(Value::as_str), Some("replaced"));
    }

    #[test]
    fn int_parsing_from_string_leaves() {
        assert_eq!(Value::Str("42".into()).as_int(), Some(42));
        assert_eq!(Value::Str(" -7 ".into()).as_int(), Some(-7));
        assert_eq!(Value::Str("nope".into()).as_int(), None);
    }

    #[test]
    fn path_lookup_descends_maps_and_lists() {
        let mut inner = ValueMap::new();
        inner.set("id", 9i64);

        let mut map = ValueMap::new();
        map.set("games", vec![Value::Map(inner)]);

        assert_eq!(map.get_path("games.0.id").and_then(Value::as_int), Some(9));
        assert!(map.get_path("games.1.id").is_none());
        assert!(map.get_path("games.0.missing").is_none());
    }
}
