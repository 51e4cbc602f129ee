//! Host-side data exchanged with the registrar
//!
//! A [`Value`] is the nested shape that arguments, reply payloads, warnings
//! and credential extras take before they are translated to XML by the
//! [`Codec`](super::codec::Codec).

use std::collections::BTreeMap;

/// Recursive structured value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value. Decoding an element without content yields this.
    #[default]
    Null,
    /// Scalar text
    Text(String),
    /// Scalar of unknown charset, run through the encoding safety net
    Bytes(Vec<u8>),
    /// Ordered list, serialized as `<array><item/>...</array>`
    List(Vec<Value>),
    /// Named fields, serialized as one child element per key
    Map(Map),
    /// Index-keyed entries, serialized like a list in ascending index order
    Indexed(BTreeMap<u64, Value>),
}

impl Value {
    /// Build a text scalar from anything that can render itself as text
    pub fn text<S: Stringable + ?Sized>(value: &S) -> Self {
        Value::Text(value.to_text())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a named field; `None` unless this is a map holding `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Look up a list position; `None` unless this is a list long enough
    pub fn index(&self, idx: usize) -> Option<&Value> {
        self.as_list().and_then(|items| items.get(idx))
    }

    /// Walk a `/`-separated path of map keys and list positions.
    ///
    /// `value.path("nameServers/0/name")` reads the name of the first
    /// nameserver.
    pub fn path(&self, path: &str) -> Option<&Value> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| match node {
                Value::List(_) => segment.parse::<usize>().ok().and_then(|i| node.index(i)),
                _ => node.get(segment),
            })
    }
}

/// Capability of rendering a host value as protocol text.
///
/// Only types implementing this trait can become scalar [`Value`]s.
pub trait Stringable {
    fn to_text(&self) -> String;
}

impl Stringable for str {
    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl Stringable for String {
    fn to_text(&self) -> String {
        self.clone()
    }
}

impl Stringable for bool {
    fn to_text(&self) -> String {
        let text = if *self { "1" } else { "0" };
        text.to_string()
    }
}

macro_rules! stringable_via_display {
    ($($ty:ty),*) => {
        $(
            impl Stringable for $ty {
                fn to_text(&self) -> String {
                    self.to_string()
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Text(v.to_text())
                }
            }
        )*
    };
}

stringable_via_display!(u8, u16, u32, u64, i8, i16, i32, i64, usize, std::net::IpAddr);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Text(v.to_text())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl From<BTreeMap<u64, Value>> for Value {
    fn from(v: BTreeMap<u64, Value>) -> Self {
        Value::Indexed(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Insertion-ordered map of named fields with unique keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Map::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a field, keeping the original position on replace.
    /// Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Text of a scalar field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
