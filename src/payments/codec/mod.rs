//! Wire codec
//!
//! Bank payloads are ordered key/value trees. Request mappers build a
//! [`Payload`], a codec turns it into bytes for the wire, and the reply is
//! decoded back into a [`Payload`] (or, for banks that answer with an
//! auto-submitting page, into an [`HtmlForm`]).

pub mod form;
pub mod html;
pub mod xml;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use form::{decode_delimited, encode_form};
pub use html::{extract_form, is_html, HtmlForm};
pub use xml::{decode_xml, encode_xml, XmlOptions};

/// One node of a bank payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Map(Payload),
    List(Vec<Value>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Payload> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn normalized(self) -> Value {
        match self {
            Value::Text(text) if text.trim().is_empty() => Value::Null,
            Value::Map(map) => Value::Map(map.normalized()),
            Value::List(items) => Value::List(items.into_iter().map(Value::normalized).collect()),
            other => other,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        value.map(Value::from).unwrap_or(Value::Null)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Payload> for Value {
    fn from(value: Payload) -> Self {
        Value::Map(value)
    }
}

/// Ordered key/value tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(IndexMap<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, keeps insertion order.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Text value of `key`. Absent, null and empty values all read as `None`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_text)
            .filter(|text| !text.is_empty())
    }

    /// Owned variant of [`Payload::text`]
    pub fn string(&self, key: &str) -> Option<String> {
        self.text(key).map(str::to_string)
    }

    pub fn map(&self, key: &str) -> Option<&Payload> {
        self.get(key).and_then(Value::as_map)
    }

    /// Walk nested maps. The last segment must be a text leaf.
    pub fn path(&self, keys: &[&str]) -> Option<&str> {
        let (last, parents) = keys.split_last()?;
        let mut current = self;
        for key in parents {
            current = current.map(key)?;
        }
        current.text(last)
    }

    pub fn path_string(&self, keys: &[&str]) -> Option<String> {
        self.path(keys).map(str::to_string)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Replace every empty or whitespace-only text leaf with `Null`.
    pub fn normalized(self) -> Payload {
        Payload(
            self.0
                .into_iter()
                .map(|(key, value)| (key, value.normalized()))
                .collect(),
        )
    }

    /// Flat view of the text leaves at the top level
    pub fn to_flat(&self) -> IndexMap<String, String> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.as_text().map(|text| (key.clone(), text.to_string())))
            .collect()
    }
}

impl FromIterator<(String, String)> for Payload {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Payload(
            iter.into_iter()
                .map(|(key, value)| (key, Value::Text(value)))
                .collect(),
        )
    }
}

impl From<IndexMap<String, String>> for Payload {
    fn from(map: IndexMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Payload {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Decoded bank reply
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Structured(Payload),
    HtmlForm(HtmlForm),
}
