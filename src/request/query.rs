use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
/// The value(s) of one query string key.
pub enum QueryValue {
    /// The key appeared once.
    One(String),
    /// The key appeared more than once; the values are in order.
    Many(Vec<String>),
}

impl QueryValue {
    /// The first value.
    pub fn first(&self) -> &str {
        match self {
            QueryValue::One(v) => v,
            QueryValue::Many(v) => v.first().map_or("", String::as_str),
        }
    }

    /// Every value, in order.
    pub fn all(&self) -> Vec<&str> {
        match self {
            QueryValue::One(v) => vec![v.as_str()],
            QueryValue::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::One(first) => {
                let first = std::mem::take(first);
                *self = QueryValue::Many(vec![first, value]);
            }
            QueryValue::Many(values) => values.push(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
/// The parsed query string of a request.
///
/// Keys that appear once map to a single string; keys that repeat map to
/// every value they were given, in order.
///
/// # Examples
/// ```rust
/// # use noheadache::{Query, QueryValue};
/// let query = Query::parse("include=profile&tag=a&tag=b&empty");
/// assert_eq!(query.get("include"), Some("profile"));
/// assert_eq!(query.get_all("tag"), vec!["a", "b"]);
/// assert_eq!(query.get("empty"), Some(""));
/// assert_eq!(query.get("missing"), None);
/// ```
pub struct Query(HashMap<String, QueryValue>);

impl Query {
    /// Parses a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let mut map = HashMap::<String, QueryValue>::new();
        for (key, value) in crate::payload::parse_pairs(raw.as_bytes()) {
            match map.get_mut(&key) {
                Some(existing) => existing.push(value),
                None => {
                    map.insert(key, QueryValue::One(value));
                }
            }
        }
        Query(map)
    }

    /// The first value of the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(QueryValue::first)
    }

    /// Every value of the given key, in order; empty if it is not present.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0.get(key).map(QueryValue::all).unwrap_or_default()
    }

    /// The raw value of the given key.
    pub fn value(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
