//! Query-string helpers.
//!
//! Query parameters are kept in insertion order, so the serialized string
//! lists keys in the order they were first set. Values may be deferred: a
//! closure stored in the map is only evaluated when the query string is
//! built.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix used for generated callback names and script ids.
pub const ID_PREFIX: &str = "__rest_chain__";

/// Characters left untouched by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A single query parameter value.
#[derive(Clone)]
pub enum QueryValue {
    /// Explicitly unset; never serialized.
    Null,
    /// Literal text. The empty string is never serialized.
    Text(String),
    /// Evaluated each time the query string is built.
    Deferred(Arc<dyn Fn() -> String + Send + Sync>),
}

impl QueryValue {
    pub fn deferred(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        QueryValue::Deferred(Arc::new(f))
    }

    /// Resolve to the text that would be serialized, or `None` if this value
    /// is skipped.
    pub fn resolve(&self) -> Option<String> {
        match self {
            QueryValue::Null => None,
            QueryValue::Text(text) if text.is_empty() => None,
            QueryValue::Text(text) => Some(text.clone()),
            QueryValue::Deferred(f) => Some(f()),
        }
    }
}

impl fmt::Debug for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Null => write!(f, "Null"),
            QueryValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            QueryValue::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

impl PartialEq for QueryValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QueryValue::Null, QueryValue::Null) => true,
            (QueryValue::Text(a), QueryValue::Text(b)) => a == b,
            (QueryValue::Deferred(a), QueryValue::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

macro_rules! query_value_from_display {
    ($($t:ty),*) => {
        $(impl From<$t> for QueryValue {
            fn from(value: $t) -> Self {
                QueryValue::Text(value.to_string())
            }
        })*
    };
}

query_value_from_display!(bool, i32, i64, u32, u64, usize, f64);

// Deferred values serialize as whatever they produce at that moment.
impl Serialize for QueryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueryValue::Null => serializer.serialize_none(),
            QueryValue::Text(text) => serializer.serialize_str(text),
            QueryValue::Deferred(f) => serializer.serialize_str(&f()),
        }
    }
}

impl<'de> Deserialize<'de> for QueryValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => QueryValue::Null,
            serde_json::Value::String(text) => QueryValue::Text(text),
            other => QueryValue::Text(other.to_string()),
        })
    }
}

/// Insertion-ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(IndexMap<String, QueryValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite a value. An overwritten key keeps its original
    /// position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Union `other` into `self`; values from `other` win.
    pub fn merge(&mut self, other: &QueryParams) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.0.iter()
    }

    /// Serialize into `key=value` pairs joined by `&`.
    ///
    /// Null and empty-string values are skipped, deferred values are
    /// evaluated, keys and values are percent-encoded like
    /// `encodeURIComponent`.
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .filter_map(|(key, value)| {
                value
                    .resolve()
                    .map(|value| format!("{}={}", encode_component(key), encode_component(&value)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Append a query string to a URL, using `?` or `&` depending on whether the
/// URL already carries a query. An empty query string leaves the URL as is.
pub fn append_query_string(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let mark = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, mark, query)
}

/// An identifier made of [`ID_PREFIX`] and the current Unix time in
/// milliseconds.
pub fn prefixed_timestamp() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{}{}", ID_PREFIX, millis)
}
