//! Query string construction.

use serde_json::Value;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Ordered query parameters.
///
/// Parameters keep insertion order. `null` values are dropped when the query
/// string is rendered, so optional filters can be passed unconditionally.
///
/// ```
/// use core_api::query::QueryParams;
///
/// let params = QueryParams::new()
///     .with("a", 1)
///     .with("b", Option::<i32>::None)
///     .with("c", "x y");
///
/// assert_eq!(params.to_query_string(), "a=1&c=x%20y");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, Value)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Renders `key=value` pairs joined by `&`, percent-encoding both sides.
    pub fn to_query_string(&self) -> String {
        self.entries
            .iter()
            .filter_map(|(key, value)| {
                let value = render_value(value)?;
                Some(format!("{}={}", encode_component(key), encode_component(&value)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.push(key, value);
        }
        params
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Characters left as-is in a component: alphanumerics and `-_.!~*'()`.
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

/// Percent-encodes a single component. Spaces become `%20`, not `+`.
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Joins a base URL, an endpoint path and the rendered query string.
pub fn build_url(base_url: &str, endpoint: &str, params: Option<&QueryParams>) -> String {
    let mut url = format!("{}{}", base_url, endpoint);
    if let Some(query) = params
        .map(QueryParams::to_query_string)
        .filter(|q| !q.is_empty())
    {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    url
}
